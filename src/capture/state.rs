use serde::{Deserialize, Serialize};

use crate::landmarks::{average_frames, AggregateError, HandFrame};

use super::game::GameSnapshot;
use super::guided::GuidedSnapshot;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CaptureMode {
    #[default]
    Guided,
    Game,
}

impl CaptureMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureMode::Guided => "guided",
            CaptureMode::Game => "game",
        }
    }
}

/// Start of the current phase; everything timed is measured from here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseClock {
    phase_start_ms: u64,
}

impl PhaseClock {
    pub fn new(now_ms: u64) -> Self {
        Self {
            phase_start_ms: now_ms,
        }
    }

    pub fn reset(&mut self, now_ms: u64) {
        self.phase_start_ms = now_ms;
    }

    pub fn started_at(&self) -> u64 {
        self.phase_start_ms
    }

    pub fn elapsed(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.phase_start_ms)
    }
}

/// Frames collected during one hold attempt.
#[derive(Debug, Clone, Default)]
pub struct HoldBuffer {
    frames: Vec<HandFrame>,
}

impl HoldBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: HandFrame) {
        self.frames.push(frame);
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Averages the collected frames and empties the buffer. Fails only when
    /// nothing was collected.
    pub fn take_embedding(&mut self) -> Result<SaveRequest, AggregateError> {
        let embedding = average_frames(&self.frames)?;
        let frame_count = self.frames.len();
        self.frames.clear();
        Ok(SaveRequest {
            embedding,
            frame_count,
        })
    }
}

/// Emitted by a state machine when a hold completes.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    pub embedding: HandFrame,
    pub frame_count: usize,
}

/// `elapsed / duration`, clamped to `[0, 1]`.
pub fn progress(elapsed_ms: u64, duration_ms: u64) -> f64 {
    if duration_ms == 0 {
        return 1.0;
    }
    (elapsed_ms as f64 / duration_ms as f64).clamp(0.0, 1.0)
}

/// Whole seconds left, rounded up.
pub fn ceil_secs(remaining_ms: u64) -> u64 {
    remaining_ms.div_ceil(1000)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum CaptureSnapshot {
    Guided(GuidedSnapshot),
    Game(GameSnapshot),
}

impl CaptureSnapshot {
    pub fn status(&self) -> &str {
        match self {
            CaptureSnapshot::Guided(s) => &s.status,
            CaptureSnapshot::Game(s) => &s.status,
        }
    }

    pub fn progress(&self) -> f64 {
        match self {
            CaptureSnapshot::Guided(s) => s.progress,
            CaptureSnapshot::Game(s) => s.progress,
        }
    }
}

/// A phase-driven capture session fed one detection per frame.
pub trait CaptureMachine: Send + 'static {
    fn mode(&self) -> CaptureMode;

    /// Manual start control: enters the first active phase.
    fn start(&mut self, now_ms: u64);

    fn reset(&mut self, now_ms: u64);

    fn tick(
        &mut self,
        hand: Option<&HandFrame>,
        frame_size: (u32, u32),
        now_ms: u64,
    ) -> Option<SaveRequest>;

    fn snapshot(&self) -> CaptureSnapshot;

    /// Overrides the status line, e.g. after an initialization failure.
    fn set_status(&mut self, status: String);

    fn is_finished(&self) -> bool {
        false
    }
}
