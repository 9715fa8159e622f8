//! Guided capture: hand in the box, hold still, save.
//!
//! ```text
//! action --(4s in box)--> hold --(5s in box)--> done --(3s)--> action
//!    ^                      |
//!    +------ hand lost -----+
//! ```
//!
//! Leaving the box only changes the status line. Losing the hand entirely is
//! what restarts the attempt.

use serde::{Deserialize, Serialize};

use crate::landmarks::{evaluate::DEFAULT_GUIDE_REGION_FRACTION, is_in_guide_region, HandFrame};

use super::state::{
    progress, CaptureMachine, CaptureMode, CaptureSnapshot, HoldBuffer, PhaseClock, SaveRequest,
};

pub const STATUS_PLACE_HAND: &str = "Place your open hand inside the box";
pub const STATUS_KEEP_INSIDE: &str = "Keep your hand inside the box";
pub const STATUS_HOLD_STILL: &str = "Hold still...";
pub const STATUS_NO_HAND: &str = "No hand detected";
pub const STATUS_SAVED: &str = "Palm captured!";
pub const STATUS_RETRY: &str = "No hand detected, try again";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum GuidedPhase {
    Action,
    Hold,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuidedConfig {
    pub action_ms: u64,
    pub hold_ms: u64,
    pub rearm_ms: u64,
    pub region_fraction: f64,
}

impl Default for GuidedConfig {
    fn default() -> Self {
        Self {
            action_ms: 4_000,
            hold_ms: 5_000,
            rearm_ms: 3_000,
            region_fraction: DEFAULT_GUIDE_REGION_FRACTION,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GuidedSnapshot {
    pub phase: GuidedPhase,
    pub progress: f64,
    pub status: String,
    pub phase_started_ms: u64,
    pub hold_frames: usize,
    pub captures: u32,
}

pub struct GuidedCapture {
    config: GuidedConfig,
    phase: GuidedPhase,
    clock: PhaseClock,
    buffer: HoldBuffer,
    progress: f64,
    status: String,
    captures: u32,
}

impl GuidedCapture {
    pub fn new(config: GuidedConfig, now_ms: u64) -> Self {
        Self {
            config,
            phase: GuidedPhase::Action,
            clock: PhaseClock::new(now_ms),
            buffer: HoldBuffer::new(),
            progress: 0.0,
            status: STATUS_PLACE_HAND.to_string(),
            captures: 0,
        }
    }

    pub fn phase(&self) -> GuidedPhase {
        self.phase
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn hold_frames(&self) -> usize {
        self.buffer.len()
    }

    pub fn phase_started_ms(&self) -> u64 {
        self.clock.started_at()
    }

    fn enter_action(&mut self, now_ms: u64, status: &str) {
        self.phase = GuidedPhase::Action;
        self.clock.reset(now_ms);
        self.buffer.clear();
        self.progress = 0.0;
        self.status = status.to_string();
    }

    fn enter_hold(&mut self, now_ms: u64) {
        self.phase = GuidedPhase::Hold;
        self.clock.reset(now_ms);
        self.buffer.clear();
        self.progress = 0.0;
        self.status = STATUS_HOLD_STILL.to_string();
    }

    /// Called only after the completing frame was pushed, so the buffer holds
    /// at least one frame. An empty buffer would be reported as a retry.
    fn complete_hold(&mut self, now_ms: u64) -> Option<SaveRequest> {
        match self.buffer.take_embedding() {
            Ok(request) => {
                self.phase = GuidedPhase::Done;
                self.clock.reset(now_ms);
                self.progress = 1.0;
                self.captures += 1;
                self.status = STATUS_SAVED.to_string();
                Some(request)
            }
            Err(_) => {
                self.enter_action(now_ms, STATUS_RETRY);
                None
            }
        }
    }
}

impl CaptureMachine for GuidedCapture {
    fn mode(&self) -> CaptureMode {
        CaptureMode::Guided
    }

    fn start(&mut self, now_ms: u64) {
        self.enter_action(now_ms, STATUS_PLACE_HAND);
    }

    fn reset(&mut self, now_ms: u64) {
        self.enter_action(now_ms, STATUS_PLACE_HAND);
    }

    fn tick(
        &mut self,
        hand: Option<&HandFrame>,
        (width, height): (u32, u32),
        now_ms: u64,
    ) -> Option<SaveRequest> {
        let Some(hand) = hand else {
            self.enter_action(now_ms, STATUS_NO_HAND);
            return None;
        };

        if self.phase == GuidedPhase::Done {
            if self.clock.elapsed(now_ms) >= self.config.rearm_ms {
                self.enter_action(now_ms, STATUS_PLACE_HAND);
            }
            return None;
        }

        if !is_in_guide_region(hand, width, height, self.config.region_fraction) {
            self.status = STATUS_KEEP_INSIDE.to_string();
            return None;
        }

        let elapsed = self.clock.elapsed(now_ms);
        match self.phase {
            GuidedPhase::Action => {
                self.progress = progress(elapsed, self.config.action_ms);
                if elapsed >= self.config.action_ms {
                    self.enter_hold(now_ms);
                } else {
                    self.status = STATUS_PLACE_HAND.to_string();
                }
                None
            }
            GuidedPhase::Hold => {
                self.buffer.push(hand.clone());
                self.progress = progress(elapsed, self.config.hold_ms);
                if elapsed >= self.config.hold_ms {
                    self.complete_hold(now_ms)
                } else {
                    self.status = STATUS_HOLD_STILL.to_string();
                    None
                }
            }
            GuidedPhase::Done => None,
        }
    }

    fn snapshot(&self) -> CaptureSnapshot {
        CaptureSnapshot::Guided(GuidedSnapshot {
            phase: self.phase,
            progress: self.progress,
            status: self.status.clone(),
            phase_started_ms: self.clock.started_at(),
            hold_frames: self.buffer.len(),
            captures: self.captures,
        })
    }

    fn set_status(&mut self, status: String) {
        self.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::LandmarkPoint;

    const FRAME: (u32, u32) = (640, 480);

    fn centred_hand() -> HandFrame {
        HandFrame::uniform(LandmarkPoint::new(0.3, 0.4, 0.1))
            .with_point(0, LandmarkPoint::new(0.5, 0.5, 0.1))
    }

    fn outside_hand() -> HandFrame {
        centred_hand().with_point(20, LandmarkPoint::new(0.05, 0.5, 0.0))
    }

    fn machine() -> GuidedCapture {
        GuidedCapture::new(GuidedConfig::default(), 0)
    }

    #[test]
    fn action_to_hold_never_before_four_seconds() {
        let mut capture = machine();
        let hand = centred_hand();

        assert!(capture.tick(Some(&hand), FRAME, 3_999).is_none());
        assert_eq!(capture.phase(), GuidedPhase::Action);
        assert!((capture.progress() - 3_999.0 / 4_000.0).abs() < 1e-12);

        capture.tick(Some(&hand), FRAME, 4_000);
        assert_eq!(capture.phase(), GuidedPhase::Hold);
        assert_eq!(capture.progress(), 0.0);
        assert_eq!(capture.phase_started_ms(), 4_000);
    }

    #[test]
    fn hold_to_done_at_five_seconds() {
        let mut capture = machine();
        let hand = centred_hand();
        capture.tick(Some(&hand), FRAME, 4_000);

        assert!(capture.tick(Some(&hand), FRAME, 8_999).is_none());
        assert_eq!(capture.phase(), GuidedPhase::Hold);

        let request = capture.tick(Some(&hand), FRAME, 9_000).expect("save request");
        assert_eq!(capture.phase(), GuidedPhase::Done);
        assert_eq!(capture.progress(), 1.0);
        assert_eq!(request.frame_count, 2);
        assert_eq!(capture.hold_frames(), 0);
    }

    #[test]
    fn full_scenario_collects_hold_window_ticks() {
        let mut capture = machine();
        let hand = centred_hand();
        let mut saved = None;
        let mut phases = Vec::new();

        for t in (0..=9_000).step_by(100) {
            if let Some(request) = capture.tick(Some(&hand), FRAME, t) {
                saved = Some((t, request));
            }
            phases.push((t, capture.phase()));
        }

        for (t, phase) in phases {
            let expected = match t {
                0..=3_999 => GuidedPhase::Action,
                4_000..=8_999 => GuidedPhase::Hold,
                _ => GuidedPhase::Done,
            };
            assert_eq!(phase, expected, "at t={t}");
        }

        let (saved_at, request) = saved.expect("hold completed");
        assert_eq!(saved_at, 9_000);
        // one frame per tick over the 5s hold window
        assert_eq!(request.frame_count, 50);
        let wrist = request.embedding.wrist();
        assert!((wrist.x - 0.5).abs() < 1e-12 && (wrist.y - 0.5).abs() < 1e-12);
    }

    #[test]
    fn leaving_box_during_action_keeps_phase_and_clock() {
        let mut capture = machine();
        let hand = centred_hand();
        let outside = outside_hand();

        capture.tick(Some(&hand), FRAME, 1_000);
        capture.tick(Some(&outside), FRAME, 2_000);
        assert_eq!(capture.phase(), GuidedPhase::Action);
        assert_eq!(capture.snapshot().status(), STATUS_KEEP_INSIDE);
        assert_eq!(capture.progress(), 0.25);

        capture.tick(Some(&outside), FRAME, 2_500);
        capture.tick(Some(&hand), FRAME, 3_000);
        assert_eq!(capture.phase(), GuidedPhase::Action);
        assert_eq!(capture.phase_started_ms(), 0);
        assert_eq!(capture.progress(), 0.75);
        assert_eq!(capture.hold_frames(), 0);
    }

    #[test]
    fn leaving_box_during_hold_does_not_revert() {
        let mut capture = machine();
        let hand = centred_hand();
        capture.tick(Some(&hand), FRAME, 4_000);
        capture.tick(Some(&hand), FRAME, 4_100);
        capture.tick(Some(&outside_hand()), FRAME, 4_200);

        assert_eq!(capture.phase(), GuidedPhase::Hold);
        assert_eq!(capture.hold_frames(), 1);
        assert_eq!(capture.phase_started_ms(), 4_000);
    }

    #[test]
    fn losing_hand_restarts_from_action() {
        let mut capture = machine();
        let hand = centred_hand();
        capture.tick(Some(&hand), FRAME, 4_000);
        capture.tick(Some(&hand), FRAME, 5_000);
        assert_eq!(capture.hold_frames(), 1);

        capture.tick(None, FRAME, 6_000);
        assert_eq!(capture.phase(), GuidedPhase::Action);
        assert_eq!(capture.hold_frames(), 0);
        assert_eq!(capture.progress(), 0.0);
        assert_eq!(capture.phase_started_ms(), 6_000);
        assert_eq!(capture.snapshot().status(), STATUS_NO_HAND);
    }

    #[test]
    fn done_rearms_after_display_delay() {
        let mut capture = machine();
        let hand = centred_hand();
        capture.tick(Some(&hand), FRAME, 4_000);
        capture.tick(Some(&hand), FRAME, 9_000);
        assert_eq!(capture.phase(), GuidedPhase::Done);

        capture.tick(Some(&hand), FRAME, 11_999);
        assert_eq!(capture.phase(), GuidedPhase::Done);
        assert_eq!(capture.hold_frames(), 0);

        capture.tick(Some(&hand), FRAME, 12_000);
        assert_eq!(capture.phase(), GuidedPhase::Action);
        assert_eq!(capture.progress(), 0.0);
        assert_eq!(capture.phase_started_ms(), 12_000);
    }

    #[test]
    fn reset_forces_action_and_clears_buffer() {
        let mut capture = machine();
        let hand = centred_hand();
        capture.tick(Some(&hand), FRAME, 4_000);
        capture.tick(Some(&hand), FRAME, 4_500);
        capture.reset(4_600);

        assert_eq!(capture.phase(), GuidedPhase::Action);
        assert_eq!(capture.hold_frames(), 0);
        assert_eq!(capture.phase_started_ms(), 4_600);
    }

    #[test]
    fn zero_length_hold_saves_on_first_hold_tick() {
        let config = GuidedConfig {
            hold_ms: 0,
            ..GuidedConfig::default()
        };
        let mut capture = GuidedCapture::new(config, 0);
        let hand = centred_hand();
        capture.tick(Some(&hand), FRAME, 4_000);
        // the frame is appended before the duration check
        let request = capture.tick(Some(&hand), FRAME, 4_000).expect("save request");
        assert_eq!(request.frame_count, 1);
    }

    #[test]
    fn snapshot_serializes_with_mode_tag() {
        let capture = machine();
        let json = serde_json::to_value(capture.snapshot()).unwrap();
        assert_eq!(json["mode"], "guided");
        assert_eq!(json["phase"], "action");
        assert_eq!(json["holdFrames"], 0);
    }
}
