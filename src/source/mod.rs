//! Landmark sources: anything that can answer "where is the hand in the frame
//! at this timestamp".
//!
//! Both implementations speak the same JSON detection format, one result per
//! frame:
//!
//! ```json
//! {"hands": [{"handedness": "Right", "score": 0.93, "landmarks": [{"x": 0.5, "y": 0.5, "z": 0.0}, ...]}]}
//! ```

pub mod process;
pub mod replay;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::landmarks::{HandFrame, LandmarkPoint};

pub use process::DetectorProcess;
pub use replay::ReplaySource;

const ENABLE_LOGS: bool = true;

use crate::log_warn;

pub trait LandmarkSource: Send + 'static {
    /// Negotiated frame dimensions in pixels.
    fn frame_size(&self) -> (u32, u32);

    /// The first detected hand at `timestamp_ms`, or `None` when no hand is
    /// visible. Errors mean the frame could not be processed at all.
    fn detect(&mut self, timestamp_ms: u64) -> Result<Option<HandFrame>>;

    /// True once the source will never produce another frame.
    fn is_exhausted(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RunningMode {
    Image,
    Video,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DetectorOptions {
    pub running_mode: RunningMode,
    pub num_hands: u32,
    pub min_detection_confidence: f64,
    pub min_tracking_confidence: f64,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            running_mode: RunningMode::Video,
            num_hands: 1,
            min_detection_confidence: 0.7,
            min_tracking_confidence: 0.5,
        }
    }
}

impl DetectorOptions {
    /// Command line flags handed to an external detector.
    pub fn to_args(&self) -> Vec<String> {
        let mode = match self.running_mode {
            RunningMode::Image => "image",
            RunningMode::Video => "video",
        };
        vec![
            "--running-mode".into(),
            mode.into(),
            "--num-hands".into(),
            self.num_hands.to_string(),
            "--min-detection-confidence".into(),
            self.min_detection_confidence.to_string(),
            "--min-tracking-confidence".into(),
            self.min_tracking_confidence.to_string(),
        ]
    }
}

#[derive(Debug, Deserialize)]
struct HandJson {
    #[serde(default)]
    handedness: Option<String>,
    #[serde(default = "full_score")]
    score: f64,
    landmarks: Vec<LandmarkPoint>,
}

fn full_score() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
struct DetectionResult {
    #[serde(default)]
    hands: Vec<HandJson>,
    #[serde(default)]
    error: Option<String>,
}

/// Parses one detection line and keeps the first hand that clears the
/// detection threshold.
pub fn parse_detection(line: &str, options: &DetectorOptions) -> Result<Option<HandFrame>> {
    let result: DetectionResult = serde_json::from_str(line)
        .map_err(|err| anyhow!("malformed detection result: {err}"))?;

    if let Some(error) = result.error {
        return Err(anyhow!("detector reported: {error}"));
    }

    for hand in result.hands {
        if hand.score < options.min_detection_confidence {
            continue;
        }
        match HandFrame::try_from(hand.landmarks) {
            Ok(frame) => return Ok(Some(frame)),
            Err(err) => {
                log_warn!(
                    "skipping {} hand: {err}",
                    hand.handedness.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    Ok(None)
}
