//! Hand landmark data model.
//!
//! A [`HandFrame`] is the full set of 21 points a detector reports for one hand
//! at one instant, in normalized image coordinates (x and y in `[0, 1]`, z is
//! relative depth).

pub mod aggregate;
pub mod evaluate;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use aggregate::{average_frames, AggregateError};
pub use evaluate::{is_in_guide_region, is_palm_open, palm_spread};

pub const LANDMARK_COUNT: usize = 21;

pub const WRIST: usize = 0;
pub const THUMB_TIP: usize = 4;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_TIP: usize = 12;
pub const RING_TIP: usize = 16;
pub const PINKY_TIP: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl LandmarkPoint {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Distance to `(x, y)` ignoring depth.
    pub fn planar_distance(&self, x: f64, y: f64) -> f64 {
        let dx = self.x - x;
        let dy = self.y - y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameError {
    pub len: usize,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hand frame needs {LANDMARK_COUNT} landmarks, got {}",
            self.len
        )
    }
}

impl std::error::Error for FrameError {}

/// Exactly 21 landmarks for a single detected hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<LandmarkPoint>", into = "Vec<LandmarkPoint>")]
pub struct HandFrame {
    points: [LandmarkPoint; LANDMARK_COUNT],
}

impl HandFrame {
    pub fn new(points: [LandmarkPoint; LANDMARK_COUNT]) -> Self {
        Self { points }
    }

    /// Every landmark at the same position. Handy for fixtures.
    pub fn uniform(point: LandmarkPoint) -> Self {
        Self {
            points: [point; LANDMARK_COUNT],
        }
    }

    pub fn points(&self) -> &[LandmarkPoint; LANDMARK_COUNT] {
        &self.points
    }

    pub fn wrist(&self) -> LandmarkPoint {
        self.points[WRIST]
    }

    pub fn with_point(mut self, index: usize, point: LandmarkPoint) -> Self {
        self.points[index] = point;
        self
    }
}

impl TryFrom<Vec<LandmarkPoint>> for HandFrame {
    type Error = FrameError;

    fn try_from(value: Vec<LandmarkPoint>) -> Result<Self, Self::Error> {
        let len = value.len();
        let points: [LandmarkPoint; LANDMARK_COUNT] =
            value.try_into().map_err(|_| FrameError { len })?;
        Ok(Self { points })
    }
}

impl From<HandFrame> for Vec<LandmarkPoint> {
    fn from(frame: HandFrame) -> Self {
        frame.points.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_landmark_count() {
        let short = vec![LandmarkPoint::default(); 20];
        assert_eq!(HandFrame::try_from(short), Err(FrameError { len: 20 }));
    }

    #[test]
    fn deserializes_from_point_list() {
        let json = serde_json::to_string(&vec![LandmarkPoint::new(0.1, 0.2, 0.3); 21]).unwrap();
        let frame: HandFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(frame.wrist(), LandmarkPoint::new(0.1, 0.2, 0.3));

        let bad = serde_json::to_string(&vec![LandmarkPoint::default(); 3]).unwrap();
        assert!(serde_json::from_str::<HandFrame>(&bad).is_err());
    }

    #[test]
    fn planar_distance_ignores_depth() {
        let p = LandmarkPoint::new(0.3, 0.4, 9.0);
        assert!((p.planar_distance(0.0, 0.0) - 0.5).abs() < 1e-12);
    }
}
