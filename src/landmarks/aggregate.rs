use std::fmt;

use super::{HandFrame, LandmarkPoint, LANDMARK_COUNT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateError {
    Empty,
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateError::Empty => write!(f, "cannot average an empty hold buffer"),
        }
    }
}

impl std::error::Error for AggregateError {}

/// Per-landmark arithmetic mean of x, y and z across `frames`.
pub fn average_frames(frames: &[HandFrame]) -> Result<HandFrame, AggregateError> {
    if frames.is_empty() {
        return Err(AggregateError::Empty);
    }

    let mut sums = [LandmarkPoint::default(); LANDMARK_COUNT];
    for frame in frames {
        for (sum, point) in sums.iter_mut().zip(frame.points()) {
            sum.x += point.x;
            sum.y += point.y;
            sum.z += point.z;
        }
    }

    let n = frames.len() as f64;
    for sum in sums.iter_mut() {
        sum.x /= n;
        sum.y /= n;
        sum.z /= n;
    }

    Ok(HandFrame::new(sums))
}
