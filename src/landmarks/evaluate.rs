//! Per-frame landmark quality checks.

use super::{
    HandFrame, LandmarkPoint, INDEX_TIP, LANDMARK_COUNT, MIDDLE_TIP, PINKY_TIP, RING_TIP,
    THUMB_TIP,
};

pub const DEFAULT_OPEN_PALM_THRESHOLD: f64 = 0.15;
pub const DEFAULT_GUIDE_REGION_FRACTION: f64 = 0.6;

/// Horizontal fingertip spread used by the open-palm heuristic.
///
/// Only x coordinates are considered, so a hand rotated towards vertical reads
/// as closed. Returns `None` when fewer than 21 points are supplied.
pub fn palm_spread(points: &[LandmarkPoint]) -> Option<f64> {
    if points.len() < LANDMARK_COUNT {
        return None;
    }
    let x = |i: usize| points[i].x;
    Some(
        (x(INDEX_TIP) - x(PINKY_TIP)).abs()
            + (x(THUMB_TIP) - x(INDEX_TIP)).abs()
            + (x(MIDDLE_TIP) - x(RING_TIP)).abs(),
    )
}

pub fn is_palm_open(frame: Option<&HandFrame>, threshold: f64) -> bool {
    frame
        .and_then(|f| palm_spread(f.points()))
        .map(|spread| spread > threshold)
        .unwrap_or(false)
}

/// Whether every landmark projects inside the centered guide square.
///
/// The square's side is `min(width, height) * fraction`; bounds are inclusive.
pub fn is_in_guide_region(frame: &HandFrame, width: u32, height: u32, fraction: f64) -> bool {
    let w = f64::from(width);
    let h = f64::from(height);
    let side = w.min(h) * fraction;
    let left = (w - side) / 2.0;
    let top = (h - side) / 2.0;
    let right = left + side;
    let bottom = top + side;

    frame.points().iter().all(|p| {
        let px = p.x * w;
        let py = p.y * h;
        px >= left && px <= right && py >= top && py <= bottom
    })
}
