//! Embedding record data model.
//!
//! One record per completed palm hold: the averaged 21 landmarks plus who and
//! when.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capture::CaptureMode;
use crate::landmarks::HandFrame;

pub const EMBEDDINGS_TABLE: &str = "embeddings";
pub const UNKNOWN_USER: &str = "unknown";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingRecord {
    pub id: String,
    pub embedding: HandFrame,
    /// Capture time, epoch milliseconds.
    pub timestamp: i64,
    pub user_id: String,
    pub mode: CaptureMode,
    pub frame_count: usize,
}

impl EmbeddingRecord {
    pub fn new(
        embedding: HandFrame,
        user_id: Option<&str>,
        mode: CaptureMode,
        frame_count: usize,
        captured_at: DateTime<Utc>,
    ) -> Self {
        let user_id = user_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(UNKNOWN_USER);

        Self {
            id: Uuid::new_v4().to_string(),
            embedding,
            timestamp: captured_at.timestamp_millis(),
            user_id: user_id.to_string(),
            mode,
            frame_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::LandmarkPoint;

    #[test]
    fn missing_identity_falls_back_to_unknown() {
        let frame = HandFrame::uniform(LandmarkPoint::new(0.3, 0.4, 0.1));
        let at = Utc::now();

        let anonymous = EmbeddingRecord::new(frame.clone(), None, CaptureMode::Guided, 3, at);
        assert_eq!(anonymous.user_id, UNKNOWN_USER);
        let blank = EmbeddingRecord::new(frame.clone(), Some("  "), CaptureMode::Guided, 3, at);
        assert_eq!(blank.user_id, UNKNOWN_USER);

        let known = EmbeddingRecord::new(frame, Some("user-42"), CaptureMode::Game, 3, at);
        assert_eq!(known.user_id, "user-42");
        assert_eq!(known.timestamp, at.timestamp_millis());
        assert_ne!(known.id, anonymous.id);
    }

    #[test]
    fn serializes_camel_case() {
        let frame = HandFrame::uniform(LandmarkPoint::new(0.3, 0.4, 0.1));
        let record = EmbeddingRecord::new(frame, Some("u"), CaptureMode::Game, 12, Utc::now());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["userId"], "u");
        assert_eq!(json["mode"], "game");
        assert_eq!(json["frameCount"], 12);
        assert_eq!(json["embedding"].as_array().unwrap().len(), 21);
    }
}
