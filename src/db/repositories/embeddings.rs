use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Row};
use serde_json::{from_str, to_string};

use crate::db::{
    connection::Database,
    helpers::{parse_mode, row_error, to_i64, to_u64},
    models::EmbeddingRecord,
};
use crate::landmarks::HandFrame;

fn row_to_embedding(row: &Row) -> rusqlite::Result<EmbeddingRecord> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let timestamp: i64 = row.get(2)?;
    let mode: String = row.get(3)?;
    let frame_count: i64 = row.get(4)?;
    let embedding_json: String = row.get(5)?;

    let embedding: HandFrame = from_str(&embedding_json)
        .context("failed to decode embedding")
        .map_err(row_error)?;
    let frame_count = to_u64(frame_count, "frame_count").map_err(row_error)? as usize;

    Ok(EmbeddingRecord {
        id,
        embedding,
        timestamp,
        user_id,
        mode: parse_mode(&mode).map_err(row_error)?,
        frame_count,
    })
}

impl Database {
    pub async fn insert_embedding(&self, record: &EmbeddingRecord) -> Result<()> {
        let record = record.clone();
        self.execute(move |conn| {
            let embedding_json =
                to_string(&record.embedding).context("failed to serialize embedding")?;

            conn.execute(
                "INSERT INTO embeddings (
                    id,
                    user_id,
                    timestamp_ms,
                    mode,
                    frame_count,
                    embedding_json,
                    created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id,
                    record.user_id,
                    record.timestamp,
                    record.mode.as_str(),
                    to_i64(record.frame_count as u64)?,
                    embedding_json,
                    Utc::now().to_rfc3339(),
                ],
            )
            .with_context(|| "failed to insert embedding")?;
            Ok(())
        })
        .await
    }

    /// Newest first. `None` lists every user.
    pub async fn list_embeddings(&self, user_id: Option<&str>) -> Result<Vec<EmbeddingRecord>> {
        let user_id = user_id.map(str::to_string);
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, timestamp_ms, mode, frame_count, embedding_json
                 FROM embeddings
                 WHERE ?1 IS NULL OR user_id = ?1
                 ORDER BY timestamp_ms DESC",
            )?;

            let rows = stmt.query_map(params![user_id], row_to_embedding)?;

            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            Ok(records)
        })
        .await
    }

    pub async fn count_embeddings(&self) -> Result<u64> {
        self.execute(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
            to_u64(count, "count")
        })
        .await
    }
}
