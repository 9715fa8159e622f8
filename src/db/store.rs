use std::future::Future;

use anyhow::Result;

use super::connection::Database;
use super::models::EmbeddingRecord;

/// Append-only sink for embedding records.
pub trait RecordStore: Clone + Send + Sync + 'static {
    fn append(&self, record: EmbeddingRecord) -> impl Future<Output = Result<()>> + Send;
}

impl RecordStore for Database {
    fn append(&self, record: EmbeddingRecord) -> impl Future<Output = Result<()>> + Send {
        let db = self.clone();
        async move { db.insert_embedding(&record).await }
    }
}
