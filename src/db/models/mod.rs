pub mod embedding;

pub use embedding::{EmbeddingRecord, EMBEDDINGS_TABLE, UNKNOWN_USER};
