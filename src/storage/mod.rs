//! Storage layer for ContractIQ
//!
//! Relational corpus storage: documents, chunks, CUAD annotations and cached embeddings
//! in a pooled SQLite database. The answer pipeline only sees the narrow [`CorpusStore`]
//! lookup; ingestion and browsing use [`SqliteCorpus`] directly.

pub mod corpus;
pub mod database;
pub mod records;

use crate::error::Result;

pub use corpus::SqliteCorpus;
pub use database::{Database, DbConn, DbPool};
pub use records::{Annotation, Chunk, CorpusStats, Document, StoredEmbedding};

/// Lookup-by-key access to chunk records
///
/// Implementations hold no per-call state and are safe to share across requests.
pub trait CorpusStore: Send + Sync {
    /// Fetch the chunks whose ids appear in `ids`.
    ///
    /// The order of the returned records is unspecified and ids without a record are
    /// omitted. An empty input returns an empty result.
    fn fetch_chunks_by_ids(&self, ids: &[String]) -> Result<Vec<Chunk>>;
}
