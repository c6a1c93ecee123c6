/// Embedding & Indexing
///
/// Local sentence embeddings for questions and chunks.
/// Architecture:
/// - EmbeddingProvider trait for abstraction
/// - FastEmbedProvider for local embedding (all-MiniLM-L6-v2, 384-dim)
/// - LazyEmbedder defers model loading until the first question
/// - IndexBuilder batches stored chunks into the vector index
mod batch;
mod lazy;
mod provider;

pub use batch::{IndexBuilder, IndexReport};
pub use lazy::LazyEmbedder;
pub use provider::{
    l2_normalize, model_dimension, EmbeddingError, EmbeddingProvider, FastEmbedProvider,
};
