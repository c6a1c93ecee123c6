//! Persisted corpus records

use serde::{Deserialize, Serialize};

/// A contract in the corpus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Digest of the title
    pub doc_id: String,
    pub title: String,
    /// Corpus the document came from (e.g. "cuad-v1")
    pub source: String,
    /// Path of the text file it was read from
    pub raw_path: Option<String>,
}

/// A character window of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Digest of `(doc_id, chunk_index, start_char, end_char)`
    pub chunk_id: String,
    pub doc_id: String,
    pub chunk_index: usize,
    pub start_char: usize,
    pub end_char: usize,
    pub text: String,
}

/// A CUAD clause annotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub annotation_id: String,
    pub doc_id: String,
    /// CUAD question text
    pub label: String,
    /// Paragraph the answer offsets refer to
    pub context: Option<String>,
    pub answer_texts: Vec<String>,
    pub answer_starts: Vec<i64>,
}

/// An embedding cached in the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEmbedding {
    pub chunk_id: String,
    pub doc_id: String,
    pub vector: Vec<f32>,
}

/// Row counts of the corpus tables
#[derive(Debug, Clone, Default, Serialize)]
pub struct CorpusStats {
    pub documents: usize,
    pub chunks: usize,
    pub annotations: usize,
    pub embeddings: usize,
}
