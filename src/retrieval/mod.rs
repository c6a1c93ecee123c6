//! Vector retrieval
//!
//! The [`Retriever`] embeds a question and asks a [`VectorIndexClient`] for the nearest
//! chunks, optionally restricted to one document. Two index backends are provided:
//! a remote Pinecone index and an in-process HNSW graph rebuilt from cached embeddings.

mod hnsw;
mod pinecone;

pub use hnsw::HnswIndex;
pub use pinecone::{
    EnsuredIndex, IndexDescription, IndexSpec, PineconeControl, PineconeIndex, CONTROL_PLANE_URL,
};

use crate::config::{IndexBackend, IndexConfig};
use crate::embedding::EmbeddingProvider;
use crate::error::{ContractIqError, Result};
use crate::storage::SqliteCorpus;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Index service unreachable: {0}")]
    Unavailable(String),

    #[error("Index service rejected the request: {0}")]
    Rejected(String),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("Insert failed: {0}")]
    InsertError(String),
}

/// One ranked hit from the vector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalMatch {
    pub chunk_id: String,
    pub score: f32,
}

/// Equality filter on the document a chunk belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocFilter {
    pub doc_id: String,
}

/// Nearest-neighbour request sent to the index
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub vector: Vec<f32>,
    pub top_k: usize,
    pub filter: Option<DocFilter>,
}

/// Metadata stored alongside each chunk vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub title: String,
    pub doc_id: String,
    pub chunk_index: usize,
    pub start_char: usize,
    pub end_char: usize,
    pub source: String,
}

/// A chunk vector to upsert
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: VectorMetadata,
}

/// Black-box nearest-neighbour oracle
pub trait VectorIndexClient: Send + Sync {
    /// Matches ordered by descending score, at most `request.top_k` of them
    fn query(&self, request: &QueryRequest) -> std::result::Result<Vec<RetrievalMatch>, IndexError>;

    /// Insert or replace vectors by id. Returns the number of records written.
    fn upsert(&self, records: &[VectorRecord]) -> std::result::Result<usize, IndexError>;
}

/// Embeds questions and queries the vector index
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndexClient>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndexClient>) -> Self {
        Self { embedder, index }
    }

    /// Rank the chunks most similar to `query`.
    ///
    /// With `doc_id` set only that document's chunks are eligible. Index failures are
    /// reported as `RetrievalUnavailable` and never retried here.
    pub fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        doc_id: Option<&str>,
    ) -> Result<Vec<RetrievalMatch>> {
        if top_k == 0 {
            return Err(ContractIqError::InvalidArgument(
                "top_k must be > 0".to_string(),
            ));
        }

        let vector = self.embedder.embed(query)?;
        let request = QueryRequest {
            vector,
            top_k,
            filter: doc_id.map(|id| DocFilter {
                doc_id: id.to_string(),
            }),
        };

        let mut matches = self
            .index
            .query(&request)
            .map_err(|e| ContractIqError::RetrievalUnavailable(e.to_string()))?;

        // Stable: equal scores keep the oracle's order
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        let mut seen = HashSet::new();
        matches.retain(|m| seen.insert(m.chunk_id.clone()));
        matches.truncate(top_k);

        tracing::debug!(
            "Retrieved {} matches (top_k={}, doc_id={:?})",
            matches.len(),
            top_k,
            doc_id
        );

        Ok(matches)
    }
}

/// Open the configured vector index backend
pub fn open_index(
    config: &IndexConfig,
    corpus: &SqliteCorpus,
    embedding_model: &str,
) -> Result<Arc<dyn VectorIndexClient>> {
    match config.backend {
        IndexBackend::Pinecone => {
            if config.host.trim().is_empty() {
                return Err(ContractIqError::Config(
                    "index.host is not set; run 'contractiq index --create' to provision the index"
                        .to_string(),
                ));
            }
            let api_key = pinecone_api_key(config)?;
            let index = PineconeIndex::new(
                &config.host,
                &config.namespace,
                &api_key,
                std::time::Duration::from_secs(config.timeout_secs),
            )
            .map_err(|e| ContractIqError::RetrievalUnavailable(e.to_string()))?;
            Ok(Arc::new(index))
        }
        IndexBackend::Local => {
            let index = HnswIndex::new(
                config.dimension,
                config.hnsw_m,
                config.hnsw_ef_construction,
                config.hnsw_ef_search,
                config.hnsw_max_elements,
            );
            let loaded = index.load_from_corpus(corpus, embedding_model)?;
            tracing::info!("Local index rebuilt from {} cached embeddings", loaded);
            Ok(Arc::new(index))
        }
    }
}

/// Create the configured Pinecone index unless it already exists
///
/// An existing index must have `config.dimension`.
pub fn provision_index(config: &IndexConfig) -> Result<EnsuredIndex> {
    if config.backend != IndexBackend::Pinecone {
        return Err(ContractIqError::InvalidArgument(
            "Index provisioning applies to the pinecone backend only".to_string(),
        ));
    }

    let api_key = pinecone_api_key(config)?;
    let control = PineconeControl::new(
        CONTROL_PLANE_URL,
        &api_key,
        std::time::Duration::from_secs(config.timeout_secs),
    )
    .map_err(|e| ContractIqError::RetrievalUnavailable(e.to_string()))?;

    let spec = IndexSpec {
        name: config.name.clone(),
        dimension: config.dimension,
        metric: config.metric.clone(),
        cloud: config.cloud.clone(),
        region: config.region.clone(),
    };

    let ensured = control.ensure_index(&spec).map_err(|e| match e {
        IndexError::InvalidDimension { .. } => ContractIqError::InvalidConfigValue {
            path: "index.dimension".to_string(),
            message: format!("Index {} exists with a different dimension: {}", spec.name, e),
        },
        other => ContractIqError::RetrievalUnavailable(other.to_string()),
    })?;

    if ensured.created {
        tracing::info!("Created Pinecone index {}", ensured.description.name);
    } else {
        tracing::info!("Pinecone index {} already exists", ensured.description.name);
    }
    Ok(ensured)
}

fn pinecone_api_key(config: &IndexConfig) -> Result<String> {
    std::env::var(&config.api_key_env).map_err(|_| {
        ContractIqError::Config(format!(
            "Environment variable {} is not set",
            config.api_key_env
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingError;
    use std::sync::Mutex;

    struct UnitEmbedder;

    impl EmbeddingProvider for UnitEmbedder {
        fn embed(&self, _text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
            Ok(vec![1.0, 0.0])
        }

        fn embed_batch(
            &self,
            texts: &[String],
        ) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "unit"
        }
    }

    struct ScriptedIndex {
        matches: Vec<RetrievalMatch>,
        requests: Mutex<Vec<(usize, Option<DocFilter>)>>,
        fail: bool,
    }

    impl VectorIndexClient for ScriptedIndex {
        fn query(
            &self,
            request: &QueryRequest,
        ) -> std::result::Result<Vec<RetrievalMatch>, IndexError> {
            self.requests
                .lock()
                .unwrap()
                .push((request.top_k, request.filter.clone()));
            if self.fail {
                return Err(IndexError::Unavailable("connection refused".to_string()));
            }
            Ok(self.matches.clone())
        }

        fn upsert(&self, records: &[VectorRecord]) -> std::result::Result<usize, IndexError> {
            Ok(records.len())
        }
    }

    fn hit(id: &str, score: f32) -> RetrievalMatch {
        RetrievalMatch {
            chunk_id: id.to_string(),
            score,
        }
    }

    fn retriever(matches: Vec<RetrievalMatch>, fail: bool) -> (Retriever, Arc<ScriptedIndex>) {
        let index = Arc::new(ScriptedIndex {
            matches,
            requests: Mutex::new(Vec::new()),
            fail,
        });
        (Retriever::new(Arc::new(UnitEmbedder), index.clone()), index)
    }

    #[test]
    fn test_filter_is_forwarded() {
        let (retriever, index) = retriever(vec![hit("c1", 0.9)], false);

        retriever.retrieve("governing law", 5, Some("doc-1")).unwrap();
        retriever.retrieve("governing law", 3, None).unwrap();

        let requests = index.requests.lock().unwrap();
        assert_eq!(
            requests[0],
            (
                5,
                Some(DocFilter {
                    doc_id: "doc-1".to_string()
                })
            )
        );
        assert_eq!(requests[1], (3, None));
    }

    #[test]
    fn test_results_descending_and_bounded() {
        let (retriever, _) = retriever(
            vec![hit("c1", 0.4), hit("c2", 0.9), hit("c3", 0.7), hit("c2", 0.1)],
            false,
        );

        let matches = retriever.retrieve("q", 2, None).unwrap();
        let ids: Vec<&str> = matches.iter().map(|m| m.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "c3"]);
    }

    #[test]
    fn test_index_failure_surfaces_as_retrieval_unavailable() {
        let (retriever, index) = retriever(Vec::new(), true);

        let result = retriever.retrieve("q", 5, None);
        assert!(matches!(
            result,
            Err(ContractIqError::RetrievalUnavailable(_))
        ));
        assert_eq!(index.requests.lock().unwrap().len(), 1, "no retry");
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let (retriever, index) = retriever(Vec::new(), false);
        assert!(matches!(
            retriever.retrieve("q", 0, None),
            Err(ContractIqError::InvalidArgument(_))
        ));
        assert!(index.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_provisioning_needs_pinecone_backend() {
        let config = crate::config::Config::default().index;
        assert_eq!(config.backend, IndexBackend::Local);
        assert!(matches!(
            provision_index(&config),
            Err(ContractIqError::InvalidArgument(_))
        ));
    }
}
