/// In-process HNSW vector index for similarity search
use super::{IndexError, QueryRequest, RetrievalMatch, VectorIndexClient, VectorRecord};
use crate::error::{ContractIqError, Result};
use crate::storage::SqliteCorpus;
use hnsw_rs::prelude::*;
use std::collections::HashMap;
use std::sync::RwLock;

/// Upper bound on graph layers
const MAX_LAYERS: usize = 16;

/// Id bookkeeping for the graph. HNSW points are addressed by position.
#[derive(Default)]
struct Entries {
    chunk_ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
    by_chunk: HashMap<String, usize>,
    by_doc: HashMap<String, Vec<usize>>,
}

/// HNSW index wrapper
///
/// Unfiltered queries walk the graph. Queries restricted to one document score that
/// document's vectors exactly, since a single contract holds at most a few hundred
/// chunks and graph search under a narrow filter loses recall.
///
/// Points cannot be removed from the graph, so an upsert of an id that is already
/// present is skipped. The index lives in memory and is rebuilt from the embedding
/// cache with [`HnswIndex::load_from_corpus`].
pub struct HnswIndex {
    graph: RwLock<Hnsw<'static, f32, DistCosine>>,
    entries: RwLock<Entries>,
    dimension: usize,
    ef_search: usize,
}

impl HnswIndex {
    /// Create an empty index
    ///
    /// # Arguments
    /// * `dimension` - Vector dimension (must match embedding dimension)
    /// * `m` - Maximum connections per node
    /// * `ef_construction` - Construction beam width (higher = better recall, slower build)
    /// * `ef_search` - Search beam width
    /// * `max_elements` - Expected number of vectors
    pub fn new(
        dimension: usize,
        m: usize,
        ef_construction: usize,
        ef_search: usize,
        max_elements: usize,
    ) -> Self {
        let graph = Hnsw::<f32, DistCosine>::new(
            m,
            max_elements,
            MAX_LAYERS,
            ef_construction,
            DistCosine,
        );

        Self {
            graph: RwLock::new(graph),
            entries: RwLock::new(Entries::default()),
            dimension,
            ef_search,
        }
    }

    /// Insert every cached embedding produced by `model`. Returns the number inserted.
    pub fn load_from_corpus(&self, corpus: &SqliteCorpus, model: &str) -> Result<usize> {
        let stored = corpus.load_embeddings(model)?;
        let mut inserted = 0;
        for embedding in stored {
            let added = self
                .insert(&embedding.chunk_id, &embedding.doc_id, embedding.vector)
                .map_err(|e| ContractIqError::RetrievalUnavailable(e.to_string()))?;
            if added {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Number of indexed vectors
    pub fn len(&self) -> std::result::Result<usize, IndexError> {
        self.entries
            .read()
            .map(|entries| entries.chunk_ids.len())
            .map_err(|_| IndexError::SearchError("Index lock poisoned".to_string()))
    }

    pub fn is_empty(&self) -> std::result::Result<bool, IndexError> {
        Ok(self.len()? == 0)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn check_dimension(&self, vector: &[f32]) -> std::result::Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    fn insert(
        &self,
        chunk_id: &str,
        doc_id: &str,
        vector: Vec<f32>,
    ) -> std::result::Result<bool, IndexError> {
        self.check_dimension(&vector)?;

        let mut entries = self
            .entries
            .write()
            .map_err(|_| IndexError::InsertError("Index lock poisoned".to_string()))?;
        if entries.by_chunk.contains_key(chunk_id) {
            return Ok(false);
        }

        let data_id = entries.chunk_ids.len();
        {
            let graph = self
                .graph
                .write()
                .map_err(|_| IndexError::InsertError("Graph lock poisoned".to_string()))?;
            graph.insert_slice((vector.as_slice(), data_id));
        }

        entries.chunk_ids.push(chunk_id.to_string());
        entries.vectors.push(vector);
        entries.by_chunk.insert(chunk_id.to_string(), data_id);
        entries
            .by_doc
            .entry(doc_id.to_string())
            .or_default()
            .push(data_id);

        Ok(true)
    }

    fn search_graph(
        &self,
        entries: &Entries,
        query: &[f32],
        top_k: usize,
    ) -> std::result::Result<Vec<RetrievalMatch>, IndexError> {
        let graph = self
            .graph
            .read()
            .map_err(|_| IndexError::SearchError("Graph lock poisoned".to_string()))?;

        let neighbours = graph.search(query, top_k, self.ef_search.max(top_k));
        let matches = neighbours
            .into_iter()
            .filter_map(|neighbour| {
                entries
                    .chunk_ids
                    .get(neighbour.d_id)
                    .map(|chunk_id| RetrievalMatch {
                        chunk_id: chunk_id.clone(),
                        score: 1.0 - neighbour.distance,
                    })
            })
            .collect();

        Ok(matches)
    }

    fn scan_document(
        entries: &Entries,
        doc_id: &str,
        query: &[f32],
        top_k: usize,
    ) -> Vec<RetrievalMatch> {
        let Some(data_ids) = entries.by_doc.get(doc_id) else {
            return Vec::new();
        };

        let mut matches: Vec<RetrievalMatch> = data_ids
            .iter()
            .map(|&data_id| RetrievalMatch {
                chunk_id: entries.chunk_ids[data_id].clone(),
                score: cosine_similarity(query, &entries.vectors[data_id]),
            })
            .collect();

        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);
        matches
    }
}

impl VectorIndexClient for HnswIndex {
    fn query(
        &self,
        request: &QueryRequest,
    ) -> std::result::Result<Vec<RetrievalMatch>, IndexError> {
        self.check_dimension(&request.vector)?;

        let entries = self
            .entries
            .read()
            .map_err(|_| IndexError::SearchError("Index lock poisoned".to_string()))?;
        if entries.chunk_ids.is_empty() || request.top_k == 0 {
            return Ok(Vec::new());
        }

        let mut matches = match &request.filter {
            Some(filter) => {
                Self::scan_document(&entries, &filter.doc_id, &request.vector, request.top_k)
            }
            None => self.search_graph(&entries, &request.vector, request.top_k)?,
        };

        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(request.top_k);
        Ok(matches)
    }

    fn upsert(&self, records: &[VectorRecord]) -> std::result::Result<usize, IndexError> {
        for record in records {
            self.check_dimension(&record.values)?;
        }

        let mut written = 0;
        for record in records {
            if self.insert(&record.id, &record.metadata.doc_id, record.values.clone())? {
                written += 1;
            } else {
                tracing::debug!("Vector {} already indexed, skipping", record.id);
            }
        }
        Ok(written)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{DocFilter, VectorMetadata};

    fn index() -> HnswIndex {
        HnswIndex::new(4, 16, 200, 50, 1000)
    }

    fn record(id: &str, doc_id: &str, values: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            values,
            metadata: VectorMetadata {
                title: format!("Contract {doc_id}"),
                doc_id: doc_id.to_string(),
                chunk_index: 0,
                start_char: 0,
                end_char: 10,
                source: "cuad-v1".to_string(),
            },
        }
    }

    fn query(vector: Vec<f32>, top_k: usize, doc_id: Option<&str>) -> QueryRequest {
        QueryRequest {
            vector,
            top_k,
            filter: doc_id.map(|id| DocFilter {
                doc_id: id.to_string(),
            }),
        }
    }

    fn seeded() -> HnswIndex {
        let index = index();
        index
            .upsert(&[
                record("a1", "doc-a", vec![1.0, 0.0, 0.0, 0.0]),
                record("a2", "doc-a", vec![0.0, 1.0, 0.0, 0.0]),
                record("b1", "doc-b", vec![0.9, 0.1, 0.0, 0.0]),
                record("b2", "doc-b", vec![0.0, 0.0, 1.0, 0.0]),
            ])
            .unwrap();
        index
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        let index = index();
        assert!(index.is_empty().unwrap());
        let matches = index.query(&query(vec![1.0, 0.0, 0.0, 0.0], 5, None)).unwrap();
        assert!(matches.is_empty());
    }

    #[test]
    fn test_insert_and_search() {
        let index = seeded();
        assert_eq!(index.len().unwrap(), 4);

        let matches = index.query(&query(vec![1.0, 0.0, 0.0, 0.0], 2, None)).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].chunk_id, "a1");
        assert!(matches[0].score > 0.99);
        assert_eq!(matches[1].chunk_id, "b1");
        assert!(matches[0].score >= matches[1].score);
    }

    #[test]
    fn test_filter_restricts_to_document() {
        let index = seeded();

        let matches = index
            .query(&query(vec![1.0, 0.0, 0.0, 0.0], 5, Some("doc-b")))
            .unwrap();
        let ids: Vec<&str> = matches.iter().map(|m| m.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["b1", "b2"]);

        let none = index
            .query(&query(vec![1.0, 0.0, 0.0, 0.0], 5, Some("doc-missing")))
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_existing_ids_are_skipped() {
        let index = seeded();
        let written = index
            .upsert(&[
                record("a1", "doc-a", vec![0.0, 0.0, 0.0, 1.0]),
                record("c1", "doc-c", vec![0.0, 0.0, 0.0, 1.0]),
            ])
            .unwrap();

        assert_eq!(written, 1);
        assert_eq!(index.len().unwrap(), 5);
    }

    #[test]
    fn test_dimension_validation() {
        let index = index();
        let result = index.upsert(&[record("x", "doc-x", vec![1.0; 3])]);
        assert!(matches!(
            result,
            Err(IndexError::InvalidDimension {
                expected: 4,
                actual: 3
            })
        ));
        assert!(index.is_empty().unwrap());

        assert!(index.query(&query(vec![1.0; 8], 1, None)).is_err());
    }

    #[test]
    fn test_poisoned_lock_is_an_error() {
        let index = std::sync::Arc::new(seeded());
        let writer = index.clone();
        let _ = std::thread::spawn(move || {
            let _entries = writer.entries.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();

        assert!(matches!(index.len(), Err(IndexError::SearchError(_))));
        assert!(index.is_empty().is_err());
        assert!(index
            .query(&query(vec![1.0, 0.0, 0.0, 0.0], 1, None))
            .is_err());
    }
}
