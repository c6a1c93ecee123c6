/// Batch index builder: embeds stored chunks and upserts them into the vector index
use super::EmbeddingProvider;
use crate::error::{ContractIqError, Result};
use crate::retrieval::{VectorIndexClient, VectorMetadata, VectorRecord};
use crate::storage::{Chunk, Document, SqliteCorpus};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of an indexing run
#[derive(Debug, Clone, Default)]
pub struct IndexReport {
    pub processed: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

/// Walks the chunk table in pages and indexes every chunk
///
/// Each page is embedded in one batch, cached in the `embeddings` table and then
/// upserted into the vector index with the chunk's metadata. A page whose embedding
/// fails is logged and counted; an index failure aborts the run since every later
/// page would fail the same way.
pub struct IndexBuilder {
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndexClient>,
    corpus: SqliteCorpus,
    batch_size: usize,
}

impl IndexBuilder {
    /// Create a new index builder
    ///
    /// # Arguments
    /// * `provider` - Embedding provider
    /// * `index` - Vector index receiving the chunk vectors
    /// * `corpus` - Chunk source and embedding cache
    /// * `batch_size` - Number of chunks to embed in one batch
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndexClient>,
        corpus: SqliteCorpus,
        batch_size: usize,
    ) -> Self {
        Self {
            provider,
            index,
            corpus,
            batch_size: batch_size.max(1),
        }
    }

    /// Index every stored chunk
    pub fn run(&self) -> Result<IndexReport> {
        let start = std::time::Instant::now();
        let documents = self.corpus.documents_by_id()?;

        info!(
            "Indexing chunks from {} documents with {}",
            documents.len(),
            self.provider.model_name()
        );

        let mut report = IndexReport::default();
        let mut after_rowid = 0;

        loop {
            let page = self.corpus.fetch_chunk_page(after_rowid, self.batch_size)?;
            let Some((last_rowid, _)) = page.last() else {
                break;
            };
            after_rowid = *last_rowid;

            let chunks: Vec<Chunk> = page.into_iter().map(|(_, chunk)| chunk).collect();
            match self.process_page(&chunks, &documents) {
                Ok(count) => {
                    report.processed += count;
                    debug!("Indexed page of {} chunks", count);
                }
                Err(ContractIqError::Embedding(e)) => {
                    warn!("Failed to embed page of {} chunks: {}", chunks.len(), e);
                    report.failed += chunks.len();
                }
                Err(e) => return Err(e),
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Indexing complete: {} processed, {} failed, {}ms",
            report.processed, report.failed, report.duration_ms
        );

        Ok(report)
    }

    fn process_page(
        &self,
        chunks: &[Chunk],
        documents: &HashMap<String, Document>,
    ) -> Result<usize> {
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.provider.embed_batch(&texts)?;

        if embeddings.len() != chunks.len() {
            return Err(ContractIqError::Embedding(
                super::EmbeddingError::GenerationError(format!(
                    "Embedding count mismatch: expected {}, got {}",
                    chunks.len(),
                    embeddings.len()
                )),
            ));
        }

        let cached: Vec<(&Chunk, &[f32])> = chunks
            .iter()
            .zip(embeddings.iter())
            .map(|(chunk, embedding)| (chunk, embedding.as_slice()))
            .collect();
        self.corpus
            .save_embeddings(self.provider.model_name(), &cached)?;

        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, values)| {
                let document = documents.get(&chunk.doc_id);
                VectorRecord {
                    id: chunk.chunk_id.clone(),
                    values,
                    metadata: VectorMetadata {
                        title: document.map(|d| d.title.clone()).unwrap_or_default(),
                        doc_id: chunk.doc_id.clone(),
                        chunk_index: chunk.chunk_index,
                        start_char: chunk.start_char,
                        end_char: chunk.end_char,
                        source: document.map(|d| d.source.clone()).unwrap_or_default(),
                    },
                }
            })
            .collect();

        self.index
            .upsert(&records)
            .map_err(|e| ContractIqError::RetrievalUnavailable(e.to_string()))?;

        Ok(chunks.len())
    }
}
