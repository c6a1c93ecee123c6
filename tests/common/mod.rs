//! Deterministic stand-ins for the embedding model, vector index, corpus and LLM
#![allow(dead_code)]

use contractiq::embedding::{l2_normalize, EmbeddingError, EmbeddingProvider};
use contractiq::generation::{GenerationError, Generator};
use contractiq::retrieval::{
    DocFilter, IndexError, QueryRequest, RetrievalMatch, VectorIndexClient, VectorRecord,
};
use contractiq::storage::{Chunk, CorpusStore};
use contractiq::{ContractIqError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const HASH_DIM: usize = 256;

/// Bag-of-words embedder: each lowercase word bumps one FNV-1a bucket
pub struct HashEmbedder;

impl EmbeddingProvider for HashEmbedder {
    fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0; HASH_DIM];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2)
        {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(0xcbf29ce484222325u64, |h, b| {
                    (h ^ b as u64).wrapping_mul(0x100000001b3)
                });
            vector[(hash % HASH_DIM as u64) as usize] += 1.0;
        }
        l2_normalize(&mut vector);
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        HASH_DIM
    }

    fn model_name(&self) -> &str {
        "hash-bow"
    }
}

/// Vector index returning a fixed ranking
#[derive(Default)]
pub struct StubIndex {
    pub matches: Vec<RetrievalMatch>,
    pub fail: bool,
    pub requests: Mutex<Vec<(usize, Option<DocFilter>)>>,
}

impl StubIndex {
    pub fn ranked(ranking: &[(&str, f32)]) -> Self {
        Self {
            matches: ranking
                .iter()
                .map(|(id, score)| RetrievalMatch {
                    chunk_id: id.to_string(),
                    score: *score,
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

impl VectorIndexClient for StubIndex {
    fn query(&self, request: &QueryRequest) -> std::result::Result<Vec<RetrievalMatch>, IndexError> {
        self.requests
            .lock()
            .unwrap()
            .push((request.top_k, request.filter.clone()));
        if self.fail {
            return Err(IndexError::Unavailable("503 Service Unavailable".to_string()));
        }
        Ok(self
            .matches
            .iter()
            .take(request.top_k)
            .cloned()
            .collect())
    }

    fn upsert(&self, records: &[VectorRecord]) -> std::result::Result<usize, IndexError> {
        Ok(records.len())
    }
}

/// Corpus that answers in chunk-id order regardless of the requested order
#[derive(Default)]
pub struct ShuffledStore {
    pub chunks: HashMap<String, Chunk>,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl ShuffledStore {
    pub fn with_chunks(chunks: Vec<Chunk>) -> Self {
        Self {
            chunks: chunks
                .into_iter()
                .map(|c| (c.chunk_id.clone(), c))
                .collect(),
            ..Default::default()
        }
    }
}

impl CorpusStore for ShuffledStore {
    fn fetch_chunks_by_ids(&self, ids: &[String]) -> Result<Vec<Chunk>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ContractIqError::StoreUnavailable(
                "database is locked".to_string(),
            ));
        }
        let mut rows: Vec<Chunk> = ids
            .iter()
            .filter_map(|id| self.chunks.get(id).cloned())
            .collect();
        rows.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));
        Ok(rows)
    }
}

/// Generator replaying one canned reply and recording every prompt
#[derive(Default)]
pub struct ScriptedGenerator {
    pub reply: String,
    pub fail: bool,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail {
            return Err(GenerationError::Api {
                status: 429,
                message: "quota exceeded".to_string(),
            });
        }
        Ok(self.reply.clone())
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

pub fn chunk(id: &str, doc_id: &str, index: usize, text: &str) -> Chunk {
    Chunk {
        chunk_id: id.to_string(),
        doc_id: doc_id.to_string(),
        chunk_index: index,
        start_char: index * 100,
        end_char: index * 100 + text.chars().count(),
        text: text.to_string(),
    }
}
