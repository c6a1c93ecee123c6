//! Retrieval-augmented answering
//!
//! One question flows through four stages in strict sequence:
//! retrieve ranked chunk ids, hydrate them from the corpus in rank order, build a
//! grounded prompt and call the model once, then parse the reply under the configured
//! response contract. Nothing is retried; adapter failures surface as the matching
//! [`ContractIqError`] variant.

mod parser;
mod prompt;

pub use parser::{
    parse_json, parse_response, verify_citations, Citation, ParsedAnswer, NOT_FOUND_ANSWER,
};
pub use prompt::{build_prompt, ANSWER_SCHEMA, NOT_FOUND_SENTINEL};

use crate::error::{ContractIqError, Result};
use crate::generation::Generator;
use crate::retrieval::{RetrievalMatch, Retriever};
use crate::storage::{Chunk, CorpusStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Output format the model is instructed to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseContract {
    /// Single JSON object with answer and citations
    #[default]
    Json,
    /// Free text, returned verbatim without citations
    Plain,
}

impl std::fmt::Display for ResponseContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseContract::Json => write!(f, "json"),
            ResponseContract::Plain => write!(f, "plain"),
        }
    }
}

impl std::str::FromStr for ResponseContract {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ResponseContract::Json),
            "plain" => Ok(ResponseContract::Plain),
            other => Err(format!("Contract must be 'json' or 'plain', got '{}'", other)),
        }
    }
}

/// Per-deployment answer settings
#[derive(Debug, Clone, Copy, Default)]
pub struct AnswerOptions {
    pub contract: ResponseContract,
    /// Reject citations that name unretrieved chunks or misquote them
    pub verify_citations: bool,
}

#[derive(Debug, Clone)]
pub struct AnswerRequest {
    pub question: String,
    pub doc_id: Option<String>,
    pub top_k: usize,
    pub debug: bool,
}

impl AnswerRequest {
    pub fn new(question: impl Into<String>, top_k: usize) -> Self {
        Self {
            question: question.into(),
            doc_id: None,
            top_k,
            debug: false,
        }
    }

    pub fn with_doc_id(mut self, doc_id: impl Into<String>) -> Self {
        self.doc_id = Some(doc_id.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Diagnostics attached when the request asks for them
#[derive(Debug, Clone, Serialize)]
pub struct DebugInfo {
    /// Ranked matches exactly as retrieval returned them
    pub matches: Vec<RetrievalMatch>,
    pub raw_output: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerResult {
    pub answer: String,
    pub citations: Vec<Citation>,
    /// Ranked ids from retrieval, including any that failed to hydrate
    pub retrieved_chunk_ids: Vec<String>,
    pub doc_id_filter: Option<String>,
    pub not_found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugInfo>,
}

/// Retriever → corpus → prompt → model → parser
#[derive(Clone)]
pub struct AnswerPipeline {
    retriever: Retriever,
    store: Arc<dyn CorpusStore>,
    generator: Arc<dyn Generator>,
    options: AnswerOptions,
}

impl AnswerPipeline {
    pub fn new(
        retriever: Retriever,
        store: Arc<dyn CorpusStore>,
        generator: Arc<dyn Generator>,
        options: AnswerOptions,
    ) -> Self {
        Self {
            retriever,
            store,
            generator,
            options,
        }
    }

    /// Answer one question
    pub fn answer(&self, request: &AnswerRequest) -> Result<AnswerResult> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(ContractIqError::InvalidArgument(
                "question must not be empty".to_string(),
            ));
        }
        if request.top_k == 0 {
            return Err(ContractIqError::InvalidArgument(
                "top_k must be > 0".to_string(),
            ));
        }

        // A blank document id means no filter
        let doc_id = request
            .doc_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());
        let matches = self.retriever.retrieve(question, request.top_k, doc_id)?;
        let retrieved_chunk_ids: Vec<String> =
            matches.iter().map(|m| m.chunk_id.clone()).collect();

        // Zero matches still go to the model, which answers from an empty context
        let rows = self.store.fetch_chunks_by_ids(&retrieved_chunk_ids)?;
        let chunks = reassemble(&retrieved_chunk_ids, rows);

        debug!(
            "Hydrated {}/{} retrieved chunks",
            chunks.len(),
            retrieved_chunk_ids.len()
        );

        let prompt = build_prompt(self.options.contract, question, &chunks);
        let raw = self
            .generator
            .generate(&prompt)
            .map_err(|e| ContractIqError::GenerationUnavailable(e.to_string()))?;

        let parsed = parse_response(self.options.contract, &raw)?;
        if self.options.verify_citations {
            verify_citations(&parsed, &chunks, &raw)?;
        }

        let not_found = parsed.is_not_found();
        info!(
            "Answered with {} citations from {} chunks (contract={}, not_found={})",
            parsed.citations.len(),
            chunks.len(),
            self.options.contract,
            not_found
        );

        Ok(AnswerResult {
            answer: parsed.answer,
            citations: parsed.citations,
            retrieved_chunk_ids,
            doc_id_filter: doc_id.map(str::to_string),
            not_found,
            debug: request.debug.then(|| DebugInfo {
                matches,
                raw_output: raw,
            }),
        })
    }
}

/// Order `rows` by their position in `ranked_ids`.
///
/// Ids with no row are dropped and the survivors keep their relative rank.
pub fn reassemble(ranked_ids: &[String], rows: Vec<Chunk>) -> Vec<Chunk> {
    let mut by_id: HashMap<String, Chunk> = rows
        .into_iter()
        .map(|chunk| (chunk.chunk_id.clone(), chunk))
        .collect();

    let ordered: Vec<Chunk> = ranked_ids
        .iter()
        .filter_map(|id| by_id.remove(id))
        .collect();

    let missing = ranked_ids.len().saturating_sub(ordered.len());
    if missing > 0 {
        warn!("{} retrieved chunk ids have no stored record", missing);
    }

    ordered
}
