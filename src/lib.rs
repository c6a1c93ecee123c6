//! ContractIQ - Grounded Question Answering over Legal Contracts
//!
//! Ingests contract text into a SQLite corpus, indexes fixed-size chunks for semantic
//! search and answers questions with a language model restricted to the retrieved
//! chunks, returning the chunk ids it cited.

pub mod answer;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod ingest;
pub mod retrieval;
pub mod storage;

pub use error::{ContractIqError, Result};
