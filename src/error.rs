use std::path::PathBuf;
use thiserror::Error;

use crate::embedding::EmbeddingError;

/// Main error type for ContractIQ
#[derive(Error, Debug)]
pub enum ContractIqError {
    /// Bad parameters supplied by the caller (chunking sizes, top_k, empty question)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Vector index unreachable or erroring
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// Corpus lookup failed
    #[error("Corpus store unavailable: {0}")]
    StoreUnavailable(String),

    /// Language model call failed
    #[error("Generation unavailable: {0}")]
    GenerationUnavailable(String),

    /// The model violated the structured output contract
    #[error("Malformed generation output: {reason}")]
    MalformedGenerationOutput { reason: String, raw: String },

    /// Embedding model initialization or inference failed
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Database errors outside the query façade (schema setup, ingestion)
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ContractIqError {
    pub fn malformed(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::MalformedGenerationOutput {
            reason: reason.into(),
            raw: raw.into(),
        }
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for ContractIQ operations
pub type Result<T> = std::result::Result<T, ContractIqError>;
