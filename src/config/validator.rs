use crate::config::{Config, IndexBackend, SCHEMA_VERSION};
use crate::embedding::model_dimension;
use crate::error::{ContractIqError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, reporting every violation at once
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_chunking(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_index(config, &mut errors);
        Self::validate_llm(config, &mut errors);
        Self::validate_answer(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ContractIqError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }

        if let Some(path) = &config.storage.sqlite_path {
            if path.as_os_str().is_empty() {
                errors.push(ValidationError::new(
                    "storage.sqlite_path",
                    "SQLite path cannot be empty when set",
                ));
            }
        }
    }

    fn validate_chunking(config: &Config, errors: &mut Vec<ValidationError>) {
        let chunking = &config.chunking;
        if chunking.chunk_size == 0 {
            errors.push(ValidationError::new(
                "chunking.chunk_size",
                "Chunk size must be greater than 0",
            ));
        } else if chunking.chunk_overlap >= chunking.chunk_size {
            errors.push(ValidationError::new(
                "chunking.chunk_overlap",
                format!(
                    "Chunk overlap must be less than chunk size ({}), got {}",
                    chunking.chunk_size, chunking.chunk_overlap
                ),
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        let model = &config.embedding.model;
        match model_dimension(model) {
            None => errors.push(ValidationError::new(
                "embedding.model",
                format!("Unsupported embedding model: '{}'", model),
            )),
            Some(dimension) if dimension != config.index.dimension => {
                errors.push(ValidationError::new(
                    "index.dimension",
                    format!(
                        "Index dimension {} does not match {} output dimension {}",
                        config.index.dimension, model, dimension
                    ),
                ))
            }
            Some(_) => {}
        }
    }

    fn validate_index(config: &Config, errors: &mut Vec<ValidationError>) {
        let index = &config.index;

        if index.dimension == 0 {
            errors.push(ValidationError::new(
                "index.dimension",
                "Vector dimension must be greater than 0",
            ));
        }

        if index.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "index.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }

        match index.backend {
            IndexBackend::Pinecone => {
                if index.host.trim().is_empty() && index.name.trim().is_empty() {
                    errors.push(ValidationError::new(
                        "index.host",
                        "Pinecone backend requires an index host or an index name to provision",
                    ));
                }
                if !["cosine", "euclidean", "dotproduct"].contains(&index.metric.as_str()) {
                    errors.push(ValidationError::new(
                        "index.metric",
                        format!(
                            "Metric must be cosine, euclidean or dotproduct, got '{}'",
                            index.metric
                        ),
                    ));
                }
                if index.api_key_env.is_empty() {
                    errors.push(ValidationError::new(
                        "index.api_key_env",
                        "API key environment variable name cannot be empty",
                    ));
                }
            }
            IndexBackend::Local => {
                for (path, value) in [
                    ("index.hnsw_m", index.hnsw_m),
                    ("index.hnsw_ef_construction", index.hnsw_ef_construction),
                    ("index.hnsw_ef_search", index.hnsw_ef_search),
                    ("index.hnsw_max_elements", index.hnsw_max_elements),
                ] {
                    if value == 0 {
                        errors.push(ValidationError::new(path, "Must be greater than 0"));
                    }
                }
            }
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        let temp = config.llm.temperature;
        if !(0.0..=2.0).contains(&temp) {
            errors.push(ValidationError::new(
                "llm.temperature",
                format!("Temperature must be between 0.0 and 2.0, got {}", temp),
            ));
        }

        if config.llm.model.is_empty() {
            errors.push(ValidationError::new("llm.model", "Model name cannot be empty"));
        }

        if config.llm.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "llm.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }
    }

    fn validate_answer(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.answer.top_k == 0 {
            errors.push(ValidationError::new(
                "answer.top_k",
                "top_k must be greater than 0",
            ));
        }
    }
}
