//! Configuration management for ContractIQ
//!
//! Settings live in one TOML file, are overridable per key through environment
//! variables and are validated as a whole before use.

use crate::answer::{AnswerOptions, ResponseContract};
use crate::error::{ContractIqError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

pub const SCHEMA_VERSION: &str = "1.0.0";

const ENV_PREFIX: &str = "CONTRACTIQ_";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub llm: LlmConfig,
    pub answer: AnswerConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Corpus database, defaults to `<data_dir>/contractiq.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlite_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn sqlite_path(&self) -> PathBuf {
        self.sqlite_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("contractiq.db"))
    }
}

/// Chunking configuration (character counts)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub batch_size: usize,
    /// Model download cache, FastEmbed's default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// Remote Pinecone serverless index
    Pinecone,
    /// In-process HNSW graph rebuilt from cached embeddings
    Local,
}

impl std::str::FromStr for IndexBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pinecone" => Ok(IndexBackend::Pinecone),
            "local" => Ok(IndexBackend::Local),
            other => Err(format!("Backend must be 'pinecone' or 'local', got '{}'", other)),
        }
    }
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub backend: IndexBackend,
    /// Pinecone index host, printed by `contractiq index --create`
    #[serde(default)]
    pub host: String,
    /// Pinecone index name used when provisioning
    #[serde(default = "default_index_name")]
    pub name: String,
    /// Similarity metric of a newly created Pinecone index
    #[serde(default = "default_index_metric")]
    pub metric: String,
    /// Serverless cloud and region, required only to create a missing index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub namespace: String,
    pub api_key_env: String,
    /// Vector dimension (must match embedding dimension)
    pub dimension: usize,
    pub timeout_secs: u64,
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
    pub hnsw_max_elements: usize,
}

fn default_index_name() -> String {
    "contractiq-384".to_string()
}

fn default_index_metric() -> String {
    "cosine".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Gemini,
    Ollama,
}

impl std::str::FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" => Ok(LlmProvider::Gemini),
            "ollama" => Ok(LlmProvider::Ollama),
            other => Err(format!("Provider must be 'gemini' or 'ollama', got '{}'", other)),
        }
    }
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    pub api_key_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl LlmConfig {
    pub fn gemini_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or("https://generativelanguage.googleapis.com")
    }

    pub fn ollama_base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or("http://127.0.0.1:11434")
    }
}

/// Answer pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerConfig {
    pub contract: ResponseContract,
    pub top_k: usize,
    #[serde(default)]
    pub verify_citations: bool,
}

impl AnswerConfig {
    pub fn options(&self) -> AnswerOptions {
        AnswerOptions {
            contract: self.contract,
            verify_citations: self.verify_citations,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ContractIqError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ContractIqError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ContractIqError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: CONTRACTIQ_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix(ENV_PREFIX) {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__DATA_DIR" => self.storage.data_dir = PathBuf::from(value),
            "STORAGE__SQLITE_PATH" => self.storage.sqlite_path = Some(PathBuf::from(value)),
            "CHUNKING__CHUNK_SIZE" => self.chunking.chunk_size = parse_value(path, value)?,
            "CHUNKING__CHUNK_OVERLAP" => self.chunking.chunk_overlap = parse_value(path, value)?,
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "EMBEDDING__BATCH_SIZE" => self.embedding.batch_size = parse_value(path, value)?,
            "EMBEDDING__CACHE_DIR" => self.embedding.cache_dir = Some(PathBuf::from(value)),
            "INDEX__BACKEND" => self.index.backend = parse_value(path, value)?,
            "INDEX__HOST" => self.index.host = value.to_string(),
            "INDEX__NAMESPACE" => self.index.namespace = value.to_string(),
            "INDEX__NAME" => self.index.name = value.to_string(),
            "INDEX__CLOUD" => self.index.cloud = Some(value.to_string()),
            "INDEX__REGION" => self.index.region = Some(value.to_string()),
            "LLM__PROVIDER" => self.llm.provider = parse_value(path, value)?,
            "LLM__MODEL" => self.llm.model = value.to_string(),
            "LLM__BASE_URL" => self.llm.base_url = Some(value.to_string()),
            "LLM__TEMPERATURE" => self.llm.temperature = parse_value(path, value)?,
            "ANSWER__CONTRACT" => self.answer.contract = parse_value(path, value)?,
            "ANSWER__TOP_K" => self.answer.top_k = parse_value(path, value)?,
            "ANSWER__VERIFY_CITATIONS" => {
                self.answer.verify_citations = parse_value(path, value)?
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            ContractIqError::Config("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("contractiq").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| ContractIqError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".contractiq"))
    }
}

fn parse_value<T>(path: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ContractIqError::InvalidConfigValue {
            path: path.to_string(),
            message: format!("Cannot parse '{}': {}", value, e),
        })
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.contractiq"),
                sqlite_path: None,
            },
            chunking: ChunkingConfig {
                chunk_size: 1200,
                chunk_overlap: 200,
            },
            embedding: EmbeddingConfig {
                model: "all-MiniLM-L6-v2".to_string(),
                batch_size: 64,
                cache_dir: None,
            },
            index: IndexConfig {
                backend: IndexBackend::Local,
                host: String::new(),
                name: default_index_name(),
                metric: default_index_metric(),
                cloud: None,
                region: None,
                namespace: "cuad-chunks-v2".to_string(),
                api_key_env: "PINECONE_API_KEY".to_string(),
                dimension: 384,
                timeout_secs: 30,
                hnsw_m: 16,
                hnsw_ef_construction: 200,
                hnsw_ef_search: 64,
                hnsw_max_elements: 200_000,
            },
            llm: LlmConfig {
                provider: LlmProvider::Gemini,
                model: "gemini-2.5-flash".to_string(),
                api_key_env: "GEMINI_API_KEY".to_string(),
                base_url: None,
                temperature: 0.0,
                timeout_secs: 120,
            },
            answer: AnswerConfig {
                contract: ResponseContract::Json,
                top_k: 8,
                verify_citations: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let mut config = Config::default();
        config.index.backend = IndexBackend::Pinecone;
        config.index.host = "cuad-abc.svc.pinecone.io".to_string();
        config.answer.contract = ResponseContract::Plain;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.index.backend, IndexBackend::Pinecone);
        assert_eq!(loaded.index.host, "cuad-abc.svc.pinecone.io");
        assert_eq!(loaded.answer.contract, ResponseContract::Plain);
        assert_eq!(loaded.chunking.chunk_size, 1200);
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load(Path::new("/nonexistent/contractiq/config.toml"));
        assert!(matches!(result, Err(ContractIqError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_unknown_enum_values_rejected_at_parse() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        let defaults = toml::to_string_pretty(&Config::default()).unwrap();

        for (from, to) in [
            ("provider = \"gemini\"", "provider = \"groq\""),
            ("contract = \"json\"", "contract = \"markdown\""),
            ("backend = \"local\"", "backend = \"faiss\""),
        ] {
            assert!(defaults.contains(from));
            std::fs::write(&path, defaults.replace(from, to)).unwrap();
            assert!(matches!(Config::load(&path), Err(ContractIqError::Toml(_))));
        }
    }

    #[test]
    fn test_env_style_overrides() {
        let mut config = Config::default();
        config.set_value_from_env("ANSWER__TOP_K", "12").unwrap();
        config.set_value_from_env("LLM__PROVIDER", "Ollama").unwrap();
        config.set_value_from_env("ANSWER__CONTRACT", "plain").unwrap();
        config
            .set_value_from_env("STORAGE__SQLITE_PATH", "/srv/contractrag.db")
            .unwrap();

        assert_eq!(config.answer.top_k, 12);
        assert_eq!(config.llm.provider, LlmProvider::Ollama);
        assert_eq!(config.answer.contract, ResponseContract::Plain);
        assert_eq!(
            config.storage.sqlite_path(),
            PathBuf::from("/srv/contractrag.db")
        );

        assert!(matches!(
            config.set_value_from_env("CHUNKING__CHUNK_SIZE", "big"),
            Err(ContractIqError::InvalidConfigValue { .. })
        ));
        assert!(config.set_value_from_env("UNKNOWN__KEY", "x").is_ok());
    }

    #[test]
    fn test_default_sqlite_path() {
        let config = Config::default();
        assert_eq!(
            config.storage.sqlite_path(),
            PathBuf::from("~/.contractiq/contractiq.db")
        );
        assert_eq!(config.llm.gemini_base_url(), "https://generativelanguage.googleapis.com");
    }
}
