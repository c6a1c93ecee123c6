/// Embedding provider trait and FastEmbed implementation
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitializationError(String),

    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Trait for embedding providers
///
/// Vectors returned by implementations are L2-normalized.
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Generate embeddings for multiple texts, one vector per input in input order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Models the FastEmbed backend can load, with their output dimension
const SUPPORTED_MODELS: &[(&str, EmbeddingModel, usize)] = &[
    ("all-MiniLM-L6-v2", EmbeddingModel::AllMiniLML6V2, 384),
    ("bge-small-en-v1.5", EmbeddingModel::BGESmallENV15, 384),
    ("bge-base-en-v1.5", EmbeddingModel::BGEBaseENV15, 768),
];

fn canonical_model_name(model_name: &str) -> &str {
    let name = model_name
        .strip_prefix("sentence-transformers/")
        .or_else(|| model_name.strip_prefix("BAAI/"))
        .unwrap_or(model_name);
    if name.eq_ignore_ascii_case("all-minilm-l6-v2") {
        "all-MiniLM-L6-v2"
    } else {
        name
    }
}

/// Output dimension of a supported model, without loading it
pub fn model_dimension(model_name: &str) -> Option<usize> {
    let name = canonical_model_name(model_name);
    SUPPORTED_MODELS
        .iter()
        .find(|(supported, _, _)| *supported == name)
        .map(|(_, _, dimension)| *dimension)
}

/// Scale `vector` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// FastEmbed provider for local embedding generation
///
/// Uses all-MiniLM-L6-v2 model (384 dimensions) by default, the same model the
/// corpus vectors are built with.
pub struct FastEmbedProvider {
    model: TextEmbedding,
    model_name: String,
    dimension: usize,
    batch_size: usize,
}

impl FastEmbedProvider {
    /// Load a model, downloading it into `cache_dir` (or the FastEmbed default) if missing
    pub fn new(
        model_name: &str,
        cache_dir: Option<PathBuf>,
        batch_size: usize,
    ) -> Result<Self, EmbeddingError> {
        let name = canonical_model_name(model_name);
        let (embedding_model, dimension) = SUPPORTED_MODELS
            .iter()
            .find(|(supported, _, _)| *supported == name)
            .map(|(_, model, dimension)| (model.clone(), *dimension))
            .ok_or_else(|| {
                EmbeddingError::InitializationError(format!(
                    "Unsupported model: {}. Supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5",
                    model_name
                ))
            })?;

        tracing::info!("Initializing embedding model: {} ({}D)", name, dimension);

        let mut init_options = InitOptions::new(embedding_model).with_show_download_progress(true);
        if let Some(dir) = cache_dir {
            init_options = init_options.with_cache_dir(dir);
        }

        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        Ok(Self {
            model,
            model_name: name.to_string(),
            dimension,
            batch_size: batch_size.max(1),
        })
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<(), EmbeddingError> {
        if embedding.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        Ok(())
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let mut embeddings = self
            .model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        let mut embedding = embeddings
            .pop()
            .ok_or_else(|| EmbeddingError::GenerationError("No embeddings generated".to_string()))?;

        self.check_dimension(&embedding)?;
        l2_normalize(&mut embedding);

        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Skipping empties would shift outputs against their inputs
        if let Some(position) = texts.iter().position(|t| t.is_empty()) {
            return Err(EmbeddingError::InvalidInput(format!(
                "Empty text at batch position {}",
                position
            )));
        }

        let mut embeddings = self
            .model
            .embed(texts.to_vec(), Some(self.batch_size))
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::GenerationError(format!(
                "Embedding count mismatch: expected {}, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        for embedding in &mut embeddings {
            self.check_dimension(embedding)?;
            l2_normalize(embedding);
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
