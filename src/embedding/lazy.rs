//! Lazily initialized, process-wide embedding model

use super::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

type ProviderFactory =
    Box<dyn Fn() -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> + Send + Sync>;

/// Embedding provider that loads its model on first use.
///
/// Concurrent first callers race through check → lock → check → initialize, so the
/// factory runs exactly once. After warm-up `embed` reads the cell without locking.
/// A failed initialization leaves the cell empty and the next call tries again.
pub struct LazyEmbedder {
    model_name: String,
    dimension: usize,
    cell: OnceLock<Arc<dyn EmbeddingProvider>>,
    init_lock: Mutex<()>,
    factory: ProviderFactory,
}

impl LazyEmbedder {
    /// Wrap an arbitrary provider constructor
    pub fn new<F>(model_name: impl Into<String>, dimension: usize, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> + Send + Sync + 'static,
    {
        Self {
            model_name: model_name.into(),
            dimension,
            cell: OnceLock::new(),
            init_lock: Mutex::new(()),
            factory: Box::new(factory),
        }
    }

    /// Deferred FastEmbed model
    pub fn fastembed(
        model_name: &str,
        cache_dir: Option<PathBuf>,
        batch_size: usize,
    ) -> Result<Self, EmbeddingError> {
        let dimension = super::model_dimension(model_name).ok_or_else(|| {
            EmbeddingError::InitializationError(format!("Unsupported model: {}", model_name))
        })?;
        let name = model_name.to_string();

        Ok(Self::new(model_name, dimension, move || {
            let provider = FastEmbedProvider::new(&name, cache_dir.clone(), batch_size)?;
            Ok(Arc::new(provider) as Arc<dyn EmbeddingProvider>)
        }))
    }

    /// Whether the underlying model has been loaded
    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }

    fn instance(&self) -> Result<&Arc<dyn EmbeddingProvider>, EmbeddingError> {
        if let Some(provider) = self.cell.get() {
            return Ok(provider);
        }

        let _guard = self.init_lock.lock().map_err(|_| {
            EmbeddingError::InitializationError("Embedding init lock poisoned".to_string())
        })?;

        if let Some(provider) = self.cell.get() {
            return Ok(provider);
        }

        let provider = (self.factory)()?;
        if provider.dimension() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: provider.dimension(),
            });
        }

        tracing::debug!("Embedding model {} ready", self.model_name);
        Ok(self.cell.get_or_init(|| provider))
    }
}

impl EmbeddingProvider for LazyEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.instance()?.embed(text)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.instance()?.embed_batch(texts)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    struct ConstantProvider {
        dimension: usize,
    }

    impl EmbeddingProvider for ConstantProvider {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let mut v = vec![0.0; self.dimension];
            v[0] = 1.0;
            Ok(v)
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_name(&self) -> &str {
            "constant"
        }
    }

    fn counting_embedder(calls: Arc<AtomicUsize>) -> LazyEmbedder {
        LazyEmbedder::new("constant", 8, move || {
            calls.fetch_add(1, Ordering::SeqCst);
            // Widen the race window
            thread::sleep(Duration::from_millis(20));
            Ok(Arc::new(ConstantProvider { dimension: 8 }) as Arc<dyn EmbeddingProvider>)
        })
    }

    #[test]
    fn test_initialization_is_deferred() {
        let calls = Arc::new(AtomicUsize::new(0));
        let embedder = counting_embedder(calls.clone());

        assert!(!embedder.is_initialized());
        assert_eq!(embedder.dimension(), 8);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        embedder.embed("governing law").unwrap();
        embedder.embed("termination").unwrap();
        assert!(embedder.is_initialized());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_first_calls_initialize_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let embedder = Arc::new(counting_embedder(calls.clone()));
        let threads = 16;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let embedder = embedder.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    embedder.embed(&format!("question {i}")).unwrap()
                })
            })
            .collect();

        for handle in handles {
            let vector = handle.join().unwrap();
            assert_eq!(vector.len(), 8);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_initialization_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let embedder = LazyEmbedder::new("flaky", 8, move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(EmbeddingError::InitializationError("offline".to_string()))
            } else {
                Ok(Arc::new(ConstantProvider { dimension: 8 }) as Arc<dyn EmbeddingProvider>)
            }
        });

        assert!(embedder.embed("q").is_err());
        assert!(!embedder.is_initialized());
        assert!(embedder.embed("q").is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let embedder = LazyEmbedder::new("wrong", 384, || {
            Ok(Arc::new(ConstantProvider { dimension: 8 }) as Arc<dyn EmbeddingProvider>)
        });

        assert!(matches!(
            embedder.embed("q"),
            Err(EmbeddingError::DimensionMismatch {
                expected: 384,
                actual: 8
            })
        ));
    }
}
