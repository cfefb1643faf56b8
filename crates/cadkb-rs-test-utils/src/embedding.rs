use async_trait::async_trait;
use cadkb_rs_core::{EmbeddingError, EmbeddingProvider, HashingEmbeddingProvider};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Returns the same vector for every text.
#[derive(Debug, Clone)]
pub struct FixedEmbedder {
    vector: Vec<f32>,
}

impl FixedEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector }
    }
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    fn name(&self) -> &str {
        "fixed"
    }

    fn dimension(&self) -> usize {
        self.vector.len()
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.vector.clone())
    }
}

/// Always reports the provider as unavailable.
#[derive(Debug, Clone)]
pub struct FailingEmbedder {
    dimension: usize,
}

impl FailingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn name(&self) -> &str {
        "failing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Unavailable("provider offline".to_string()))
    }
}

/// Hashing embeddings delivered after a fixed delay.
#[derive(Debug, Clone)]
pub struct SlowEmbedder {
    inner: HashingEmbeddingProvider,
    delay: Duration,
}

impl SlowEmbedder {
    pub fn new(dimension: usize, delay: Duration) -> Self {
        Self {
            inner: HashingEmbeddingProvider::new(dimension),
            delay,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for SlowEmbedder {
    fn name(&self) -> &str {
        "slow"
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.inner.embed_text(text))
    }
}

/// Hashing embeddings that can be switched off and on during a test.
#[derive(Debug)]
pub struct SwitchableEmbedder {
    inner: HashingEmbeddingProvider,
    available: AtomicBool,
    calls: AtomicUsize,
}

impl SwitchableEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            inner: HashingEmbeddingProvider::new(dimension),
            available: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of embed calls seen so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for SwitchableEmbedder {
    fn name(&self) -> &str {
        "switchable"
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.available.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Unavailable("switched off".to_string()));
        }
        Ok(self.inner.embed_text(text))
    }
}
