//! Embedding providers and the registry that selects one from config.

mod hashing;
mod http;

pub use hashing::HashingEmbeddingProvider;
pub use http::HttpEmbeddingProvider;

use crate::error::EmbeddingError;
use async_trait::async_trait;
use cadkb_rs_config::{EmbeddingConfig, EmbeddingProviderKind};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
/// Turns text into a fixed-width vector.
pub trait EmbeddingProvider: Send + Sync {
    /// Short provider name used in logs.
    fn name(&self) -> &str;

    /// Width of every vector this provider returns.
    fn dimension(&self) -> usize;

    /// Embed one piece of text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Constructor for a provider from its config block.
pub type ProviderFactory =
    fn(&EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError>;

/// Mapping from provider kind to constructor, resolved once at startup.
#[derive(Clone)]
pub struct EmbeddingProviderRegistry {
    factories: HashMap<EmbeddingProviderKind, ProviderFactory>,
}

impl EmbeddingProviderRegistry {
    /// Registry with no providers.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry holding the built-in hashing and http providers.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(EmbeddingProviderKind::Hashing, build_hashing);
        registry.register(EmbeddingProviderKind::Http, build_http);
        registry
    }

    /// Register or replace the factory for a provider kind.
    pub fn register(&mut self, kind: EmbeddingProviderKind, factory: ProviderFactory) {
        debug!("registering embedding provider (kind={kind:?})");
        self.factories.insert(kind, factory);
    }

    /// Build the provider selected by `config`.
    pub fn build(
        &self,
        config: &EmbeddingConfig,
    ) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
        let factory = self.factories.get(&config.provider).ok_or_else(|| {
            EmbeddingError::Unavailable(format!(
                "no embedding provider registered for {:?}",
                config.provider
            ))
        })?;
        let provider = factory(config)?;
        info!(
            "embedding provider ready (name={}, dimension={})",
            provider.name(),
            provider.dimension()
        );
        Ok(provider)
    }
}

impl Default for EmbeddingProviderRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

fn build_hashing(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    Ok(Arc::new(HashingEmbeddingProvider::new(config.dimension)))
}

fn build_http(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    Ok(Arc::new(HttpEmbeddingProvider::from_config(config)?))
}

/// Build the provider named by `config` from the built-in registry.
pub fn provider_from_config(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    EmbeddingProviderRegistry::with_builtin().build(config)
}

#[cfg(test)]
mod tests {
    use super::{EmbeddingProviderRegistry, provider_from_config};
    use cadkb_rs_config::{EmbeddingConfig, EmbeddingProviderKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn builds_hashing_provider_by_default() {
        let config = EmbeddingConfig {
            dimension: 32,
            ..EmbeddingConfig::default()
        };
        let provider = provider_from_config(&config).expect("provider");
        assert_eq!(provider.name(), "hashing");
        assert_eq!(provider.dimension(), 32);
    }

    #[test]
    fn builds_http_provider_from_endpoint() {
        let config = EmbeddingConfig {
            provider: EmbeddingProviderKind::Http,
            endpoint: Some("http://127.0.0.1:11434".to_string()),
            ..EmbeddingConfig::default()
        };
        let provider = provider_from_config(&config).expect("provider");
        assert_eq!(provider.name(), "http");
    }

    #[test]
    fn empty_registry_reports_missing_provider() {
        let registry = EmbeddingProviderRegistry::empty();
        let err = registry
            .build(&EmbeddingConfig::default())
            .err()
            .expect("missing provider");
        assert!(err.to_string().contains("no embedding provider"));
    }
}
