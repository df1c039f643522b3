//! Embedding collaborator port.
//!
//! Failure is non-fatal by contract: the index degrades to keyword-only
//! scoring whenever the embedder is unavailable.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from the embedding collaborator.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// No embedding provider is configured or reachable.
    #[error("Embedding provider unavailable")]
    Unavailable,

    /// The provider returned a failure.
    #[error("Embedding provider error: {0}")]
    Provider(String),
}

/// Port for the embedding collaborator: text → fixed-dimension vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// Embedder used when no provider is configured. Always unavailable, which
/// keeps the index on keyword-only scoring.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEmbedder;

impl NoopEmbedder {
    /// Create a noop embedder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Embedder for NoopEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        Err(EmbedError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_embedder_is_unavailable() {
        let embedder = NoopEmbedder::new();
        assert!(matches!(
            embedder.embed("anything").await,
            Err(EmbedError::Unavailable)
        ));
    }
}
