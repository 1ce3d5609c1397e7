//! The external embedding capability: a batch of strings in, one
//! fixed-length vector per string out.

pub mod hash_embedder;
pub mod http_embedder;
pub mod similarity;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub use hash_embedder::HashEmbedder;
pub use http_embedder::HttpEmbedder;
pub use similarity::{cosine_similarity, pairwise_cosine};

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding request timed out after {0:?}")]
    Timeout(Duration),
    #[error("embedding transport failed: {0}")]
    Transport(String),
    #[error("embedding endpoint returned {status}: {body}")]
    Endpoint { status: u16, body: String },
    #[error("malformed embedding response: {0}")]
    MalformedResponse(String),
    #[error("embedding count mismatch: sent {sent} texts, received {received} vectors")]
    CountMismatch { sent: usize, received: usize },
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("embedder configuration error: {0}")]
    Config(String),
}

/// Abstract embedding model interface.
///
/// Implementations:
/// - HashEmbedder: feature hashing, deterministic, no model server
/// - HttpEmbedder: OpenAI-compatible embeddings endpoint over HTTP
///
/// `name()` and `model_version()` are recorded in the index manifest so a
/// persisted index can be traced back to the model that produced it.
pub trait Embedder: Send + Sync + std::fmt::Debug {
    /// Implementation name ("hash", "http").
    fn name(&self) -> &'static str;

    /// Model generation identifier, e.g. "all-mpnet-base-v2".
    fn model_version(&self) -> &str;

    /// Output vector length.
    fn dimension(&self) -> usize;

    /// Embeds a batch, preserving input order. The only suspension point
    /// in the matching pipeline; implementations must honor a configured
    /// timeout rather than blocking indefinitely.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    /// Which implementation to construct: "hash" or "http".
    pub backend: String,
    /// Vector length for the hash backend; expected length for http.
    pub dimension: usize,
    /// Base URL of the OpenAI-compatible endpoint (http backend).
    pub endpoint: String,
    /// Model name sent with each request (http backend).
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            backend: "hash".into(),
            dimension: 768,
            endpoint: "http://localhost:8080/v1".into(),
            model: "all-mpnet-base-v2".into(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl EmbedderConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            backend: std::env::var("NOC_EMBEDDER").unwrap_or(defaults.backend),
            dimension: std::env::var("NOC_EMBEDDING_DIMENSION")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(defaults.dimension),
            endpoint: std::env::var("NOC_EMBEDDING_ENDPOINT").unwrap_or(defaults.endpoint),
            model: std::env::var("NOC_EMBEDDING_MODEL").unwrap_or(defaults.model),
            api_key: std::env::var("NOC_EMBEDDING_API_KEY").ok(),
            timeout: std::env::var("NOC_EMBEDDING_TIMEOUT_SECS")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }
}

/// Embedder factory.
pub fn create_embedder(config: &EmbedderConfig) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    match config.backend.as_str() {
        "hash" => Ok(Arc::new(HashEmbedder::new(config.dimension))),
        "http" => Ok(Arc::new(HttpEmbedder::new(config)?)),
        other => Err(EmbeddingError::Config(format!(
            "unknown embedder backend {other:?} (expected \"hash\" or \"http\")"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_builds_hash_backend() {
        let embedder = create_embedder(&EmbedderConfig {
            backend: "hash".into(),
            dimension: 128,
            ..EmbedderConfig::default()
        })
        .unwrap();

        assert_eq!(embedder.name(), "hash");
        assert_eq!(embedder.dimension(), 128);
    }

    #[test]
    fn factory_rejects_unknown_backend() {
        let err = create_embedder(&EmbedderConfig {
            backend: "onnx".into(),
            ..EmbedderConfig::default()
        })
        .unwrap_err();

        assert!(matches!(err, EmbeddingError::Config(_)));
    }
}
