//! Blocking client for an OpenAI-compatible `/embeddings` endpoint.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::{Embedder, EmbedderConfig, EmbeddingError};

#[derive(Debug)]
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimension: usize,
    timeout: Duration,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(config: &EmbedderConfig) -> Result<Self, EmbeddingError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &config.api_key {
            let auth = format!("Bearer {}", key.trim());
            let value = HeaderValue::from_str(&auth)
                .map_err(|_| EmbeddingError::Config("api key is not a valid header value".into()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| EmbeddingError::Config(format!("failed to build http client: {err}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.endpoint.trim_end_matches('/')),
            model: config.model.clone(),
            dimension: config.dimension,
            timeout: config.timeout,
        })
    }
}

impl Embedder for HttpEmbedder {
    fn name(&self) -> &'static str {
        "http"
    }

    fn model_version(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    // No retry loop here: per-request retry policy belongs to the caller.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|err| {
                if err.is_timeout() {
                    EmbeddingError::Timeout(self.timeout)
                } else {
                    EmbeddingError::Transport(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EmbeddingError::Endpoint {
                status: status.as_u16(),
                body,
            });
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .map_err(|err| EmbeddingError::MalformedResponse(err.to_string()))?;
        parsed.data.sort_by_key(|entry| entry.index);

        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                sent: texts.len(),
                received: parsed.data.len(),
            });
        }

        let vectors: Vec<Vec<f32>> = parsed
            .data
            .into_iter()
            .map(|entry| entry.embedding)
            .collect();

        if let Some(bad) = vectors.iter().find(|vector| vector.len() != self.dimension) {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }

        Ok(vectors)
    }
}
