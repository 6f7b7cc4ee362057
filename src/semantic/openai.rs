//! Embedding client for OpenAI-compatible `/embeddings` endpoints.
//!
//! Each call is a single HTTP attempt; retries belong to the caller's
//! retry policy so every provider is retried the same way.

use std::time::Duration;

use anyhow::Context;
use reqwest::blocking::Client;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::semantic::embeddings::{EmbeddingError, EmbeddingProvider};

pub const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "text-embedding-ada-002";
/// Output size of `text-embedding-ada-002`
pub const DEFAULT_OPENAI_DIMENSIONS: usize = 1536;

/// Blocking embeddings client.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    /// Requested output size; only sent when explicitly configured
    requested_dimensions: Option<usize>,
    dimensions: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        dimensions: Option<usize>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing OpenAI API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing OpenAI model name");

        let mut headers = reqwest::header::HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).context("invalid OpenAI API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build OpenAI HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            requested_dimensions: dimensions,
            dimensions: dimensions.unwrap_or(DEFAULT_OPENAI_DIMENSIONS),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl EmbeddingProvider for OpenAiEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.requested_dimensions,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|err| EmbeddingError::Request(err.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EmbeddingError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbeddingResponse = resp
            .json()
            .map_err(|err| EmbeddingError::Request(format!("invalid response body: {err}")))?;

        parsed.into_vectors(texts.len(), self.requested_dimensions)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    #[serde(borrow)]
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl EmbeddingResponse {
    fn into_vectors(
        mut self,
        expected_len: usize,
        dimensions: Option<usize>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if self.data.len() != expected_len {
            return Err(EmbeddingError::EmbeddingFailed(format!(
                "provider returned {} embeddings for {} inputs",
                self.data.len(),
                expected_len
            )));
        }

        self.data.sort_by_key(|entry| entry.index);
        if let Some(expected) = dimensions {
            if let Some(bad) = self.data.iter().find(|d| d.embedding.len() != expected) {
                return Err(EmbeddingError::DimensionMismatch {
                    expected,
                    got: bad.embedding.len(),
                });
            }
        }

        Ok(self.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_api_key() {
        let result = OpenAiEmbedder::new(
            "  ",
            DEFAULT_OPENAI_BASE,
            DEFAULT_OPENAI_MODEL,
            None,
            Duration::from_secs(5),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let embedder = OpenAiEmbedder::new(
            "sk-test",
            "https://example.invalid/v1/",
            DEFAULT_OPENAI_MODEL,
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(embedder.endpoint(), "https://example.invalid/v1/embeddings");
        assert_eq!(embedder.dimensions(), DEFAULT_OPENAI_DIMENSIONS);
    }

    #[test]
    fn test_response_sorted_by_index() {
        let json = r#"{"data":[
            {"embedding":[0.0,1.0],"index":1},
            {"embedding":[1.0,0.0],"index":0}
        ]}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(json).unwrap();
        let vectors = parsed.into_vectors(2, None).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_response_count_mismatch() {
        let json = r#"{"data":[{"embedding":[1.0,0.0],"index":0}]}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            parsed.into_vectors(2, None),
            Err(EmbeddingError::EmbeddingFailed(_))
        ));
    }

    #[test]
    fn test_response_dimension_mismatch() {
        let json = r#"{"data":[{"embedding":[1.0,0.0,0.5],"index":0}]}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            parsed.into_vectors(1, Some(2)),
            Err(EmbeddingError::DimensionMismatch {
                expected: 2,
                got: 3
            })
        ));
    }
}
