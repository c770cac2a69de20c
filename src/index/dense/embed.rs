//! Embedding adapters.
//!
//! `HttpEmbedder` talks to an OpenAI-style /embeddings endpoint and must
//! clear the offline gate before every call. `HashEmbedder` is a fully
//! offline, deterministic fallback used for tests and air-gapped builds.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;

use super::{DenseError, EmbeddingBatch, EmbeddingPort};
use crate::gate::OfflineGate;

/// HTTP adapter for a hosted embedding provider.
pub struct HttpEmbedder {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    timeout: Duration,
    gate: OfflineGate,
}

impl HttpEmbedder {
    pub fn new(
        api_base: &str,
        api_key: &str,
        model: &str,
        timeout_secs: u64,
        gate: OfflineGate,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout: Duration::from_secs(timeout_secs),
            gate,
        }
    }

    async fn request(
        &self,
        inputs: &[String],
        dim: usize,
    ) -> Result<(Vec<Vec<f32>>, u64), DenseError> {
        self.gate.require("dense embeddings")?;
        let url = format!("{}/embeddings", self.api_base);
        let body = serde_json::json!({
            "model": self.model,
            "input": inputs,
            "dimensions": dim,
        });
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DenseError::Timeout {
                        seconds: self.timeout.as_secs(),
                    }
                } else {
                    DenseError::Api(e.to_string())
                }
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(DenseError::Api(format!("{} from {}", status, url)));
        }

        #[derive(Deserialize)]
        struct ApiEmbedding {
            embedding: Vec<f32>,
        }
        #[derive(Deserialize)]
        struct ApiUsage {
            total_tokens: u64,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            data: Vec<ApiEmbedding>,
            usage: Option<ApiUsage>,
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| DenseError::Api(format!("bad response body: {}", e)))?;
        let tokens = parsed.usage.map(|u| u.total_tokens).unwrap_or(0);
        Ok((parsed.data.into_iter().map(|d| d.embedding).collect(), tokens))
    }
}

#[async_trait]
impl EmbeddingPort for HttpEmbedder {
    async fn embed_documents(
        &self,
        texts: &[String],
        dim: usize,
    ) -> Result<EmbeddingBatch, DenseError> {
        let start = Instant::now();
        let (vectors, tokens) = self.request(texts, dim).await?;
        if vectors.len() != texts.len() {
            return Err(DenseError::Api(format!(
                "provider returned {} vectors for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(EmbeddingBatch {
            vectors,
            latency_ms: start.elapsed().as_millis() as u64,
            tokens,
            model: self.model.clone(),
            dim,
        })
    }

    async fn embed_query(&self, text: &str, dim: usize) -> Result<Vec<f32>, DenseError> {
        let (mut vectors, _) = self.request(&[text.to_string()], dim).await?;
        vectors
            .pop()
            .ok_or_else(|| DenseError::Api("provider returned no vector".to_string()))
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn model_version(&self) -> &str {
        "hosted"
    }
}

/// Deterministic offline embedder.
///
/// Tokens are hashed into `dim` buckets with signed weights; the result is
/// a pure function of the text, which is exactly what reproducible builds
/// and gate tests need. Not semantically meaningful.
pub struct HashEmbedder;

pub const HASH_EMBEDDER_MODEL: &str = "kanon2";
pub const HASH_EMBEDDER_VERSION: &str = "local-1";

impl HashEmbedder {
    pub fn embed(text: &str, dim: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; dim];
        for token in text.split_whitespace() {
            let token = token.to_ascii_lowercase();
            let h = fnv1a(token.as_bytes());
            let bucket = (h % dim as u64) as usize;
            let sign = if (h >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        v
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[async_trait]
impl EmbeddingPort for HashEmbedder {
    async fn embed_documents(
        &self,
        texts: &[String],
        dim: usize,
    ) -> Result<EmbeddingBatch, DenseError> {
        let start = Instant::now();
        let vectors: Vec<Vec<f32>> = texts.iter().map(|t| Self::embed(t, dim)).collect();
        let tokens = texts
            .iter()
            .map(|t| t.split_whitespace().count() as u64)
            .sum();
        Ok(EmbeddingBatch {
            vectors,
            latency_ms: start.elapsed().as_millis() as u64,
            tokens,
            model: HASH_EMBEDDER_MODEL.to_string(),
            dim,
        })
    }

    async fn embed_query(&self, text: &str, dim: usize) -> Result<Vec<f32>, DenseError> {
        Ok(Self::embed(text, dim))
    }

    fn model_id(&self) -> &str {
        HASH_EMBEDDER_MODEL
    }

    fn model_version(&self) -> &str {
        HASH_EMBEDDER_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_embedder_is_deterministic() {
        let a = HashEmbedder::embed("privileged attorney memo", 256);
        let b = HashEmbedder::embed("privileged attorney memo", 256);
        assert_eq!(a, b);
        assert_eq!(a.len(), 256);
    }

    #[test]
    fn test_hash_embedder_distinguishes_texts() {
        let a = HashEmbedder::embed("merger agreement", 256);
        let b = HashEmbedder::embed("lunch menu tacos", 256);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_http_embedder_refused_offline() {
        let embedder = HttpEmbedder::new(
            "https://embeddings.invalid/v1",
            "key",
            "kanon2",
            30,
            OfflineGate::new(false),
        );
        let err = embedder
            .embed_query("anything", 256)
            .await
            .unwrap_err();
        assert!(matches!(err, DenseError::Refused(_)));
    }
}
