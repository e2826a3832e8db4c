use anyhow::Result;
use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use ollama_rs::{generation::options::GenerationOptions, Ollama};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::external::error::ExternalError;

#[cfg(test)]
use mockall::automock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub host: String,
    pub port: u16,
    /// L2-normalise every vector so cosine and dot product agree
    pub normalize: bool,
    pub max_concurrent_requests: usize,
}

impl EmbeddingConfig {
    /// Get the full URL for the Ollama service
    pub fn get_url(&self) -> Result<String> {
        let url = if self.host.starts_with("http://") || self.host.starts_with("https://") {
            format!("{}:{}", self.host.trim_end_matches('/'), self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        };

        Url::parse(&url).map_err(|e| ExternalError::ConfigError(format!("Invalid URL: {}", e)))?;

        Ok(url)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "all-minilm".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            normalize: true,
            max_concurrent_requests: 4,
        }
    }
}

/// Turns text into fixed-length vectors.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ExternalError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ExternalError>;

    /// Dimensionality of the vectors this model produces
    async fn dimension(&self) -> Result<usize, ExternalError> {
        Ok(self.embed_query("test").await?.len())
    }

    fn model_name(&self) -> String;
}

/// Scale a vector to unit length. Zero vectors are returned unchanged.
pub fn l2_normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
    vector
}

/// Ollama-backed embedding engine
pub struct EmbeddingEngine {
    client: Ollama,
    config: EmbeddingConfig,
}

impl EmbeddingEngine {
    /// Create a new embedding engine with the given configuration
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let url = config.get_url()?;
        let url = Url::parse(&url)
            .map_err(|e| ExternalError::ConfigError(format!("Invalid URL: {}", e)))?;

        let host = format!("{}://{}", url.scheme(), url.host_str().unwrap_or("localhost"));
        let client = Ollama::new(host, config.port);

        info!(model = %config.model, url = %url, "embedding engine ready");
        Ok(Self { client, config })
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, ExternalError> {
        let response = self
            .client
            .generate_embeddings(
                self.config.model.clone(),
                text.to_string(),
                Some(GenerationOptions::default()),
            )
            .await
            .map_err(|e| ExternalError::OllamaError(e.to_string()))?;

        if response.embeddings.is_empty() {
            return Err(ExternalError::OllamaError(format!(
                "model {} returned an empty embedding",
                self.config.model
            )));
        }

        let vector: Vec<f32> = response.embeddings.into_iter().map(|x| x as f32).collect();
        Ok(if self.config.normalize {
            l2_normalize(vector)
        } else {
            vector
        })
    }
}

#[async_trait]
impl Embedder for EmbeddingEngine {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ExternalError> {
        debug!(count = texts.len(), "embedding documents");
        let requests: Vec<_> = texts.iter().map(|text| self.embed_one(text)).collect();
        stream::iter(requests)
            .buffered(self.config.max_concurrent_requests.max(1))
            .try_collect()
            .await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ExternalError> {
        self.embed_one(text).await
    }

    fn model_name(&self) -> String {
        self.config.model.clone()
    }
}
