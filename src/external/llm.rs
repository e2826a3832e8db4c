use anyhow::Result;
use async_trait::async_trait;
use ollama_rs::{
    generation::{completion::request::GenerationRequest, options::GenerationOptions},
    Ollama,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, info};
use url::Url;

use crate::external::error::ExternalError;

#[cfg(test)]
use mockall::automock;

/// Which service answers prompts
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LLMBackend {
    HuggingFace,
    Ollama,
}

impl FromStr for LLMBackend {
    type Err = ExternalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "huggingface" | "hf" => Ok(Self::HuggingFace),
            "ollama" | "local" => Ok(Self::Ollama),
            other => Err(ExternalError::ConfigError(format!(
                "Unknown LLM backend: {}",
                other
            ))),
        }
    }
}

/// Sampling parameters for one generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 300,
            temperature: 0.5,
            top_p: 0.9,
            repetition_penalty: 1.2,
        }
    }
}

/// A model that turns a prompt into text.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn text_generation(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, ExternalError>;

    fn model_name(&self) -> String;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    pub backend: LLMBackend,
    pub model: String,
    pub host: String,
    pub port: u16,
    pub temperature: f32,
    pub top_p: f32,
}

impl LLMConfig {
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

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            backend: LLMBackend::HuggingFace,
            model: "mistral".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            temperature: 0.5,
            top_p: 0.9,
        }
    }
}

/// Local Ollama completion engine
pub struct LLMEngine {
    client: Ollama,
    config: LLMConfig,
}

impl LLMEngine {
    /// Create a new LLM engine with the given configuration
    pub fn new(config: LLMConfig) -> Result<Self> {
        let url = config.get_url()?;
        let url = Url::parse(&url)
            .map_err(|e| ExternalError::ConfigError(format!("Invalid URL: {}", e)))?;

        let host = format!("{}://{}", url.scheme(), url.host_str().unwrap_or("localhost"));
        let client = Ollama::new(host, config.port);

        info!(model = %config.model, url = %url, "ollama LLM engine ready");
        Ok(Self { client, config })
    }

    /// Generate text completion
    pub async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let mut request = GenerationRequest::new(self.config.model.clone(), prompt.to_string());

        let options = GenerationOptions::default()
            .temperature(params.temperature)
            .top_p(params.top_p)
            .repeat_penalty(params.repetition_penalty)
            .num_predict(params.max_new_tokens as i32);

        request.options = Some(options);

        debug!(model = %self.config.model, chars = prompt.len(), "ollama generate");
        let response = self
            .client
            .generate(request)
            .await
            .map_err(|e| ExternalError::OllamaError(e.to_string()))?;

        Ok(response.response)
    }
}

#[async_trait]
impl TextGenerator for LLMEngine {
    async fn text_generation(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, ExternalError> {
        let text = self.generate(prompt, params).await?;
        Ok(text.trim().to_string())
    }

    fn model_name(&self) -> String {
        self.config.model.clone()
    }
}
