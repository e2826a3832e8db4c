use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::external::{ExternalError, GenerationParams, TextGenerator};

/// Markers after which models tend to start inventing follow-up questions
pub const STOP_PATTERNS: [&str; 4] = ["\n\nQuestion:", "\nQuestion:", "\n\nProvide", "------"];

#[derive(Error, Debug)]
#[error("LLM generation failed: {0}")]
pub struct LlmError(#[from] pub ExternalError);

fn truncate_at<'a>(text: &'a str, pattern: &str) -> &'a str {
    match text.find(pattern) {
        Some(pos) => &text[..pos],
        None => text,
    }
}

/// Text generator with fixed sampling parameters and answer clean-up.
#[derive(Clone)]
pub struct Llm {
    generator: Arc<dyn TextGenerator>,
    params: GenerationParams,
}

impl Llm {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self::with_params(generator, GenerationParams::default())
    }

    pub fn with_params(generator: Arc<dyn TextGenerator>, params: GenerationParams) -> Self {
        Self { generator, params }
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    pub fn model_name(&self) -> String {
        self.generator.model_name()
    }

    pub fn identifying_params(&self) -> Value {
        json!({
            "model_name": self.generator.model_name(),
            "max_new_tokens": self.params.max_new_tokens,
            "temperature": self.params.temperature,
            "top_p": self.params.top_p,
            "repetition_penalty": self.params.repetition_penalty,
        })
    }

    /// Generate a completion, cut at the caller's stop sequences and at
    /// [`STOP_PATTERNS`].
    pub async fn call(&self, prompt: &str, stop: &[&str]) -> Result<String, LlmError> {
        let raw = self.generator.text_generation(prompt, &self.params).await?;
        debug!(chars = raw.len(), "raw completion");

        let mut answer = raw.as_str();
        for pattern in stop.iter().chain(STOP_PATTERNS.iter()) {
            answer = truncate_at(answer, pattern);
        }
        Ok(answer.trim().to_string())
    }
}
