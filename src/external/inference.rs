use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::external::{
    error::ExternalError,
    llm::{GenerationParams, TextGenerator},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    pub api_key: String,
    pub model: String,
    /// Base URL of the inference router
    pub api_base: String,
    /// Base URL of the model hub (model metadata, auth checks)
    pub hub_base: String,
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "mistralai/Mistral-7B-Instruct-v0.2".to_string(),
            api_base: "https://router.huggingface.co".to_string(),
            hub_base: "https://huggingface.co".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Serialize)]
struct TextGenerationParameters {
    max_new_tokens: u32,
    temperature: f32,
    top_p: f32,
    repetition_penalty: f32,
    return_full_text: bool,
}

#[derive(Debug, Serialize)]
struct TextGenerationRequest<'a> {
    inputs: &'a str,
    parameters: TextGenerationParameters,
}

#[derive(Debug, Deserialize)]
struct GeneratedText {
    generated_text: String,
}

/// The text-generation endpoint answers in several shapes depending on the model.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TextGenerationResponse {
    Plain(String),
    Single(GeneratedText),
    Batch(Vec<GeneratedText>),
}

impl TextGenerationResponse {
    fn into_text(self) -> Option<String> {
        match self {
            Self::Plain(text) => Some(text),
            Self::Single(generated) => Some(generated.generated_text),
            Self::Batch(mut batch) => {
                if batch.is_empty() {
                    None
                } else {
                    Some(batch.swap_remove(0).generated_text)
                }
            }
        }
    }
}

/// Client for HuggingFace hosted inference
pub struct InferenceClient {
    client: Client,
    config: InferenceConfig,
}

impl InferenceClient {
    pub fn new(config: InferenceConfig) -> Result<Self, ExternalError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExternalError::ConnectionError(e.to_string()))?;

        info!(
            model = %config.model,
            endpoint = %format!("{}/hf-inference/models/{}", config.api_base, config.model),
            "inference client ready"
        );
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    fn chat_url(&self) -> String {
        format!("{}/v1/chat/completions", self.config.api_base.trim_end_matches('/'))
    }

    fn text_generation_url(&self) -> String {
        format!(
            "{}/hf-inference/models/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.model
        )
    }

    fn model_info_url(&self) -> String {
        format!(
            "{}/api/models/{}",
            self.config.hub_base.trim_end_matches('/'),
            self.config.model
        )
    }

    fn map_transport_error(&self, error: reqwest::Error) -> ExternalError {
        if error.is_timeout() {
            ExternalError::Timeout {
                model: self.config.model.clone(),
                seconds: self.config.timeout_secs,
            }
        } else {
            ExternalError::ConnectionError(error.to_string())
        }
    }

    async fn check_status(&self, response: Response) -> Result<Response, ExternalError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), model = %self.config.model, "inference API error");
        Err(ExternalError::from_status(
            status.as_u16(),
            &self.config.model,
            body,
        ))
    }

    async fn chat_completion(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, ExternalError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: params.max_new_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            stream: false,
        };

        let response = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        let response = self.check_status(response).await?;

        let text = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|_| ExternalError::UnexpectedResponse(text.clone()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or(ExternalError::UnexpectedResponse(text))
    }

    async fn raw_text_generation(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, ExternalError> {
        let request = TextGenerationRequest {
            inputs: prompt,
            parameters: TextGenerationParameters {
                max_new_tokens: params.max_new_tokens,
                temperature: params.temperature,
                top_p: params.top_p,
                repetition_penalty: params.repetition_penalty,
                return_full_text: false,
            },
        };

        let response = self
            .client
            .post(self.text_generation_url())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        let response = self.check_status(response).await?;

        let text = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        serde_json::from_str::<TextGenerationResponse>(&text)
            .ok()
            .and_then(TextGenerationResponse::into_text)
            .map(|generated| generated.trim().to_string())
            .ok_or(ExternalError::UnexpectedResponse(text))
    }

    /// Check that the API key can read the configured model.
    pub async fn authenticate(&self) -> Result<bool, ExternalError> {
        let response = self
            .client
            .get(self.model_info_url())
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if response.status().is_success() {
            Ok(true)
        } else {
            Err(ExternalError::AuthenticationFailed)
        }
    }

    pub async fn get_model_info(&self) -> Result<serde_json::Value, ExternalError> {
        let response = self
            .client
            .get(self.model_info_url())
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        let response = self.check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| ExternalError::UnexpectedResponse(e.to_string()))
    }
}

#[async_trait]
impl TextGenerator for InferenceClient {
    /// Chat completion first; plain text generation when the chat reply has an
    /// unexpected shape. HTTP failures are returned as-is.
    async fn text_generation(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, ExternalError> {
        match self.chat_completion(prompt, params).await {
            Ok(text) => Ok(text),
            Err(ExternalError::UnexpectedResponse(body)) => {
                debug!(%body, "chat completion shape not recognised, using text generation");
                self.raw_text_generation(prompt, params).await
            }
            Err(e) => Err(e),
        }
    }

    fn model_name(&self) -> String {
        self.config.model.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MODEL: &str = "org/test-model";

    fn client_for(server: &MockServer) -> InferenceClient {
        InferenceClient::new(InferenceConfig {
            api_key: "hf_secret".to_string(),
            model: MODEL.to_string(),
            api_base: server.uri(),
            hub_base: server.uri(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_chat_completion_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer hf_secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "  REQ-001 covers login.  "}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let text = client
            .text_generation("prompt", &GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(text, "REQ-001 covers login.");
    }

    #[tokio::test]
    async fn test_falls_back_to_text_generation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/hf-inference/models/{}", MODEL)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"generated_text": " fallback answer "}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let text = client
            .text_generation("prompt", &GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(text, "fallback answer");
    }

    #[tokio::test]
    async fn test_text_generation_object_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/hf-inference/models/{}", MODEL)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"generated_text": "object answer"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let text = client
            .text_generation("prompt", &GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(text, "object answer");
    }

    #[tokio::test]
    async fn test_http_status_is_not_retried_as_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/hf-inference/models/{}", MODEL)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!("unused")))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .text_generation("prompt", &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExternalError::RateLimited));
    }

    #[tokio::test]
    async fn test_status_codes_map_to_errors() {
        for (status, expected) in [
            (401u16, "Invalid API key"),
            (404, "not found"),
            (410, "no longer available"),
            (503, "currently loading"),
        ] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/v1/chat/completions"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;

            let client = client_for(&server);
            let err = client
                .text_generation("prompt", &GenerationParams::default())
                .await
                .unwrap_err();
            assert!(
                err.to_string().contains(expected),
                "status {} gave {}",
                status,
                err
            );
        }
    }

    #[tokio::test]
    async fn test_authenticate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/api/models/{}", MODEL)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": MODEL,
                "pipeline_tag": "text-generation"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.authenticate().await.unwrap());
        let info = client.get_model_info().await.unwrap();
        assert_eq!(info["pipeline_tag"], "text-generation");
    }

    #[tokio::test]
    async fn test_authenticate_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/api/models/{}", MODEL)))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(matches!(
            client.authenticate().await,
            Err(ExternalError::AuthenticationFailed)
        ));
    }
}
