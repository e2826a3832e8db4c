use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExternalError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Ollama error: {0}")]
    OllamaError(String),

    #[error("Vector DB error: {0}")]
    VectorDBError(String),

    #[error("Invalid API key. Check your HUGGINGFACE_API_KEY.")]
    InvalidApiKey,

    #[error("Authentication failed. Check your API key.")]
    AuthenticationFailed,

    #[error("Model {0} not found. Please check the model name in your .env file.")]
    ModelNotFound(String),

    #[error(
        "Model {0} is no longer available (410 Gone). \
         Please use a different model (e.g., mistralai/Mistral-7B-Instruct-v0.3)"
    )]
    ModelGone(String),

    #[error("Rate limit exceeded. Please wait and try again.")]
    RateLimited,

    #[error("Model {0} is currently loading. Please wait a minute and try again.")]
    ModelLoading(String),

    #[error(
        "Request to {model} timed out after {seconds} seconds. \
         The model may be loading or experiencing high demand."
    )]
    Timeout { model: String, seconds: u64 },

    #[error("API request failed ({status}): {body}")]
    ApiRequest { status: u16, body: String },

    #[error("Unexpected response format: {0}")]
    UnexpectedResponse(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ExternalError {
    /// Map a non-success HTTP status from the inference API to an error.
    pub fn from_status(status: u16, model: &str, body: String) -> Self {
        match status {
            401 => Self::InvalidApiKey,
            404 => Self::ModelNotFound(model.to_string()),
            410 => Self::ModelGone(model.to_string()),
            429 => Self::RateLimited,
            503 => Self::ModelLoading(model.to_string()),
            _ => Self::ApiRequest { status, body },
        }
    }
}
