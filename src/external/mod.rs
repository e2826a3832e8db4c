mod embedding;
pub mod error;
pub mod inference;
mod llm;
pub mod vectordb;

#[cfg(test)]
pub use embedding::MockEmbedder;
pub use embedding::{l2_normalize, Embedder, EmbeddingConfig, EmbeddingEngine};
pub use error::ExternalError;
pub use inference::{InferenceClient, InferenceConfig};
#[cfg(test)]
pub use llm::MockTextGenerator;
pub use llm::{GenerationParams, LLMBackend, LLMConfig, LLMEngine, TextGenerator};
pub use vectordb::{QdrantIndex, VectorBackend, VectorDBConfig};
