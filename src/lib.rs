pub mod config;
pub mod external;
pub mod parser;
pub mod pipeline;
pub mod qa;
pub mod retrieval;
pub mod splitter;
pub mod store;
pub mod ui;

pub use config::Config;
pub use external::{Embedder, EmbeddingEngine, ExternalError, InferenceClient, LLMEngine, TextGenerator};
pub use parser::{Document, DocumentMetadata, DocumentParser, ParseError};
pub use pipeline::{initialize_inference_pipeline, initialize_loading_pipeline};
pub use qa::{QaResponse, RetrievalQa};
pub use retrieval::Retriever;
pub use splitter::TextSplitter;
pub use store::{StoreError, VectorStore};
pub use ui::ClientUi;
