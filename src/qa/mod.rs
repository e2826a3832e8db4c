mod chain;
mod llm;
mod prompt;

pub use chain::{QaResponse, RetrievalQa, EMPTY_QUERY_MESSAGE};
pub use llm::{Llm, LlmError, STOP_PATTERNS};
pub use prompt::{PromptError, PromptTemplate};
