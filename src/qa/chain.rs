use anyhow::Result;
use serde::Serialize;
use tracing::{error, info};

use crate::parser::Document;
use crate::qa::{Llm, PromptTemplate};
use crate::retrieval::Retriever;

pub const EMPTY_QUERY_MESSAGE: &str = "Please provide a valid question.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QaResponse {
    pub query: String,
    pub result: String,
    pub source_documents: Vec<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QaResponse {
    /// `(label, content)` for every source document
    pub fn sources(&self) -> Vec<(String, String)> {
        self.source_documents
            .iter()
            .map(|doc| (doc.metadata.label(), doc.content.clone()))
            .collect()
    }
}

/// Retrieve, stuff every hit into one prompt, generate.
pub struct RetrievalQa {
    retriever: Retriever,
    llm: Llm,
    prompt: PromptTemplate,
}

impl RetrievalQa {
    pub fn new(retriever: Retriever, llm: Llm) -> Self {
        Self::with_prompt(retriever, llm, PromptTemplate::requirements())
    }

    pub fn with_prompt(retriever: Retriever, llm: Llm, prompt: PromptTemplate) -> Self {
        info!(
            model = %llm.model_name(),
            top_k = retriever.top_k(),
            "retrieval QA chain created (stuff)"
        );
        Self {
            retriever,
            llm,
            prompt,
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn llm(&self) -> &Llm {
        &self.llm
    }

    /// Never fails: errors are reported inside the response.
    pub async fn process_query(&self, query: &str) -> QaResponse {
        if query.trim().is_empty() {
            return QaResponse {
                query: query.to_string(),
                result: EMPTY_QUERY_MESSAGE.to_string(),
                source_documents: Vec::new(),
                error: None,
            };
        }

        match self.answer(query).await {
            Ok((result, source_documents)) => QaResponse {
                query: query.to_string(),
                result,
                source_documents,
                error: None,
            },
            Err(e) => {
                error!(error = %e, "query failed");
                QaResponse {
                    query: query.to_string(),
                    result: format!("Error processing query: {}", e),
                    source_documents: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn answer(&self, query: &str) -> Result<(String, Vec<Document>)> {
        let documents = self.retriever.get_relevant_documents(query).await?;
        let context = documents
            .iter()
            .map(|d| d.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = self
            .prompt
            .format(&[("context", context.as_str()), ("question", query)])?;
        let result = self.llm.call(&prompt, &[]).await?;
        Ok((result, documents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{ExternalError, MockEmbedder, MockTextGenerator};
    use crate::parser::DocumentMetadata;
    use crate::store::{MockVectorIndex, ScoredRecord, VectorStore};
    use std::sync::Arc;

    async fn retriever() -> Retriever {
        let mut embedder = MockEmbedder::new();
        embedder.expect_embed_query().returning(|_| Ok(vec![1.0]));

        let mut index = MockVectorIndex::new();
        index.expect_location().returning(|| "mem".to_string());
        index.expect_open().returning(|| Ok(2));
        index.expect_search().returning(|_, _| {
            Ok(vec![
                ScoredRecord {
                    document: Document::new(
                        "REQ-001 Users shall log in with email.",
                        DocumentMetadata::new("srs.pdf").with_page(0),
                    ),
                    score: 0.9,
                },
                ScoredRecord {
                    document: Document::new(
                        "REQ-002 Sessions expire after 30 minutes.",
                        DocumentMetadata::new("srs.pdf").with_page(1),
                    ),
                    score: 0.8,
                },
            ])
        });

        let store = Arc::new(VectorStore::new(Box::new(index), Arc::new(embedder), 10));
        store.load_existing().await.unwrap();
        store.as_retriever(2)
    }

    #[tokio::test]
    async fn test_blank_query() {
        let qa = RetrievalQa::new(retriever().await, Llm::new(Arc::new(MockTextGenerator::new())));
        let response = qa.process_query("   ").await;
        assert_eq!(response.result, EMPTY_QUERY_MESSAGE);
        assert!(response.source_documents.is_empty());
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn test_stuffs_context_into_prompt() {
        let mut generator = MockTextGenerator::new();
        generator.expect_model_name().returning(|| "m".to_string());
        generator
            .expect_text_generation()
            .withf(|prompt, _| {
                prompt.contains(
                    "REQ-001 Users shall log in with email.\n\nREQ-002 Sessions expire after 30 minutes.",
                ) && prompt.contains("Question: How do users log in?")
            })
            .times(1)
            .returning(|_, _| Ok("Per REQ-001, with email.\nQuestion: next?".to_string()));

        let qa = RetrievalQa::new(retriever().await, Llm::new(Arc::new(generator)));
        let response = qa.process_query("How do users log in?").await;

        assert_eq!(response.result, "Per REQ-001, with email.");
        assert_eq!(response.source_documents.len(), 2);
        assert_eq!(
            response.sources()[1],
            (
                "srs.pdf (page 2)".to_string(),
                "REQ-002 Sessions expire after 30 minutes.".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_generation_error_is_reported() {
        let mut generator = MockTextGenerator::new();
        generator.expect_model_name().returning(|| "m".to_string());
        generator
            .expect_text_generation()
            .returning(|_, _| Err(ExternalError::ModelLoading("m".to_string())));

        let qa = RetrievalQa::new(retriever().await, Llm::new(Arc::new(generator)));
        let response = qa.process_query("How do users log in?").await;

        assert!(response.result.starts_with("Error processing query: LLM generation failed"));
        assert!(response.error.is_some());
        assert!(response.source_documents.is_empty());
    }
}
