use std::sync::Arc;
use tracing::debug;

use crate::parser::Document;
use crate::store::{StoreError, VectorStore};

/// Top-k similarity lookups against a shared [`VectorStore`].
#[derive(Clone)]
pub struct Retriever {
    store: Arc<VectorStore>,
    top_k: usize,
}

impl Retriever {
    pub fn new(store: Arc<VectorStore>, top_k: usize) -> Self {
        Self { store, top_k }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn set_top_k(&mut self, k: usize) {
        self.top_k = k;
    }

    /// `k` overrides the configured top-k for this call only.
    pub async fn retrieve_by_text(
        &self,
        query: &str,
        k: Option<usize>,
    ) -> Result<Vec<Document>, StoreError> {
        let k = k.unwrap_or(self.top_k);
        let docs = self.store.query(query, k).await?;
        debug!(k, retrieved = docs.len(), "retrieved documents");
        Ok(docs)
    }

    pub async fn get_relevant_documents(&self, query: &str) -> Result<Vec<Document>, StoreError> {
        self.retrieve_by_text(query, None).await
    }
}
