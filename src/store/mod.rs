pub mod error;
mod local;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::external::{Embedder, ExternalError};
use crate::parser::{Document, DocumentMetadata};
use crate::retrieval::Retriever;

pub use error::StoreError;
pub use local::{cosine_similarity, LocalIndex};

/// Chunks shorter than this (after cleaning) are not worth embedding
pub const MIN_CHUNK_CHARS: usize = 10;

/// A chunk as stored in an index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: Uuid,
    pub text: String,
    pub metadata: DocumentMetadata,
    pub vector: Vec<f32>,
}

impl IndexRecord {
    pub fn to_document(&self) -> Document {
        Document::new(self.text.clone(), self.metadata.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub document: Document,
    pub score: f32,
}

/// Persistence backend for embedded chunks
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Load whatever is already persisted, returning the number of records.
    async fn open(&self) -> Result<usize, StoreError>;
    async fn add(&self, records: Vec<IndexRecord>) -> Result<(), StoreError>;
    /// Most similar records first.
    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredRecord>, StoreError>;
    async fn count(&self) -> Result<usize, StoreError>;
    async fn reset(&self) -> Result<(), StoreError>;
    async fn persist(&self) -> Result<(), StoreError>;
    fn location(&self) -> String;
}

/// Outcome of an ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub total_chunks: usize,
    pub added: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub fn clean_text(text: &str) -> String {
    text.replace('\0', "").replace('\r', " ").trim().to_string()
}

static SHARED: OnceLock<Arc<VectorStore>> = OnceLock::new();

/// Embeds chunks and keeps them in a [`VectorIndex`] for similarity search.
pub struct VectorStore {
    index: Box<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    initialized: AtomicBool,
}

impl VectorStore {
    pub fn new(index: Box<dyn VectorIndex>, embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self {
            index,
            embedder,
            batch_size: batch_size.max(1),
            initialized: AtomicBool::new(false),
        }
    }

    /// The process-wide store. Only the first call's `store` is kept; later
    /// arguments are dropped.
    pub fn shared(store: VectorStore) -> Arc<VectorStore> {
        SHARED.get_or_init(|| Arc::new(store)).clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn location(&self) -> String {
        self.index.location()
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.embedder)
    }

    pub async fn create_from_documents(
        &self,
        documents: &[Document],
    ) -> Result<IngestReport, StoreError> {
        let mut report = IngestReport {
            total_chunks: documents.len(),
            ..Default::default()
        };

        let mut valid = Vec::with_capacity(documents.len());
        for doc in documents {
            let text = clean_text(&doc.content);
            if text.chars().count() < MIN_CHUNK_CHARS {
                debug!(source = %doc.metadata.source, "skipping short chunk");
                report.skipped += 1;
                continue;
            }
            valid.push(Document::new(text, doc.metadata.clone()));
        }

        info!(
            valid = valid.len(),
            skipped = report.skipped,
            batch_size = self.batch_size,
            model = %self.embedder.model_name(),
            "embedding chunks"
        );

        let batches = valid.chunks(self.batch_size).count();
        for (i, batch) in valid.chunks(self.batch_size).enumerate() {
            match self.add_batch(batch).await {
                Ok(()) => {
                    report.added += batch.len();
                    debug!(batch = i + 1, of = batches, "batch added");
                }
                Err(e) => {
                    warn!(batch = i + 1, error = %e, "batch failed, retrying chunks individually");
                    for doc in batch {
                        match self.add_batch(std::slice::from_ref(doc)).await {
                            Ok(()) => report.added += 1,
                            Err(e) => {
                                warn!(source = %doc.metadata.source, error = %e, "chunk failed");
                                report.failed += 1;
                            }
                        }
                    }
                }
            }
        }

        self.initialized.store(true, Ordering::SeqCst);
        info!(
            added = report.added,
            failed = report.failed,
            location = %self.index.location(),
            "vector store created"
        );
        Ok(report)
    }

    async fn add_batch(&self, batch: &[Document]) -> Result<(), StoreError> {
        let texts: Vec<String> = batch.iter().map(|d| d.content.clone()).collect();
        let vectors = self.embedder.embed_documents(&texts).await?;
        if vectors.len() != batch.len() {
            return Err(StoreError::Embedding(ExternalError::UnexpectedResponse(format!(
                "expected {} embeddings, got {}",
                batch.len(),
                vectors.len()
            ))));
        }

        let records = batch
            .iter()
            .zip(vectors)
            .map(|(doc, vector)| IndexRecord {
                id: Uuid::new_v4(),
                text: doc.content.clone(),
                metadata: doc.metadata.clone(),
                vector,
            })
            .collect();
        self.index.add(records).await
    }

    /// Open a previously persisted index. `false` when there is nothing to load.
    pub async fn load_existing(&self) -> Result<bool, StoreError> {
        let count = self.index.open().await?;
        if count == 0 {
            info!(location = %self.index.location(), "no existing vector store");
            return Ok(false);
        }
        self.initialized.store(true, Ordering::SeqCst);
        info!(count, location = %self.index.location(), "loaded existing vector store");
        Ok(true)
    }

    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<Document>, StoreError> {
        Ok(self
            .query_with_scores(text, k)
            .await?
            .into_iter()
            .map(|(doc, _)| doc)
            .collect())
    }

    pub async fn query_with_scores(
        &self,
        text: &str,
        k: usize,
    ) -> Result<Vec<(Document, f32)>, StoreError> {
        if !self.is_initialized() {
            return Err(StoreError::NotInitialized);
        }
        let vector = self.embedder.embed_query(text).await?;
        let results = self.index.search(&vector, k).await?;
        debug!(k, hits = results.len(), "similarity search");
        Ok(results.into_iter().map(|r| (r.document, r.score)).collect())
    }

    pub fn as_retriever(self: &Arc<Self>, k: usize) -> Retriever {
        Retriever::new(Arc::clone(self), k)
    }

    pub async fn persist(&self) -> Result<(), StoreError> {
        if !self.is_initialized() {
            return Err(StoreError::NotInitialized);
        }
        self.index.persist().await
    }

    pub async fn reset(&self) -> Result<(), StoreError> {
        self.index.reset().await?;
        self.initialized.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub async fn count(&self) -> Result<usize, StoreError> {
        self.index.count().await
    }
}
