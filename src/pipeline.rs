use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::external::{
    Embedder, EmbeddingEngine, GenerationParams, InferenceClient, LLMBackend, LLMEngine,
    QdrantIndex, TextGenerator, VectorBackend,
};
use crate::parser::{Document, DocumentParser};
use crate::qa::{Llm, RetrievalQa};
use crate::splitter::{chunk_stats, TextSplitter};
use crate::store::{IngestReport, LocalIndex, VectorIndex, VectorStore};

const PREVIEW_CHARS: usize = 500;

pub fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    Ok(Arc::new(EmbeddingEngine::new(config.embedding.clone())?))
}

pub fn open_index(config: &Config) -> Result<Box<dyn VectorIndex>> {
    let index: Box<dyn VectorIndex> = match config.vector_db.backend {
        VectorBackend::Local => Box::new(LocalIndex::new(
            &config.vector_db.path,
            &config.vector_db.collection_name,
        )),
        VectorBackend::Qdrant => Box::new(QdrantIndex::new(config.vector_db.clone())?),
    };
    Ok(index)
}

pub fn build_generator(config: &Config) -> Result<Arc<dyn TextGenerator>> {
    let generator: Arc<dyn TextGenerator> = match config.llm.backend {
        LLMBackend::HuggingFace => Arc::new(InferenceClient::new(config.inference.clone())?),
        LLMBackend::Ollama => Arc::new(LLMEngine::new(config.llm.clone())?),
    };
    Ok(generator)
}

pub fn generation_params(config: &Config) -> GenerationParams {
    GenerationParams {
        temperature: config.llm.temperature,
        top_p: config.llm.top_p,
        ..Default::default()
    }
}

/// Parse and split everything under the data directory.
pub async fn load_chunks(config: &Config) -> Result<Vec<Document>> {
    let parser = DocumentParser::new();
    let documents = parser
        .parse_directory(&config.data.data_dir)
        .await
        .context("Document parsing failed")?;
    info!(documents = documents.len(), "parsed documents");

    let splitter = TextSplitter::new(config.chunking.chunk_size, config.chunking.chunk_overlap)
        .context("Invalid chunking configuration")?;
    let chunks = splitter.split_documents(&documents);

    let stats = chunk_stats(&chunks);
    info!(
        total = stats.total_chunks,
        avg = %format!("{:.1}", stats.avg_chunk_length),
        min = stats.min_chunk_length,
        max = stats.max_chunk_length,
        "chunk statistics"
    );
    if let Some(first) = chunks.first() {
        info!(source = %first.metadata.label(), preview = %first.snippet(PREVIEW_CHARS), "first chunk");
    }
    Ok(chunks)
}

async fn store_chunks(store: &VectorStore, chunks: &[Document]) -> Result<IngestReport> {
    let report = store.create_from_documents(chunks).await?;
    store.persist().await?;
    Ok(report)
}

/// Parse, split and embed everything under the data directory into `store`.
pub async fn ingest(config: &Config, store: &VectorStore) -> Result<IngestReport> {
    let chunks = load_chunks(config).await?;
    store_chunks(store, &chunks).await
}

/// Reuse a persisted index when possible, otherwise rebuild it from the data
/// directory. Returns `true` when documents were (re)ingested.
///
/// The old index is only cleared once the documents have been read, so a bad
/// data directory leaves it in place.
pub async fn prepare_store(config: &Config, store: &VectorStore, recreate: bool) -> Result<bool> {
    if !recreate {
        match store.load_existing().await {
            Ok(true) => return Ok(false),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "could not load existing vector store, rebuilding"),
        }
    }

    let chunks = load_chunks(config).await?;
    store.reset().await?;
    let report = store_chunks(store, &chunks).await?;
    info!(
        added = report.added,
        skipped = report.skipped,
        failed = report.failed,
        "ingestion complete"
    );
    Ok(true)
}

/// Documents to vectors: returns the process-wide store, loaded and ready.
pub async fn initialize_loading_pipeline(config: &Config, recreate: bool) -> Result<Arc<VectorStore>> {
    let store = VectorStore::shared(VectorStore::new(
        open_index(config)?,
        build_embedder(config)?,
        config.processing.batch_size,
    ));
    info!(location = %store.location(), "vector store");

    prepare_store(config, &store, recreate).await?;
    Ok(store)
}

/// Question to answer: retriever plus language model behind one chain.
pub fn initialize_inference_pipeline(config: &Config, store: Arc<VectorStore>) -> Result<RetrievalQa> {
    let retriever = store.as_retriever(config.retrieval.top_k);
    let llm = Llm::with_params(build_generator(config)?, generation_params(config));
    Ok(RetrievalQa::new(retriever, llm))
}
