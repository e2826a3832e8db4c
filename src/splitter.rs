use serde::Serialize;
use text_splitter::{Characters, ChunkConfig, ChunkConfigError, TextSplitter as CharSplitter};
use tracing::info;

use crate::parser::Document;

/// Aggregate chunk lengths, in characters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChunkStats {
    pub total_chunks: usize,
    pub avg_chunk_length: f64,
    pub min_chunk_length: usize,
    pub max_chunk_length: usize,
}

/// Splits documents into overlapping chunks sized in characters.
///
/// Boundaries are chosen from the coarsest level that fits: paragraphs, then
/// lines, sentences, words and finally single characters.
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    splitter: CharSplitter<Characters>,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChunkConfigError> {
        let config = ChunkConfig::new(chunk_size).with_overlap(chunk_overlap)?;
        Ok(Self {
            chunk_size,
            chunk_overlap,
            splitter: CharSplitter::new(config),
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Chunks inherit their parent's metadata and record their byte offset in it.
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Document> {
        let chunks: Vec<Document> = documents
            .iter()
            .flat_map(|doc| {
                self.splitter
                    .chunk_indices(&doc.content)
                    .map(move |(offset, text)| {
                        let mut metadata = doc.metadata.clone();
                        metadata.start_index = Some(offset);
                        Document::new(text, metadata)
                    })
            })
            .collect();

        info!(
            documents = documents.len(),
            chunks = chunks.len(),
            chunk_size = self.chunk_size,
            chunk_overlap = self.chunk_overlap,
            "split documents"
        );
        chunks
    }
}

pub fn chunk_stats(chunks: &[Document]) -> ChunkStats {
    if chunks.is_empty() {
        return ChunkStats::default();
    }

    let lengths: Vec<usize> = chunks.iter().map(|c| c.content.chars().count()).collect();
    ChunkStats {
        total_chunks: chunks.len(),
        avg_chunk_length: lengths.iter().sum::<usize>() as f64 / lengths.len() as f64,
        min_chunk_length: lengths.iter().copied().min().unwrap_or(0),
        max_chunk_length: lengths.iter().copied().max().unwrap_or(0),
    }
}
