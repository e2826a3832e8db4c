use serde::{Deserialize, Serialize};

/// Where a piece of text came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// File path (PDF pages) or file name (text files)
    pub source: String,
    /// 0-based page number, PDF only
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub page: Option<u32>,
    /// Byte offset of a chunk inside its parent document
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub start_index: Option<usize>,
}

impl DocumentMetadata {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            page: None,
            start_index: None,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Human readable citation, e.g. `srs.pdf (page 3)`
    pub fn label(&self) -> String {
        let name = std::path::Path::new(&self.source)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.source);
        match self.page {
            Some(page) => format!("{} (page {})", name, page + 1),
            None => name.to_string(),
        }
    }
}

/// A unit of text plus its provenance. Used for whole files, PDF pages and chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(content: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    /// First `max_chars` characters of the content
    pub fn snippet(&self, max_chars: usize) -> String {
        self.content.chars().take(max_chars).collect()
    }
}
