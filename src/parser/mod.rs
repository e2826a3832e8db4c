pub mod document;
pub mod error;

use lopdf::Document as PdfDocument;
use pulldown_cmark::{Event, Options, Parser, Tag};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

pub use document::{Document, DocumentMetadata};
pub use error::ParseError;

const PDF_EXTENSIONS: &[&str] = &["pdf"];
const TEXT_EXTENSIONS: &[&str] = &["txt"];
const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown"];

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string()
}

/// Whether `parse_file` knows how to read this path
pub fn is_supported(path: &Path) -> bool {
    let ext = extension_of(path);
    PDF_EXTENSIONS
        .iter()
        .chain(TEXT_EXTENSIONS)
        .chain(MARKDOWN_EXTENSIONS)
        .any(|known| *known == ext)
}

/// Render markdown to plain text, keeping block structure as blank lines
pub fn markdown_to_text(content: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut text = String::with_capacity(content.len());

    for event in Parser::new_ext(content, options) {
        match event {
            Event::Start(Tag::Item) => text.push_str("- "),
            Event::End(Tag::Item) | Event::End(Tag::TableRow) | Event::End(Tag::TableHead) => {
                text.push('\n')
            }
            Event::End(Tag::TableCell) => text.push_str(" | "),
            Event::End(Tag::Heading(..))
            | Event::End(Tag::Paragraph)
            | Event::End(Tag::CodeBlock(_))
            | Event::End(Tag::List(_))
            | Event::End(Tag::Table(_)) => {
                if !text.ends_with("\n\n") {
                    text.push_str(if text.ends_with('\n') { "\n" } else { "\n\n" });
                }
            }
            Event::Text(t) | Event::Code(t) | Event::Html(t) => text.push_str(&t),
            Event::SoftBreak | Event::HardBreak => text.push('\n'),
            _ => {}
        }
    }

    text.trim().to_string()
}

/// Reads requirement documents from disk
#[derive(Debug, Default, Clone)]
pub struct DocumentParser;

impl DocumentParser {
    pub fn new() -> Self {
        Self
    }

    /// One document per page, pages numbered from 0
    pub async fn parse_pdf(&self, file_path: &Path) -> Result<Vec<Document>, ParseError> {
        if !file_path.exists() {
            return Err(ParseError::FileNotFound(file_path.to_path_buf()));
        }
        if !PDF_EXTENSIONS.contains(&extension_of(file_path).as_str()) {
            return Err(ParseError::UnsupportedFormat(file_path.to_path_buf()));
        }

        let bytes = tokio::fs::read(file_path).await?;
        let path = file_path.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || extract_pdf_pages(&path, &bytes))
            .await
            .map_err(|e| ParseError::Pdf {
                path: file_path.to_path_buf(),
                message: e.to_string(),
            })??;

        let source = file_path.display().to_string();
        let documents: Vec<Document> = pages
            .into_iter()
            .enumerate()
            .map(|(index, text)| {
                Document::new(text, DocumentMetadata::new(source.clone()).with_page(index as u32))
            })
            .collect();

        info!(pages = documents.len(), file = %file_name_of(file_path), "parsed PDF");
        Ok(documents)
    }

    /// Whole text file as a single document
    pub async fn parse_text(&self, file_path: &Path) -> Result<Vec<Document>, ParseError> {
        if !file_path.exists() {
            return Err(ParseError::FileNotFound(file_path.to_path_buf()));
        }
        let content = tokio::fs::read_to_string(file_path).await?;
        info!(file = %file_name_of(file_path), chars = content.chars().count(), "loaded text file");
        Ok(vec![Document::new(
            content,
            DocumentMetadata::new(file_name_of(file_path)),
        )])
    }

    /// Markdown file rendered to plain text as a single document
    pub async fn parse_markdown(&self, file_path: &Path) -> Result<Vec<Document>, ParseError> {
        if !file_path.exists() {
            return Err(ParseError::FileNotFound(file_path.to_path_buf()));
        }
        let content = tokio::fs::read_to_string(file_path).await?;
        info!(file = %file_name_of(file_path), "loaded markdown file");
        Ok(vec![Document::new(
            markdown_to_text(&content),
            DocumentMetadata::new(file_name_of(file_path)),
        )])
    }

    pub async fn parse_file(&self, file_path: &Path) -> Result<Vec<Document>, ParseError> {
        let ext = extension_of(file_path);
        if PDF_EXTENSIONS.contains(&ext.as_str()) {
            self.parse_pdf(file_path).await
        } else if TEXT_EXTENSIONS.contains(&ext.as_str()) {
            self.parse_text(file_path).await
        } else if MARKDOWN_EXTENSIONS.contains(&ext.as_str()) {
            self.parse_markdown(file_path).await
        } else {
            Err(ParseError::UnsupportedFormat(file_path.to_path_buf()))
        }
    }

    /// Supported files directly inside `directory`, in file-name order
    pub fn discover(&self, directory: &Path) -> Result<Vec<PathBuf>, ParseError> {
        if !directory.is_dir() {
            return Err(ParseError::DirectoryNotFound(directory.to_path_buf()));
        }

        let files: Vec<PathBuf> = WalkDir::new(directory)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_supported(e.path()))
            .map(|e| e.into_path())
            .collect();

        if files.is_empty() {
            return Err(ParseError::NoDocuments(directory.to_path_buf()));
        }
        Ok(files)
    }

    pub async fn parse_directory(&self, directory: &Path) -> Result<Vec<Document>, ParseError> {
        let files = self.discover(directory)?;
        info!(files = files.len(), dir = %directory.display(), "found documents");

        let mut all_documents = Vec::new();
        for file in &files {
            all_documents.extend(self.parse_file(file).await?);
        }

        info!(documents = all_documents.len(), "documents extracted");
        Ok(all_documents)
    }

    pub fn get_metadata<'a>(&self, doc: &'a Document) -> &'a DocumentMetadata {
        &doc.metadata
    }
}

/// Page texts in page order. A page that cannot be decoded yields empty text.
fn extract_pdf_pages(path: &Path, bytes: &[u8]) -> Result<Vec<String>, ParseError> {
    let pdf = PdfDocument::load_mem(bytes).map_err(|e| ParseError::Pdf {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut page_numbers: Vec<u32> = pdf.get_pages().keys().copied().collect();
    page_numbers.sort_unstable();

    Ok(page_numbers
        .into_iter()
        .map(|number| match pdf.extract_text(&[number]) {
            Ok(text) => text,
            Err(e) => {
                warn!(page = number, file = %path.display(), error = %e, "could not extract page text");
                String::new()
            }
        })
        .collect())
}
