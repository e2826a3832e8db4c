use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("No supported documents (.pdf, .txt, .md) found in {0}")]
    NoDocuments(PathBuf),

    #[error("Failed to read PDF {path}: {message}")]
    Pdf { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
