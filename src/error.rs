//! Error types for the PDF utilities library

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the PDF utilities library
#[derive(Error, Debug)]
pub enum Error {
    /// A source stream could not be read or is not a PDF
    #[error("Cannot read PDF source '{key}': {source}")]
    InputStream {
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Malformed page range syntax
    #[error("Invalid page range '{range}': {reason}")]
    InvalidPageRange { range: String, reason: String },

    /// Page range refers to a page the document does not have
    #[error("Page {page} in range '{range}' out of bounds (total: {total})")]
    PageOutOfBounds { range: String, page: u32, total: u32 },

    /// Image bytes for an image field are not a supported raster format
    #[error("Image decode error: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// Stamp session used after it was stamped or disposed
    #[error("Stamp session is already {state}")]
    SessionClosed { state: &'static str },

    /// PDF processing error
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Invalid glob pattern
    #[error("Invalid glob pattern: {0}")]
    InvalidGlob(String),

    /// No files matched pattern
    #[error("No PDF files found matching pattern: {0}")]
    NoFilesMatched(String),

    /// General error
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Wrap a read or parse failure of the source identified by `key`
    pub(crate) fn input_stream<E>(key: &str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::InputStream {
            key: key.to_string(),
            source: Box::new(source),
        }
    }

    /// True for both malformed and out-of-bounds page ranges
    pub fn is_page_range_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidPageRange { .. } | Error::PageOutOfBounds { .. }
        )
    }
}
