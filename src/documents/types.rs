//! Chunk records and error definitions for document processing.

use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or splitting documents.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Extension outside the pdf/docx/txt set. Holds the lowercased extension without the dot.
    #[error("Unsupported file type: .{0}")]
    UnsupportedFileType(String),
    /// File could not be read from disk.
    #[error("Failed to read '{path}': {source}")]
    Io {
        /// Path that failed to open or read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// PDF text extraction failed.
    #[error("Failed to extract PDF text: {0}")]
    Pdf(String),
    /// DOCX container or markup could not be parsed.
    #[error("Failed to extract DOCX text: {0}")]
    Docx(String),
    /// Plain-text file was not valid UTF-8.
    #[error("'{0}' is not valid UTF-8 text")]
    Encoding(PathBuf),
    /// Chunk size and overlap do not describe a usable splitter.
    #[error("Invalid chunking configuration: {0}")]
    InvalidChunking(String),
}

/// Supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Portable Document Format.
    Pdf,
    /// Office Open XML word-processing document.
    Docx,
    /// UTF-8 plain text.
    Text,
}

impl DocumentKind {
    /// Extensions accepted by the loader, lowercase and without the dot.
    pub const EXTENSIONS: [&'static str; 3] = ["pdf", "docx", "txt"];

    /// Match a file extension, ignoring case.
    pub fn from_extension(extension: &str) -> Result<Self, DocumentError> {
        let normalized = extension.trim_start_matches('.').to_ascii_lowercase();
        match normalized.as_str() {
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            "txt" => Ok(Self::Text),
            _ => Err(DocumentError::UnsupportedFileType(normalized)),
        }
    }
}

/// Location of a chunk within its source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkMetadata {
    /// Original filename the chunk came from.
    pub source: String,
    /// 0-based position within the document.
    pub chunk_index: usize,
    /// Number of chunks the document produced.
    pub total_chunks: usize,
}

/// Bounded piece of document text with provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Trimmed, non-empty chunk text.
    pub text: String,
    /// Provenance recorded in the stored payload.
    pub metadata: ChunkMetadata,
}

impl ChunkMetadata {
    /// Payload fields stored alongside the chunk vector.
    pub fn to_payload(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("source".into(), Value::String(self.source.clone()));
        map.insert("chunk_index".into(), Value::from(self.chunk_index as u64));
        map.insert("total_chunks".into(), Value::from(self.total_chunks as u64));
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_extension_is_accepted() {
        for extension in DocumentKind::EXTENSIONS {
            assert!(DocumentKind::from_extension(extension).is_ok(), "{extension}");
            assert!(
                DocumentKind::from_extension(&extension.to_ascii_uppercase()).is_ok(),
                "{extension}"
            );
        }
        assert!(matches!(
            DocumentKind::from_extension("csv"),
            Err(DocumentError::UnsupportedFileType(ext)) if ext == "csv"
        ));
    }
}
