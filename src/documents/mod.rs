//! Document loading and chunking.
//!
//! [`DocumentProcessor`] turns an uploaded file into provenance-tagged [`Chunk`]s. All work here
//! is synchronous file and CPU work; async callers should run it on the blocking pool.

mod chunking;
mod loader;
mod types;

pub use types::{Chunk, ChunkMetadata, DocumentError, DocumentKind};

use crate::config::Config;
use chunking::RecursiveSplitter;
use std::path::Path;

/// Loads supported files and splits their text into overlapping chunks.
#[derive(Debug, Clone, Copy)]
pub struct DocumentProcessor {
    splitter: RecursiveSplitter,
}

impl DocumentProcessor {
    /// Build a processor with explicit character budgets.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, DocumentError> {
        Ok(Self {
            splitter: RecursiveSplitter::new(chunk_size, chunk_overlap)?,
        })
    }

    /// Build a processor from `CHUNK_SIZE` / `CHUNK_OVERLAP`.
    pub fn from_config(config: &Config) -> Result<Self, DocumentError> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Classify `path` by its extension, ignoring case.
    pub fn detect_kind(path: &Path) -> Result<DocumentKind, DocumentError> {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default();
        DocumentKind::from_extension(&extension)
    }

    /// Extract the full text of a supported file.
    pub fn load(&self, path: &Path) -> Result<String, DocumentError> {
        let kind = Self::detect_kind(path)?;
        let text = loader::extract_text(path, kind)?;
        tracing::debug!(path = %path.display(), ?kind, chars = text.chars().count(), "Loaded document");
        Ok(text)
    }

    /// Split `text` into chunks attributed to `source`.
    pub fn split(&self, text: &str, source: &str) -> Vec<Chunk> {
        let pieces = self.splitter.split(text);
        let total_chunks = pieces.len();
        pieces
            .into_iter()
            .enumerate()
            .map(|(chunk_index, text)| Chunk {
                text,
                metadata: ChunkMetadata {
                    source: source.to_string(),
                    chunk_index,
                    total_chunks,
                },
            })
            .collect()
    }

    /// Load and split `path`, attributing chunks to `source` (usually the uploaded filename).
    pub fn process(&self, path: &Path, source: &str) -> Result<Vec<Chunk>, DocumentError> {
        let text = self.load(path)?;
        let chunks = self.split(&text, source);
        tracing::info!(source, chunks = chunks.len(), "Split document");
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn extension_matching_ignores_case() {
        assert_eq!(
            DocumentProcessor::detect_kind(Path::new("Report.PDF")).expect("pdf"),
            DocumentKind::Pdf
        );
        assert_eq!(
            DocumentProcessor::detect_kind(Path::new("notes.Docx")).expect("docx"),
            DocumentKind::Docx
        );
        assert_eq!(
            DocumentProcessor::detect_kind(Path::new("a.txt")).expect("txt"),
            DocumentKind::Text
        );
    }

    #[test]
    fn unsupported_extensions_name_the_extension() {
        let error = DocumentProcessor::detect_kind(Path::new("data.CSV")).unwrap_err();
        assert_eq!(error.to_string(), "Unsupported file type: .csv");
        let error = DocumentProcessor::detect_kind(Path::new("README")).unwrap_err();
        assert_eq!(error.to_string(), "Unsupported file type: .");
    }

    #[test]
    fn chunks_carry_index_and_total() {
        let processor = DocumentProcessor::new(12, 0).expect("processor");
        let chunks = processor.split("para one.\n\npara two.", "notes.txt");
        assert_eq!(chunks.len(), 2);
        for (position, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.metadata.source, "notes.txt");
            assert_eq!(chunk.metadata.chunk_index, position);
            assert_eq!(chunk.metadata.total_chunks, 2);
        }
    }

    #[test]
    fn process_reads_and_splits_text_files() {
        let mut file = tempfile::Builder::new()
            .suffix(".TXT")
            .tempfile()
            .expect("temp file");
        file.write_all(b"Paris is the capital of France.")
            .expect("write");

        let processor = DocumentProcessor::from_config(&Config::default()).expect("processor");
        let chunks = processor.process(file.path(), "france.txt").expect("chunks");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Paris is the capital of France.");
    }

    #[test]
    fn empty_file_produces_no_chunks() {
        let file = tempfile::Builder::new()
            .suffix(".txt")
            .tempfile()
            .expect("temp file");
        let processor = DocumentProcessor::new(100, 10).expect("processor");
        assert!(processor.process(file.path(), "empty.txt").expect("ok").is_empty());
    }

    #[test]
    fn payload_includes_provenance() {
        let metadata = ChunkMetadata {
            source: "a.pdf".into(),
            chunk_index: 3,
            total_chunks: 9,
        };
        let payload = metadata.to_payload();
        assert_eq!(payload["source"], "a.pdf");
        assert_eq!(payload["chunk_index"], 3);
        assert_eq!(payload["total_chunks"], 9);
    }
}
