//! Recursive character splitting.
//!
//! Text is cut on the first separator (in priority order) that occurs in it. Pieces still longer
//! than the chunk size are cut again with the remaining separators, down to single characters.
//! Short pieces are then merged greedily up to the chunk size, and the tail of every emitted
//! chunk (at most `overlap` characters) is carried into the next one. Separators stay attached to
//! the start of the piece that follows them. Lengths are counted in characters, not bytes.

use super::types::DocumentError;

/// Separators tried in order; the empty separator splits into characters.
pub(crate) const SEPARATORS: [&str; 8] = ["\n\n", "\n", ".", "!", "?", ",", " ", ""];

/// Character-budgeted recursive splitter.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RecursiveSplitter {
    chunk_size: usize,
    overlap: usize,
}

impl RecursiveSplitter {
    pub(crate) fn new(chunk_size: usize, overlap: usize) -> Result<Self, DocumentError> {
        if chunk_size == 0 {
            return Err(DocumentError::InvalidChunking(
                "chunk size must be greater than zero".into(),
            ));
        }
        if overlap >= chunk_size {
            return Err(DocumentError::InvalidChunking(format!(
                "overlap ({overlap}) must be smaller than chunk size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    /// Split `text` into trimmed, non-empty chunks.
    pub(crate) fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (separator, remaining) = pick_separator(text, separators);
        let mut chunks = Vec::new();
        let mut pending: Vec<String> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(&piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge(std::mem::take(&mut pending)));
            }
            if remaining.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_with(&piece, remaining));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge(pending));
        }
        chunks
            .into_iter()
            .filter_map(|chunk| {
                let trimmed = chunk.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .collect()
    }

    fn merge(&self, pieces: Vec<String>) -> Vec<String> {
        let mut merged = Vec::new();
        let mut window: std::collections::VecDeque<(String, usize)> = Default::default();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(&piece);
            if total + len > self.chunk_size && !window.is_empty() {
                if total > self.chunk_size {
                    tracing::trace!(total, chunk_size = self.chunk_size, "Chunk exceeds budget");
                }
                push_joined(&mut merged, &window);
                while total > self.overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }
            total += len;
            window.push_back((piece, len));
        }

        push_joined(&mut merged, &window);
        merged
    }
}

fn pick_separator<'a>(text: &str, separators: &'a [&'a str]) -> (&'a str, &'a [&'a str]) {
    for (index, candidate) in separators.iter().enumerate() {
        if candidate.is_empty() {
            return ("", &[]);
        }
        if text.contains(*candidate) {
            return (*candidate, &separators[index + 1..]);
        }
    }
    (separators.last().copied().unwrap_or(""), &[])
}

fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }
    let mut parts = text.split(separator);
    let mut pieces = Vec::new();
    if let Some(first) = parts.next() {
        pieces.push(first.to_string());
    }
    pieces.extend(parts.map(|part| format!("{separator}{part}")));
    pieces.retain(|piece| !piece.is_empty());
    pieces
}

fn push_joined(out: &mut Vec<String>, window: &std::collections::VecDeque<(String, usize)>) {
    let joined: String = window.iter().map(|(piece, _)| piece.as_str()).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
