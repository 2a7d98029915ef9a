//! Syntax-aware chunking with a character-based fallback. Both strategies
//! share one interface: given source text, a file path, and a language tag,
//! produce an ordered list of `Chunk`s.

mod fallback;
pub mod languages;
mod syntax;

use serde::{Deserialize, Serialize};

/// The kind of syntax node a chunk was derived from, or `Block` for anything
/// produced by the fallback (character) strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Function,
    Class,
    Interface,
    Block,
}

/// A semantic unit of source text, ready to be embedded and upserted.
/// Immutable once created; `content` is always non-empty after trimming and
/// `start_line <= end_line`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub start_line: u32,
    pub end_line: u32,
    pub file_path: String,
    pub language: String,
    pub chunk_index: u32,
    pub chunk_kind: Option<ChunkKind>,
    pub symbol_name: Option<String>,
}

/// Parameters shared by both chunking strategies.
#[derive(Debug, Clone, Copy)]
pub struct ChunkOptions {
    /// Target window size (characters) for the fallback strategy; also the
    /// `maxChunkSize` threshold (as `2 * chunk_size`) used by both strategies
    /// to decide when a syntax node is too large and must be re-split.
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl ChunkOptions {
    pub fn max_chunk_size(&self) -> usize {
        2 * self.chunk_size
    }
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

const MIN_CHUNK_BYTES: usize = 50;
const FALLBACK_TRIGGER_BYTES: usize = 100;

/// Chunk one file's source text. Tries the syntax strategy first (when the
/// language is supported); falls back to the character strategy if the
/// parse fails, yields zero chunks for a file larger than
/// `FALLBACK_TRIGGER_BYTES`, or the language has no grammar registered.
pub fn chunk_file(source: &str, file_path: &str, language: &str, opts: ChunkOptions) -> Vec<Chunk> {
    let syntax_chunks = syntax::chunk_with_syntax(source, file_path, language, opts);

    match syntax_chunks {
        Some(chunks) if !chunks.is_empty() => renumber(chunks),
        Some(_) | None => {
            if source.len() > FALLBACK_TRIGGER_BYTES || syntax_chunks.is_none() {
                renumber(fallback::chunk_with_fallback(source, file_path, language, opts))
            } else {
                Vec::new()
            }
        }
    }
}

fn renumber(mut chunks: Vec<Chunk>) -> Vec<Chunk> {
    for (i, chunk) in chunks.iter_mut().enumerate() {
        chunk.chunk_index = i as u32;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_file_chunks_via_syntax() {
        let source = "def greet(name):\n    print('hello ' + name)\n    return name\n\n\ndef farewell(name):\n    print('bye ' + name)\n    return None\n";
        let chunks = chunk_file(source, "a.py", "python", ChunkOptions::default());
        assert!(!chunks.is_empty());
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as u32);
            assert!(!c.content.trim().is_empty());
            assert!(c.start_line <= c.end_line);
        }
    }

    #[test]
    fn unsupported_language_falls_back() {
        let source = "x".repeat(5000);
        let chunks = chunk_file(&source, "a.txt", "unknown", ChunkOptions::default());
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.chunk_kind == Some(ChunkKind::Block)));
    }

    #[test]
    fn tiny_unsupported_file_yields_no_chunks() {
        let chunks = chunk_file("x", "a.txt", "unknown", ChunkOptions::default());
        assert!(chunks.is_empty());
    }
}
