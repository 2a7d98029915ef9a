use super::{languages, Chunk, ChunkOptions};

const MIN_CHUNK_BYTES: usize = 50;

/// Run the syntax strategy for one file. Returns `None` when the language
/// has no registered grammar or the parser fails outright (both cases are
/// the caller's cue to fall back to the character strategy regardless of
/// file size); returns `Some(chunks)` — possibly empty — otherwise.
pub fn chunk_with_syntax(source: &str, file_path: &str, language: &str, opts: ChunkOptions) -> Option<Vec<Chunk>> {
    let grammar = languages::grammar_for(language)?;

    let mut parser = tree_sitter::Parser::new();
    parser.set_language(&grammar.language).ok()?;
    let tree = parser.parse(source, None)?;

    let query = tree_sitter::Query::new(&grammar.language, grammar.query_source).ok()?;
    let capture_names: Vec<&str> = query.capture_names().iter().map(|s| s.as_ref()).collect();
    let source_bytes = source.as_bytes();

    let mut cursor = tree_sitter::QueryCursor::new();
    let mut candidates: Vec<Candidate> = Vec::new();

    for m in cursor.matches(&query, tree.root_node(), source_bytes) {
        let mut name = String::new();
        let mut outer_capture = "";
        let mut node = None;

        for cap in m.captures {
            let cap_name = capture_names[cap.index as usize];
            if cap_name == "name" {
                name = cap.node.utf8_text(source_bytes).unwrap_or("").to_string();
            } else {
                outer_capture = cap_name;
                node = Some(cap.node);
            }
        }

        if let Some(node) = node {
            candidates.push(Candidate {
                start_byte: node.start_byte(),
                end_byte: node.end_byte(),
                start_line: node.start_position().row as u32 + 1,
                end_line: node.end_position().row as u32 + 1,
                kind: languages::chunk_kind_for_capture(outer_capture),
                name,
            });
        }
    }

    // Top-most only: a chunkable node whose children are also chunkable
    // (e.g. an impl block containing functions) is not recursed into.
    candidates.sort_by_key(|c| (c.start_byte, std::cmp::Reverse(c.end_byte)));
    let mut top_most: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        let nested = top_most
            .last()
            .map(|accepted: &Candidate| candidate.start_byte >= accepted.start_byte && candidate.end_byte <= accepted.end_byte)
            .unwrap_or(false);
        if !nested {
            top_most.push(candidate);
        }
    }

    let max_chunk_size = opts.max_chunk_size();
    let mut chunks = Vec::new();

    for candidate in top_most {
        let length = candidate.end_byte - candidate.start_byte;
        if length < MIN_CHUNK_BYTES {
            continue;
        }

        let text = String::from_utf8_lossy(&source_bytes[candidate.start_byte..candidate.end_byte]).to_string();

        if length > 2 * max_chunk_size {
            let sub_chunks = super::fallback::chunk_with_fallback(&text, file_path, language, opts);
            let line_offset = candidate.start_line - 1;
            for mut sub in sub_chunks {
                sub.start_line += line_offset;
                sub.end_line += line_offset;
                chunks.push(sub);
            }
            continue;
        }

        chunks.push(Chunk {
            content: text,
            start_line: candidate.start_line,
            end_line: candidate.end_line,
            file_path: file_path.to_string(),
            language: language.to_string(),
            chunk_index: 0,
            chunk_kind: Some(candidate.kind),
            symbol_name: if candidate.name.is_empty() { None } else { Some(candidate.name) },
        });
    }

    chunks.sort_by_key(|c| c.start_line);
    Some(chunks)
}

struct Candidate {
    start_byte: usize,
    end_byte: usize,
    start_line: u32,
    end_line: u32,
    kind: super::ChunkKind,
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::ChunkKind;

    #[test]
    fn extracts_top_level_functions() {
        let source = "fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n\nfn sub(a: i32, b: i32) -> i32 {\n    a - b\n}\n";
        let chunks = chunk_with_syntax(source, "lib.rs", "rust", ChunkOptions::default()).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].symbol_name.as_deref(), Some("add"));
        assert_eq!(chunks[0].chunk_kind, Some(ChunkKind::Function));
    }

    #[test]
    fn does_not_recurse_into_impl_methods() {
        let source = "struct S;\n\nimpl S {\n    fn method_one(&self) -> i32 {\n        1\n    }\n\n    fn method_two(&self) -> i32 {\n        2\n    }\n}\n";
        let chunks = chunk_with_syntax(source, "lib.rs", "rust", ChunkOptions::default()).unwrap();
        // struct S is too short (dropped as trivial); the impl block is one chunk,
        // its two methods are not separately emitted.
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_kind, Some(ChunkKind::Class));
        assert!(chunks[0].content.contains("method_one"));
        assert!(chunks[0].content.contains("method_two"));
    }

    #[test]
    fn unsupported_language_returns_none() {
        assert!(chunk_with_syntax("text", "notes.txt", "unknown", ChunkOptions::default()).is_none());
    }
}
