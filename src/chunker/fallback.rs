use super::{Chunk, ChunkKind, ChunkOptions};

const MIN_TAIL_CHARS: usize = 50;
const BREAKPOINT_SEARCH_LINES: usize = 20;

/// Character-based sliding-window strategy. Walks lines accumulating into a
/// window; once the window reaches `chunk_size` it is extended (up to 20
/// more lines, never past `max_chunk_size`) looking for a natural break
/// point, then emitted. The next window reuses the last `chunk_overlap`
/// characters' worth of lines. The final window is only kept if its trimmed
/// length exceeds 50 characters.
pub fn chunk_with_fallback(source: &str, file_path: &str, language: &str, opts: ChunkOptions) -> Vec<Chunk> {
    let lines: Vec<&str> = source.lines().collect();
    let total_lines = lines.len();
    if total_lines == 0 {
        return Vec::new();
    }

    let chunk_size = opts.chunk_size.max(1);
    let max_chunk_size = opts.max_chunk_size();
    let overlap_lines = overlap_lines(opts.chunk_overlap, chunk_size, total_lines);

    let mut chunks = Vec::new();
    let mut cursor = 0usize;

    loop {
        let (end, window_len) = grow_to_chunk_size(&lines, cursor, chunk_size);
        let (end, _final_len) = extend_to_break_point(&lines, end, window_len, max_chunk_size);

        let is_final_window = end + 1 >= total_lines;
        let content = lines[cursor..=end].join("\n");

        if !is_final_window || content.trim().chars().count() > MIN_TAIL_CHARS {
            chunks.push(Chunk {
                content,
                start_line: cursor as u32 + 1,
                end_line: end as u32 + 1,
                file_path: file_path.to_string(),
                language: language.to_string(),
                chunk_index: 0,
                chunk_kind: Some(ChunkKind::Block),
                symbol_name: None,
            });
        }

        if is_final_window {
            break;
        }

        let next_cursor = (end + 1).saturating_sub(overlap_lines);
        cursor = if next_cursor > cursor { next_cursor } else { end + 1 };
    }

    chunks
}

/// `overlapLines = floor(chunkOverlap / max(chunkSize/totalLines, 1))`.
fn overlap_lines(chunk_overlap: usize, chunk_size: usize, total_lines: usize) -> usize {
    let ratio = (chunk_size as f64 / total_lines as f64).max(1.0);
    (chunk_overlap as f64 / ratio).floor() as usize
}

/// Accumulate lines from `start` until the window length reaches `chunk_size`
/// or input is exhausted. Returns the inclusive end index and window length.
fn grow_to_chunk_size(lines: &[&str], start: usize, chunk_size: usize) -> (usize, usize) {
    let mut end = start;
    let mut len = lines[start].len() + 1;
    while len < chunk_size && end + 1 < lines.len() {
        end += 1;
        len += lines[end].len() + 1;
    }
    (end, len)
}

/// Extend the window up to `BREAKPOINT_SEARCH_LINES` further lines looking
/// for a natural break point, never growing past `max_chunk_size`.
fn extend_to_break_point(lines: &[&str], start_end: usize, start_len: usize, max_chunk_size: usize) -> (usize, usize) {
    let mut end = start_end;
    let mut len = start_len;

    if is_break_point(lines[end]) {
        return (end, len);
    }

    for _ in 0..BREAKPOINT_SEARCH_LINES {
        if end + 1 >= lines.len() {
            break;
        }
        let candidate_len = len + lines[end + 1].len() + 1;
        if candidate_len > max_chunk_size {
            break;
        }
        end += 1;
        len = candidate_len;
        if is_break_point(lines[end]) {
            break;
        }
    }

    (end, len)
}

fn is_break_point(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return true;
    }
    matches!(trimmed, "}" | "};" | "]);") || trimmed.starts_with("//") || trimmed.starts_with('#')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_yields_no_chunks() {
        assert!(chunk_with_fallback("", "a.txt", "unknown", ChunkOptions::default()).is_empty());
    }

    #[test]
    fn short_source_below_threshold_is_dropped() {
        let chunks = chunk_with_fallback("short\n", "a.txt", "unknown", ChunkOptions::default());
        assert!(chunks.is_empty());
    }

    #[test]
    fn long_source_produces_multiple_overlapping_windows() {
        let mut source = String::new();
        for i in 0..300 {
            source.push_str(&format!("line number {i}\n"));
        }
        let opts = ChunkOptions { chunk_size: 200, chunk_overlap: 50 };
        let chunks = chunk_with_fallback(&source, "a.txt", "unknown", opts);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.start_line <= c.end_line);
            assert!(!c.content.trim().is_empty());
        }
    }

    #[test]
    fn windows_cover_every_line_via_overlap() {
        let mut source = String::new();
        for i in 0..100 {
            source.push_str(&format!("l{i}\n"));
        }
        let opts = ChunkOptions { chunk_size: 50, chunk_overlap: 10 };
        let chunks = chunk_with_fallback(&source, "a.txt", "unknown", opts);
        let last = chunks.last().unwrap();
        assert_eq!(last.end_line as usize, source.lines().count());
    }
}
