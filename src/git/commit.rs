//! Commit classification and the single-chunk-per-commit text format.

use std::sync::OnceLock;

use regex::Regex;

use super::reader::CommitInfo;
use crate::chunker::{Chunk, ChunkKind};
use crate::ids;

const MAX_FILES_LISTED: usize = 20;
const TRUNCATION_SUFFIX: &str = "\n[content truncated due to size]";

fn prefix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(feat|fix|bugfix|hotfix|docs|style|refactor|test|chore|perf|build|ci|revert)(\([^)]+\))?!?:").unwrap()
    })
}

/// Classify a commit's subject/body into a conventional-commit-ish type.
/// Prefix matches take precedence over keyword heuristics.
pub fn classify_commit_type(subject: &str, body: &str) -> &'static str {
    if let Some(m) = prefix_regex().captures(subject) {
        return match m.get(1).unwrap().as_str().to_lowercase().as_str() {
            "bugfix" | "hotfix" => "fix",
            other @ ("feat" | "fix" | "docs" | "style" | "refactor" | "test" | "chore" | "perf" | "build" | "ci" | "revert") => {
                leak_str(other)
            }
            _ => "other",
        };
    }

    let haystack = format!("{subject} {body}").to_lowercase();
    if haystack.contains("implement") {
        return "feat";
    }
    if haystack.contains("optimize") || haystack.contains("performance") {
        return "perf";
    }
    if haystack.contains("fix") || haystack.contains("bug") || haystack.contains("error") {
        return "fix";
    }
    if haystack.contains("refactor") {
        return "refactor";
    }
    if haystack.contains("test") {
        return "test";
    }
    if haystack.contains("doc") {
        return "docs";
    }
    "other"
}

fn leak_str(s: &str) -> &'static str {
    match s {
        "feat" => "feat",
        "fix" => "fix",
        "docs" => "docs",
        "style" => "style",
        "refactor" => "refactor",
        "test" => "test",
        "chore" => "chore",
        "perf" => "perf",
        "build" => "build",
        "ci" => "ci",
        "revert" => "revert",
        _ => "other",
    }
}

/// Render one commit into a single chunk. Content begins with
/// `Commit: <shortHash>`, then `Type`, `Author`, `Date`, `Subject`, an
/// optional `Description`, an optional file list (first 20 entries, with a
/// `... and K more files` suffix), `Changes: +ins -del`, and an optional
/// diff preview. Truncated to `max_chunk_size` with a trailing marker.
pub fn create_chunks(commit: &CommitInfo, repo_path: &str, diff: Option<&str>, max_chunk_size: usize) -> Chunk {
    let commit_type = classify_commit_type(&commit.subject, &commit.body);

    let mut text = format!(
        "Commit: {}\nType: {}\nAuthor: {}\nDate: {}\nSubject: {}\n",
        commit.short_hash,
        commit_type,
        commit.author,
        commit.date.to_rfc3339(),
        commit.subject,
    );

    if !commit.body.is_empty() {
        text.push_str(&format!("Description: {}\n", commit.body));
    }

    if !commit.files_changed.is_empty() {
        let n = commit.files_changed.len();
        text.push_str(&format!("Files changed ({n}):\n"));
        for file in commit.files_changed.iter().take(MAX_FILES_LISTED) {
            text.push_str(&format!("  {file}\n"));
        }
        if n > MAX_FILES_LISTED {
            text.push_str(&format!("  ... and {} more files\n", n - MAX_FILES_LISTED));
        }
    }

    text.push_str(&format!("Changes: +{} -{}\n", commit.insertions, commit.deletions));

    if let Some(diff) = diff {
        text.push_str("Diff preview:\n");
        text.push_str(diff);
    }

    if text.len() > max_chunk_size {
        let keep = max_chunk_size.saturating_sub(TRUNCATION_SUFFIX.len());
        let mut boundary = keep.min(text.len());
        while boundary > 0 && !text.is_char_boundary(boundary) {
            boundary -= 1;
        }
        text.truncate(boundary);
        text.push_str(TRUNCATION_SUFFIX);
    }

    let id = ids::gitcommit_id(repo_path, &commit.full_hash);
    Chunk {
        content: text,
        start_line: 1,
        end_line: 1,
        file_path: format!("commit:{}", commit.short_hash),
        language: "gitcommit".to_string(),
        chunk_index: 0,
        chunk_kind: Some(ChunkKind::Block),
        symbol_name: Some(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use chrono::Utc;

    fn commit(subject: &str, body: &str) -> CommitInfo {
        CommitInfo {
            short_hash: "abc1234".to_string(),
            full_hash: "abc1234def5678".to_string(),
            author: "Ada".to_string(),
            author_email: "ada@example.com".to_string(),
            date: sample_date(),
            subject: subject.to_string(),
            body: body.to_string(),
            files_changed: vec!["src/lib.rs".to_string()],
            insertions: 3,
            deletions: 1,
        }
    }

    fn sample_date() -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn classifies_conventional_prefix() {
        assert_eq!(classify_commit_type("feat(x): y", ""), "feat");
        assert_eq!(classify_commit_type("bugfix: y", ""), "fix");
        assert_eq!(classify_commit_type("hotfix!: y", ""), "fix");
    }

    #[test]
    fn classifies_by_keyword_fallback() {
        assert_eq!(classify_commit_type("Implement login", ""), "feat");
        assert_eq!(classify_commit_type("Random update", ""), "other");
    }

    #[test]
    fn prefix_takes_precedence_over_keywords() {
        assert_eq!(classify_commit_type("fix: implement caching", ""), "fix");
    }

    #[test]
    fn create_chunks_includes_required_sections() {
        let c = commit("feat: add caching", "Adds an LRU cache.");
        let chunk = create_chunks(&c, "/repo", None, 10_000);
        assert!(chunk.content.starts_with("Commit: abc1234"));
        assert!(chunk.content.contains("Type: feat"));
        assert!(chunk.content.contains("Files changed (1):"));
        assert!(chunk.content.contains("Changes: +3 -1"));
    }

    #[test]
    fn truncates_oversized_content() {
        let mut c = commit("feat: add caching", "x".repeat(1000));
        c.files_changed = (0..30).map(|i| format!("file{i}.rs")).collect();
        let chunk = create_chunks(&c, "/repo", None, 200);
        assert!(chunk.content.ends_with("[content truncated due to size]"));
        assert!(chunk.content.len() <= 200 + "\n[content truncated due to size]".len());
    }

    #[test]
    fn lists_overflow_files_with_suffix() {
        let mut c = commit("chore: bulk rename", "");
        c.files_changed = (0..25).map(|i| format!("file{i}.rs")).collect();
        let chunk = create_chunks(&c, "/repo", None, 10_000);
        assert!(chunk.content.contains("... and 5 more files"));
    }
}
