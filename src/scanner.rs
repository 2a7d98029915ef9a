//! Walks a directory, filtering by extension and ignore patterns.

use std::path::{Path, PathBuf};

use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use tracing::warn;

/// Configuration for a single scan.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub root: PathBuf,
    pub extensions: Vec<String>,
    /// Extra user-supplied ignore globs, on top of .gitignore/.git/global ignores.
    pub extra_ignore_globs: Vec<String>,
}

impl ScannerConfig {
    pub fn new(root: impl Into<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            root: root.into(),
            extensions,
            extra_ignore_globs: Vec::new(),
        }
    }
}

/// Walk `config.root` depth-first, never following symlinks, excluding any
/// path matched by an ignore glob before it is ever read. Errors descending
/// into a subdirectory are logged and skipped; they do not fail the scan.
/// Returns a deduplicated, lexicographically sorted list of absolute paths.
pub fn scan(config: &ScannerConfig) -> Vec<PathBuf> {
    let root = &config.root;

    let mut overrides = OverrideBuilder::new(root);
    for glob in &config.extra_ignore_globs {
        // OverrideBuilder treats a leading `!` as "do include"; our ignore
        // globs are plain excludes, so negate them into override syntax.
        let pattern = format!("!{glob}");
        if let Err(e) = overrides.add(&pattern) {
            warn!(glob = %glob, error = %e, "invalid ignore glob, skipping");
        }
    }
    let overrides = overrides.build().unwrap_or_else(|_| OverrideBuilder::new(root).build().unwrap());

    let walker = WalkBuilder::new(root)
        .follow_links(false)
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .overrides(overrides)
        .build();

    let mut paths: Vec<PathBuf> = Vec::new();

    for entry in walker {
        match entry {
            Ok(entry) => {
                let is_file = entry.file_type().map(|ft| ft.is_file()).unwrap_or(false);
                if !is_file {
                    continue;
                }
                let path = entry.path();
                if has_allowed_extension(path, &config.extensions) {
                    paths.push(path.to_path_buf());
                }
            }
            Err(e) => {
                warn!(error = %e, "skipping unreadable path during scan");
            }
        }
    }

    paths.sort();
    paths.dedup();
    paths
}

fn has_allowed_extension(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn scans_only_allowed_extensions_sorted_and_deduped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.py"), "pass").unwrap();
        fs::write(dir.path().join("a.py"), "pass").unwrap();
        fs::write(dir.path().join("notes.txt"), "hi").unwrap();

        let config = ScannerConfig::new(dir.path(), vec!["py".to_string()]);
        let found = scan(&config);

        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("a.py"));
        assert!(found[1].ends_with("b.py"));
    }

    #[test]
    fn empty_directory_yields_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScannerConfig::new(dir.path(), vec!["py".to_string()]);
        assert!(scan(&config).is_empty());
    }

    #[test]
    fn respects_gitignore() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".gitignore"), "ignored.py\n").unwrap();
        fs::write(dir.path().join("ignored.py"), "pass").unwrap();
        fs::write(dir.path().join("kept.py"), "pass").unwrap();

        let config = ScannerConfig::new(dir.path(), vec!["py".to_string()]);
        let found = scan(&config);
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("kept.py"));
    }
}
