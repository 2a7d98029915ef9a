//! Deterministic ID derivation and reshaping into the vector store's ID format.

use sha2::{Digest, Sha256};

/// Derive the 16-hex-character chunk ID, prefixed `chunk_`.
///
/// The canonical key is `(normalized absolute file path, content, startLine,
/// endLine, chunkIndex)`; any field change changes the ID.
pub fn chunk_id(file_path: &str, content: &str, start_line: u32, end_line: u32, chunk_index: u32) -> String {
    format!("chunk_{}", canonical_hash(file_path, content, start_line, end_line, chunk_index))
}

/// Derive the 16-hex-character commit-chunk ID, prefixed `gitcommit_`.
pub fn gitcommit_id(repo_path: &str, full_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(repo_path.as_bytes());
    hasher.update(b":");
    hasher.update(full_hash.as_bytes());
    let digest = hasher.finalize();
    format!("gitcommit_{}", &hex::encode(digest)[..16])
}

fn canonical_hash(file_path: &str, content: &str, start_line: u32, end_line: u32, chunk_index: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file_path.as_bytes());
    hasher.update(b":");
    hasher.update(content.as_bytes());
    hasher.update(b":");
    hasher.update(start_line.to_le_bytes());
    hasher.update(end_line.to_le_bytes());
    hasher.update(chunk_index.to_le_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)[..16].to_string()
}

/// Compute the `code_`/`git_` collection name: prefix || first-8-hex of sha256(absolute path).
pub fn collection_name(prefix: &str, absolute_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(absolute_path.as_bytes());
    let digest = hasher.finalize();
    format!("{prefix}_{}", &hex::encode(digest)[..8])
}

/// Reshape a logical string ID into the vector store's required point-ID
/// format: either a bare non-negative integer, or a lowercase UUID string
/// (8-4-4-4-12 hex). IDs already in one of those shapes pass through
/// unchanged; anything else is rehashed deterministically into the UUID
/// shape so the same logical ID always reshapes to the same point ID.
pub fn reshape_point_id(logical_id: &str) -> String {
    if logical_id.chars().all(|c| c.is_ascii_digit()) && !logical_id.is_empty() {
        return logical_id.to_string();
    }
    if uuid::Uuid::parse_str(logical_id).is_ok() {
        return logical_id.to_lowercase();
    }

    let mut hasher = Sha256::new();
    hasher.update(logical_id.as_bytes());
    let digest = hasher.finalize();
    let bytes: [u8; 16] = digest[..16].try_into().expect("sha256 digest has at least 16 bytes");
    uuid::Uuid::from_bytes(bytes).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_is_deterministic() {
        let a = chunk_id("/repo/a.py", "def f(): pass", 1, 1, 0);
        let b = chunk_id("/repo/a.py", "def f(): pass", 1, 1, 0);
        assert_eq!(a, b);
        assert!(a.starts_with("chunk_"));
        assert_eq!(a.len(), "chunk_".len() + 16);
    }

    #[test]
    fn chunk_id_changes_with_any_field() {
        let base = chunk_id("/repo/a.py", "def f(): pass", 1, 1, 0);
        assert_ne!(base, chunk_id("/repo/b.py", "def f(): pass", 1, 1, 0));
        assert_ne!(base, chunk_id("/repo/a.py", "def g(): pass", 1, 1, 0));
        assert_ne!(base, chunk_id("/repo/a.py", "def f(): pass", 2, 2, 0));
        assert_ne!(base, chunk_id("/repo/a.py", "def f(): pass", 1, 1, 1));
    }

    #[test]
    fn reshape_numeric_passes_through() {
        assert_eq!(reshape_point_id("12345"), "12345");
    }

    #[test]
    fn reshape_uuid_passes_through_lowercased() {
        let uuid = "550E8400-E29B-41D4-A716-446655440000";
        assert_eq!(reshape_point_id(uuid), uuid.to_lowercase());
    }

    #[test]
    fn reshape_arbitrary_is_stable_uuid_shape() {
        let a = reshape_point_id("chunk_deadbeefcafebabe");
        let b = reshape_point_id("chunk_deadbeefcafebabe");
        assert_eq!(a, b);
        assert!(uuid::Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn collection_name_has_expected_shape() {
        let name = collection_name("code", "/home/user/project");
        assert!(name.starts_with("code_"));
        assert_eq!(name.len(), "code_".len() + 8);
    }
}
