//! Merkle tree over per-file content hashes, and the atomically-persisted
//! snapshot that pairs it with the raw file-hash map for incremental sync.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One node of the tree: a 32-byte content-addressed hash plus optional
/// children. Leaves have no children.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MerkleNode {
    #[serde(with = "hex_bytes32")]
    pub hash: [u8; 32],
    pub left: Option<Box<MerkleNode>>,
    pub right: Option<Box<MerkleNode>>,
}

impl MerkleNode {
    fn leaf(path: &str, content_hash: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(path.as_bytes());
        hasher.update(b":");
        hasher.update(content_hash.as_bytes());
        Self {
            hash: hasher.finalize().into(),
            left: None,
            right: None,
        }
    }

    fn parent(left: MerkleNode, right: MerkleNode) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(left.hash);
        hasher.update(right.hash);
        let hash = hasher.finalize().into();
        Self {
            hash,
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
        }
    }
}

mod hex_bytes32 {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        hex::encode(bytes).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32-byte hex hash"))
    }
}

/// An ordered binary tree built over file-hashes sorted by path. Identical
/// `{path -> content-hash}` maps always produce identical root hashes,
/// regardless of the order entries were inserted in the caller's map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MerkleTree {
    pub root: Option<MerkleNode>,
}

impl MerkleTree {
    /// Build a tree from a `{relative path -> content-hash}` map. Paths are
    /// sorted ascending before leaves are created, so insertion order of the
    /// input map never affects the root hash.
    pub fn build(file_hashes: &BTreeMap<String, String>) -> Self {
        if file_hashes.is_empty() {
            return Self { root: None };
        }

        let mut level: Vec<MerkleNode> = file_hashes
            .iter()
            .map(|(path, hash)| MerkleNode::leaf(path, hash))
            .collect();

        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            let mut iter = level.into_iter();
            while let Some(left) = iter.next() {
                match iter.next() {
                    Some(right) => next.push(MerkleNode::parent(left, right)),
                    // A lone trailing node at this level is promoted unchanged.
                    None => next.push(left),
                }
            }
            level = next;
        }

        Self {
            root: level.into_iter().next(),
        }
    }

    pub fn root_hash(&self) -> Option<[u8; 32]> {
        self.root.as_ref().map(|n| n.hash)
    }

    pub fn root_hash_hex(&self) -> Option<String> {
        self.root_hash().map(|h| hex::encode(h))
    }

    pub fn serialize_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn deserialize_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

/// Result of comparing two file-hash maps: three disjoint sets. Unchanged
/// keys are never reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompareResult {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

/// Compare an old and a new `{path -> content-hash}` map.
pub fn compare(old: &BTreeMap<String, String>, new: &BTreeMap<String, String>) -> CompareResult {
    let mut added = Vec::new();
    let mut modified = Vec::new();
    let mut deleted = Vec::new();

    for (path, new_hash) in new {
        match old.get(path) {
            None => added.push(path.clone()),
            Some(old_hash) if old_hash != new_hash => modified.push(path.clone()),
            Some(_) => {}
        }
    }
    for path in old.keys() {
        if !new.contains_key(path) {
            deleted.push(path.clone());
        }
    }

    added.sort();
    modified.sort();
    deleted.sort();
    CompareResult { added, modified, deleted }
}

/// Persisted state for incremental sync of a codebase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "codebasePath")]
    pub codebase_path: String,
    pub timestamp: i64,
    #[serde(rename = "fileHashes")]
    pub file_hashes: BTreeMap<String, String>,
    #[serde(rename = "merkleTree")]
    pub merkle_tree: MerkleTree,
}

impl Snapshot {
    pub fn build(codebase_path: impl Into<String>, file_hashes: BTreeMap<String, String>, timestamp: i64) -> Self {
        let merkle_tree = MerkleTree::build(&file_hashes);
        Self {
            codebase_path: codebase_path.into(),
            timestamp,
            file_hashes,
            merkle_tree,
        }
    }
}

/// Persisted state for incremental sync of a git commit index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSnapshot {
    #[serde(rename = "repoPath")]
    pub repo_path: String,
    #[serde(rename = "lastCommit")]
    pub last_commit: String,
    #[serde(rename = "lastIndexedAt")]
    pub last_indexed_at: i64,
    #[serde(rename = "commitCount")]
    pub commit_count: u64,
}

/// Loads and atomically saves JSON snapshots under a base directory, one file
/// per collection name.
pub struct SnapshotStore {
    base_dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    fn path_for(&self, collection: &str) -> PathBuf {
        self.base_dir.join(format!("{collection}.json"))
    }

    pub async fn save(&self, collection: &str, snapshot: &Snapshot) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        let body = serde_json::to_vec_pretty(snapshot).expect("Snapshot serialization cannot fail");
        write_atomic(&self.path_for(collection), &body).await
    }

    /// Returns `None` if the file is missing or fails to parse.
    pub async fn load(&self, collection: &str) -> Option<Snapshot> {
        let bytes = tokio::fs::read(self.path_for(collection)).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Loads the snapshot and verifies the tree deserializes and either has a
    /// root hash or the file-hash map is empty.
    pub async fn validate(&self, collection: &str) -> bool {
        match self.load(collection).await {
            None => false,
            Some(snapshot) => snapshot.merkle_tree.root.is_some() || snapshot.file_hashes.is_empty(),
        }
    }

    pub async fn delete(&self, collection: &str) -> std::io::Result<()> {
        match tokio::fs::remove_file(self.path_for(collection)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Same atomic-write contract as `SnapshotStore`, for the separate
/// git-snapshot namespace.
pub struct GitSnapshotStore {
    base_dir: PathBuf,
}

impl GitSnapshotStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    fn path_for(&self, collection: &str) -> PathBuf {
        self.base_dir.join(format!("{collection}.json"))
    }

    pub async fn save(&self, collection: &str, snapshot: &GitSnapshot) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        let body = serde_json::to_vec_pretty(snapshot).expect("GitSnapshot serialization cannot fail");
        write_atomic(&self.path_for(collection), &body).await
    }

    /// Returns `None` if the file is missing, unparseable, or the stored repo
    /// path disagrees with `expected_repo_path`.
    pub async fn load(&self, collection: &str, expected_repo_path: &str) -> Option<GitSnapshot> {
        let bytes = tokio::fs::read(self.path_for(collection)).await.ok()?;
        let snapshot: GitSnapshot = serde_json::from_slice(&bytes).ok()?;
        if snapshot.repo_path != expected_repo_path {
            return None;
        }
        Some(snapshot)
    }
}

/// Write `body` to `<path>.tmp` then rename into place, so a crash mid-write
/// never corrupts the previous snapshot.
async fn write_atomic(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, body).await?;
    tokio::fs::rename(&tmp_path, path).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn empty_tree_has_no_root() {
        let tree = MerkleTree::build(&BTreeMap::new());
        assert!(tree.root.is_none());
    }

    #[test]
    fn order_independence() {
        let a = map(&[("a.py", "h1"), ("b.py", "h2"), ("c.py", "h3")]);
        let b = map(&[("c.py", "h3"), ("a.py", "h1"), ("b.py", "h2")]);
        assert_eq!(MerkleTree::build(&a).root_hash(), MerkleTree::build(&b).root_hash());
    }

    #[test]
    fn single_file_change_changes_root() {
        let a = map(&[("a.py", "h1"), ("b.py", "h2")]);
        let b = map(&[("a.py", "h1"), ("b.py", "h2-changed")]);
        assert_ne!(MerkleTree::build(&a).root_hash(), MerkleTree::build(&b).root_hash());
    }

    #[test]
    fn odd_node_promoted_unchanged() {
        let single = map(&[("a.py", "h1")]);
        let tree = MerkleTree::build(&single);
        let leaf_hash = MerkleNode::leaf("a.py", "h1").hash;
        assert_eq!(tree.root_hash(), Some(leaf_hash));
    }

    #[test]
    fn serialize_roundtrip_preserves_root() {
        let data = map(&[("a.py", "h1"), ("b.py", "h2"), ("c.py", "h3")]);
        let tree = MerkleTree::build(&data);
        let json = tree.serialize_json().unwrap();
        let restored = MerkleTree::deserialize_json(&json).unwrap();
        assert_eq!(tree.root_hash(), restored.root_hash());
        assert_eq!(tree, restored);
    }

    #[test]
    fn compare_is_complete_and_disjoint() {
        let old = map(&[("a.py", "h1"), ("b.py", "h2"), ("d.py", "h4")]);
        let new = map(&[("a.py", "h1"), ("b.py", "h2-changed"), ("c.py", "h3")]);
        let result = compare(&old, &new);
        assert_eq!(result.added, vec!["c.py".to_string()]);
        assert_eq!(result.modified, vec!["b.py".to_string()]);
        assert_eq!(result.deleted, vec!["d.py".to_string()]);

        let mut all: Vec<String> = old.keys().chain(new.keys()).cloned().collect();
        all.sort();
        all.dedup();
        let mut reported: Vec<String> = result
            .added
            .iter()
            .chain(result.modified.iter())
            .chain(result.deleted.iter())
            .chain(std::iter::once(&"a.py".to_string()))
            .cloned()
            .collect();
        reported.sort();
        reported.dedup();
        assert_eq!(all, reported);
    }

    #[tokio::test]
    async fn snapshot_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let snapshot = Snapshot::build("/repo", map(&[("a.py", "h1")]), 1000);

        store.save("code_abcdef12", &snapshot).await.unwrap();
        let loaded = store.load("code_abcdef12").await.unwrap();
        assert_eq!(loaded.file_hashes, snapshot.file_hashes);
        assert_eq!(loaded.merkle_tree.root_hash(), snapshot.merkle_tree.root_hash());
        assert!(store.validate("code_abcdef12").await);
    }

    #[tokio::test]
    async fn snapshot_store_missing_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        assert!(store.load("nope").await.is_none());
        assert!(!store.validate("nope").await);
    }
}
