//! Code Indexer Orchestrator: scans a codebase, chunks it, embeds the
//! chunks, and upserts them into the vector store, tracking a Merkle
//! snapshot so subsequent runs only touch what changed.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::chunker::{self, ChunkOptions};
use crate::embeddings::EmbeddingProvider;
use crate::error::{IndexError, Result};
use crate::ids;
use crate::merkle::{self, Snapshot, SnapshotStore};
use crate::metadata;
use crate::progress::{Phase, ProgressReporter};
use crate::scanner::{self, ScannerConfig};
use crate::sparse::Bm25Index;
use crate::store::{Distance, Point, VectorStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    Completed,
    Partial,
    Failed,
}

#[derive(Debug, Clone)]
pub struct IndexStats {
    pub files_scanned: u64,
    pub files_indexed: u64,
    pub chunks_created: u64,
    pub duration_ms: u64,
    pub status: IndexStatus,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub extensions: Vec<String>,
    pub extra_ignore_globs: Vec<String>,
    pub chunk_options: ChunkOptions,
    pub max_chunks_per_file: usize,
    pub max_total_chunks: usize,
    pub batch_size: usize,
    pub force_reindex: bool,
    /// When set, the collection is created with a `bm25` sparse-vector
    /// config and every point gets a co-located BM25 sparse vector
    /// alongside its dense embedding.
    pub hybrid: bool,
    pub distance: Distance,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            extensions: Vec::new(),
            extra_ignore_globs: Vec::new(),
            chunk_options: ChunkOptions::default(),
            max_chunks_per_file: 500,
            max_total_chunks: 50_000,
            batch_size: 32,
            force_reindex: false,
            hybrid: false,
            distance: Distance::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub file_types: Vec<String>,
    pub path_pattern: Option<String>,
    pub limit: u32,
    pub score_threshold: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub content: String,
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub language: String,
    pub score: f32,
    pub file_extension: String,
}

/// Rejects a second concurrent run over the same collection rather than
/// queuing it.
#[derive(Default)]
pub struct RunRegistry {
    active: Mutex<HashSet<String>>,
}

pub struct RunGuard<'a> {
    registry: &'a RunRegistry,
    collection: String,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.registry.active.lock().unwrap().remove(&self.collection);
    }
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, collection: &str) -> std::result::Result<RunGuard<'_>, IndexError> {
        let mut active = self.active.lock().unwrap();
        if !active.insert(collection.to_string()) {
            return Err(IndexError::Store {
                collection: collection.to_string(),
                message: "an indexing run is already in progress for this collection".to_string(),
            });
        }
        Ok(RunGuard { registry: self, collection: collection.to_string() })
    }
}

pub struct Indexer<'a> {
    pub provider: &'a dyn EmbeddingProvider,
    pub store: &'a VectorStore,
    pub snapshots: &'a SnapshotStore,
}

fn is_cancelled(cancel: &watch::Receiver<bool>) -> bool {
    *cancel.borrow()
}

fn file_content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

impl<'a> Indexer<'a> {
    pub async fn index_codebase(
        &self,
        path: &Path,
        opts: &IndexOptions,
        progress: &ProgressReporter,
        cancel: &watch::Receiver<bool>,
    ) -> Result<IndexStats> {
        let started = Instant::now();
        let absolute_path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let collection = ids::collection_name("code", &absolute_path.to_string_lossy());
        let span = info_span!("index_codebase", collection = %collection);

        async {
            let mut errors = Vec::new();
            let mut status = IndexStatus::Completed;

            if opts.force_reindex || !self.store.collection_exists(&collection).await.unwrap_or(false) {
                if self.store.collection_exists(&collection).await.unwrap_or(false) {
                    self.store.delete_collection(&collection).await?;
                }
                self.store.create_collection(&collection, self.provider.dimensions(), opts.distance, opts.hybrid).await?;
            }

            let scanner_config = ScannerConfig { root: absolute_path.clone(), extensions: opts.extensions.clone(), extra_ignore_globs: opts.extra_ignore_globs.clone() };
            let files = scanner::scan(&scanner_config);
            let files_scanned = files.len() as u64;
            progress.report(Phase::Scanning, 0, files_scanned, format!("found {files_scanned} files"));

            let mut file_hashes: BTreeMap<String, String> = BTreeMap::new();
            let mut all_chunks_by_file: Vec<(String, Vec<crate::chunker::Chunk>)> = Vec::new();
            let mut total_chunks = 0usize;
            let mut files_indexed = 0u64;

            for (i, file_path) in files.iter().enumerate() {
                if is_cancelled(cancel) {
                    status = IndexStatus::Partial;
                    break;
                }
                if total_chunks >= opts.max_total_chunks {
                    status = IndexStatus::Partial;
                    break;
                }

                let rel_path = file_path.strip_prefix(&absolute_path).unwrap_or(file_path).to_string_lossy().replace('\\', "/");

                let content = match tokio::fs::read_to_string(file_path).await {
                    Ok(c) => c,
                    Err(e) => {
                        debug!(file = %rel_path, error = %e, "skipping unreadable file");
                        errors.push(format!("io error reading {rel_path}: {e}"));
                        continue;
                    }
                };

                if metadata::contains_secrets(&content) {
                    warn!(file = %rel_path, "secret detected, file skipped");
                    errors.push(format!("secret detected in {rel_path}, file skipped"));
                    continue;
                }

                file_hashes.insert(rel_path.clone(), file_content_hash(&content));

                let language = metadata::detect_language(&rel_path);
                let mut chunks = chunker::chunk_file(&content, &rel_path, language, opts.chunk_options);
                if chunks.len() > opts.max_chunks_per_file {
                    chunks.truncate(opts.max_chunks_per_file);
                    status = IndexStatus::Partial;
                }

                total_chunks += chunks.len();
                if !chunks.is_empty() {
                    files_indexed += 1;
                }
                all_chunks_by_file.push((rel_path, chunks));

                progress.report(Phase::Chunking, i as u64 + 1, files_scanned, None);
            }

            let flat_chunks: Vec<(String, crate::chunker::Chunk)> = all_chunks_by_file
                .into_iter()
                .flat_map(|(path, chunks)| chunks.into_iter().map(move |c| (path.clone(), c)))
                .collect();

            let chunks_created = flat_chunks.len() as u64;

            let mut bm25 = Bm25Index::new();
            if opts.hybrid {
                bm25.train(flat_chunks.iter().map(|(_, c)| c.content.as_str()));
            }

            let embed_batches: Vec<&[(String, crate::chunker::Chunk)]> = flat_chunks.chunks(opts.batch_size.max(1)).collect();
            let total_batches = embed_batches.len();

            for (batch_idx, batch) in embed_batches.into_iter().enumerate() {
                if is_cancelled(cancel) {
                    status = IndexStatus::Partial;
                    break;
                }

                let texts: Vec<String> = batch.iter().map(|(_, c)| c.content.clone()).collect();
                let vectors = match self.provider.embed_batch(&texts).await {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(batch = batch_idx, error = %e, "embedding batch failed");
                        errors.push(format!("embedding batch {batch_idx} failed: {e}"));
                        status = IndexStatus::Partial;
                        continue;
                    }
                };
                progress.report(Phase::Embedding, batch_idx as u64 + 1, total_batches as u64, None);

                let points: Vec<Point> = batch
                    .iter()
                    .zip(vectors.into_iter())
                    .map(|((rel_path, chunk), vector)| {
                        let id = ids::chunk_id(rel_path, &chunk.content, chunk.start_line, chunk.end_line, chunk.chunk_index);
                        let mut payload: HashMap<String, Value> = HashMap::new();
                        payload.insert("filePath".to_string(), json!(rel_path));
                        payload.insert("language".to_string(), json!(chunk.language));
                        payload.insert("startLine".to_string(), json!(chunk.start_line));
                        payload.insert("endLine".to_string(), json!(chunk.end_line));
                        payload.insert("content".to_string(), json!(chunk.content));
                        let sparse_vector = opts.hybrid.then(|| bm25.vectorize(&chunk.content));
                        Point { id, vector, sparse_vector, payload }
                    })
                    .collect();

                if let Err(e) = self.store.add_points(&collection, points).await {
                    warn!(batch = batch_idx, error = %e, "store batch failed");
                    errors.push(format!("store batch {batch_idx} failed: {e}"));
                    status = IndexStatus::Partial;
                    continue;
                }
                progress.report(Phase::Storing, batch_idx as u64 + 1, total_batches as u64, None);
            }

            if status != IndexStatus::Failed {
                let timestamp = chrono::Utc::now().timestamp_millis();
                let snapshot = Snapshot::build(absolute_path.to_string_lossy().to_string(), file_hashes, timestamp);
                if let Err(e) = self.snapshots.save(&collection, &snapshot).await {
                    errors.push(format!("snapshot save failed: {e}"));
                }
            }

            progress.report(Phase::Done, files_scanned, files_scanned, None);

            Ok(IndexStats {
                files_scanned,
                files_indexed,
                chunks_created,
                duration_ms: started.elapsed().as_millis() as u64,
                status,
                errors,
            })
        }
        .instrument(span)
        .await
    }

    pub async fn index_incrementally(
        &self,
        path: &Path,
        opts: &IndexOptions,
        progress: &ProgressReporter,
        cancel: &watch::Receiver<bool>,
    ) -> Result<IndexStats> {
        let started = Instant::now();
        let absolute_path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let collection = ids::collection_name("code", &absolute_path.to_string_lossy());

        let existing = self.snapshots.load(&collection).await;
        let old_hashes = existing.as_ref().map(|s| s.file_hashes.clone()).unwrap_or_default();

        let scanner_config = ScannerConfig { root: absolute_path.clone(), extensions: opts.extensions.clone(), extra_ignore_globs: opts.extra_ignore_globs.clone() };
        let files = scanner::scan(&scanner_config);

        let mut new_hashes: BTreeMap<String, String> = BTreeMap::new();
        let mut contents: HashMap<String, String> = HashMap::new();
        for file_path in &files {
            let rel_path = file_path.strip_prefix(&absolute_path).unwrap_or(file_path).to_string_lossy().replace('\\', "/");
            if let Ok(content) = tokio::fs::read_to_string(file_path).await {
                new_hashes.insert(rel_path.clone(), file_content_hash(&content));
                contents.insert(rel_path, content);
            }
        }

        let diff = merkle::compare(&old_hashes, &new_hashes);
        let mut errors = Vec::new();
        let mut status = IndexStatus::Completed;
        let mut chunks_created = 0u64;
        let mut files_indexed = 0u64;

        let to_remove: Vec<String> = diff.modified.iter().chain(diff.deleted.iter()).cloned().collect();
        if !to_remove.is_empty() {
            // Old chunk IDs aren't known without re-chunking the previous content,
            // so deletion is scoped by filePath via a filter match instead.
            for rel_path in &to_remove {
                let mut filter = HashMap::new();
                filter.insert("filePath".to_string(), json!(rel_path));
                if let Err(e) = self.delete_by_file(&collection, &filter).await {
                    errors.push(format!("delete for {rel_path} failed: {e}"));
                    status = IndexStatus::Partial;
                }
            }
        }

        let to_process: Vec<String> = diff.added.iter().chain(diff.modified.iter()).cloned().collect();
        let total = to_process.len() as u64;

        for (i, rel_path) in to_process.iter().enumerate() {
            if is_cancelled(cancel) {
                status = IndexStatus::Partial;
                break;
            }
            let Some(content) = contents.get(rel_path) else { continue };
            if metadata::contains_secrets(content) {
                errors.push(format!("secret detected in {rel_path}, file skipped"));
                continue;
            }

            let language = metadata::detect_language(rel_path);
            let chunks = chunker::chunk_file(content, rel_path, language, opts.chunk_options);
            if chunks.is_empty() {
                progress.report(Phase::Chunking, i as u64 + 1, total, None);
                continue;
            }
            files_indexed += 1;
            chunks_created += chunks.len() as u64;

            let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
            let mut bm25 = Bm25Index::new();
            if opts.hybrid {
                bm25.train(texts.iter().map(String::as_str));
            }
            match self.provider.embed_batch(&texts).await {
                Ok(vectors) => {
                    let points: Vec<Point> = chunks
                        .iter()
                        .zip(vectors.into_iter())
                        .map(|(chunk, vector)| {
                            let id = ids::chunk_id(rel_path, &chunk.content, chunk.start_line, chunk.end_line, chunk.chunk_index);
                            let mut payload: HashMap<String, Value> = HashMap::new();
                            payload.insert("filePath".to_string(), json!(rel_path));
                            payload.insert("language".to_string(), json!(chunk.language));
                            payload.insert("startLine".to_string(), json!(chunk.start_line));
                            payload.insert("endLine".to_string(), json!(chunk.end_line));
                            payload.insert("content".to_string(), json!(chunk.content));
                            let sparse_vector = opts.hybrid.then(|| bm25.vectorize(&chunk.content));
                            Point { id, vector, sparse_vector, payload }
                        })
                        .collect();
                    if let Err(e) = self.store.add_points(&collection, points).await {
                        errors.push(format!("store for {rel_path} failed: {e}"));
                        status = IndexStatus::Partial;
                    }
                }
                Err(e) => {
                    errors.push(format!("embedding for {rel_path} failed: {e}"));
                    status = IndexStatus::Partial;
                }
            }
            progress.report(Phase::Chunking, i as u64 + 1, total, None);
        }

        if status != IndexStatus::Failed {
            let timestamp = chrono::Utc::now().timestamp_millis();
            let snapshot = Snapshot::build(absolute_path.to_string_lossy().to_string(), new_hashes, timestamp);
            if let Err(e) = self.snapshots.save(&collection, &snapshot).await {
                errors.push(format!("snapshot save failed: {e}"));
            }
        }

        info!(added = diff.added.len(), modified = diff.modified.len(), deleted = diff.deleted.len(), "incremental index complete");

        Ok(IndexStats {
            files_scanned: files.len() as u64,
            files_indexed,
            chunks_created,
            duration_ms: started.elapsed().as_millis() as u64,
            status,
            errors,
        })
    }

    async fn delete_by_file(&self, collection: &str, filter: &HashMap<String, Value>) -> Result<()> {
        let zero_vector = vec![0.0f32; self.provider.dimensions() as usize];
        let hits = self.store.search(collection, &zero_vector, 10_000, filter).await?;
        let ids: Vec<String> = hits.into_iter().map(|h| h.id).collect();
        if ids.is_empty() {
            return Ok(());
        }
        self.store.delete_points(collection, ids).await
    }

    pub async fn search_code(&self, path: &Path, query: &str, opts: &SearchOptions) -> Result<Vec<SearchResult>> {
        let absolute_path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let collection = ids::collection_name("code", &absolute_path.to_string_lossy());

        if !self.store.collection_exists(&collection).await.unwrap_or(false) {
            return Err(IndexError::NotIndexed { collection });
        }

        let query_vector = self
            .provider
            .embed(query)
            .await
            .map_err(|e| IndexError::Store { collection: collection.clone(), message: e.to_string() })?;

        let mut filter = HashMap::new();
        if let Some(pattern) = &opts.path_pattern {
            filter.insert("filePath".to_string(), json!(pattern));
        }

        let limit = if opts.limit == 0 { 5 } else { opts.limit };
        let hits = self.store.search(&collection, &query_vector, limit, &filter).await?;

        let results = hits
            .into_iter()
            .filter(|h| opts.score_threshold.map(|t| h.score >= t).unwrap_or(true))
            .filter(|h| {
                if opts.file_types.is_empty() {
                    return true;
                }
                h.payload
                    .get("filePath")
                    .and_then(|v| v.as_str())
                    .map(|p| opts.file_types.iter().any(|ext| p.ends_with(ext)))
                    .unwrap_or(false)
            })
            .map(|h| {
                let file_path = h.payload.get("filePath").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                let extension = file_path.rsplit('.').next().unwrap_or_default().to_string();
                SearchResult {
                    content: h.payload.get("content").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                    start_line: h.payload.get("startLine").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
                    end_line: h.payload.get("endLine").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
                    language: h.payload.get("language").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                    score: h.score,
                    file_extension: extension,
                    file_path,
                }
            })
            .collect();

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedProvider;

    #[async_trait]
    impl EmbeddingProvider for FixedProvider {
        async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
        fn dimensions(&self) -> u32 {
            2
        }
        fn model_id(&self) -> &str {
            "fixed"
        }
    }

    #[test]
    fn run_registry_rejects_concurrent_same_collection() {
        let registry = RunRegistry::new();
        let _guard = registry.try_acquire("code_abc").unwrap();
        assert!(registry.try_acquire("code_abc").is_err());
        assert!(registry.try_acquire("code_def").is_ok());
    }

    #[test]
    fn run_registry_releases_on_drop() {
        let registry = RunRegistry::new();
        {
            let _guard = registry.try_acquire("code_abc").unwrap();
        }
        assert!(registry.try_acquire("code_abc").is_ok());
    }

    #[tokio::test]
    async fn fixed_provider_embeds_batch() {
        let provider = FixedProvider;
        let vectors = provider.embed_batch(&["a".to_string(), "b".to_string()]).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].len(), 2);
    }
}
