//! Git Indexer Orchestrator: mirrors the code indexer (§4.H) but over commit
//! history instead of file content.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{info, info_span, Instrument};

use super::commit::{classify_commit_type, create_chunks};
use super::reader::GitReader;
use crate::embeddings::EmbeddingProvider;
use crate::error::Result;
use crate::ids;
use crate::merkle::{GitSnapshot, GitSnapshotStore};
use crate::store::{Distance, Point, VectorStore};

const DEFAULT_MAX_CHUNK_SIZE: usize = 4000;

#[derive(Debug, Clone, Default)]
pub struct GitIndexOptions {
    pub since_date: Option<DateTime<Utc>>,
    pub max_commits: Option<usize>,
    pub include_diff: bool,
    pub max_chunk_size: usize,
}

impl GitIndexOptions {
    fn effective_max_chunk_size(&self) -> usize {
        if self.max_chunk_size == 0 {
            DEFAULT_MAX_CHUNK_SIZE
        } else {
            self.max_chunk_size
        }
    }
}

#[derive(Debug, Clone)]
pub struct GitIndexStats {
    pub new_commits: u64,
    pub duration_ms: u64,
    pub errors: Vec<String>,
}

pub struct GitIndexer<'a> {
    pub provider: &'a dyn EmbeddingProvider,
    pub store: &'a VectorStore,
    pub snapshots: &'a GitSnapshotStore,
}

impl<'a> GitIndexer<'a> {
    pub async fn index_history(&self, path: &Path, opts: &GitIndexOptions) -> Result<GitIndexStats> {
        let started = Instant::now();
        let absolute_path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let repo_path = absolute_path.to_string_lossy().to_string();
        let collection = ids::collection_name("git", &repo_path);
        let span = info_span!("index_history", collection = %collection);

        async {
            let reader = GitReader::open(&absolute_path).map_err(|e| crate::error::IndexError::Store {
                collection: collection.clone(),
                message: e.to_string(),
            })?;

            if !self.store.collection_exists(&collection).await.unwrap_or(false) {
                self.store.create_collection(&collection, self.provider.dimensions(), Distance::default(), false).await?;
            }

            let commits = reader
                .commits(opts.since_date, opts.max_commits)
                .map_err(|e| crate::error::IndexError::Store { collection: collection.clone(), message: e.to_string() })?;

            let mut errors = Vec::new();
            let mut new_commits = 0u64;

            for commit in &commits {
                let chunk = create_chunks(commit, &repo_path, None, opts.effective_max_chunk_size());
                match self.provider.embed(&chunk.content).await {
                    Ok(vector) => {
                        let mut payload: HashMap<String, Value> = HashMap::new();
                        payload.insert("shortHash".to_string(), json!(commit.short_hash));
                        payload.insert("fullHash".to_string(), json!(commit.full_hash));
                        payload.insert("author".to_string(), json!(commit.author));
                        payload.insert("authorEmail".to_string(), json!(commit.author_email));
                        payload.insert("date".to_string(), json!(commit.date.to_rfc3339()));
                        payload.insert("subject".to_string(), json!(commit.subject));
                        payload.insert("commitType".to_string(), json!(classify_commit_type(&commit.subject, &commit.body)));
                        payload.insert("content".to_string(), json!(chunk.content));

                        let id = chunk.symbol_name.clone().unwrap_or_else(|| ids::gitcommit_id(&repo_path, &commit.full_hash));
                        let point = Point { id, vector, sparse_vector: None, payload };
                        if let Err(e) = self.store.add_points(&collection, vec![point]).await {
                            errors.push(format!("store failed for {}: {e}", commit.short_hash));
                            continue;
                        }
                        new_commits += 1;
                    }
                    Err(e) => errors.push(format!("embedding failed for {}: {e}", commit.short_hash)),
                }
            }

            if let Some(latest) = commits.first() {
                let snapshot = GitSnapshot {
                    repo_path: repo_path.clone(),
                    last_commit: latest.full_hash.clone(),
                    last_indexed_at: chrono::Utc::now().timestamp_millis(),
                    commit_count: new_commits,
                };
                self.snapshots.save(&collection, &snapshot).await.map_err(|e| crate::error::IndexError::Store {
                    collection: collection.clone(),
                    message: e.to_string(),
                })?;
            }

            info!(new_commits, "git history index complete");

            Ok(GitIndexStats { new_commits, duration_ms: started.elapsed().as_millis() as u64, errors })
        }
        .instrument(span)
        .await
    }

    /// Index only commits reachable from HEAD but not from the last
    /// checkpointed hash. A no-op (`new_commits = 0`) when there is nothing
    /// new, including when no prior snapshot exists (first call seeds HEAD
    /// without a backfill — use `index_history` for the initial load).
    pub async fn index_new_commits(&self, path: &Path) -> Result<GitIndexStats> {
        let started = Instant::now();
        let absolute_path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let repo_path = absolute_path.to_string_lossy().to_string();
        let collection = ids::collection_name("git", &repo_path);

        let reader = GitReader::open(&absolute_path)
            .map_err(|e| crate::error::IndexError::Store { collection: collection.clone(), message: e.to_string() })?;

        let existing = self.snapshots.load(&collection, &repo_path).await;
        let Some(existing) = existing else {
            let head = reader
                .head_commit_hash()
                .map_err(|e| crate::error::IndexError::Store { collection: collection.clone(), message: e.to_string() })?;
            let snapshot = GitSnapshot { repo_path: repo_path.clone(), last_commit: head, last_indexed_at: chrono::Utc::now().timestamp_millis(), commit_count: 0 };
            self.snapshots
                .save(&collection, &snapshot)
                .await
                .map_err(|e| crate::error::IndexError::Store { collection: collection.clone(), message: e.to_string() })?;
            return Ok(GitIndexStats { new_commits: 0, duration_ms: started.elapsed().as_millis() as u64, errors: Vec::new() });
        };

        let new_commits = reader
            .commits_since(&existing.last_commit)
            .map_err(|e| crate::error::IndexError::Store { collection: collection.clone(), message: e.to_string() })?;

        if new_commits.is_empty() {
            return Ok(GitIndexStats { new_commits: 0, duration_ms: started.elapsed().as_millis() as u64, errors: Vec::new() });
        }

        let mut errors = Vec::new();
        let mut indexed = 0u64;

        for commit in &new_commits {
            let chunk = create_chunks(commit, &repo_path, None, DEFAULT_MAX_CHUNK_SIZE);
            match self.provider.embed(&chunk.content).await {
                Ok(vector) => {
                    let mut payload: HashMap<String, Value> = HashMap::new();
                    payload.insert("shortHash".to_string(), json!(commit.short_hash));
                    payload.insert("fullHash".to_string(), json!(commit.full_hash));
                    payload.insert("author".to_string(), json!(commit.author));
                    payload.insert("authorEmail".to_string(), json!(commit.author_email));
                    payload.insert("date".to_string(), json!(commit.date.to_rfc3339()));
                    payload.insert("subject".to_string(), json!(commit.subject));
                    payload.insert("commitType".to_string(), json!(classify_commit_type(&commit.subject, &commit.body)));
                    payload.insert("content".to_string(), json!(chunk.content));
                    let id = chunk.symbol_name.clone().unwrap_or_else(|| ids::gitcommit_id(&repo_path, &commit.full_hash));
                    let point = Point { id, vector, sparse_vector: None, payload };
                    if let Err(e) = self.store.add_points(&collection, vec![point]).await {
                        errors.push(format!("store failed for {}: {e}", commit.short_hash));
                        continue;
                    }
                    indexed += 1;
                }
                Err(e) => errors.push(format!("embedding failed for {}: {e}", commit.short_hash)),
            }
        }

        let snapshot = GitSnapshot {
            repo_path: repo_path.clone(),
            last_commit: new_commits.last().unwrap().full_hash.clone(),
            last_indexed_at: chrono::Utc::now().timestamp_millis(),
            commit_count: existing.commit_count + indexed,
        };
        self.snapshots
            .save(&collection, &snapshot)
            .await
            .map_err(|e| crate::error::IndexError::Store { collection: collection.clone(), message: e.to_string() })?;

        Ok(GitIndexStats { new_commits: indexed, duration_ms: started.elapsed().as_millis() as u64, errors })
    }
}
