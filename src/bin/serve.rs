//! Minimal line-delimited JSON-RPC front end over the tool-protocol surface
//! named in the interface contract. One JSON object per stdin line; one
//! JSON object per stdout line. Thin by design — orchestration lives in
//! `codeindex::indexer` and `codeindex::git::orchestrator`.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use codeindex::config::EmbeddingSettings;
use codeindex::embeddings::create_provider;
use codeindex::git::orchestrator::{GitIndexOptions, GitIndexer};
use codeindex::indexer::{IndexOptions, Indexer, SearchOptions};
use codeindex::merkle::{GitSnapshotStore, SnapshotStore};
use codeindex::progress::ProgressReporter;
use codeindex::store::VectorStore;
use serde_json::{json, Value};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let settings = EmbeddingSettings::from_env()?;
    let provider = create_provider(&settings);

    let store_url = std::env::var("VECTOR_STORE_URL").unwrap_or_else(|_| "http://localhost:6333".to_string());
    let store_api_key = std::env::var("VECTOR_STORE_API_KEY").ok();
    let store = VectorStore::new(store_url, store_api_key);

    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    let snapshots = SnapshotStore::new(PathBuf::from(&home).join(".qdrant-mcp/snapshots"));
    let git_snapshots = GitSnapshotStore::new(PathBuf::from(&home).join(".qdrant-mcp/git-snapshots"));

    let indexer = Indexer { provider: provider.as_ref(), store: &store, snapshots: &snapshots };
    let git_indexer = GitIndexer { provider: provider.as_ref(), store: &store, snapshots: &git_snapshots };

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let progress = ProgressReporter::noop();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let request: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                writeln!(stdout, "{}", json!({ "error": format!("invalid request: {e}") }))?;
                continue;
            }
        };

        let response = dispatch(&request, &indexer, &git_indexer, &progress, &cancel_rx).await;
        writeln!(stdout, "{}", response)?;
        stdout.flush()?;
    }

    Ok(())
}

async fn dispatch(
    request: &Value,
    indexer: &Indexer<'_>,
    git_indexer: &GitIndexer<'_>,
    progress: &ProgressReporter,
    cancel: &watch::Receiver<bool>,
) -> Value {
    let op = request["op"].as_str().unwrap_or_default();
    let path = PathBuf::from(request["path"].as_str().unwrap_or("."));

    let result = match op {
        "index_codebase" => indexer
            .index_codebase(&path, &IndexOptions::default(), progress, cancel)
            .await
            .map(|stats| json!({ "filesScanned": stats.files_scanned, "filesIndexed": stats.files_indexed, "chunksCreated": stats.chunks_created, "status": format!("{:?}", stats.status), "errors": stats.errors })),
        "search_code" => {
            let query = request["query"].as_str().unwrap_or_default();
            indexer
                .search_code(&path, query, &SearchOptions::default())
                .await
                .map(|results| json!(results.iter().map(|r| json!({ "content": r.content, "filePath": r.file_path, "startLine": r.start_line, "endLine": r.end_line, "score": r.score })).collect::<Vec<_>>()))
        }
        "index_git_history" => git_indexer
            .index_history(&path, &GitIndexOptions::default())
            .await
            .map(|stats| json!({ "newCommits": stats.new_commits, "errors": stats.errors })),
        "index_new_commits" => git_indexer
            .index_new_commits(&path)
            .await
            .map(|stats| json!({ "newCommits": stats.new_commits, "errors": stats.errors })),
        other => return json!({ "error": format!("unknown operation '{other}'") }),
    };

    match result {
        Ok(value) => json!({ "ok": true, "result": value }),
        Err(e) => json!({ "ok": false, "error": e.to_string() }),
    }
}
