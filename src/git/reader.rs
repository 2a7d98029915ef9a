//! Commit enumeration and diff extraction via `git2`'s native bindings.

use chrono::{DateTime, Utc};
use git2::{Repository, Sort};

#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub short_hash: String,
    pub full_hash: String,
    pub author: String,
    pub author_email: String,
    pub date: DateTime<Utc>,
    pub subject: String,
    pub body: String,
    pub files_changed: Vec<String>,
    pub insertions: usize,
    pub deletions: usize,
}

pub struct GitReader {
    repo: Repository,
}

impl GitReader {
    pub fn open(path: &std::path::Path) -> anyhow::Result<Self> {
        let repo = Repository::discover(path)?;
        Ok(Self { repo })
    }

    pub fn head_commit_hash(&self) -> anyhow::Result<String> {
        let head = self.repo.head()?;
        let commit = head.peel_to_commit()?;
        Ok(commit.id().to_string())
    }

    /// Enumerate commits reachable from HEAD, newest first, optionally
    /// bounded by `since` (author date) and `max_commits`.
    pub fn commits(&self, since: Option<DateTime<Utc>>, max_commits: Option<usize>) -> anyhow::Result<Vec<CommitInfo>> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.push_head()?;
        revwalk.set_sorting(Sort::TIME)?;

        let mut commits = Vec::new();
        for oid in revwalk {
            let oid = oid?;
            let commit = self.repo.find_commit(oid)?;
            let info = self.commit_info(&commit)?;

            if let Some(since) = since {
                if info.date < since {
                    break;
                }
            }

            commits.push(info);
            if let Some(max) = max_commits {
                if commits.len() >= max {
                    break;
                }
            }
        }
        Ok(commits)
    }

    /// Enumerate commits reachable from HEAD but not from `checkpoint`, in
    /// chronological order (oldest first) so callers process history
    /// forward from the checkpoint.
    pub fn commits_since(&self, checkpoint: &str) -> anyhow::Result<Vec<CommitInfo>> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.push_head()?;
        revwalk.hide(self.repo.revparse_single(checkpoint)?.id())?;
        revwalk.set_sorting(Sort::TIME | Sort::REVERSE)?;

        let mut commits = Vec::new();
        for oid in revwalk {
            let oid = oid?;
            let commit = self.repo.find_commit(oid)?;
            commits.push(self.commit_info(&commit)?);
        }
        Ok(commits)
    }

    fn commit_info(&self, commit: &git2::Commit) -> anyhow::Result<CommitInfo> {
        let full_hash = commit.id().to_string();
        let short_hash = full_hash[..7.min(full_hash.len())].to_string();
        let author = commit.author();
        let author_name = author.name().unwrap_or("unknown").to_string();
        let author_email = author.email().unwrap_or("unknown").to_string();
        let timestamp = commit.time().seconds();
        let date = DateTime::from_timestamp(timestamp, 0).unwrap_or_else(Utc::now);

        let message = commit.message().unwrap_or("").to_string();
        let mut lines = message.splitn(2, '\n');
        let subject = lines.next().unwrap_or("").trim().to_string();
        let body = lines.next().unwrap_or("").trim().to_string();

        let (files_changed, insertions, deletions) = self.diff_stats(commit)?;

        Ok(CommitInfo { short_hash, full_hash, author: author_name, author_email, date, subject, body, files_changed, insertions, deletions })
    }

    fn diff_stats(&self, commit: &git2::Commit) -> anyhow::Result<(Vec<String>, usize, usize)> {
        let tree = commit.tree()?;
        let parent_tree = commit.parents().next().map(|p| p.tree()).transpose()?;
        let diff = self.repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;

        let mut files = Vec::new();
        diff.foreach(
            &mut |delta, _progress| {
                if let Some(path) = delta.new_file().path().or_else(|| delta.old_file().path()) {
                    files.push(path.to_string_lossy().to_string());
                }
                true
            },
            None,
            None,
            None,
        )?;

        let stats = diff.stats()?;
        Ok((files, stats.insertions(), stats.deletions()))
    }
}
