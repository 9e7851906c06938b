//! Source provenance via libgit2.
//!
//! [`GitManager`] finds the newest commit that touched a rule file so the
//! published variants can name the revision, author and date they were
//! built from.

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Local, Offset, Utc};
use git2::{Commit, Oid, Repository, Sort};
use std::fs;
use std::path::Path;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Provenance stamped into generated front matter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// First 7 hex digits of the commit id.
    pub short_hash: String,
    pub author: String,
    /// Commit time in the committer's own offset, without the offset.
    pub date: String,
}

impl CommitInfo {
    /// Placeholder used when the history cannot be read.
    pub fn unknown() -> Self {
        Self {
            short_hash: "unknown".into(),
            author: "unknown".into(),
            date: Local::now().format(DATE_FORMAT).to_string(),
        }
    }

    fn from_commit(commit: &Commit<'_>) -> Self {
        let time = commit.time();
        let offset = FixedOffset::east_opt(time.offset_minutes() * 60)
            .unwrap_or_else(|| Utc.fix());
        let date = DateTime::from_timestamp(time.seconds(), 0)
            .map(|utc| utc.with_timezone(&offset).format(DATE_FORMAT).to_string())
            .unwrap_or_else(|| "unknown".into());
        let id = commit.id().to_string();
        Self {
            short_hash: id[..7].to_string(),
            author: commit.author().name().unwrap_or("unknown").to_string(),
            date,
        }
    }
}

/// Read-only view of the repository that contains the rule sources.
pub struct GitManager {
    repo: Repository,
}

impl GitManager {
    /// Opens the repository enclosing `path`, searching parent directories.
    pub fn discover(path: &Path) -> Result<Self> {
        let repo = Repository::discover(path).context("failed to find git repository")?;
        Ok(Self { repo })
    }

    /// Newest commit reachable from HEAD whose version of `path` differs
    /// from its first parent's. `None` when the file was never committed.
    pub fn last_commit_for(&self, path: &Path) -> Result<Option<CommitInfo>> {
        let workdir = self
            .repo
            .workdir()
            .context("repository has no working tree")?;
        let root = fs::canonicalize(workdir)?;
        let abs = fs::canonicalize(path).with_context(|| format!("cannot resolve {}", path.display()))?;
        let rel = abs
            .strip_prefix(&root)
            .with_context(|| format!("{} is outside the repository", path.display()))?;

        let mut walk = self.repo.revwalk()?;
        walk.push_head()?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;

        for oid in walk {
            let commit = self.repo.find_commit(oid?)?;
            let Some(blob) = blob_at(&commit, rel) else {
                continue;
            };
            let parent_blob = match commit.parent(0) {
                Ok(parent) => blob_at(&parent, rel),
                Err(_) => None,
            };
            if parent_blob != Some(blob) {
                return Ok(Some(CommitInfo::from_commit(&commit)));
            }
        }
        Ok(None)
    }
}

fn blob_at(commit: &Commit<'_>, rel: &Path) -> Option<Oid> {
    let tree = commit.tree().ok()?;
    tree.get_path(rel).ok().map(|entry| entry.id())
}
