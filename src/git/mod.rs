//! Git integration layer.
//!
//! Reads go through `git2`. Rebase-pull, stash and push shell out to the
//! `git` binary ([`cli`]) and have their output interpreted in one place
//! ([`classify`]). Everything is bound to one working copy through
//! [`RepositoryHandle`].

mod classify;
mod cli;
mod commit;
mod diff;
mod error;
mod git2_backend;
mod handle;
mod sync;

use serde::Serialize;

pub use cli::{GitCli, GitOutput};
pub use commit::{CommitEngine, CommitReport};
pub use diff::{DiffEntry, DiffStatus};
pub use error::{CommitError, GitCommandError, GitFailure, RepoError, SyncError};
pub use handle::{
    BranchLog, FileAtCommit, HeadInfo, History, HistoryEntry, HistoryReport, RepositoryHandle,
};
pub use sync::{GitSyncEngine, PullReport, SyncReport, SyncStage};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Branch {
    pub name: String,
}

impl Branch {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Commit {
    pub hash: String,
    pub summary: String,
    pub message: String,
}

impl Commit {
    pub(crate) fn from_git(c: &git2::Commit<'_>) -> Self {
        Self {
            hash: c.id().to_string(),
            summary: c.summary().unwrap_or_default().to_string(),
            message: String::from_utf8_lossy(c.message_bytes()).into_owned(),
        }
    }
}
