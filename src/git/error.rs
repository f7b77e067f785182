//! Error types of the git layer.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::cli::GitOutput;
use crate::place::PathError;

/// Failure of a `git` subprocess.
#[derive(Debug, Error)]
pub enum GitCommandError {
    #[error("cannot run `git {args}`: {source}")]
    Spawn {
        args: String,
        #[source]
        source: io::Error,
    },
    #[error("`git {args}` failed ({}): {}", .output.describe_status(), .output.stderr.trim())]
    Failed { args: String, output: GitOutput },
}

/// Errors raised by read-only repository accessors.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("no git working copy at {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },
    #[error("{} is a bare repository; a working copy is required", .0.display())]
    Bare(PathBuf),
    #[error("unknown revision {0:?}")]
    UnknownRevision(String),
    #[error(transparent)]
    InvalidPath(#[from] PathError),
    #[error("cannot lock {}: {source}", .path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),
}

/// Catch-all for underlying failures that no specific kind covers.
#[derive(Debug, Error)]
pub enum GitFailure {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Command(#[from] GitCommandError),
    #[error("git operation failed: {0}")]
    Lib(#[from] git2::Error),
    #[error("i/o failure in git directory: {0}")]
    Io(#[from] io::Error),
}

/// Terminal outcome of a failed pull, push or sync.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(
        "repository is in a detached HEAD state; check out a branch (e.g. `git checkout main`) and retry"
    )]
    DetachedHead,
    #[error("remote {0:?} is not configured")]
    NoRemote(String),
    #[error("a rebase or merge is in progress; resolve or abort it before syncing")]
    UnmergedFiles,
    #[error("conflicts detected during rebase; the rebase was aborted: {detail}")]
    RebaseConflict { detail: String },
    #[error("rebase succeeded, but local edits conflicted; they remain in the stash")]
    UnstashConflict,
    #[error("push rejected as non-fast-forward: {summary}")]
    NonFastForward { summary: String },
    #[error("push failed: {0}")]
    PushFailed(String),
    #[error("local commit {local} did not match remote {}", .remote.as_deref().unwrap_or("N/A"))]
    PushNotApplied {
        local: String,
        remote: Option<String>,
    },
    #[error("git error: {0}")]
    Git(#[from] GitFailure),
}

/// Refusals and failures of [`crate::git::CommitEngine::commit_all`].
#[derive(Debug, Error)]
pub enum CommitError {
    #[error(
        "repository is in a detached HEAD state; check out a branch (e.g. `git checkout main`) and retry"
    )]
    DetachedHead,
    #[error("branch {0:?} is behind the remote; pull before committing")]
    RemoteAhead(String),
    #[error("branch {0:?} has diverged from the remote; pull and resolve conflicts first")]
    Diverged(String),
    #[error(transparent)]
    InvalidPath(#[from] PathError),
    #[error("git error: {0}")]
    Git(#[from] GitFailure),
}

macro_rules! via_git_failure {
    ($target:ty: $($source:ty),+) => {
        $(impl From<$source> for $target {
            fn from(e: $source) -> Self {
                Self::Git(GitFailure::from(e))
            }
        })+
    };
}

via_git_failure!(SyncError: RepoError, GitCommandError, git2::Error, io::Error);
via_git_failure!(CommitError: RepoError, GitCommandError, git2::Error, io::Error);
