use std::fs;
use std::io;

use git2::Repository;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::classify::{
    PullOutcome, PushVerdict, StashPopOutcome, classify_pull, classify_push, classify_stash_pop,
};
use super::error::{GitCommandError, GitFailure, SyncError};
use super::git2_backend::{self, short};
use super::handle::RepositoryHandle;
use super::Commit;

const AUTOSTASH_MESSAGE: &str = "docsync-autostash-before-sync";

/// Steps of the sync pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Preflight,
    RefCleanup,
    Fetch,
    Stash,
    RebasePull,
    RestoreStash,
    Push,
    Verify,
}

impl SyncStage {
    pub fn describe(self) -> &'static str {
        match self {
            Self::Preflight => "checking branch and remote",
            Self::RefCleanup => "cleaning stale refs",
            Self::Fetch => "fetching",
            Self::Stash => "stashing local edits",
            Self::RebasePull => "rebasing onto remote",
            Self::RestoreStash => "restoring local edits",
            Self::Push => "pushing",
            Self::Verify => "verifying remote",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub active_branch: String,
    pub commit: Option<String>,
    pub summary: Option<String>,
    pub push_result: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullReport {
    pub active_branch: String,
    pub commit: Option<String>,
}

/// Reconciles the working copy with its remote.
///
/// Every operation holds the handle's write lock for its whole duration
/// and either completes or leaves no rebase in progress behind.
pub struct GitSyncEngine<'a> {
    handle: &'a RepositoryHandle,
}

impl<'a> GitSyncEngine<'a> {
    pub fn new(handle: &'a RepositoryHandle) -> Self {
        Self { handle }
    }

    /// Fetch, rebase local work onto the remote branch, push, and confirm
    /// the remote now points at the local tip.
    pub fn sync(&self) -> Result<SyncReport, SyncError> {
        self.sync_with(&mut |_| {})
    }

    /// [`GitSyncEngine::sync`], reporting each stage to `observe` before it
    /// runs.
    pub fn sync_with(&self, observe: &mut dyn FnMut(SyncStage)) -> Result<SyncReport, SyncError> {
        let _w = self.handle.write_guard()?;
        let repo = self.handle.repo()?;

        observe(SyncStage::Preflight);
        let branch = self.preflight(&repo)?;
        info!(branch = %branch, remote = %self.handle.remote(), "sync started");

        observe(SyncStage::RefCleanup);
        self.clean_refs(&repo)?;

        observe(SyncStage::Fetch);
        git2_backend::fetch(&repo, self.handle.remote())?;

        observe(SyncStage::Stash);
        let stashed = self.stash_if_dirty(&repo)?;

        observe(SyncStage::RebasePull);
        self.rebase_pull(&branch, stashed)?;

        if stashed {
            observe(SyncStage::RestoreStash);
            self.restore_stash()?;
        }

        observe(SyncStage::Push);
        let push_result = self.push_branch(&branch)?;

        observe(SyncStage::Verify);
        self.verify(&branch)?;

        let head = self.current_head()?;
        info!(branch = %branch, commit = ?head.as_ref().map(|c| &c.hash), "sync finished");
        Ok(SyncReport {
            active_branch: branch,
            commit: head.as_ref().map(|c| c.hash.clone()),
            summary: head.map(|c| c.summary),
            push_result,
        })
    }

    /// Fetch and rebase-pull without pushing. Uncommitted edits ride along
    /// through git's own autostash.
    pub fn pull(&self) -> Result<PullReport, SyncError> {
        let _w = self.handle.write_guard()?;
        let repo = self.handle.repo()?;
        let branch = self.preflight(&repo)?;
        self.clean_refs(&repo)?;
        git2_backend::fetch(&repo, self.handle.remote())?;
        self.rebase_pull(&branch, false)?;
        Ok(PullReport {
            active_branch: branch,
            commit: self.current_head()?.map(|c| c.hash),
        })
    }

    /// Push the active branch as is, without rebasing or verification.
    pub fn push(&self) -> Result<SyncReport, SyncError> {
        let _w = self.handle.write_guard()?;
        let repo = self.handle.repo()?;
        let branch = self.preflight(&repo)?;
        let push_result = self.push_branch(&branch)?;
        let head = self.current_head()?;
        Ok(SyncReport {
            active_branch: branch,
            commit: head.as_ref().map(|c| c.hash.clone()),
            summary: head.map(|c| c.summary),
            push_result,
        })
    }

    fn preflight(&self, repo: &Repository) -> Result<String, SyncError> {
        let Some(branch) = git2_backend::active_branch(repo)? else {
            return Err(SyncError::DetachedHead);
        };
        if repo.find_remote(self.handle.remote()).is_err() {
            return Err(SyncError::NoRemote(self.handle.remote().to_string()));
        }
        Ok(branch.name)
    }

    fn clean_refs(&self, repo: &Repository) -> Result<(), SyncError> {
        if git2_backend::operation_in_progress(repo)? {
            return Err(SyncError::UnmergedFiles);
        }
        let removed = git2_backend::remove_stale_markers(repo)?;
        if !removed.is_empty() {
            warn!(markers = ?removed, "removed stale markers");
        }
        Ok(())
    }

    fn stash_if_dirty(&self, repo: &Repository) -> Result<bool, SyncError> {
        if !git2_backend::is_dirty(repo)? {
            return Ok(false);
        }
        let before = git2_backend::stash_tip(repo);
        self.handle
            .cli()
            .run_checked(&["stash", "push", "-u", "-m", AUTOSTASH_MESSAGE])?;
        let after = git2_backend::stash_tip(&self.handle.repo()?);
        let created = after.is_some() && after != before;
        debug!(created, "stashed local edits");
        Ok(created)
    }

    fn rebase_pull(&self, branch: &str, stashed: bool) -> Result<(), SyncError> {
        let remote = self.handle.remote();
        let repo = self.handle.repo()?;
        if git2_backend::remote_tip(&repo, remote, branch).is_none() {
            debug!(branch, remote, "remote has no such branch yet; nothing to pull");
            return Ok(());
        }

        let args = ["pull", "--rebase", "--autostash", remote, branch];
        let cli = self.handle.cli();
        let mut retried = false;
        loop {
            let out = cli.run(&args)?;
            match classify_pull(&out) {
                PullOutcome::Applied => {
                    debug!(branch, "rebase-pull applied");
                    return Ok(());
                }
                PullOutcome::LockContention if !retried => {
                    warn!("ORIG_HEAD is locked; removing the marker and retrying once");
                    git2_backend::remove_marker(&repo, "ORIG_HEAD.lock")?;
                    git2_backend::remove_marker(&repo, "ORIG_HEAD")?;
                    retried = true;
                }
                PullOutcome::Conflict(detail) => {
                    warn!(%detail, "rebase stopped on conflicts; aborting");
                    self.abort_rebase()?;
                    let kept = !self.restore_after_abort(stashed);
                    return Err(SyncError::RebaseConflict {
                        detail: note_kept_stash(detail, kept),
                    });
                }
                PullOutcome::LockContention | PullOutcome::Failed => {
                    self.abort_rebase()?;
                    self.restore_after_abort(stashed);
                    let failure = GitCommandError::Failed {
                        args: args.join(" "),
                        output: out,
                    };
                    return Err(SyncError::Git(GitFailure::Command(failure)));
                }
            }
        }
    }

    fn abort_rebase(&self) -> Result<(), SyncError> {
        if !git2_backend::rebase_in_progress(&self.handle.repo()?) {
            return Ok(());
        }
        self.handle.cli().run_checked(&["rebase", "--abort"])?;
        Ok(())
    }

    /// Put stashed edits back after an aborted pull. Returns false when
    /// they could not be restored and are still in the stash.
    fn restore_after_abort(&self, stashed: bool) -> bool {
        if !stashed {
            return true;
        }
        match self.handle.cli().run(&["stash", "pop"]) {
            Ok(out) if out.success() => {
                debug!("restored stashed edits");
                true
            }
            Ok(out) => {
                warn!(stderr = %out.stderr.trim(), "local edits remain in the stash");
                false
            }
            Err(e) => {
                warn!(error = %e, "local edits remain in the stash");
                false
            }
        }
    }

    fn restore_stash(&self) -> Result<(), SyncError> {
        let cli = self.handle.cli();
        let out = cli.run(&["stash", "pop"])?;
        match classify_stash_pop(&out) {
            StashPopOutcome::Restored => Ok(()),
            StashPopOutcome::Conflict => {
                cli.run_checked(&["reset", "--hard", "HEAD"])?;
                let dropped = self.drop_restored_untracked()?;
                warn!(
                    untracked_dropped = dropped,
                    "stashed edits conflict with the rebased branch; kept in the stash"
                );
                Err(SyncError::UnstashConflict)
            }
            StashPopOutcome::Failed => Err(GitCommandError::Failed {
                args: "stash pop".to_string(),
                output: out,
            }
            .into()),
        }
    }

    /// Delete untracked files a failed `stash pop` already wrote back, so
    /// the kept stash entry is their only copy. Paths the branch tracks are
    /// never touched.
    fn drop_restored_untracked(&self) -> Result<usize, SyncError> {
        let repo = self.handle.repo()?;
        let head_tree = repo.head()?.peel_to_tree()?;
        let index = repo.index()?;
        let mut dropped = 0;
        for rel in git2_backend::stash_untracked_paths(&repo)? {
            if head_tree.get_path(&rel).is_ok() || index.get_path(&rel, 0).is_some() {
                continue;
            }
            match fs::remove_file(self.handle.workdir().join(&rel)) {
                Ok(()) => dropped += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(dropped)
    }

    fn push_branch(&self, branch: &str) -> Result<Vec<String>, SyncError> {
        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        let args = ["push", "--porcelain", self.handle.remote(), refspec.as_str()];
        let out = self.handle.cli().run(&args)?;
        match classify_push(&out) {
            PushVerdict::Accepted(records) => Ok(records
                .into_iter()
                .map(|r| format!("{}:{} {}", r.from, r.to, r.summary))
                .collect()),
            PushVerdict::NonFastForward(summary) => Err(SyncError::NonFastForward { summary }),
            PushVerdict::Rejected(summary) => Err(SyncError::PushFailed(summary)),
            PushVerdict::Failed => Err(GitCommandError::Failed {
                args: args.join(" "),
                output: out,
            }
            .into()),
        }
    }

    fn verify(&self, branch: &str) -> Result<(), SyncError> {
        let repo = self.handle.repo()?;
        git2_backend::fetch(&repo, self.handle.remote())?;
        let local = git2_backend::branch_tip(&repo, branch)?;
        let remote = git2_backend::remote_tip(&repo, self.handle.remote(), branch);
        match local {
            Some(local) if Some(local) == remote => Ok(()),
            Some(local) => Err(SyncError::PushNotApplied {
                local: short(local),
                remote: remote.map(short),
            }),
            None if remote.is_none() => Ok(()),
            None => Err(SyncError::PushNotApplied {
                local: "none".to_string(),
                remote: remote.map(short),
            }),
        }
    }

    fn current_head(&self) -> Result<Option<Commit>, SyncError> {
        Ok(self.handle.head_commit_unlocked()?)
    }
}

fn note_kept_stash(detail: String, kept: bool) -> String {
    if kept {
        format!("{detail}; local edits were kept in the stash ({AUTOSTASH_MESSAGE})")
    } else {
        detail
    }
}
