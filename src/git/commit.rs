use git2::{IndexAddOption, Oid, Repository, Signature};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::error::CommitError;
use super::git2_backend;
use super::handle::RepositoryHandle;
use crate::place::{RelativePath, normalize};

const EMPTY_MESSAGE: &str = "(no message)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitReport {
    pub commit: String,
    pub summary: String,
    pub active_branch: String,
}

/// Records local edits of the docs directory as a commit on the active
/// branch. Refuses while the remote has commits the branch lacks.
pub struct CommitEngine<'a> {
    handle: &'a RepositoryHandle,
}

impl<'a> CommitEngine<'a> {
    pub fn new(handle: &'a RepositoryHandle) -> Self {
        Self { handle }
    }

    /// Stage `files` (docs-relative) or, when none are given, everything
    /// under the docs directory, then commit.
    ///
    /// # Errors
    /// - [`CommitError::DetachedHead`] when HEAD is not on a branch.
    /// - [`CommitError::RemoteAhead`] when the branch is strictly behind
    ///   its remote tracking ref.
    /// - [`CommitError::Diverged`] when both sides have new commits.
    /// - [`CommitError::InvalidPath`] for a file path that escapes the docs
    ///   directory. Nothing is staged in that case.
    pub fn commit_all(
        &self,
        message: &str,
        files: Option<&[String]>,
    ) -> Result<CommitReport, CommitError> {
        let _w = self.handle.write_guard()?;
        let repo = self.handle.repo()?;

        let Some(branch) = git2_backend::active_branch(&repo)? else {
            return Err(CommitError::DetachedHead);
        };
        let branch = branch.name;

        if let Err(e) = git2_backend::fetch(&repo, self.handle.remote()) {
            warn!(remote = %self.handle.remote(), error = %e, "fetch failed; comparing against last known remote");
        }

        let local = git2_backend::branch_tip(&repo, &branch)?;
        if let Some(local) = local
            && let Some(remote) = git2_backend::remote_tip(&repo, self.handle.remote(), &branch)
        {
            check_ancestry(&repo, &branch, local, remote)?;
        }

        let specs = self.pathspecs(files)?;
        let mut index = repo.index()?;
        index.add_all(specs.iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(specs.iter(), None)?;
        index.write()?;
        let tree = repo.find_tree(index.write_tree()?)?;
        debug!(pathspecs = ?specs, "staged changes");

        let sig = match repo.signature() {
            Ok(sig) => sig,
            Err(_) => {
                let author = self.handle.author();
                Signature::now(&author.name, &author.email)?
            }
        };
        let parents = match local {
            Some(oid) => vec![repo.find_commit(oid)?],
            None => Vec::new(),
        };
        let parent_refs: Vec<_> = parents.iter().collect();
        let message = match message.trim() {
            "" => EMPTY_MESSAGE,
            m => m,
        };
        let oid = repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)?;
        let commit = repo.find_commit(oid)?;
        info!(branch = %branch, commit = %oid, "committed");

        Ok(CommitReport {
            commit: oid.to_string(),
            summary: commit.summary().unwrap_or_default().to_string(),
            active_branch: branch,
        })
    }

    /// Repository pathspecs to stage. Every file is validated before any of
    /// them is used.
    fn pathspecs(&self, files: Option<&[String]>) -> Result<Vec<String>, CommitError> {
        let docs = self.handle.docs_dir();
        let chosen: Vec<RelativePath> = match files {
            Some(files) if !files.is_empty() => files
                .iter()
                .map(|f| Ok(docs.join(&normalize(f)?)))
                .collect::<Result<_, CommitError>>()?,
            _ => vec![docs.clone()],
        };
        Ok(chosen
            .into_iter()
            .map(|p| {
                if p.is_root() {
                    "*".to_string()
                } else {
                    p.as_str().to_string()
                }
            })
            .collect())
    }
}

fn check_ancestry(repo: &Repository, branch: &str, local: Oid, remote: Oid) -> Result<(), CommitError> {
    if local == remote {
        return Ok(());
    }
    if repo.graph_descendant_of(remote, local)? {
        return Err(CommitError::RemoteAhead(branch.to_string()));
    }
    if !repo.graph_descendant_of(local, remote)? {
        return Err(CommitError::Diverged(branch.to_string()));
    }
    Ok(())
}
