use git2::{
    BranchType, Cred, ErrorCode, FetchOptions, ObjectType, Oid, RemoteCallbacks, Repository,
    RepositoryState, StatusOptions, TreeWalkMode, TreeWalkResult,
};
use std::fs;
use std::io;
use std::path::PathBuf;

use super::Branch;

/// Markers an interrupted rebase or merge can leave behind.
pub const STALE_MARKERS: [&str; 2] = ["ORIG_HEAD", "MERGE_HEAD"];

/// Build a `FetchOptions` with SSH-agent and credential-helper support.
///
/// SSH keys come from the agent; HTTPS remotes go through the configured
/// credential helper. Anything else falls back to default credentials.
fn fetch_opts_with_creds(repo: &Repository) -> FetchOptions<'static> {
    let cfg = repo.config().ok();
    let mut cb = RemoteCallbacks::new();
    cb.credentials(move |url, username_from_url, allowed| {
        if allowed.is_ssh_key() {
            return Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"));
        }
        if allowed.is_user_pass_plaintext()
            && let Some(cfg) = cfg.as_ref()
            && let Ok(cred) = Cred::credential_helper(cfg, url, username_from_url)
        {
            return Ok(cred);
        }
        Cred::default()
    });

    let mut fo = FetchOptions::new();
    fo.remote_callbacks(cb);
    fo
}

/// Perform `git fetch <remote>` to update remote-tracking refs.
///
/// Branch heads are force-updated into `refs/remotes/<remote>/*` so a
/// rewritten remote branch never blocks the fetch.
///
/// # Errors
/// Returns an error if the remote is missing or the fetch fails.
pub fn fetch(repo: &Repository, remote: &str) -> Result<(), git2::Error> {
    let mut fo = fetch_opts_with_creds(repo);
    let refspec = format!("+refs/heads/*:refs/remotes/{remote}/*");
    repo.find_remote(remote)?
        .fetch(&[refspec.as_str()], Some(&mut fo), None)
}

/// Branch HEAD is attached to, including an unborn one. `None` when
/// detached.
pub fn active_branch(repo: &Repository) -> Result<Option<Branch>, git2::Error> {
    if repo.head_detached()? {
        return Ok(None);
    }
    match repo.head() {
        Ok(head) if head.is_branch() => Ok(head.shorthand().map(Branch::new)),
        Ok(_) => Ok(None),
        Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
            let head = repo.find_reference("HEAD")?;
            Ok(head
                .symbolic_target()
                .and_then(|t| t.strip_prefix("refs/heads/"))
                .map(Branch::new))
        }
        Err(e) => Err(e),
    }
}

/// Tip of a local branch, `None` when the branch has no commits yet.
pub fn branch_tip(repo: &Repository, branch: &str) -> Result<Option<Oid>, git2::Error> {
    match repo.find_branch(branch, BranchType::Local) {
        Ok(b) => Ok(b.get().target()),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Tip of `refs/remotes/<remote>/<branch>` as last fetched.
pub fn remote_tip(repo: &Repository, remote: &str, branch: &str) -> Option<Oid> {
    repo.refname_to_id(&format!("refs/remotes/{remote}/{branch}"))
        .ok()
}

pub fn stash_tip(repo: &Repository) -> Option<Oid> {
    repo.refname_to_id("refs/stash").ok()
}

pub fn rebase_in_progress(repo: &Repository) -> bool {
    let git_dir = repo.path();
    git_dir.join("rebase-apply").exists() || git_dir.join("rebase-merge").exists()
}

/// `MERGE_HEAD` only counts as a merge when git also wrote the message or
/// mode file that a running merge keeps next to it.
fn merge_in_progress(repo: &Repository) -> bool {
    let git_dir = repo.path();
    git_dir.join("MERGE_HEAD").exists()
        && (git_dir.join("MERGE_MSG").exists() || git_dir.join("MERGE_MODE").exists())
}

/// A rebase, merge, cherry-pick, revert or bisect is running, or the index
/// still holds unresolved conflicts.
pub fn operation_in_progress(repo: &Repository) -> Result<bool, git2::Error> {
    if rebase_in_progress(repo) || repo.index()?.has_conflicts() {
        return Ok(true);
    }
    Ok(match repo.state() {
        RepositoryState::Clean => false,
        RepositoryState::Merge => merge_in_progress(repo),
        _ => true,
    })
}

/// Remove leftover `ORIG_HEAD`/`MERGE_HEAD` files. Returns the names that
/// were removed. Callers check [`operation_in_progress`] first.
pub fn remove_stale_markers(repo: &Repository) -> io::Result<Vec<&'static str>> {
    let mut removed = Vec::new();
    for marker in STALE_MARKERS {
        match fs::remove_file(repo.path().join(marker)) {
            Ok(()) => removed.push(marker),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(removed)
}

pub fn remove_marker(repo: &Repository, marker: &str) -> io::Result<bool> {
    match fs::remove_file(repo.path().join(marker)) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Tracked modifications or untracked files anywhere in the working copy.
pub fn is_dirty(repo: &Repository) -> Result<bool, git2::Error> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .include_ignored(false)
        .exclude_submodules(true);
    let statuses = repo.statuses(Some(&mut opts))?;
    Ok(!statuses.is_empty())
}

/// Paths of the untracked files saved in the newest stash entry (its third
/// parent, present only for `stash push -u`).
pub fn stash_untracked_paths(repo: &Repository) -> Result<Vec<PathBuf>, git2::Error> {
    let Some(tip) = stash_tip(repo) else {
        return Ok(Vec::new());
    };
    let stash = repo.find_commit(tip)?;
    if stash.parent_count() < 3 {
        return Ok(Vec::new());
    }
    let tree = stash.parent(2)?.tree()?;
    let mut paths = Vec::new();
    tree.walk(TreeWalkMode::PreOrder, |dir, entry| {
        if entry.kind() == Some(ObjectType::Blob)
            && let Some(name) = entry.name()
        {
            paths.push(PathBuf::from(format!("{dir}{name}")));
        }
        TreeWalkResult::Ok
    })?;
    Ok(paths)
}

/// Abbreviated hash used in human-facing messages.
pub fn short(oid: Oid) -> String {
    let s = oid.to_string();
    s[..7.min(s.len())].to_string()
}
