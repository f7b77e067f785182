use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use git2::{DiffOptions, ErrorCode, Oid, Repository, Sort};
use serde::Serialize;
use tracing::warn;

use super::cli::GitCli;
use super::diff::{DiffEntry, entry_from_delta};
use super::error::RepoError;
use super::git2_backend;
use super::{Branch, Commit};
use crate::lockfile::LockFile;
use crate::place::{RelativePath, normalize};
use crate::settings::{Author, Config};

/// Content of a file as recorded in some commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileAtCommit {
    Content(String),
    NotFound,
}

/// One commit of a branch listing, newest first (`index` 1 is the tip).
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub commit: Commit,
    pub index: usize,
    pub file_exists: bool,
}

/// Commits of one branch, or the reason they could not be listed.
#[derive(Debug)]
pub struct BranchLog {
    pub branch: String,
    pub commits: Result<Vec<HistoryEntry>, RepoError>,
}

#[derive(Debug, Default)]
pub struct History {
    pub logs: Vec<BranchLog>,
    pub active_branch: Option<String>,
    pub head_commit: Option<String>,
}

/// JSON shape of the history query.
#[derive(Debug, Default, Serialize)]
pub struct HistoryReport {
    pub branches: Vec<String>,
    pub commits: BTreeMap<String, Vec<HistoryEntry>>,
    pub active_branch: Option<String>,
    pub head_commit: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
}

impl History {
    pub fn report(&self) -> HistoryReport {
        let mut out = HistoryReport {
            active_branch: self.active_branch.clone(),
            head_commit: self.head_commit.clone(),
            ..HistoryReport::default()
        };
        for log in &self.logs {
            out.branches.push(log.branch.clone());
            match &log.commits {
                Ok(commits) => {
                    out.commits.insert(log.branch.clone(), commits.clone());
                }
                Err(e) => {
                    out.commits.insert(log.branch.clone(), Vec::new());
                    out.errors.insert(log.branch.clone(), e.to_string());
                }
            }
        }
        out.branches.sort();
        out.branches.dedup();
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeadInfo {
    pub head: Option<String>,
    pub active_branch: Option<String>,
}

/// Name of the lock file inside the git directory.
const LOCK_FILE: &str = "docsync.lock";

/// A held repository lock: the in-process side plus the file lock other
/// processes see.
pub(crate) struct RepoGuard<G> {
    _file: LockFile,
    _local: G,
}

/// The one working copy this process serves.
///
/// Nothing about the repository is cached: every accessor opens it afresh
/// and reads live HEAD, branches and refs. Git-mutating operations take the
/// write side of `lock` and an exclusive lock on `<git dir>/docsync.lock`;
/// accessors take the shared sides.
#[derive(Debug)]
pub struct RepositoryHandle {
    workdir: PathBuf,
    git_dir: PathBuf,
    docs_dir: RelativePath,
    remote: String,
    doc_extension: String,
    author: Author,
    lock: RwLock<()>,
}

impl RepositoryHandle {
    /// Bind to the working copy at `repo_dir`.
    ///
    /// # Errors
    /// - [`RepoError::Open`] if `repo_dir` is not the root of a git repository.
    /// - [`RepoError::Bare`] if the repository has no working tree.
    /// - [`RepoError::InvalidPath`] if `docs_dir` escapes the working copy.
    pub fn open(repo_dir: &Path, docs_dir: &str, remote: &str) -> Result<Self, RepoError> {
        let repo = Repository::open(repo_dir).map_err(|source| RepoError::Open {
            path: repo_dir.to_path_buf(),
            source,
        })?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| RepoError::Bare(repo_dir.to_path_buf()))?
            .to_path_buf();
        let workdir = workdir.canonicalize().unwrap_or(workdir);
        let git_dir = repo.path().canonicalize().unwrap_or_else(|_| repo.path().to_path_buf());
        Ok(Self {
            workdir,
            git_dir,
            docs_dir: normalize(docs_dir)?,
            remote: remote.to_string(),
            doc_extension: String::new(),
            author: Author::default(),
            lock: RwLock::new(()),
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, RepoError> {
        let mut handle = Self::open(&cfg.repo_dir, &cfg.docs_dir, &cfg.remote)?;
        handle.doc_extension = cfg.doc_extension.trim_start_matches('.').to_string();
        handle.author = cfg.author.clone();
        Ok(handle)
    }

    /// Only report untracked files with this extension in working-tree
    /// diffs. Empty reports all of them.
    pub fn with_doc_extension(mut self, ext: &str) -> Self {
        self.doc_extension = ext.trim_start_matches('.').to_string();
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn docs_dir(&self) -> &RelativePath {
        &self.docs_dir
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn author(&self) -> &Author {
        &self.author
    }

    pub(crate) fn repo(&self) -> Result<Repository, RepoError> {
        Repository::open(&self.workdir).map_err(|source| RepoError::Open {
            path: self.workdir.clone(),
            source,
        })
    }

    pub(crate) fn cli(&self) -> GitCli {
        GitCli::new(&self.workdir)
    }

    pub(crate) fn read_guard(&self) -> Result<RepoGuard<RwLockReadGuard<'_, ()>>, RepoError> {
        let local = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        let path = self.git_dir.join(LOCK_FILE);
        let file = LockFile::shared(&path).map_err(|source| RepoError::Lock { path, source })?;
        Ok(RepoGuard {
            _file: file,
            _local: local,
        })
    }

    pub(crate) fn write_guard(&self) -> Result<RepoGuard<RwLockWriteGuard<'_, ()>>, RepoError> {
        let local = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        let path = self.git_dir.join(LOCK_FILE);
        let file = LockFile::exclusive(&path).map_err(|source| RepoError::Lock { path, source })?;
        Ok(RepoGuard {
            _file: file,
            _local: local,
        })
    }

    /// Repository path (`docs/<rel>`) of a docs-relative path.
    pub fn repo_path(&self, doc_relative: &str) -> Result<RelativePath, RepoError> {
        Ok(self.docs_dir.join(&normalize(doc_relative)?))
    }

    pub fn branches(&self) -> Result<Vec<Branch>, RepoError> {
        let _r = self.read_guard()?;
        list_branches(&self.repo()?)
    }

    pub fn commits_on(&self, branch: &str) -> Result<Vec<Commit>, RepoError> {
        let _r = self.read_guard()?;
        let repo = self.repo()?;
        let oids = walk_branch(&repo, branch)?;
        oids.into_iter()
            .map(|oid| Ok(Commit::from_git(&repo.find_commit(oid)?)))
            .collect()
    }

    pub fn head_commit(&self) -> Result<Option<Commit>, RepoError> {
        let _r = self.read_guard()?;
        head_commit(&self.repo()?)
    }

    /// HEAD without taking the lock, for callers already holding it.
    pub(crate) fn head_commit_unlocked(&self) -> Result<Option<Commit>, RepoError> {
        head_commit(&self.repo()?)
    }

    pub fn active_branch(&self) -> Result<Option<Branch>, RepoError> {
        let _r = self.read_guard()?;
        Ok(git2_backend::active_branch(&self.repo()?)?)
    }

    pub fn has_remote(&self) -> Result<bool, RepoError> {
        let _r = self.read_guard()?;
        Ok(self.repo()?.find_remote(&self.remote).is_ok())
    }

    /// Last fetched tip of `<remote>/<branch>`.
    pub fn remote_tip(&self, branch: &str) -> Result<Option<String>, RepoError> {
        let _r = self.read_guard()?;
        let repo = self.repo()?;
        Ok(git2_backend::remote_tip(&repo, &self.remote, branch).map(|o| o.to_string()))
    }

    pub fn head_info(&self) -> Result<HeadInfo, RepoError> {
        let _r = self.read_guard()?;
        let repo = self.repo()?;
        Ok(HeadInfo {
            head: head_commit(&repo)?.map(|c| c.hash),
            active_branch: git2_backend::active_branch(&repo)?.map(|b| b.name),
        })
    }

    pub fn file_exists_in_commit(&self, rev: &str, path: &str) -> Result<bool, RepoError> {
        let _r = self.read_guard()?;
        let repo = self.repo()?;
        let tree = find_commit(&repo, rev)?.tree()?;
        let path = self.repo_path(path)?;
        tree_has_path(&tree, &path)
    }

    /// Read a docs file as of `rev`; carriage returns are stripped.
    pub fn read_file_at_commit(&self, rev: &str, path: &str) -> Result<FileAtCommit, RepoError> {
        let _r = self.read_guard()?;
        let repo = self.repo()?;
        let tree = find_commit(&repo, rev)?.tree()?;
        let path = self.repo_path(path)?;
        let entry = match tree.get_path(&path.to_path_buf()) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(FileAtCommit::NotFound),
            Err(e) => return Err(e.into()),
        };
        let Ok(blob) = entry.to_object(&repo)?.into_blob() else {
            return Ok(FileAtCommit::NotFound);
        };
        Ok(FileAtCommit::Content(
            String::from_utf8_lossy(blob.content()).replace('\r', ""),
        ))
    }

    /// Changes from `old` to `new` below the docs-relative `scope`, with
    /// renames detected.
    pub fn diff_between(&self, old: &str, new: &str, scope: &str) -> Result<Vec<DiffEntry>, RepoError> {
        let _r = self.read_guard()?;
        let repo = self.repo()?;
        let old_tree = find_commit(&repo, old)?.tree()?;
        let new_tree = find_commit(&repo, new)?.tree()?;
        let mut opts = self.diff_options(scope)?;
        let mut diff = repo.diff_tree_to_tree(Some(&old_tree), Some(&new_tree), Some(&mut opts))?;
        diff.find_similar(None)?;
        let mut out: Vec<_> = diff.deltas().filter_map(|d| entry_from_delta(&d)).collect();
        sort_by_path(&mut out);
        Ok(out)
    }

    /// Index and working tree against `against`, below the docs-relative
    /// `scope`. Untracked files are reported as added.
    pub fn working_tree_diff(&self, against: &str, scope: &str) -> Result<Vec<DiffEntry>, RepoError> {
        let _r = self.read_guard()?;
        let repo = self.repo()?;
        let tree = find_commit(&repo, against)?.tree()?;
        let mut opts = self.diff_options(scope)?;
        opts.include_untracked(true).recurse_untracked_dirs(true);
        let mut diff = repo.diff_tree_to_workdir_with_index(Some(&tree), Some(&mut opts))?;
        diff.find_similar(None)?;

        let mut out = Vec::new();
        for delta in diff.deltas() {
            if delta.status() == git2::Delta::Untracked {
                if let Some(path) = delta.new_file().path()
                    && self.reports_untracked(path)
                {
                    out.push(DiffEntry::added(path.to_string_lossy().replace('\\', "/")));
                }
                continue;
            }
            out.extend(entry_from_delta(&delta));
        }
        sort_by_path(&mut out);
        Ok(out)
    }

    /// Every branch with its commits, for the editor's history picker.
    ///
    /// With `file` set, each commit records whether that docs file exists
    /// in it. A branch that cannot be walked is reported in its
    /// [`BranchLog`] and does not hide the others.
    pub fn history(&self, file: Option<&str>) -> Result<History, RepoError> {
        let _r = self.read_guard()?;
        let repo = self.repo()?;
        let branches = list_branches(&repo)?;
        if branches.is_empty() {
            return Ok(History::default());
        }
        let target = file
            .filter(|f| !f.trim().is_empty())
            .map(|f| self.repo_path(f))
            .transpose()?;

        let logs = branches
            .into_iter()
            .map(|b| {
                let commits = branch_history(&repo, &b.name, target.as_ref());
                if let Err(e) = &commits {
                    warn!(branch = %b.name, error = %e, "cannot list branch history");
                }
                BranchLog {
                    branch: b.name,
                    commits,
                }
            })
            .collect();

        Ok(History {
            logs,
            active_branch: git2_backend::active_branch(&repo).ok().flatten().map(|b| b.name),
            head_commit: head_commit(&repo).ok().flatten().map(|c| c.hash),
        })
    }

    fn diff_options(&self, scope: &str) -> Result<DiffOptions, RepoError> {
        let scope = self.repo_path(scope)?;
        let mut opts = DiffOptions::new();
        if !scope.is_root() {
            opts.pathspec(scope.as_str());
        }
        Ok(opts)
    }

    fn reports_untracked(&self, path: &Path) -> bool {
        self.doc_extension.is_empty()
            || path
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case(self.doc_extension.as_str()))
    }
}

fn sort_by_path(entries: &mut [DiffEntry]) {
    entries.sort_by(|a, b| a.path().cmp(&b.path()));
}

fn list_branches(repo: &Repository) -> Result<Vec<Branch>, RepoError> {
    let mut out = Vec::new();
    for item in repo.branches(Some(git2::BranchType::Local))? {
        let (branch, _) = item?;
        if let Some(name) = branch.name()? {
            out.push(Branch::new(name));
        }
    }
    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
}

fn head_commit(repo: &Repository) -> Result<Option<Commit>, RepoError> {
    match repo.head() {
        Ok(head) => Ok(Some(Commit::from_git(&head.peel_to_commit()?))),
        Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Commit ids reachable from a local branch, newest first.
fn walk_branch(repo: &Repository, branch: &str) -> Result<Vec<Oid>, RepoError> {
    let Some(tip) = git2_backend::branch_tip(repo, branch)? else {
        return Ok(Vec::new());
    };
    let mut walk = repo.revwalk()?;
    walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
    walk.push(tip)?;
    walk.map(|oid| oid.map_err(RepoError::from)).collect()
}

fn branch_history(
    repo: &Repository,
    branch: &str,
    target: Option<&RelativePath>,
) -> Result<Vec<HistoryEntry>, RepoError> {
    walk_branch(repo, branch)?
        .into_iter()
        .enumerate()
        .map(|(i, oid)| {
            let commit = repo.find_commit(oid)?;
            let file_exists = match target {
                Some(path) => tree_has_path(&commit.tree()?, path)?,
                None => true,
            };
            Ok(HistoryEntry {
                commit: Commit::from_git(&commit),
                index: i + 1,
                file_exists,
            })
        })
        .collect()
}

fn find_commit<'r>(repo: &'r Repository, rev: &str) -> Result<git2::Commit<'r>, RepoError> {
    let obj = repo
        .revparse_single(rev)
        .map_err(|_| RepoError::UnknownRevision(rev.to_string()))?;
    obj.peel_to_commit()
        .map_err(|_| RepoError::UnknownRevision(rev.to_string()))
}

fn tree_has_path(tree: &git2::Tree<'_>, path: &RelativePath) -> Result<bool, RepoError> {
    match tree.get_path(&path.to_path_buf()) {
        Ok(_) => Ok(true),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn handles_on_one_repository_exclude_each_other() {
        let td = TempDir::new().unwrap();
        Repository::init(td.path()).unwrap();
        let first = RepositoryHandle::open(td.path(), "docs", "origin").unwrap();
        let second = RepositoryHandle::open(td.path(), "docs", "origin").unwrap();
        assert!(first.git_dir().join(LOCK_FILE).parent().unwrap().is_dir());

        let held = first.write_guard().unwrap();
        let entered = AtomicBool::new(false);
        thread::scope(|s| {
            s.spawn(|| {
                let _w = second.write_guard().unwrap();
                entered.store(true, Ordering::SeqCst);
            });
            thread::sleep(Duration::from_millis(100));
            assert!(!entered.load(Ordering::SeqCst), "second handle got in while first held the lock");
            drop(held);
        });
        assert!(entered.load(Ordering::SeqCst));

        // Readers on different handles share the lock.
        let _a = first.read_guard().unwrap();
        let _b = second.read_guard().unwrap();
    }
}
