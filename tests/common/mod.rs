//! Shared fixture: a working copy on `main` tracking a bare remote, plus
//! helpers to act as a second contributor.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use docsync::RepositoryHandle;
use tempfile::TempDir;

pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("LC_ALL", "C")
        .output()
        .expect("failed to run git");
    assert!(
        out.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

fn configure(dir: &Path) {
    git(dir, &["config", "user.email", "test@test.com"]);
    git(dir, &["config", "user.name", "Test User"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
}

pub fn write(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

pub fn commit(dir: &Path, message: &str) -> String {
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-q", "-m", message]);
    git(dir, &["rev-parse", "HEAD"])
}

pub struct TestRepo {
    work_dir: TempDir,
    remote_dir: TempDir,
    peers: Vec<TempDir>,
}

impl TestRepo {
    /// Working copy with one pushed commit containing `docs/readme.md`.
    pub fn new() -> Self {
        let remote_dir = TempDir::new().expect("failed to create remote dir");
        git(remote_dir.path(), &["init", "-q", "--bare", "-b", "main"]);

        let work_dir = TempDir::new().expect("failed to create work dir");
        let work = work_dir.path();
        git(work, &["init", "-q", "-b", "main"]);
        configure(work);
        git(work, &["remote", "add", "origin", remote_dir.path().to_str().unwrap()]);
        write(work, "docs/readme.md", "first line\nsecond line\n");
        commit(work, "initial");
        git(work, &["push", "-q", "-u", "origin", "main"]);

        Self {
            work_dir,
            remote_dir,
            peers: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        self.work_dir.path()
    }

    pub fn git(&self, args: &[&str]) -> String {
        git(self.path(), args)
    }

    pub fn write(&self, rel: &str, content: &str) {
        write(self.path(), rel, content);
    }

    pub fn commit(&self, message: &str) -> String {
        commit(self.path(), message)
    }

    pub fn head(&self) -> String {
        self.git(&["rev-parse", "HEAD"])
    }

    pub fn remote_main(&self) -> String {
        git(self.remote_dir.path(), &["rev-parse", "refs/heads/main"])
    }

    pub fn remote_path(&self) -> &Path {
        self.remote_dir.path()
    }

    /// Install an executable hook script in the bare remote.
    #[cfg(unix)]
    pub fn remote_hook(&self, name: &str, script: &str) {
        use std::os::unix::fs::PermissionsExt;

        let path = self.remote_path().join("hooks").join(name);
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    pub fn handle(&self) -> RepositoryHandle {
        RepositoryHandle::open(self.path(), "docs", "origin").expect("failed to open handle")
    }

    /// Clone the remote, let `f` edit the clone, then commit and push it.
    /// Returns the pushed commit.
    pub fn push_from_peer(&mut self, message: &str, f: impl FnOnce(&Path)) -> String {
        let peer = TempDir::new().expect("failed to create peer dir");
        let dir: PathBuf = peer.path().join("clone");
        git(
            peer.path(),
            &["clone", "-q", "-b", "main", self.remote_dir.path().to_str().unwrap(), "clone"],
        );
        configure(&dir);
        f(&dir);
        let oid = commit(&dir, message);
        git(&dir, &["push", "-q", "origin", "main"]);
        self.peers.push(peer);
        oid
    }
}
