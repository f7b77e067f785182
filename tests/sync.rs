//! Sync pipeline against a real bare remote.

mod common;

use std::fs;

use common::{TestRepo, write};
use docsync::git::{SyncError, SyncStage};
use docsync::{GitSyncEngine, RepositoryHandle};

#[test]
fn sync_pushes_local_commit() {
    let repo = TestRepo::new();
    repo.write("docs/new.md", "hello\n");
    let local = repo.commit("add new");

    let handle = repo.handle();
    let report = GitSyncEngine::new(&handle).sync().unwrap();

    assert_eq!(report.active_branch, "main");
    assert_eq!(report.commit.as_deref(), Some(local.as_str()));
    assert_eq!(report.summary.as_deref(), Some("add new"));
    assert_eq!(repo.remote_main(), local);
    assert!(!report.push_result.is_empty());
}

#[test]
fn sync_reports_stages_in_order() {
    let repo = TestRepo::new();
    let handle = repo.handle();
    let mut seen = Vec::new();
    GitSyncEngine::new(&handle)
        .sync_with(&mut |s| seen.push(s))
        .unwrap();
    assert_eq!(
        seen,
        [
            SyncStage::Preflight,
            SyncStage::RefCleanup,
            SyncStage::Fetch,
            SyncStage::Stash,
            SyncStage::RebasePull,
            SyncStage::Push,
            SyncStage::Verify,
        ]
    );
}

#[test]
fn sync_rebases_local_work_onto_remote() {
    let mut repo = TestRepo::new();
    let theirs = repo.push_from_peer("peer edit", |d| write(d, "docs/other.md", "peer\n"));
    repo.write("docs/mine.md", "mine\n");
    repo.commit("local edit");

    let handle = repo.handle();
    let report = GitSyncEngine::new(&handle).sync().unwrap();

    let head = repo.head();
    assert_eq!(report.commit.as_deref(), Some(head.as_str()));
    assert_eq!(repo.remote_main(), head);
    assert_eq!(repo.git(&["rev-parse", "HEAD~1"]), theirs);
    assert!(repo.path().join("docs/other.md").exists());
}

#[test]
fn rebase_conflict_is_aborted_and_tree_left_clean() {
    let mut repo = TestRepo::new();
    repo.push_from_peer("peer rewrite", |d| {
        write(d, "docs/readme.md", "their first line\nsecond line\n")
    });
    repo.write("docs/readme.md", "my first line\nsecond line\n");
    let local = repo.commit("local rewrite");

    let handle = repo.handle();
    let err = GitSyncEngine::new(&handle).sync().unwrap_err();
    assert!(matches!(err, SyncError::RebaseConflict { .. }), "{err:?}");

    let git_dir = repo.path().join(".git");
    assert!(!git_dir.join("rebase-merge").exists());
    assert!(!git_dir.join("rebase-apply").exists());
    assert_eq!(repo.head(), local);
    assert_eq!(repo.git(&["status", "--porcelain"]), "");
    // A later git operation works without manual cleanup.
    repo.git(&["log", "-1"]);
}

#[test]
fn dirty_tree_survives_sync() {
    let mut repo = TestRepo::new();
    repo.push_from_peer("peer edit", |d| write(d, "docs/other.md", "peer\n"));
    repo.write("docs/readme.md", "first line\nsecond line\nthird line\n");
    repo.write("docs/draft.md", "draft\n");

    let handle = repo.handle();
    GitSyncEngine::new(&handle).sync().unwrap();

    assert_eq!(
        fs::read_to_string(repo.path().join("docs/readme.md")).unwrap(),
        "first line\nsecond line\nthird line\n"
    );
    assert!(repo.path().join("docs/draft.md").exists());
    assert!(repo.path().join("docs/other.md").exists());
    assert_eq!(repo.git(&["stash", "list"]), "");
}

#[test]
fn unstash_conflict_keeps_stash_and_clean_tree() {
    let mut repo = TestRepo::new();
    let theirs = repo.push_from_peer("peer rewrite", |d| {
        write(d, "docs/readme.md", "their first line\nsecond line\n")
    });
    repo.write("docs/readme.md", "my first line\nsecond line\n");
    repo.write("docs/draft.md", "untracked draft\n");

    let handle = repo.handle();
    let err = GitSyncEngine::new(&handle).sync().unwrap_err();
    assert!(matches!(err, SyncError::UnstashConflict), "{err:?}");

    assert_eq!(repo.head(), theirs);
    assert_eq!(repo.git(&["status", "--porcelain", "-uall"]), "");
    assert!(!repo.path().join("docs/draft.md").exists());
    assert!(repo.git(&["stash", "list"]).contains("docsync-autostash-before-sync"));
    // Both edits live on in the kept stash entry.
    assert_eq!(repo.git(&["show", "stash@{0}^3:docs/draft.md"]), "untracked draft");
    assert!(repo.git(&["show", "stash@{0}:docs/readme.md"]).starts_with("my first line"));
}

#[test]
fn rebase_conflict_detail_names_the_conflict() {
    let mut repo = TestRepo::new();
    repo.push_from_peer("peer rewrite", |d| {
        write(d, "docs/readme.md", "their first line\nsecond line\n")
    });
    repo.write("docs/readme.md", "my first line\nsecond line\n");
    repo.commit("local rewrite");

    let handle = repo.handle();
    match GitSyncEngine::new(&handle).sync().unwrap_err() {
        SyncError::RebaseConflict { detail } => {
            assert!(
                detail.contains("readme.md") || detail.contains("local rewrite"),
                "{detail}"
            );
            assert!(!detail.contains("kept in the stash"), "{detail}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn detached_head_is_refused() {
    let repo = TestRepo::new();
    repo.git(&["checkout", "-q", "--detach"]);
    let handle = repo.handle();
    let err = GitSyncEngine::new(&handle).sync().unwrap_err();
    assert!(matches!(err, SyncError::DetachedHead));
}

#[test]
fn missing_remote_is_refused() {
    let repo = TestRepo::new();
    let handle = RepositoryHandle::open(repo.path(), "docs", "upstream").unwrap();
    let err = GitSyncEngine::new(&handle).sync().unwrap_err();
    assert!(matches!(err, SyncError::NoRemote(r) if r == "upstream"));
}

#[test]
fn rebase_in_progress_is_refused() {
    let repo = TestRepo::new();
    fs::create_dir(repo.path().join(".git/rebase-merge")).unwrap();
    let handle = repo.handle();
    let err = GitSyncEngine::new(&handle).sync().unwrap_err();
    assert!(matches!(err, SyncError::UnmergedFiles));
}

#[test]
fn merge_in_progress_is_refused() {
    let repo = TestRepo::new();
    repo.git(&["checkout", "-q", "-b", "side"]);
    repo.write("docs/side.md", "side\n");
    repo.commit("side work");
    repo.git(&["checkout", "-q", "main"]);
    repo.write("docs/main2.md", "main\n");
    let local = repo.commit("main work");
    repo.git(&["merge", "-q", "--no-ff", "--no-commit", "side"]);

    let handle = repo.handle();
    let err = GitSyncEngine::new(&handle).sync().unwrap_err();
    assert!(matches!(err, SyncError::UnmergedFiles), "{err:?}");

    // The half-finished merge is left for the user to conclude.
    assert!(repo.path().join(".git/MERGE_HEAD").exists());
    assert_eq!(repo.git(&["stash", "list"]), "");
    assert_eq!(repo.head(), local);
    repo.git(&["commit", "-q", "--no-edit"]);
    assert_eq!(repo.git(&["rev-parse", "HEAD^2"]), repo.git(&["rev-parse", "side"]));
}

#[test]
fn stale_markers_are_removed() {
    let repo = TestRepo::new();
    let head = repo.head();
    fs::write(repo.path().join(".git/ORIG_HEAD"), format!("{head}\n")).unwrap();
    fs::write(repo.path().join(".git/MERGE_HEAD"), format!("{head}\n")).unwrap();

    let handle = repo.handle();
    GitSyncEngine::new(&handle).sync().unwrap();
    assert!(!repo.path().join(".git/MERGE_HEAD").exists());
}

#[test]
fn locked_orig_head_does_not_block_sync() {
    let mut repo = TestRepo::new();
    let theirs = repo.push_from_peer("peer edit", |d| write(d, "docs/other.md", "peer\n"));
    repo.write("docs/mine.md", "mine\n");
    repo.commit("local edit");
    fs::write(repo.path().join(".git/ORIG_HEAD.lock"), "").unwrap();

    let handle = repo.handle();
    let report = GitSyncEngine::new(&handle).sync().unwrap();

    let head = repo.head();
    assert_eq!(report.commit.as_deref(), Some(head.as_str()));
    assert_eq!(repo.remote_main(), head);
    assert_eq!(repo.git(&["rev-parse", "HEAD~1"]), theirs);
}

#[test]
fn sync_when_only_behind_fast_forwards() {
    let mut repo = TestRepo::new();
    let theirs = repo.push_from_peer("peer edit", |d| write(d, "docs/other.md", "peer\n"));

    let handle = repo.handle();
    let report = GitSyncEngine::new(&handle).sync().unwrap();

    assert_eq!(report.commit.as_deref(), Some(theirs.as_str()));
    assert_eq!(report.summary.as_deref(), Some("peer edit"));
    assert_eq!(repo.head(), theirs);
    assert_eq!(repo.remote_main(), theirs);
    assert_eq!(repo.git(&["status", "--porcelain"]), "");
}

#[cfg(unix)]
#[test]
fn hook_rejection_is_push_failed() {
    let repo = TestRepo::new();
    let before = repo.remote_main();
    repo.remote_hook("pre-receive", "#!/bin/sh\nexit 1\n");
    repo.write("docs/new.md", "hello\n");
    repo.commit("add new");

    let handle = repo.handle();
    let err = GitSyncEngine::new(&handle).sync().unwrap_err();
    match err {
        SyncError::PushFailed(summary) => assert!(summary.contains("hook declined"), "{summary}"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(repo.remote_main(), before);
}

#[cfg(unix)]
#[test]
fn remote_that_drops_the_update_is_push_not_applied() {
    let repo = TestRepo::new();
    let before = repo.remote_main();
    repo.remote_hook(
        "post-receive",
        "#!/bin/sh\nwhile read old new ref; do git update-ref \"$ref\" \"$old\"; done\n",
    );
    repo.write("docs/new.md", "hello\n");
    repo.commit("add new");

    let handle = repo.handle();
    let err = GitSyncEngine::new(&handle).sync().unwrap_err();
    assert!(
        matches!(&err, SyncError::PushNotApplied { remote: Some(_), .. }),
        "{err:?}"
    );
    assert_eq!(repo.remote_main(), before);
}

#[test]
fn new_branch_is_pushed_without_pull() {
    let repo = TestRepo::new();
    repo.git(&["checkout", "-q", "-b", "feature"]);
    repo.write("docs/feature.md", "f\n");
    let local = repo.commit("feature work");

    let handle = repo.handle();
    let report = GitSyncEngine::new(&handle).sync().unwrap();
    assert_eq!(report.active_branch, "feature");
    assert_eq!(handle.remote_tip("feature").unwrap().as_deref(), Some(local.as_str()));
}

#[test]
fn push_without_rebase_is_non_fast_forward() {
    let mut repo = TestRepo::new();
    repo.push_from_peer("peer edit", |d| write(d, "docs/other.md", "peer\n"));
    repo.write("docs/mine.md", "mine\n");
    repo.commit("local edit");

    let handle = repo.handle();
    let err = GitSyncEngine::new(&handle).push().unwrap_err();
    assert!(matches!(err, SyncError::NonFastForward { .. }), "{err:?}");
}

#[test]
fn pull_fast_forwards_to_remote() {
    let mut repo = TestRepo::new();
    let theirs = repo.push_from_peer("peer edit", |d| write(d, "docs/other.md", "peer\n"));

    let handle = repo.handle();
    let report = GitSyncEngine::new(&handle).pull().unwrap();
    assert_eq!(report.active_branch, "main");
    assert_eq!(report.commit.as_deref(), Some(theirs.as_str()));
    assert_eq!(repo.head(), theirs);
}
