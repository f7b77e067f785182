//! One function per CLI subcommand. Each returns the [`Response`] the
//! editor backend would send for the equivalent request.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde_json::{Value, json};

use crate::api::{ApiError, Response};
use crate::git::{
    CommitEngine, FileAtCommit, GitSyncEngine, RepositoryHandle, SyncError, SyncStage,
};
use crate::place::{CollisionPolicy, CollisionResolver, Payload};
use crate::progress::StageSpinner;
use crate::settings::Config;

/// Everything a command needs, built once per process.
pub struct App {
    pub cfg: Config,
    pub repo: RepositoryHandle,
    pub placer: CollisionResolver,
}

impl App {
    pub fn open(cfg: Config) -> Result<Self> {
        let repo = RepositoryHandle::from_config(&cfg)
            .with_context(|| format!("cannot open repository at {}", cfg.repo_dir.display()))?;
        let docs_root = repo.workdir().join(repo.docs_dir().to_path_buf());
        fs::create_dir_all(&docs_root)
            .with_context(|| format!("cannot create {}", docs_root.display()))?;
        let placer =
            CollisionResolver::new(docs_root).with_lock_dir(repo.git_dir().join("docsync-locks"));
        Ok(Self { cfg, repo, placer })
    }
}

fn policy(action: &str) -> Result<CollisionPolicy, Response> {
    action.parse().map_err(|e| Response::error(&e))
}

/// Store `source` (a local file, `-` for stdin) at the docs-relative
/// `destination`.
pub fn cmd_place(app: &App, destination: &str, action: &str, source: &Path) -> Result<Response> {
    let policy = match policy(action) {
        Ok(p) => p,
        Err(resp) => return Ok(resp),
    };
    let mut reader: Box<dyn Read> = if source == Path::new("-") {
        Box::new(io::stdin().lock())
    } else {
        Box::new(File::open(source).with_context(|| format!("cannot open {}", source.display()))?)
    };
    Ok(app
        .placer
        .place(destination, policy, Payload::Upload(reader.as_mut()))
        .into())
}

/// Upload images into `folder` below the static directory, in parallel.
/// The body lists one result per file, in argument order.
pub fn cmd_upload(app: &App, folder: &str, action: &str, files: &[PathBuf]) -> Result<Response> {
    let policy = match policy(action) {
        Ok(p) => p,
        Err(resp) => return Ok(resp),
    };
    let mut opened = Vec::with_capacity(files.len());
    for path in files {
        let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        opened.push((name, file));
    }

    let results: Vec<Response> = opened
        .into_par_iter()
        .map(|(name, mut file)| {
            app.placer
                .place_image(&app.cfg.static_dir, folder, &name, policy, &mut file)
                .into()
        })
        .collect();

    let status = results.iter().map(|r| r.status).max().unwrap_or(200);
    let bodies: Vec<Value> = results.into_iter().map(|r| r.body).collect();
    Ok(Response {
        status,
        body: Value::Array(bodies),
    })
}

pub fn cmd_rename(app: &App, from: &str, to: &str, action: &str) -> Response {
    match policy(action) {
        Ok(policy) => app.placer.place(to, policy, Payload::Move(from)).into(),
        Err(resp) => resp,
    }
}

pub fn cmd_history(app: &App, file: Option<&str>) -> Response {
    match app.repo.history(file) {
        Ok(history) => Response::ok(&history.report()),
        Err(e) => Response::error(&e),
    }
}

pub fn cmd_head(app: &App) -> Response {
    app.repo.head_info().into()
}

pub fn cmd_show(app: &App, rev: &str, path: &str) -> Response {
    match app.repo.read_file_at_commit(rev, path) {
        Ok(FileAtCommit::Content(content)) => Response::ok(&json!({ "content": content })),
        Ok(FileAtCommit::NotFound) => Response {
            status: 404,
            body: json!({
                "error": "FILE_NOT_FOUND",
                "detail": format!("{path} does not exist in {rev}"),
                "status": 404,
            }),
        },
        Err(e) => Response::error(&e),
    }
}

pub fn cmd_diff(app: &App, old: &str, new: &str, scope: &str) -> Response {
    app.repo.diff_between(old, new, scope).into()
}

pub fn cmd_status(app: &App, against: &str, scope: &str) -> Response {
    app.repo.working_tree_diff(against, scope).into()
}

pub fn cmd_commit(app: &App, message: &str, files: &[String]) -> Response {
    let files = (!files.is_empty()).then_some(files);
    match CommitEngine::new(&app.repo).commit_all(message, files) {
        Ok(report) => Response::success(&report),
        Err(e) => Response::error(&e),
    }
}

fn with_spinner<T>(label: &str, run: impl FnOnce(&StageSpinner) -> Result<T, SyncError>) -> Result<T, SyncError> {
    let spinner = StageSpinner::start(label);
    let res = run(&spinner);
    match &res {
        Ok(_) => spinner.finish(true, "done"),
        Err(e) => spinner.finish(false, e.code()),
    }
    res
}

pub fn cmd_pull(app: &App) -> Response {
    let engine = GitSyncEngine::new(&app.repo);
    match with_spinner("pull", |_| engine.pull()) {
        Ok(report) => Response::success(&report),
        Err(e) => Response::error(&e),
    }
}

pub fn cmd_push(app: &App) -> Response {
    let engine = GitSyncEngine::new(&app.repo);
    match with_spinner("push", |_| engine.push()) {
        Ok(report) => Response::success(&report),
        Err(e) => Response::error(&e),
    }
}

pub fn cmd_sync(app: &App) -> Response {
    let engine = GitSyncEngine::new(&app.repo);
    let res = with_spinner("sync", |spinner| {
        engine.sync_with(&mut |stage: SyncStage| spinner.stage(stage.describe()))
    });
    match res {
        Ok(report) => Response::success(&report),
        Err(e) => Response::error(&e),
    }
}
