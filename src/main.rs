//! # docsync
//!
//! Command-line front end of the docsync editor backend.
//!
//! Every subcommand prints the JSON body the backend would answer with on
//! stdout and exits non-zero when that answer is an error:
//! - `docsync place` / `upload` / `rename` store files under the docs root
//! - `docsync history` / `head` / `show` / `diff` / `status` query git
//! - `docsync commit` / `pull` / `push` / `sync` change the repository
//! - `docsync home` prints the docsync home directory
//!
//! This CLI is built with [clap](https://docs.rs/clap).

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use docsync::commands::{self, App};
use docsync::paths::{default_config_path, docsync_home};
use docsync::{Response, load_config, logging};

#[derive(Parser, Debug)]
#[command(
    name = "docsync",
    version,
    about = "docsync - markdown editor backend: safe file placement and git sync",
    arg_required_else_help = true
)]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/.docsync/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Store a file (or stdin with `-`) at a docs-relative path
    Place {
        destination: String,
        source: PathBuf,
        /// check, overwrite or increment
        #[arg(short, long, default_value = "check")]
        action: String,
    },
    /// Upload images into a folder below the static directory
    Upload {
        folder: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(short, long, default_value = "check")]
        action: String,
    },
    /// Move a docs file to a new path
    Rename {
        from: String,
        to: String,
        #[arg(short, long, default_value = "check")]
        action: String,
    },
    /// List branches and their commits, marking where a file exists
    History {
        #[arg(short, long)]
        file: Option<String>,
    },
    /// Print HEAD and the active branch
    Head,
    /// Print a docs file as of a commit
    Show { rev: String, path: String },
    /// Changes between two commits
    Diff {
        old: String,
        new: String,
        #[arg(short, long, default_value = "")]
        scope: String,
    },
    /// Uncommitted changes against a commit
    Status {
        #[arg(long, default_value = "HEAD")]
        against: String,
        #[arg(short, long, default_value = "")]
        scope: String,
    },
    /// Commit docs changes (all of them, or just FILES)
    Commit {
        #[arg(short, long, default_value = "")]
        message: String,
        files: Vec<String>,
    },
    /// Fetch and rebase onto the remote branch
    Pull,
    /// Push the active branch
    Push,
    /// Stash, rebase-pull, restore, push and verify
    Sync,
    /// Print the docsync home directory
    Home,
}

fn run(cli: Cli) -> Result<Option<Response>> {
    if let Cmd::Home = cli.cmd {
        println!("{}", docsync_home()?.display());
        return Ok(None);
    }

    let config_path = match cli.config {
        Some(p) => p,
        None => default_config_path()?,
    };
    let app = App::open(load_config(&config_path)?)?;

    let resp = match cli.cmd {
        Cmd::Place {
            destination,
            source,
            action,
        } => commands::cmd_place(&app, &destination, &action, &source)?,
        Cmd::Upload {
            folder,
            files,
            action,
        } => commands::cmd_upload(&app, &folder, &action, &files)?,
        Cmd::Rename { from, to, action } => commands::cmd_rename(&app, &from, &to, &action),
        Cmd::History { file } => commands::cmd_history(&app, file.as_deref()),
        Cmd::Head => commands::cmd_head(&app),
        Cmd::Show { rev, path } => commands::cmd_show(&app, &rev, &path),
        Cmd::Diff { old, new, scope } => commands::cmd_diff(&app, &old, &new, &scope),
        Cmd::Status { against, scope } => commands::cmd_status(&app, &against, &scope),
        Cmd::Commit { message, files } => commands::cmd_commit(&app, &message, &files),
        Cmd::Pull => commands::cmd_pull(&app),
        Cmd::Push => commands::cmd_push(&app),
        Cmd::Sync => commands::cmd_sync(&app),
        Cmd::Home => return Ok(None),
    };
    Ok(Some(resp))
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let Some(resp) = run(cli)? else {
        return Ok(ExitCode::SUCCESS);
    };
    println!("{}", serde_json::to_string_pretty(&resp.body)?);
    Ok(if resp.is_error() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
