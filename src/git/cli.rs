use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, trace};

use super::error::GitCommandError;

/// Captured result of one `git` invocation.
#[derive(Debug, Clone)]
pub struct GitOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr, for scanning tool messages that git
    /// prints on either stream.
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }

    pub fn describe_status(&self) -> String {
        match self.code {
            Some(c) => format!("exit code {c}"),
            None => "killed by signal".to_string(),
        }
    }
}

/// Runs the `git` binary inside one working copy.
///
/// Used for the porcelain operations (rebase-pull, stash, push) whose
/// semantics only the command-line tool provides. Output is forced to the C
/// locale so [`super::classify`] sees stable English messages.
#[derive(Debug, Clone)]
pub struct GitCli {
    workdir: PathBuf,
}

impl GitCli {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Run `git <args>` and capture its output whatever the exit status.
    ///
    /// # Errors
    /// Only when the process cannot be spawned.
    pub fn run(&self, args: &[&str]) -> Result<GitOutput, GitCommandError> {
        let joined = args.join(" ");
        debug!(args = %joined, "running git");
        let out = Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .env("LC_ALL", "C")
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_EDITOR", "true")
            .output()
            .map_err(|source| GitCommandError::Spawn {
                args: joined.clone(),
                source,
            })?;
        let output = GitOutput {
            code: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        };
        trace!(args = %joined, code = ?output.code, stderr = %output.stderr.trim(), "git finished");
        Ok(output)
    }

    /// Like [`GitCli::run`], but a non-zero exit becomes
    /// [`GitCommandError::Failed`].
    pub fn run_checked(&self, args: &[&str]) -> Result<GitOutput, GitCommandError> {
        let output = self.run(args)?;
        if output.success() {
            Ok(output)
        } else {
            Err(GitCommandError::Failed {
                args: args.join(" "),
                output,
            })
        }
    }
}
