//! Translation of `git` tool output into structured outcomes.
//!
//! This is the only place that inspects git's human-readable messages.
//! Everything above it works with the enums defined here.

use super::cli::GitOutput;

/// Result of `git pull --rebase`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    Applied,
    /// A stale `ORIG_HEAD` lock blocked the rebase; removing it and retrying
    /// is safe.
    LockContention,
    /// The rebase stopped on conflicts. Carries the first conflict line.
    Conflict(String),
    Failed,
}

/// Result of `git stash pop`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StashPopOutcome {
    Restored,
    /// The stash could not be applied cleanly; git keeps the entry.
    Conflict,
    Failed,
}

/// Per-ref status flag of `git push --porcelain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushFlag {
    FastForward,
    Forced,
    Deleted,
    NewRef,
    Rejected,
    UpToDate,
}

impl PushFlag {
    fn from_char(c: char) -> Option<Self> {
        Some(match c {
            ' ' => Self::FastForward,
            '+' => Self::Forced,
            '-' => Self::Deleted,
            '*' => Self::NewRef,
            '!' => Self::Rejected,
            '=' => Self::UpToDate,
            _ => return None,
        })
    }
}

/// One ref line of `git push --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRecord {
    pub flag: PushFlag,
    pub from: String,
    pub to: String,
    pub summary: String,
}

/// Result of `git push --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushVerdict {
    Accepted(Vec<PushRecord>),
    NonFastForward(String),
    Rejected(String),
    Failed,
}

fn is_conflict_text(text: &str) -> bool {
    text.contains("CONFLICT")
        || text.contains("could not apply")
        || text.contains("Resolve all conflicts manually")
        || text.contains("needs merge")
}

fn is_non_fast_forward(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    lower.contains("non-fast-forward") || lower.contains("fetch first")
}

pub fn classify_pull(out: &GitOutput) -> PullOutcome {
    if out.success() {
        return PullOutcome::Applied;
    }
    let text = out.combined();
    if text.contains("cannot lock ref") && text.contains("ORIG_HEAD") {
        return PullOutcome::LockContention;
    }
    if is_conflict_text(&text) {
        let line = text
            .lines()
            .find(|l| l.contains("CONFLICT") || l.contains("could not apply"))
            .unwrap_or("conflict")
            .trim()
            .to_string();
        return PullOutcome::Conflict(line);
    }
    PullOutcome::Failed
}

pub fn classify_stash_pop(out: &GitOutput) -> StashPopOutcome {
    if out.success() {
        return StashPopOutcome::Restored;
    }
    let text = out.combined();
    if is_conflict_text(&text)
        || text.contains("already exists, no checkout")
        || text.contains("could not restore untracked files")
        || text.contains("would be overwritten")
    {
        return StashPopOutcome::Conflict;
    }
    StashPopOutcome::Failed
}

/// Parse the ref lines of `git push --porcelain` stdout. `To <url>` and
/// `Done` lines are skipped.
pub fn parse_push_porcelain(stdout: &str) -> Vec<PushRecord> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut chars = line.chars();
            let flag = PushFlag::from_char(chars.next()?)?;
            let rest = chars.as_str().strip_prefix('\t')?;
            let (refs, summary) = rest.split_once('\t')?;
            let (from, to) = refs.split_once(':')?;
            Some(PushRecord {
                flag,
                from: from.to_string(),
                to: to.to_string(),
                summary: summary.trim().to_string(),
            })
        })
        .collect()
}

pub fn classify_push(out: &GitOutput) -> PushVerdict {
    let records = parse_push_porcelain(&out.stdout);
    if let Some(rejected) = records.iter().find(|r| r.flag == PushFlag::Rejected) {
        return if is_non_fast_forward(&rejected.summary) {
            PushVerdict::NonFastForward(rejected.summary.clone())
        } else {
            PushVerdict::Rejected(rejected.summary.clone())
        };
    }
    if !out.success() {
        let text = out.combined();
        if is_non_fast_forward(&text) {
            let line = text
                .lines()
                .find(|l| is_non_fast_forward(l))
                .unwrap_or("non-fast-forward")
                .trim()
                .to_string();
            return PushVerdict::NonFastForward(line);
        }
        return PushVerdict::Failed;
    }
    PushVerdict::Accepted(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn out(code: i32, stdout: &str, stderr: &str) -> GitOutput {
        GitOutput {
            code: Some(code),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn pull_success_is_applied() {
        assert_eq!(
            classify_pull(&out(0, "Successfully rebased and updated refs/heads/main.", "")),
            PullOutcome::Applied
        );
    }

    #[test]
    fn pull_conflict_carries_first_conflict_line() {
        let o = out(
            1,
            "Auto-merging docs/a.md\nCONFLICT (content): Merge conflict in docs/a.md\n",
            "error: could not apply 1a2b3c4... edit a\nhint: Resolve all conflicts manually\n",
        );
        assert_eq!(
            classify_pull(&o),
            PullOutcome::Conflict("CONFLICT (content): Merge conflict in docs/a.md".into())
        );
    }

    #[test]
    fn pull_lock_on_orig_head_is_retryable() {
        let o = out(
            128,
            "",
            "error: cannot lock ref 'ORIG_HEAD': Unable to create '.git/ORIG_HEAD.lock': File exists.",
        );
        assert_eq!(classify_pull(&o), PullOutcome::LockContention);
    }

    #[test]
    fn pull_other_lock_or_network_failure_is_failed() {
        let o = out(128, "", "error: cannot lock ref 'refs/heads/main': is at abc but expected def");
        assert_eq!(classify_pull(&o), PullOutcome::Failed);
        let o = out(1, "", "fatal: unable to access 'https://example.com/': Could not resolve host");
        assert_eq!(classify_pull(&o), PullOutcome::Failed);
    }

    #[test]
    fn stash_pop_variants() {
        assert_eq!(classify_stash_pop(&out(0, "Dropped refs/stash@{0}", "")), StashPopOutcome::Restored);
        assert_eq!(
            classify_stash_pop(&out(1, "CONFLICT (content): Merge conflict in docs/a.md\nThe stash entry is kept in case you need it again.", "")),
            StashPopOutcome::Conflict
        );
        assert_eq!(
            classify_stash_pop(&out(1, "", "docs/new.md already exists, no checkout\nerror: could not restore untracked files from stash")),
            StashPopOutcome::Conflict
        );
        assert_eq!(
            classify_stash_pop(&out(1, "", "error: refs/stash@{0} is not a valid reference")),
            StashPopOutcome::Failed
        );
    }

    #[test]
    fn porcelain_lines_are_parsed() {
        let stdout = "To /tmp/remote.git\n \trefs/heads/main:refs/heads/main\t1a2b3c4..5d6e7f8\n*\trefs/heads/x:refs/heads/x\t[new branch]\nDone\n";
        let recs = parse_push_porcelain(stdout);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].flag, PushFlag::FastForward);
        assert_eq!(recs[0].from, "refs/heads/main");
        assert_eq!(recs[0].to, "refs/heads/main");
        assert_eq!(recs[0].summary, "1a2b3c4..5d6e7f8");
        assert_eq!(recs[1].flag, PushFlag::NewRef);
        assert_eq!(recs[1].summary, "[new branch]");
    }

    #[test]
    fn push_rejections_are_told_apart() {
        let nff = out(1, "To r\n!\trefs/heads/main:refs/heads/main\t[rejected] (fetch first)\nDone\n", "");
        assert_eq!(classify_push(&nff), PushVerdict::NonFastForward("[rejected] (fetch first)".into()));

        let nff2 = out(1, "!\trefs/heads/main:refs/heads/main\t[rejected] (non-fast-forward)\n", "");
        assert!(matches!(classify_push(&nff2), PushVerdict::NonFastForward(_)));

        let hook = out(1, "!\trefs/heads/main:refs/heads/main\t[remote rejected] (pre-receive hook declined)\n", "");
        assert_eq!(
            classify_push(&hook),
            PushVerdict::Rejected("[remote rejected] (pre-receive hook declined)".into())
        );
    }

    #[test]
    fn push_without_records() {
        let ok = out(0, "To r\n=\trefs/heads/main:refs/heads/main\t[up to date]\nDone\n", "");
        match classify_push(&ok) {
            PushVerdict::Accepted(recs) => assert_eq!(recs[0].flag, PushFlag::UpToDate),
            other => panic!("unexpected {other:?}"),
        }
        let broken = out(128, "", "fatal: 'nowhere' does not appear to be a git repository");
        assert_eq!(classify_push(&broken), PushVerdict::Failed);
    }
}
