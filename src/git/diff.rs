use git2::{Delta, DiffDelta};
use serde::Serialize;

/// Change kind of one path. Serialized as the single-letter codes the
/// editor's diff view expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiffStatus {
    #[serde(rename = "A")]
    Added,
    #[serde(rename = "M")]
    Modified,
    #[serde(rename = "D")]
    Deleted,
    #[serde(rename = "R")]
    Renamed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffEntry {
    pub old_path: Option<String>,
    pub new_path: Option<String>,
    pub status: DiffStatus,
}

impl DiffEntry {
    pub fn added(path: impl Into<String>) -> Self {
        Self {
            old_path: None,
            new_path: Some(path.into()),
            status: DiffStatus::Added,
        }
    }

    /// The path the entry is best known by: the new one, or the old one
    /// for deletions.
    pub fn path(&self) -> Option<&str> {
        self.new_path.as_deref().or(self.old_path.as_deref())
    }
}

fn path_of(file: git2::DiffFile<'_>) -> Option<String> {
    file.path().map(|p| p.to_string_lossy().replace('\\', "/"))
}

/// Map a git2 delta onto a [`DiffEntry`]. Unmodified, ignored and untracked
/// deltas yield `None`; callers that want untracked files handle them
/// separately.
pub fn entry_from_delta(delta: &DiffDelta<'_>) -> Option<DiffEntry> {
    let old = path_of(delta.old_file());
    let new = path_of(delta.new_file());
    let (old_path, new_path, status) = match delta.status() {
        Delta::Added | Delta::Copied => (None, new, DiffStatus::Added),
        Delta::Deleted => (old, None, DiffStatus::Deleted),
        Delta::Renamed => (old, new, DiffStatus::Renamed),
        Delta::Modified | Delta::Typechange | Delta::Conflicted => {
            (old.clone(), new.or(old), DiffStatus::Modified)
        }
        Delta::Unmodified | Delta::Ignored | Delta::Untracked | Delta::Unreadable => return None,
    };
    Some(DiffEntry {
        old_path,
        new_path,
        status,
    })
}
