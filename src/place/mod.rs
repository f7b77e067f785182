//! Safe placement of incoming files below the documents root.
//!
//! [`path`] confines caller-supplied paths, [`CollisionResolver`] decides
//! where a file finally lands under a [`CollisionPolicy`] and performs the
//! move or copy.

mod collision;
mod increment;
mod locks;
pub mod path;

use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

pub use collision::{CollisionResolver, Payload};
pub use path::{PathError, RelativePath, normalize, resolve, resolve_dir, sanitize_filename};

/// What to do when the destination already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Refuse with [`PlaceError::Collision`].
    #[default]
    Check,
    /// Replace the existing file.
    Overwrite,
    /// Pick the next free numbered sibling name.
    Increment,
}

impl FromStr for CollisionPolicy {
    type Err = PlaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "check" => Ok(Self::Check),
            "overwrite" => Ok(Self::Overwrite),
            "increment" => Ok(Self::Increment),
            other => Err(PlaceError::InvalidAction(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementStatus {
    Saved,
    NoChange,
}

/// Outcome of a successful placement. `new_path` is where the file is now;
/// callers must use it, since under `increment` it differs from the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub status: PlacementStatus,
    #[serde(rename = "newPath")]
    pub new_path: RelativePath,
}

#[derive(Debug, Error)]
pub enum PlaceError {
    #[error(transparent)]
    InvalidPath(#[from] PathError),
    #[error("invalid action {0:?}, expected check, overwrite or increment")]
    InvalidAction(String),
    #[error("destination already exists: {0}")]
    Collision(RelativePath),
    #[error("source does not exist: {0}")]
    SourceNotFound(RelativePath),
    #[error("i/o failure at {}: {source}", .path.display())]
    Internal {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PlaceError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> PlaceError {
        let path = path.into();
        move |source| PlaceError::Internal { path, source }
    }
}
