//! JSON response bodies and status codes for every operation.
//!
//! Client errors carry the error's message as `detail`. Server errors are
//! logged in full and the client only sees a generic message.

use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::error;

use crate::git::{CommitError, RepoError, SyncError};
use crate::place::{PathError, PlaceError};

const GENERIC_DETAIL: &str = "internal error; see the server log for details";

/// Error that knows how it is reported to a client.
pub trait ApiError: std::error::Error {
    /// HTTP-equivalent status code.
    fn status(&self) -> u16;

    /// Machine-readable error kind, e.g. `REBASE_CONFLICT`.
    fn code(&self) -> &'static str;

    fn detail(&self) -> String {
        if self.status() >= 500 {
            GENERIC_DETAIL.to_string()
        } else {
            self.to_string()
        }
    }

    /// Placement collisions answer with `{"collision": true}`.
    fn is_collision(&self) -> bool {
        false
    }
}

impl ApiError for PathError {
    fn status(&self) -> u16 {
        match self {
            PathError::RootUnavailable { .. } => 500,
            _ => 400,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            PathError::RootUnavailable { .. } => "INTERNAL_ERROR",
            _ => "INVALID_PATH",
        }
    }
}

impl ApiError for PlaceError {
    fn status(&self) -> u16 {
        match self {
            PlaceError::InvalidPath(e) => e.status(),
            PlaceError::InvalidAction(_) => 400,
            PlaceError::Collision(_) => 409,
            PlaceError::SourceNotFound(_) => 404,
            PlaceError::Internal { .. } => 500,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            PlaceError::InvalidPath(e) => e.code(),
            PlaceError::InvalidAction(_) => "INVALID_ACTION",
            PlaceError::Collision(_) => "COLLISION",
            PlaceError::SourceNotFound(_) => "SOURCE_NOT_FOUND",
            PlaceError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    fn is_collision(&self) -> bool {
        matches!(self, PlaceError::Collision(_))
    }
}

impl ApiError for RepoError {
    fn status(&self) -> u16 {
        match self {
            RepoError::UnknownRevision(_) => 404,
            RepoError::InvalidPath(e) => e.status(),
            RepoError::Open { .. }
            | RepoError::Bare(_)
            | RepoError::Lock { .. }
            | RepoError::Git(_) => 500,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            RepoError::UnknownRevision(_) => "UNKNOWN_REVISION",
            RepoError::InvalidPath(e) => e.code(),
            RepoError::Open { .. } | RepoError::Bare(_) => "REPO_UNAVAILABLE",
            RepoError::Lock { .. } => "LOCK_FAILED",
            RepoError::Git(_) => "GIT_ERROR",
        }
    }
}

impl ApiError for SyncError {
    fn status(&self) -> u16 {
        match self {
            SyncError::DetachedHead | SyncError::NoRemote(_) | SyncError::UnmergedFiles => 400,
            SyncError::RebaseConflict { .. }
            | SyncError::UnstashConflict
            | SyncError::NonFastForward { .. } => 409,
            SyncError::PushFailed(_) | SyncError::PushNotApplied { .. } | SyncError::Git(_) => 500,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            SyncError::DetachedHead => "HEAD_DETACHED",
            SyncError::NoRemote(_) => "NO_REMOTE",
            SyncError::UnmergedFiles => "UNMERGED_FILES",
            SyncError::RebaseConflict { .. } => "REBASE_CONFLICT",
            SyncError::UnstashConflict => "UNSTASH_CONFLICT",
            SyncError::NonFastForward { .. } => "NON_FAST_FORWARD",
            SyncError::PushFailed(_) => "PUSH_FAILED",
            SyncError::PushNotApplied { .. } => "PUSH_NOT_APPLIED",
            SyncError::Git(_) => "GIT_ERROR",
        }
    }
}

impl ApiError for CommitError {
    fn status(&self) -> u16 {
        match self {
            CommitError::DetachedHead => 400,
            CommitError::InvalidPath(e) => e.status(),
            CommitError::RemoteAhead(_) | CommitError::Diverged(_) => 409,
            CommitError::Git(_) => 500,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            CommitError::DetachedHead => "HEAD_DETACHED",
            CommitError::InvalidPath(e) => e.code(),
            CommitError::RemoteAhead(_) => "REMOTE_AHEAD",
            CommitError::Diverged(_) => "DIVERGED",
            CommitError::Git(_) => "GIT_ERROR",
        }
    }
}

/// A rendered reply: status code plus JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    /// 200 with `value` as the body.
    pub fn ok<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(body) => Self { status: 200, body },
            Err(e) => {
                error!(error = %e, "cannot serialize response body");
                Self::internal()
            }
        }
    }

    /// Like [`Response::ok`], with `"status": "success"` added to an object
    /// body.
    pub fn success<T: Serialize + ?Sized>(value: &T) -> Self {
        let mut resp = Self::ok(value);
        if resp.status == 200
            && let Value::Object(map) = &mut resp.body
        {
            map.insert("status".to_string(), Value::from("success"));
        }
        resp
    }

    pub fn error<E: ApiError + ?Sized>(err: &E) -> Self {
        let status = err.status();
        if status >= 500 {
            error!(code = err.code(), error = %err, source = ?err.source(), "request failed");
        }
        if err.is_collision() {
            return Self {
                status,
                body: json!({ "collision": true, "status": status }),
            };
        }
        let mut body = Map::new();
        body.insert("error".to_string(), Value::from(err.code()));
        body.insert("detail".to_string(), Value::from(err.detail()));
        body.insert("status".to_string(), Value::from(status));
        Self {
            status,
            body: Value::Object(body),
        }
    }

    fn internal() -> Self {
        Self {
            status: 500,
            body: json!({ "error": "INTERNAL_ERROR", "detail": GENERIC_DETAIL, "status": 500 }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status >= 400
    }
}

impl<T: Serialize, E: ApiError> From<Result<T, E>> for Response {
    fn from(r: Result<T, E>) -> Self {
        match r {
            Ok(v) => Response::ok(&v),
            Err(e) => Response::error(&e),
        }
    }
}
