//! Crate entry point for **docsync**.
//!
//! The backend core of a web markdown editor: safe placement of files
//! below a documents root ([`place`]) and synchronization of the enclosing
//! git working copy with its remote ([`git`]). [`api`] turns results into
//! the JSON bodies and status codes clients see, [`commands`] drives both
//! from the `docsync` CLI.

pub mod api;
pub mod commands;
pub mod git;
mod lockfile;
pub mod logging;
pub mod paths;
pub mod place;
mod progress;
pub mod settings;

pub use api::{ApiError, Response};
pub use git::{CommitEngine, GitSyncEngine, RepositoryHandle};
pub use place::{CollisionPolicy, CollisionResolver, Payload, Placement};
pub use settings::{Config, load_config};
