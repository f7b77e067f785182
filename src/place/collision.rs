use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::debug;

use super::increment::next_free_name;
use super::locks::PathLocks;
use super::path::{PathError, RelativePath, normalize, resolve_normalized, sanitize_filename};
use super::{CollisionPolicy, PlaceError, Placement, PlacementStatus};
use crate::lockfile::LockFile;

/// Where the bytes of a placement come from.
pub enum Payload<'a> {
    /// Stream an uploaded body into the destination.
    Upload(&'a mut dyn Read),
    /// Rename an existing file (relative to the same root).
    Move(&'a str),
}

enum Incoming<'a> {
    Stream(&'a mut dyn Read),
    File(PathBuf),
}

/// Places files below one root, serializing placements per destination
/// directory so an existence check and the write that follows it cannot
/// interleave with another placement. Threads are held apart by `locks`,
/// processes by one lock file per directory under `lock_dir`.
pub struct CollisionResolver {
    root: PathBuf,
    locks: PathLocks,
    lock_dir: PathBuf,
}

fn saved(new_path: RelativePath) -> Placement {
    Placement {
        status: PlacementStatus::Saved,
        new_path,
    }
}

fn exists(p: &Path) -> bool {
    fs::symlink_metadata(p).is_ok()
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

impl CollisionResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: PathLocks::new(),
            lock_dir: std::env::temp_dir().join("docsync-locks"),
        }
    }

    /// Keep directory lock files in `dir`. Resolvers that should exclude
    /// each other must share it.
    pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = dir.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Place `payload` at `destination` under `policy`.
    ///
    /// Parent directories of the destination are created first. On success
    /// the returned path holds the content; the only other change to the
    /// tree is the replaced file under `overwrite`, or the vacated source of
    /// a move.
    ///
    /// # Errors
    /// - [`PlaceError::InvalidPath`] if either path escapes the root.
    /// - [`PlaceError::Collision`] under `check` when the destination exists.
    /// - [`PlaceError::SourceNotFound`] when a move source is missing.
    /// - [`PlaceError::Internal`] for any other I/O failure.
    pub fn place(
        &self,
        destination: &str,
        policy: CollisionPolicy,
        payload: Payload<'_>,
    ) -> Result<Placement, PlaceError> {
        let dest_rel = normalize(destination)?;
        if dest_rel.is_root() {
            return Err(PathError::Empty.into());
        }
        let dest = resolve_normalized(&self.root, &dest_rel)?;
        let Some(dir) = dest.parent() else {
            return Err(PathError::Empty.into());
        };
        fs::create_dir_all(dir).map_err(PlaceError::io(dir))?;
        let dir_key = fs::canonicalize(dir).map_err(PlaceError::io(dir))?;
        let _guard = self.locks.lock(&dir_key);
        let _file_guard = self.dir_lock(&dir_key)?;

        let incoming = match payload {
            Payload::Upload(reader) => Incoming::Stream(reader),
            Payload::Move(src) => Incoming::File(self.move_source(src)?),
        };

        let same_as_source =
            matches!(&incoming, Incoming::File(src) if same_file(src, &dest));

        let placed = match policy {
            CollisionPolicy::Check => {
                if same_as_source {
                    return Ok(self.unchanged(dest_rel));
                }
                if exists(&dest) {
                    return Err(PlaceError::Collision(dest_rel));
                }
                match write(incoming, &dir_key, &dest, false) {
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                        return Err(PlaceError::Collision(dest_rel));
                    }
                    other => other.map_err(PlaceError::io(&dest))?,
                }
                dest_rel
            }
            CollisionPolicy::Overwrite => {
                if same_as_source {
                    return Ok(self.unchanged(dest_rel));
                }
                write(incoming, &dir_key, &dest, true).map_err(PlaceError::io(&dest))?;
                dest_rel
            }
            CollisionPolicy::Increment => {
                let requested = dest_rel.file_name().unwrap_or_default();
                let name = next_free_name(&dir_key, requested);
                let target = dir_key.join(&name);
                write(incoming, &dir_key, &target, false).map_err(PlaceError::io(&target))?;
                dest_rel.with_file_name(&name)
            }
        };

        debug!(path = %placed, ?policy, "placed file");
        Ok(saved(placed))
    }

    fn dir_lock(&self, dir: &Path) -> Result<LockFile, PlaceError> {
        let digest = Sha256::digest(dir.as_os_str().as_encoded_bytes());
        let path = self.lock_dir.join(format!("{}.lock", hex::encode(digest)));
        LockFile::exclusive(&path).map_err(PlaceError::io(&path))
    }

    /// Upload an image below `static_dir`.
    ///
    /// `folder` is forced under `static_dir` when it does not already start
    /// with it, and the file name is sanitized before placement.
    pub fn place_image(
        &self,
        static_dir: &str,
        folder: &str,
        file_name: &str,
        policy: CollisionPolicy,
        reader: &mut dyn Read,
    ) -> Result<Placement, PlaceError> {
        let static_rel = normalize(static_dir)?;
        let folder_rel = normalize(folder)?;
        let folder_rel = if folder_rel.starts_with(&static_rel) {
            folder_rel
        } else {
            static_rel.join(&folder_rel)
        };
        let name = normalize(&sanitize_filename(file_name))?;
        if name.is_root() {
            return Err(PathError::Empty.into());
        }
        let dest = folder_rel.join(&name);
        self.place(dest.as_str(), policy, Payload::Upload(reader))
    }

    fn move_source(&self, src: &str) -> Result<PathBuf, PlaceError> {
        let rel = normalize(src)?;
        if rel.is_root() {
            return Err(PathError::Empty.into());
        }
        let abs = resolve_normalized(&self.root, &rel)?;
        if !exists(&abs) {
            return Err(PlaceError::SourceNotFound(rel));
        }
        Ok(abs)
    }

    fn unchanged(&self, path: RelativePath) -> Placement {
        debug!(%path, "source and destination are the same file");
        Placement {
            status: PlacementStatus::NoChange,
            new_path: path,
        }
    }
}

/// Move or stream `incoming` to `dest`. With `clobber == false` an existing
/// destination yields `AlreadyExists` for streamed uploads.
fn write(incoming: Incoming<'_>, dir: &Path, dest: &Path, clobber: bool) -> io::Result<()> {
    match incoming {
        Incoming::File(src) => fs::rename(src, dest),
        Incoming::Stream(reader) => {
            let mut tmp = NamedTempFile::new_in(dir)?;
            io::copy(reader, tmp.as_file_mut())?;
            tmp.as_file().sync_all()?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                tmp.as_file()
                    .set_permissions(fs::Permissions::from_mode(0o644))?;
            }
            let persisted = if clobber {
                tmp.persist(dest)
            } else {
                tmp.persist_noclobber(dest)
            };
            persisted.map(|_| ()).map_err(|e| e.error)
        }
    }
}
