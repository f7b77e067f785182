//! Advisory file locks, so several docsync processes serving the same
//! working copy serialize the way threads of one process do.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;

use fs4::fs_std::FileExt;

/// An OS-level lock on a file. Released when dropped.
#[derive(Debug)]
pub(crate) struct LockFile {
    _file: File,
}

impl LockFile {
    /// Block until no other holder of `path` remains.
    pub(crate) fn exclusive(path: &Path) -> io::Result<Self> {
        let file = open(path)?;
        FileExt::lock_exclusive(&file)?;
        Ok(Self { _file: file })
    }

    /// Block until no exclusive holder of `path` remains.
    pub(crate) fn shared(path: &Path) -> io::Result<Self> {
        let file = open(path)?;
        FileExt::lock_shared(&file)?;
        Ok(Self { _file: file })
    }
}

fn open(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}
