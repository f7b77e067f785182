//! Path normalization and root confinement.
//!
//! Every caller-supplied path goes through [`normalize`] before it touches
//! the filesystem, and through [`resolve`] before it is opened. `resolve`
//! re-checks containment after canonicalization, so a gap in `normalize`
//! or a symlink inside the root still cannot reach outside it.

use serde::Serialize;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const MAX_LINK_HOPS: usize = 40;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("invalid path {0:?}: directory traversal detected")]
    Traversal(String),
    #[error("invalid path {0:?}: resolves outside the root")]
    OutsideRoot(String),
    #[error("invalid path: refers to the root itself")]
    Empty,
    #[error("root {path} is unavailable: {source}")]
    RootUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A normalized, `/`-separated path below some root.
///
/// Never contains `..`, `.` or empty segments, and never starts with `/`.
/// The empty value denotes the root itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RelativePath(String);

impl RelativePath {
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    pub fn file_name(&self) -> Option<&str> {
        self.segments().last()
    }

    pub fn parent(&self) -> RelativePath {
        match self.0.rfind('/') {
            Some(i) => Self(self.0[..i].to_string()),
            None => Self::root(),
        }
    }

    /// Append an already-normalized relative path.
    pub fn join(&self, other: &RelativePath) -> RelativePath {
        match (self.is_root(), other.is_root()) {
            (true, _) => other.clone(),
            (_, true) => self.clone(),
            _ => Self(format!("{}/{}", self.0, other.0)),
        }
    }

    pub fn with_file_name(&self, name: &str) -> RelativePath {
        let parent = self.parent();
        if parent.is_root() {
            Self(name.to_string())
        } else {
            Self(format!("{}/{}", parent.0, name))
        }
    }

    pub fn starts_with(&self, prefix: &RelativePath) -> bool {
        prefix.is_root()
            || self.0 == prefix.0
            || (self.0.starts_with(&prefix.0) && self.0[prefix.0.len()..].starts_with('/'))
    }

    pub fn to_path_buf(&self) -> PathBuf {
        self.segments().collect()
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RelativePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Strip one leading absolute or relative marker, if any.
fn strip_marker(s: &str) -> Option<&str> {
    if let Some(rest) = s.strip_prefix("../") {
        return Some(rest);
    }
    if let Some(rest) = s.strip_prefix("./") {
        return Some(rest);
    }
    if let Some(rest) = s.strip_prefix('/') {
        return Some(rest);
    }
    // drive letter, e.g. `C:/`
    let b = s.as_bytes();
    if b.len() >= 3 && b[0].is_ascii_alphabetic() && b[1] == b':' && b[2] == b'/' {
        return Some(&s[3..]);
    }
    None
}

/// Normalize a caller-supplied relative path.
///
/// Backslashes become `/`, leading `./`, `../`, `/` and drive markers are
/// stripped repeatedly, empty and `.` segments are dropped and `..` is
/// collapsed against the preceding segment. Any `..` left after that is a
/// traversal attempt.
pub fn normalize(path: &str) -> Result<RelativePath, PathError> {
    let converted = path.replace('\\', "/");
    let mut s = converted.trim();
    while let Some(rest) = strip_marker(s) {
        s = rest;
    }

    let mut out: Vec<&str> = Vec::new();
    for seg in s.split('/') {
        match seg {
            "" | "." => {}
            ".." => match out.last() {
                Some(last) if *last != ".." => {
                    out.pop();
                }
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }

    if out.contains(&"..") {
        return Err(PathError::Traversal(path.to_string()));
    }
    Ok(RelativePath(out.join("/")))
}

/// Canonicalize the deepest existing ancestor of `path` and re-append the
/// missing tail. Dangling symlinks along the way are followed through their
/// target so a link cannot smuggle a write outside the root.
fn canonicalize_lenient(path: &Path, hops: usize) -> io::Result<PathBuf> {
    let mut tail: Vec<OsString> = Vec::new();
    let mut cur = path.to_path_buf();
    loop {
        match fs::canonicalize(&cur) {
            Ok(mut c) => {
                for t in tail.iter().rev() {
                    c.push(t);
                }
                return Ok(c);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if let Ok(meta) = fs::symlink_metadata(&cur)
                    && meta.file_type().is_symlink()
                {
                    if hops >= MAX_LINK_HOPS {
                        return Err(io::Error::other("too many symbolic links"));
                    }
                    let target = fs::read_link(&cur)?;
                    let abs = match cur.parent() {
                        Some(p) if target.is_relative() => p.join(target),
                        _ => target,
                    };
                    let mut c = canonicalize_lenient(&abs, hops + 1)?;
                    for t in tail.iter().rev() {
                        c.push(t);
                    }
                    return Ok(c);
                }
                let name = cur.file_name().map(|n| n.to_os_string()).ok_or(e)?;
                tail.push(name);
                if !cur.pop() {
                    return Err(io::Error::from(io::ErrorKind::NotFound));
                }
            }
            Err(e) => return Err(e),
        }
    }
}

fn canonical_root(root: &Path) -> Result<PathBuf, PathError> {
    fs::canonicalize(root).map_err(|source| PathError::RootUnavailable {
        path: root.to_path_buf(),
        source,
    })
}

/// Join an already-normalized path onto `root` and verify containment.
///
/// The returned path is rooted at the canonical root but keeps the
/// caller's components (symlinks are not substituted).
pub fn resolve_normalized(root: &Path, rel: &RelativePath) -> Result<PathBuf, PathError> {
    let root_c = canonical_root(root)?;
    if rel.is_root() {
        return Ok(root_c);
    }
    let joined = root_c.join(rel.to_path_buf());
    let checked = canonicalize_lenient(&joined, 0)
        .map_err(|_| PathError::OutsideRoot(rel.to_string()))?;
    if !checked.starts_with(&root_c) {
        return Err(PathError::OutsideRoot(rel.to_string()));
    }
    Ok(joined)
}

/// Resolve a file path below `root`. The root itself is rejected.
pub fn resolve(root: &Path, path: &str) -> Result<PathBuf, PathError> {
    let rel = normalize(path)?;
    if rel.is_root() {
        return Err(PathError::Empty);
    }
    resolve_normalized(root, &rel)
}

/// Resolve a directory path below `root`; the root itself is allowed.
pub fn resolve_dir(root: &Path, path: &str) -> Result<PathBuf, PathError> {
    let rel = normalize(path)?;
    resolve_normalized(root, &rel)
}

/// Make an uploaded file name safe to store.
///
/// Directory components are dropped; every stem character outside
/// `[A-Za-z0-9_-]` becomes `_`. The extension is kept.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let (stem, ext) = super::increment::split_ext(base);
    let stem: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let ext: String = ext
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.')
        .collect();
    format!("{stem}{ext}")
}
