use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Top-level configuration loaded from `config.toml`.
///
/// Every key is optional. A missing file yields [`Config::default`].
///
/// Example TOML:
/// ```toml
/// repo_dir   = "/srv/notes"
/// docs_dir   = "docs"
/// static_dir = "_static"
/// remote     = "origin"
///
/// [author]
/// name  = "Editor Bot"
/// email = "editor@example.com"
/// ```
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Git working copy that holds the documents.
    pub repo_dir: PathBuf,
    /// Documents directory, relative to `repo_dir`.
    pub docs_dir: String,
    /// Image folder, relative to `docs_dir`.
    pub static_dir: String,
    /// Remote used for fetch, pull and push.
    pub remote: String,
    /// Untracked files are only reported by working-tree diffs when they
    /// carry this extension. Empty means "report everything".
    pub doc_extension: String,
    pub author: Author,
}

/// Fallback commit signature, used when git config has no `user.name`.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repo_dir: PathBuf::from("."),
            docs_dir: "docs".to_string(),
            static_dir: "_static".to_string(),
            remote: "origin".to_string(),
            doc_extension: "md".to_string(),
            author: Author::default(),
        }
    }
}

impl Default for Author {
    fn default() -> Self {
        Self {
            name: "docsync".to_string(),
            email: "docsync@localhost".to_string(),
        }
    }
}

/// Load and parse `config.toml` at `path`.
///
/// # Errors
/// - Returns an error if the file exists but cannot be read.
/// - Returns an error if parsing the TOML fails; the message names the path.
pub fn load_config(path: &Path) -> Result<Config> {
    let txt = match fs::read_to_string(path) {
        Ok(txt) => txt,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Config::default()),
        Err(e) => {
            return Err(e).with_context(|| format!("cannot read config: {}", path.display()));
        }
    };
    let cfg: Config = toml::from_str(&txt)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_gives_defaults() {
        let td = tempdir().unwrap();
        let cfg = load_config(&td.path().join("nope.toml")).unwrap();
        assert_eq!(cfg.docs_dir, "docs");
        assert_eq!(cfg.remote, "origin");
        assert_eq!(cfg.static_dir, "_static");
        assert_eq!(cfg.doc_extension, "md");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.toml");
        fs::write(
            &p,
            "repo_dir = \"/srv/notes\"\nremote = \"upstream\"\n[author]\nname = \"Bot\"\n",
        )
        .unwrap();
        let cfg = load_config(&p).unwrap();
        assert_eq!(cfg.repo_dir, PathBuf::from("/srv/notes"));
        assert_eq!(cfg.remote, "upstream");
        assert_eq!(cfg.docs_dir, "docs");
        assert_eq!(cfg.author.name, "Bot");
        assert_eq!(cfg.author.email, "docsync@localhost");
    }

    #[test]
    fn invalid_toml_names_the_file() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.toml");
        fs::write(&p, "remote = [").unwrap();
        let err = load_config(&p).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));
    }
}
