use anyhow::{Result, anyhow};
use std::{env, path::PathBuf};

/// Directory holding docsync's own files: `$XDG_CONFIG_HOME/.docsync`
/// or `~/.config/.docsync`.
pub fn docsync_home() -> Result<PathBuf> {
    let base = match env::var_os("XDG_CONFIG_HOME") {
        Some(xdg) if !xdg.is_empty() => PathBuf::from(xdg),
        _ => {
            let home = env::var_os("HOME")
                .filter(|h| !h.is_empty())
                .ok_or_else(|| anyhow!("neither XDG_CONFIG_HOME nor HOME is set"))?;
            PathBuf::from(home).join(".config")
        }
    };
    Ok(base.join(".docsync"))
}

/// Default location of `config.toml`.
pub fn default_config_path() -> Result<PathBuf> {
    Ok(docsync_home()?.join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    struct EnvGuard(Vec<(&'static str, Option<std::ffi::OsString>)>);

    impl EnvGuard {
        fn capture(keys: &[&'static str]) -> Self {
            Self(keys.iter().map(|k| (*k, env::var_os(k))).collect())
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (k, v) in &self.0 {
                // SAFETY: tests touching the environment run under #[serial].
                unsafe {
                    match v {
                        Some(v) => env::set_var(k, v),
                        None => env::remove_var(k),
                    }
                }
            }
        }
    }

    #[test]
    #[serial]
    fn home_prefers_xdg_config_home() {
        let _g = EnvGuard::capture(&["XDG_CONFIG_HOME", "HOME"]);
        unsafe {
            env::set_var("XDG_CONFIG_HOME", "/tmp/xdg");
            env::set_var("HOME", "/home/someone");
        }
        assert_eq!(docsync_home().unwrap(), PathBuf::from("/tmp/xdg/.docsync"));
        assert_eq!(
            default_config_path().unwrap(),
            PathBuf::from("/tmp/xdg/.docsync/config.toml")
        );
    }

    #[test]
    #[serial]
    fn home_falls_back_to_dot_config() {
        let _g = EnvGuard::capture(&["XDG_CONFIG_HOME", "HOME"]);
        unsafe {
            env::remove_var("XDG_CONFIG_HOME");
            env::set_var("HOME", "/home/someone");
        }
        assert_eq!(
            docsync_home().unwrap(),
            PathBuf::from("/home/someone/.config/.docsync")
        );
    }
}
