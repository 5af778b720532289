//! Centralized path resolution for terrace
//!
//! # Environment Variables
//!
//! - `TERRACE_CONFIG_DIR` - Override the settings directory
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `TERRACE_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/terrace` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\terrace`
//!    - macOS/Linux: `~/.config/terrace`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "TERRACE_CONFIG_DIR";

/// Settings file name inside the config directory
pub const SETTINGS_FILE: &str = "settings.toml";

/// Get the terrace config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("terrace");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            let path = app_data.join("terrace");
            log::debug!("Using Windows config dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("terrace");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Path of the settings file
pub fn settings_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(SETTINGS_FILE))
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as-is.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

/// Expand a path and resolve it against `base` if it is relative
pub fn resolve(base: &Path, path: &str) -> PathBuf {
    let expanded = expand(path);
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// Helper to run a test with temporary env var
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: Tests run in isolation and don't read env vars concurrently
        unsafe { env::set_var(key, value) };
        let result = f();
        match original {
            // SAFETY: Tests run in isolation
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    #[test]
    fn test_config_dir_env_override() {
        with_env_var(ENV_CONFIG_DIR, "/custom/terrace", || {
            assert_eq!(config_dir().unwrap(), PathBuf::from("/custom/terrace"));
            assert_eq!(
                settings_file().unwrap(),
                PathBuf::from("/custom/terrace/settings.toml")
            );
        });
    }

    #[test]
    fn test_expand_with_tilde() {
        let result = expand("~/infra/state");
        let home = dirs::home_dir().unwrap();
        assert_eq!(result, home.join("infra").join("state"));
    }

    #[test]
    fn test_expand_unknown_env_var_unchanged() {
        let result = expand("/path/$TERRACE_NONEXISTENT_12345/file");
        assert_eq!(result, PathBuf::from("/path/$TERRACE_NONEXISTENT_12345/file"));
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let base = Path::new("/work/infra");
        assert_eq!(
            resolve(base, "terrace.tfstate"),
            PathBuf::from("/work/infra/terrace.tfstate")
        );
        assert_eq!(resolve(base, "/var/state.json"), PathBuf::from("/var/state.json"));
    }
}
