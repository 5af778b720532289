//! Tool settings
//!
//! Settings come from `settings.toml` in the config directory. Environment
//! variables and command-line flags are layered on top by the CLI.

use anyhow::{Context, Result};
use declarative::DEFAULT_PARALLELISM;
use declarative::state::DEFAULT_STATE_FILE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::paths;

/// Persistent defaults for terrace commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Maximum number of concurrent resource operations
    pub parallelism: usize,
    /// State file, relative to the configuration directory
    pub state_path: String,
    /// Lock state during operations that write it
    pub lock: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            parallelism: DEFAULT_PARALLELISM,
            state_path: DEFAULT_STATE_FILE.to_string(),
            lock: true,
        }
    }
}

impl Settings {
    /// Load settings from the config directory, falling back to defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::settings_file()?)
    }

    /// Load settings from a specific file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let settings: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid settings file {}", path.display()))?;
        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }
}
