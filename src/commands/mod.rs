//! Command implementations
//!
//! Every command works on the configuration directory and state file
//! resolved in [`crate::Context`].

pub mod apply;
pub mod graph;
pub mod output;
pub mod plan;
pub mod refresh;
pub mod state;
pub mod unlock;
pub mod validate;

use anyhow::{Context as AnyhowContext, Result};
use declarative::{
    Configuration, LocalStateStore, ProviderRegistry, StateLock, StateSnapshot, StateStore,
};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::Context;
use crate::cli::VarArgs;
use crate::providers;

/// Load and merge the configuration files under the working directory
pub(crate) fn load_config(ctx: &Context) -> Result<Configuration> {
    let config = Configuration::load(&ctx.dir)
        .with_context(|| format!("Failed to load configuration from {}", ctx.dir.display()))?;
    log::debug!(
        "Loaded {} resources, {} variables, {} outputs",
        config.resources.len(),
        config.variables.len(),
        config.outputs.len()
    );
    Ok(config)
}

/// Registry of every resource type this binary can manage
pub(crate) fn registry() -> ProviderRegistry {
    providers::builtin()
}

/// State store at the resolved state path
pub(crate) fn store(ctx: &Context) -> LocalStateStore {
    LocalStateStore::new(ctx.state_path.clone())
}

/// Acquire the state lock unless locking is disabled
///
/// The lock is released when the returned guard is dropped.
pub(crate) fn acquire_lock(
    ctx: &Context,
    store: &LocalStateStore,
    requested: Option<bool>,
    operation: &str,
) -> Result<Option<StateLock>> {
    if !requested.unwrap_or(ctx.settings.lock) {
        log::warn!("State locking disabled for {operation}");
        return Ok(None);
    }
    let lock = store.lock(operation)?;
    log::debug!("Acquired state lock {} for {operation}", lock.info().id);
    Ok(Some(lock))
}

/// Resolve input variables from defaults, environment and `--var` flags
pub(crate) fn variables(config: &Configuration, vars: &VarArgs) -> Result<BTreeMap<String, Value>> {
    Ok(config.resolve_variables(std::env::vars(), &vars.assignments())?)
}

/// Persist `updated` if it differs from what was loaded
///
/// Returns whether anything was written.
pub(crate) fn persist_if_changed(
    store: &LocalStateStore,
    loaded: &StateSnapshot,
    mut updated: StateSnapshot,
) -> Result<bool> {
    if updated == *loaded {
        log::debug!("State unchanged, not persisting");
        return Ok(false);
    }
    store
        .persist(&mut updated)
        .with_context(|| format!("Failed to write state to {}", store.path().display()))?;
    log::info!(
        "Persisted state serial {} to {}",
        updated.serial,
        store.path().display()
    );
    Ok(true)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::Context;
    use crate::config::Settings;
    use std::fs;
    use std::path::Path;

    /// Context rooted in `dir` with the given configuration file content
    pub fn context(dir: &Path, config: &str) -> Context {
        fs::write(dir.join("main.tf.toml"), config).unwrap();
        Context {
            verbose: 0,
            quiet: true,
            dir: dir.to_path_buf(),
            state_path: dir.join("terrace.tfstate"),
            settings: Settings::default(),
        }
    }
}
