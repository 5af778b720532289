//! `terrace refresh`

use anyhow::Result;
use declarative::StateStore;

use super::{acquire_lock, persist_if_changed, registry, store};
use crate::cli::RefreshArgs;
use crate::{Context, ui};

/// Read every resource in state and record what actually exists
pub fn run(ctx: &Context, args: &RefreshArgs) -> Result<()> {
    let registry = registry();
    let store = store(ctx);
    let _lock = acquire_lock(ctx, &store, args.lock, "refresh")?;
    let state = store.load()?;

    let (refreshed, drifted) = declarative::refresh(&state, &registry, ctx.verbose > 0)?;

    for address in &drifted {
        if refreshed.contains(address) {
            ui::warn(&format!("{address} changed outside of terrace"));
        } else {
            ui::warn(&format!("{address} no longer exists, removed from state"));
        }
    }

    persist_if_changed(&store, &state, refreshed)?;
    if !ctx.quiet {
        ui::success(&format!(
            "Refreshed {} resources, {} drifted",
            state.resources.len(),
            drifted.len()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{ApplyArgs, VarArgs};
    use crate::commands::{apply, test_support::context};
    use declarative::{LocalStateStore, PlanMode, ResourceAddress};
    use std::fs;

    #[test]
    fn test_refresh_drops_deleted_objects() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("motd");
        let ctx = context(
            dir.path(),
            &format!(
                "[resource.local_file.motd]\nfilename = \"{}\"\ncontent = \"hi\"\n",
                file.display()
            ),
        );
        let args = ApplyArgs {
            auto_approve: true,
            parallelism: None,
            target: Vec::new(),
            refresh: true,
            vars: VarArgs::default(),
            lock: None,
        };
        apply::run(&ctx, &args, PlanMode::Normal).unwrap();

        fs::remove_file(&file).unwrap();
        run(&ctx, &RefreshArgs { lock: None }).unwrap();

        let state = LocalStateStore::new(&ctx.state_path).load().unwrap();
        assert!(!state.contains(&ResourceAddress::new("local_file", "motd")));
        assert!(LocalStateStore::new(&ctx.state_path).backup_path().exists());
    }
}
