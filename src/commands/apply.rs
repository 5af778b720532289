//! `terrace apply` and `terrace destroy`

use anyhow::{Result, bail};
use declarative::{ExecuteOptions, PlanMode, PlanOptions, StateStore};

use super::{acquire_lock, load_config, output, persist_if_changed, registry, store, variables};
use crate::cli::ApplyArgs;
use crate::engine::apply_plan;
use crate::{Context, ui};

/// Plan, confirm and apply; persists state even when some changes fail
pub fn run(ctx: &Context, args: &ApplyArgs, mode: PlanMode) -> Result<()> {
    let config = load_config(ctx)?;
    let registry = registry();
    let store = store(ctx);
    let operation = match mode {
        PlanMode::Normal => "apply",
        PlanMode::Destroy => "destroy",
    };
    let lock = acquire_lock(ctx, &store, args.lock, operation)?;
    let state = store.load()?;

    let options = PlanOptions {
        mode,
        targets: args.target.clone(),
        refresh: args.refresh,
        variables: variables(&config, &args.vars)?,
        verbose: ctx.verbose > 0,
    };
    let plan = declarative::plan(&config, &state, &registry, &options)?;

    let opts = ExecuteOptions {
        parallelism: args.parallelism.unwrap_or(ctx.settings.parallelism),
        verbose: ctx.verbose > 0,
    };
    let outcome = apply_plan(&plan, &config, &registry, &opts, args.auto_approve, ctx.quiet)?;

    if outcome.declined {
        return Ok(());
    }

    let failed = outcome.summary.failed;
    let has_outputs = !outcome.state.outputs.is_empty();
    persist_if_changed(&store, &state, outcome.state.clone())?;
    drop(lock);

    if failed > 0 {
        bail!(
            "{failed} resource operation{} failed; state records what was applied",
            if failed == 1 { "" } else { "s" }
        );
    }

    if mode == PlanMode::Normal && has_outputs && !ctx.quiet {
        ui::header("Outputs");
        output::print_all(&outcome.state.outputs);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::VarArgs;
    use crate::commands::test_support::context;
    use declarative::{LocalStateStore, ResourceAddress};
    use std::fs;

    fn args() -> ApplyArgs {
        ApplyArgs {
            auto_approve: true,
            parallelism: None,
            target: Vec::new(),
            refresh: true,
            vars: VarArgs::default(),
            lock: None,
        }
    }

    fn config(dir: &std::path::Path) -> String {
        format!(
            r#"
[variable.greeting]
default = "hello"

[resource.null_resource.seed]

[resource.local_file.motd]
filename = "{}/out/motd"
content = "${{var.greeting}} ${{null_resource.seed.id}}"

[output.motd_path]
value = "${{local_file.motd.filename}}"
"#,
            dir.display()
        )
    }

    #[test]
    fn test_apply_creates_resources_and_persists_state() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), &config(dir.path()));
        run(&ctx, &args(), PlanMode::Normal).unwrap();

        let state = LocalStateStore::new(&ctx.state_path).load().unwrap();
        let seed = state.get(&ResourceAddress::new("null_resource", "seed")).unwrap();
        let id = seed.attributes["id"].as_str().unwrap();
        let motd = fs::read_to_string(dir.path().join("out/motd")).unwrap();
        assert_eq!(motd, format!("hello {id}"));
        assert!(state.outputs.contains_key("motd_path"));
        assert!(!dir.path().join("terrace.tfstate.lock").exists());

        // A second apply changes nothing and leaves the serial alone
        run(&ctx, &args(), PlanMode::Normal).unwrap();
        let again = LocalStateStore::new(&ctx.state_path).load().unwrap();
        assert_eq!(again.serial, state.serial);
    }

    #[test]
    fn test_apply_repairs_drift() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), &config(dir.path()));
        run(&ctx, &args(), PlanMode::Normal).unwrap();
        let path = dir.path().join("out/motd");
        let expected = fs::read_to_string(&path).unwrap();

        fs::write(&path, "edited by hand").unwrap();
        run(&ctx, &args(), PlanMode::Normal).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), expected);
    }

    #[test]
    fn test_destroy_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), &config(dir.path()));
        run(&ctx, &args(), PlanMode::Normal).unwrap();
        run(&ctx, &args(), PlanMode::Destroy).unwrap();

        let state = LocalStateStore::new(&ctx.state_path).load().unwrap();
        assert!(state.is_empty());
        assert!(state.outputs.is_empty());
        assert!(!dir.path().join("out/motd").exists());
    }

    #[test]
    fn test_held_lock_blocks_apply() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), &config(dir.path()));
        let _held = LocalStateStore::new(&ctx.state_path).lock("other").unwrap();

        let err = run(&ctx, &args(), PlanMode::Normal).unwrap_err();
        assert!(err.to_string().contains("locked"));
        assert!(!dir.path().join("out/motd").exists());
    }

    #[test]
    fn test_failed_resource_keeps_partial_state() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes the write fail
        fs::create_dir_all(dir.path().join("out/motd")).unwrap();
        let ctx = context(dir.path(), &config(dir.path()));

        assert!(run(&ctx, &args(), PlanMode::Normal).is_err());
        let state = LocalStateStore::new(&ctx.state_path).load().unwrap();
        assert!(state.contains(&ResourceAddress::new("null_resource", "seed")));
        assert!(!state.contains(&ResourceAddress::new("local_file", "motd")));
    }
}
