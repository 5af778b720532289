//! `terrace plan`

use anyhow::Result;
use declarative::{PlanMode, PlanOptions, StateStore};

use super::{acquire_lock, load_config, registry, store, variables};
use crate::cli::PlanArgs;
use crate::Context;
use crate::engine::display_plan;

/// Compute and display a plan without applying it
///
/// Returns whether the plan has changes.
pub fn run(ctx: &Context, args: &PlanArgs) -> Result<bool> {
    let config = load_config(ctx)?;
    let registry = registry();
    let store = store(ctx);
    let _lock = acquire_lock(ctx, &store, args.lock, "plan")?;
    let state = store.load()?;

    let options = PlanOptions {
        mode: if args.destroy {
            PlanMode::Destroy
        } else {
            PlanMode::Normal
        },
        targets: args.target.clone(),
        refresh: args.refresh,
        variables: variables(&config, &args.vars)?,
        verbose: ctx.verbose > 0,
    };
    let plan = declarative::plan(&config, &state, &registry, &options)?;

    if !ctx.quiet {
        display_plan(&plan);
    }
    Ok(plan.has_changes())
}
