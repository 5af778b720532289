//! `terrace validate`

use anyhow::Result;
use declarative::DependencyGraph;

use super::{load_config, registry};
use crate::{Context, ui};

pub fn run(ctx: &Context) -> Result<()> {
    let config = load_config(ctx)?;
    config.validate(&registry())?;
    let order = DependencyGraph::build(&config)?.topological_order()?;

    if !ctx.quiet {
        ui::success(&format!(
            "Configuration is valid ({} resources, {} variables, {} outputs)",
            order.len(),
            config.variables.len(),
            config.outputs.len()
        ));
        if ctx.verbose > 0 {
            ui::header("Apply order");
            for (i, address) in order.iter().enumerate() {
                println!("  {:>3}. {address}", i + 1);
            }
        }
    }
    Ok(())
}
