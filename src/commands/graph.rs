//! `terrace graph`

use anyhow::Result;
use declarative::DependencyGraph;

use super::load_config;
use crate::Context;

/// Print the configuration's dependency graph in DOT format
pub fn run(ctx: &Context) -> Result<()> {
    let config = load_config(ctx)?;
    let graph = DependencyGraph::build(&config)?;
    print!("{}", graph.to_dot());
    Ok(())
}
