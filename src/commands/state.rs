//! `terrace state` subcommands plus `taint` and `untaint`

use anyhow::{Result, bail};
use colored::Colorize;
use declarative::{ResourceAddress, StateStore};

use super::{acquire_lock, persist_if_changed, store};
use crate::cli::StateCommand;
use crate::{Context, ui};

pub fn run(ctx: &Context, cmd: StateCommand) -> Result<()> {
    match cmd {
        StateCommand::List => list(ctx),
        StateCommand::Show { address } => show(ctx, &address),
        StateCommand::Rm { addresses } => remove(ctx, &addresses),
        StateCommand::Mv {
            source,
            destination,
        } => mv(ctx, &source, &destination),
    }
}

fn list(ctx: &Context) -> Result<()> {
    let state = store(ctx).load()?;
    if state.is_empty() && !ctx.quiet {
        ui::info("No resources in state");
    }
    for (address, instance) in &state.resources {
        if instance.tainted && !ctx.quiet {
            println!("{address} {}", "(tainted)".yellow());
        } else {
            println!("{address}");
        }
    }
    Ok(())
}

fn show(ctx: &Context, address: &ResourceAddress) -> Result<()> {
    let state = store(ctx).load()?;
    let Some(instance) = state.get(address) else {
        bail!("{address} is not in the state");
    };

    ui::header(&address.to_string());
    for (name, value) in &instance.attributes {
        let rendered = match value {
            serde_json::Value::String(s) => format!("{s:?}"),
            other => other.to_string(),
        };
        ui::kv(name, &rendered);
    }
    if !instance.dependencies.is_empty() {
        let deps: Vec<String> = instance.dependencies.iter().map(ToString::to_string).collect();
        ui::kv("depends on", &deps.join(", "));
    }
    if instance.tainted {
        ui::warn("Tainted: will be replaced on the next apply");
    }
    Ok(())
}

fn remove(ctx: &Context, addresses: &[ResourceAddress]) -> Result<()> {
    let store = store(ctx);
    let _lock = acquire_lock(ctx, &store, None, "state rm")?;
    let state = store.load()?;

    let mut updated = state.clone();
    for address in addresses {
        if updated.remove(address).is_none() {
            bail!("{address} is not in the state");
        }
    }
    persist_if_changed(&store, &state, updated)?;

    if !ctx.quiet {
        for address in addresses {
            ui::success(&format!("Removed {address} (the real object was left in place)"));
        }
    }
    Ok(())
}

fn mv(ctx: &Context, source: &ResourceAddress, destination: &ResourceAddress) -> Result<()> {
    if source.resource_type != destination.resource_type {
        bail!("Cannot move {source} to {destination}: resource types differ");
    }
    let store = store(ctx);
    let _lock = acquire_lock(ctx, &store, None, "state mv")?;
    let state = store.load()?;

    let mut updated = state.clone();
    updated.move_resource(source, destination)?;
    persist_if_changed(&store, &state, updated)?;

    if !ctx.quiet {
        ui::success(&format!("Moved {source} to {destination}"));
    }
    Ok(())
}

/// Set or clear the replacement mark on a resource
pub fn set_tainted(ctx: &Context, address: &ResourceAddress, tainted: bool) -> Result<()> {
    let store = store(ctx);
    let operation = if tainted { "taint" } else { "untaint" };
    let _lock = acquire_lock(ctx, &store, None, operation)?;
    let state = store.load()?;

    let mut updated = state.clone();
    if tainted {
        updated.taint(address)?;
    } else {
        updated.untaint(address)?;
    }
    persist_if_changed(&store, &state, updated)?;

    if !ctx.quiet {
        if tainted {
            ui::success(&format!("{address} will be replaced on the next apply"));
        } else {
            ui::success(&format!("{address} is no longer tainted"));
        }
    }
    Ok(())
}
