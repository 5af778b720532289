//! `terrace output`

use anyhow::{Result, bail};
use colored::Colorize;
use declarative::{OutputValue, StateStore};
use serde_json::Value;
use std::collections::BTreeMap;

use super::store;
use crate::Context;

const SENSITIVE: &str = "<sensitive>";

/// Human-readable rendering: strings unquoted, everything else as JSON
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// One `name = value` line per output, hiding sensitive values
fn output_lines(outputs: &BTreeMap<String, OutputValue>) -> Vec<String> {
    outputs
        .iter()
        .map(|(name, output)| {
            let value = if output.sensitive {
                SENSITIVE.dimmed().to_string()
            } else {
                match &output.value {
                    Value::String(s) => format!("{s:?}"),
                    other => other.to_string(),
                }
            };
            format!("{} = {value}", name.bold())
        })
        .collect()
}

/// Print every output, hiding sensitive values
pub fn print_all(outputs: &BTreeMap<String, OutputValue>) {
    for line in output_lines(outputs) {
        println!("  {line}");
    }
}

/// JSON document of outputs with their sensitivity flags
fn outputs_json(outputs: &BTreeMap<String, OutputValue>) -> Value {
    outputs
        .iter()
        .map(|(name, output)| {
            let entry = serde_json::json!({
                "sensitive": output.sensitive,
                "value": output.value,
            });
            (name.clone(), entry)
        })
        .collect::<serde_json::Map<_, _>>()
        .into()
}

pub fn run(ctx: &Context, name: Option<&str>, json: bool) -> Result<()> {
    let state = store(ctx).load()?;

    match name {
        // An explicitly named output is shown even when sensitive
        Some(name) => {
            let Some(output) = state.outputs.get(name) else {
                bail!("Output \"{name}\" not found in state");
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&output.value)?);
            } else {
                println!("{}", display_value(&output.value));
            }
        }
        None if json => {
            println!("{}", serde_json::to_string_pretty(&outputs_json(&state.outputs))?);
        }
        None => {
            if state.outputs.is_empty() {
                if !ctx.quiet {
                    crate::ui::info("No outputs found in state");
                }
                return Ok(());
            }
            print_all(&state.outputs);
        }
    }
    Ok(())
}
