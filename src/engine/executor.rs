//! Execution engine - terrace-specific executor with UI integration

use anyhow::Result;
use colored::Colorize;
use declarative::{
    ConfirmCallback, Configuration, ExecuteOptions, ExecuteOutcome, ExecuteSummary, Plan,
    PlanMode, ProviderRegistry,
};

use crate::progress::BarProgress;

use super::differ::plan_lines;

/// Confirmation through an interactive prompt
pub struct Prompt {
    /// Skip the prompt and proceed
    pub auto_approve: bool,
}

impl ConfirmCallback for Prompt {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        if self.auto_approve {
            return Ok(true);
        }

        use dialoguer::Confirm;

        println!();
        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()?;
        Ok(confirmed)
    }
}

/// Display the plan, confirm, then apply it with progress output
pub fn apply_plan(
    plan: &Plan,
    config: &Configuration,
    registry: &ProviderRegistry,
    opts: &ExecuteOptions,
    auto_approve: bool,
    quiet: bool,
) -> Result<ExecuteOutcome> {
    for line in preamble(plan, opts, quiet) {
        println!("{line}");
    }

    let mut progress = BarProgress::new(quiet);
    let mut prompt = Prompt { auto_approve };
    let outcome = declarative::execute(plan, config, registry, opts, &mut progress, &mut prompt)?;

    if outcome.declined {
        println!();
        println!("  {} Aborted", "✗".red());
    } else if plan.has_changes() {
        print_summary(&outcome.summary, plan.mode);
    }
    Ok(outcome)
}

/// Plan display and apply announcement; nothing when quiet
fn preamble(plan: &Plan, opts: &ExecuteOptions, quiet: bool) -> Vec<String> {
    if quiet {
        return Vec::new();
    }
    let mut lines = plan_lines(plan);
    if plan.has_changes() {
        lines.push(String::new());
        lines.push(format!(
            "  {} Applying with up to {} concurrent operations...",
            "→".cyan(),
            opts.parallelism.max(1)
        ));
    }
    lines
}

/// Print final summary
fn print_summary(summary: &ExecuteSummary, mode: PlanMode) {
    let noun = if mode == PlanMode::Destroy {
        "Destroy"
    } else {
        "Apply"
    };

    println!();
    if summary.is_success() {
        println!("  {} {} complete!", "✓".green().bold(), noun);
    } else {
        println!("  {} {} finished with errors", "⚠".yellow().bold(), noun);
    }

    for line in summary_lines(summary) {
        println!("    • {line}");
    }
}

fn summary_lines(summary: &ExecuteSummary) -> Vec<String> {
    let mut lines = Vec::new();
    let counts = [
        (summary.created, "created"),
        (summary.modified, "modified"),
        (summary.replaced, "replaced"),
        (summary.removed, "destroyed"),
        (summary.skipped, "skipped"),
    ];
    for (count, verb) in counts {
        if count > 0 {
            lines.push(format!("{count} {} {verb}", resources(count)));
        }
    }
    if summary.failed > 0 {
        lines.push(format!(
            "{} {} failed",
            summary.failed,
            resources(summary.failed).red()
        ));
    }
    lines
}

fn resources(count: usize) -> &'static str {
    if count == 1 { "resource" } else { "resources" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_lines() {
        colored::control::set_override(false);
        let summary = ExecuteSummary {
            created: 2,
            removed: 1,
            failed: 1,
            ..Default::default()
        };
        assert_eq!(
            summary_lines(&summary),
            [
                "2 resources created",
                "1 resource destroyed",
                "1 resource failed"
            ]
        );
    }

    fn pending_plan() -> Plan {
        let address = declarative::ResourceAddress::new("null_resource", "a");
        Plan {
            mode: PlanMode::Normal,
            changes: vec![declarative::ResourceChange {
                address,
                action: declarative::Action::Create,
                before: None,
                after: Some(declarative::PlannedAttributes::new()),
                attributes: Vec::new(),
                replace_reason: None,
                lifecycle: declarative::Lifecycle::default(),
            }],
            prior_state: declarative::StateSnapshot::new(),
            drifted: Vec::new(),
            graph: declarative::DependencyGraph::default(),
            variables: std::collections::BTreeMap::new(),
        }
    }

    #[test]
    fn test_quiet_apply_prints_no_plan() {
        let plan = pending_plan();
        assert!(preamble(&plan, &ExecuteOptions::default(), true).is_empty());
    }

    #[test]
    fn test_preamble_shows_plan_and_parallelism() {
        colored::control::set_override(false);
        let plan = pending_plan();
        let opts = ExecuteOptions {
            parallelism: 0,
            verbose: false,
        };
        let lines = preamble(&plan, &opts, false);
        assert!(lines.iter().any(|l| l.contains("+ null_resource.a will be created")));
        assert!(lines.iter().any(|l| l.contains("up to 1 concurrent operations")));
    }

    #[test]
    fn test_auto_approve_skips_prompt() {
        let mut prompt = Prompt { auto_approve: true };
        assert!(prompt.confirm("Do you want to perform these actions?").unwrap());
    }
}
