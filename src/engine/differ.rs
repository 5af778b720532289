//! Plan display - terrace-specific UI

use colored::{ColoredString, Colorize};
use declarative::{Action, AttributeDiff, Plan, PlannedValue, ResourceChange, group_by_type};
use serde_json::Value;

use crate::ui;

const MAX_VALUE_WIDTH: usize = 60;

fn action_symbol(action: Action) -> ColoredString {
    match action {
        Action::Create => action.symbol().green(),
        Action::Update => action.symbol().yellow(),
        Action::Destroy => action.symbol().red(),
        Action::Replace => action.symbol().magenta(),
        Action::NoOp => action.symbol().dimmed(),
    }
}

/// Render a value on a single line
fn format_value(value: &Value) -> String {
    let rendered = match value {
        Value::String(s) => format!("{s:?}"),
        other => other.to_string(),
    };
    ui::truncate(&rendered, MAX_VALUE_WIDTH)
}

fn format_planned(value: &PlannedValue) -> String {
    match value {
        PlannedValue::Known(v) => format_value(v),
        PlannedValue::Unknown => "(known after apply)".dimmed().to_string(),
    }
}

/// Line diff for multi-line string values
fn text_diff_lines(before: &str, after: &str) -> Vec<String> {
    let diff = similar::TextDiff::from_lines(before, after);
    diff.iter_all_changes()
        .filter_map(|change| {
            let text = change.to_string();
            let line = text.trim_end_matches('\n');
            match change.tag() {
                similar::ChangeTag::Delete => Some(format!("- {line}").red().to_string()),
                similar::ChangeTag::Insert => Some(format!("+ {line}").green().to_string()),
                similar::ChangeTag::Equal => None,
            }
        })
        .collect()
}

fn attribute_lines(diff: &AttributeDiff, width: usize) -> Vec<String> {
    let forces = if diff.forces_replacement {
        format!(" {}", "# forces replacement".red())
    } else {
        String::new()
    };

    if let (Some(Value::String(before)), Some(PlannedValue::Known(Value::String(after)))) =
        (&diff.before, &diff.after)
        && (before.contains('\n') || after.contains('\n'))
    {
        let mut lines = vec![format!("{} {}:{forces}", "~".yellow(), diff.name)];
        lines.extend(text_diff_lines(before, after).into_iter().map(|l| format!("    {l}")));
        return lines;
    }

    let line = match (&diff.before, &diff.after) {
        (None, Some(after)) => format!(
            "{} {:<width$} = {}",
            "+".green(),
            diff.name,
            format_planned(after)
        ),
        (Some(before), None) => format!(
            "{} {:<width$} = {}",
            "-".red(),
            diff.name,
            format_value(before)
        ),
        (Some(before), Some(after)) => format!(
            "{} {:<width$} = {} → {}",
            "~".yellow(),
            diff.name,
            format_value(before),
            format_planned(after)
        ),
        (None, None) => return Vec::new(),
    };
    vec![format!("{line}{forces}")]
}

/// Render one change as display lines
pub fn render_change(change: &ResourceChange) -> Vec<String> {
    let mut header = format!(
        "{} {} will be {}",
        action_symbol(change.action),
        change.address.to_string().bold(),
        change.action.verb()
    );
    if change.action == Action::Replace {
        header = format!(
            "{} {} must be replaced",
            action_symbol(change.action),
            change.address.to_string().bold()
        );
        if let Some(reason) = &change.replace_reason {
            header.push_str(&format!(" ({reason})").dimmed().to_string());
        }
    }
    let mut lines = vec![header];

    let shown: Vec<AttributeDiff> = match change.action {
        Action::Create => change
            .after
            .iter()
            .flatten()
            .map(|(name, value)| AttributeDiff {
                name: name.clone(),
                before: None,
                after: Some(value.clone()),
                forces_replacement: false,
            })
            .collect(),
        Action::Destroy => change
            .before
            .iter()
            .flatten()
            .map(|(name, value)| AttributeDiff {
                name: name.clone(),
                before: Some(value.clone()),
                after: None,
                forces_replacement: false,
            })
            .collect(),
        _ => change.attributes.clone(),
    };

    let width = shown.iter().map(|a| a.name.len()).max().unwrap_or(0);
    for attribute in &shown {
        lines.extend(
            attribute_lines(attribute, width)
                .into_iter()
                .map(|l| format!("    {l}")),
        );
    }
    lines
}

/// Render a plan as display lines
pub fn plan_lines(plan: &Plan) -> Vec<String> {
    let mut lines = Vec::new();
    if !plan.drifted.is_empty() {
        lines.push(String::new());
        lines.push(format!("  {} Objects changed outside of terrace:", "ℹ".blue()));
        for address in &plan.drifted {
            lines.push(format!("    • {address}"));
        }
    }

    let actionable: Vec<ResourceChange> = plan.actionable().cloned().collect();
    if actionable.is_empty() {
        lines.push(String::new());
        lines.push(format!(
            "  {} No changes. Infrastructure matches the configuration.",
            "✓".green()
        ));
        return lines;
    }

    let groups = group_by_type(&actionable);
    let mut types: Vec<&String> = groups.keys().collect();
    types.sort();

    lines.push(String::new());
    lines.push(format!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Execution Plan".bold()
    ));
    lines.push("│".to_string());
    for resource_type in types {
        lines.push(format!("│ {}", resource_type.bold()));
        for change in &groups[resource_type] {
            lines.extend(render_change(change).into_iter().map(|l| format!("│   {l}")));
        }
        lines.push("│".to_string());
    }

    let summary = plan.summary();
    lines.push("├─────────────────────────────────────────────────────┤".to_string());
    lines.push(format!(
        "│ Plan: {} to add, {} to change, {} to destroy.",
        summary.additions.to_string().green(),
        summary.changes.to_string().yellow(),
        summary.destructions.to_string().red()
    ));
    lines.push("└─────────────────────────────────────────────────────┘".to_string());
    lines
}

/// Display a plan in a user-friendly format
pub fn display_plan(plan: &Plan) {
    for line in plan_lines(plan) {
        println!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{Lifecycle, ReplaceReason, ResourceAddress};
    use serde_json::json;

    fn change(action: Action) -> ResourceChange {
        ResourceChange {
            address: ResourceAddress::new("local_file", "motd"),
            action,
            before: None,
            after: None,
            attributes: Vec::new(),
            replace_reason: None,
            lifecycle: Lifecycle::default(),
        }
    }

    #[test]
    fn test_render_create_shows_unknowns() {
        colored::control::set_override(false);
        let mut create = change(Action::Create);
        create.after = Some(
            [
                ("content".to_string(), PlannedValue::Known(json!("hi"))),
                ("id".to_string(), PlannedValue::Unknown),
            ]
            .into(),
        );
        let lines = render_change(&create);
        assert_eq!(lines[0], "+ local_file.motd will be created");
        assert_eq!(lines[1], "    + content = \"hi\"");
        assert_eq!(lines[2], "    + id      = (known after apply)");
    }

    #[test]
    fn test_render_replace_reason() {
        colored::control::set_override(false);
        let mut replace = change(Action::Replace);
        replace.replace_reason = Some(ReplaceReason::ForcedBy(vec!["filename".into()]));
        replace.attributes = vec![AttributeDiff {
            name: "filename".into(),
            before: Some(json!("/a")),
            after: Some(PlannedValue::Known(json!("/b"))),
            forces_replacement: true,
        }];
        let lines = render_change(&replace);
        assert_eq!(
            lines[0],
            "-/+ local_file.motd must be replaced (forced by changes to filename)"
        );
        assert_eq!(lines[1], "    ~ filename = \"/a\" → \"/b\" # forces replacement");
    }

    #[test]
    fn test_multiline_strings_use_line_diff() {
        colored::control::set_override(false);
        let diff = AttributeDiff {
            name: "content".into(),
            before: Some(json!("one\ntwo\n")),
            after: Some(PlannedValue::Known(json!("one\nthree\n"))),
            forces_replacement: false,
        };
        let lines = attribute_lines(&diff, 7);
        assert_eq!(lines, ["~ content:", "    - two", "    + three"]);
    }

    #[test]
    fn test_long_values_are_truncated() {
        let long = "x".repeat(200);
        assert_eq!(format_value(&json!(long)).chars().count(), MAX_VALUE_WIDTH);
    }
}
