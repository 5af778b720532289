//! Progress display for apply operations

use colored::Colorize;
use declarative::{Action, ApplyResult, ProgressCallback, ResourceAddress};
use indicatif::{ProgressBar, ProgressStyle};

/// Symbol shown next to a finished resource
pub fn result_symbol(result: &ApplyResult) -> String {
    match result {
        ApplyResult::NoChange => "○".dimmed().to_string(),
        ApplyResult::Created | ApplyResult::Modified | ApplyResult::Replaced => {
            "✓".green().to_string()
        }
        ApplyResult::Removed => "✓".red().to_string(),
        ApplyResult::Failed { .. } => "✗".red().to_string(),
        ApplyResult::Skipped { .. } => "⊘".yellow().to_string(),
    }
}

/// Describe a finished resource in one line
pub fn result_line(address: &ResourceAddress, result: &ApplyResult) -> String {
    let detail = match result {
        ApplyResult::NoChange => "no changes".to_string(),
        ApplyResult::Created => "created".to_string(),
        ApplyResult::Modified => "updated".to_string(),
        ApplyResult::Replaced => "replaced".to_string(),
        ApplyResult::Removed => "destroyed".to_string(),
        ApplyResult::Failed { error } => format!("failed: {error}"),
        ApplyResult::Skipped { reason } => format!("skipped: {reason}"),
    };
    format!("{} {} {}", result_symbol(result), address, detail.dimmed())
}

/// Progress bar driven by the executor's callbacks
pub struct BarProgress {
    bar: Option<ProgressBar>,
    quiet: bool,
}

impl BarProgress {
    pub fn new(quiet: bool) -> Self {
        Self { bar: None, quiet }
    }
}

impl ProgressCallback for BarProgress {
    fn on_batch_start(&mut self, count: usize) {
        if self.quiet {
            return;
        }
        let bar = ProgressBar::new(count as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )
        .map(|s| s.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        self.bar = Some(bar);
    }

    fn on_resource_start(&mut self, address: &ResourceAddress, action: Action) {
        log::debug!("Starting {action} of {address}");
        if let Some(bar) = &self.bar {
            bar.set_message(format!("{} {}", action.symbol(), address));
        }
    }

    fn on_resource_complete(&mut self, address: &ResourceAddress, result: &ApplyResult) {
        match &self.bar {
            Some(bar) => {
                bar.println(format!("  {}", result_line(address, result)));
                bar.inc(1);
            }
            None if !self.quiet => println!("  {}", result_line(address, result)),
            None => {}
        }
    }

    fn on_batch_complete(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}
