mod cli;
mod commands;
mod config;
mod engine;
mod paths;
mod progress;
mod providers;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::Settings;
use declarative::PlanMode;
use std::io;
use std::path::{Path, PathBuf};

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// Configuration directory, or a single configuration file
    pub dir: PathBuf,
    /// Resolved state file path
    pub state_path: PathBuf,
    pub settings: Settings,
}

impl Context {
    fn new(cli: &Cli, settings: Settings) -> Self {
        // State lives next to the configuration unless given absolutely
        let base = if cli.chdir.is_file() {
            cli.chdir.parent().unwrap_or(Path::new(".")).to_path_buf()
        } else {
            cli.chdir.clone()
        };
        let state = cli.state.as_deref().unwrap_or(&settings.state_path);
        let state_path = paths::resolve(&base, state);

        Self {
            verbose: cli.verbose,
            quiet: cli.quiet,
            dir: cli.chdir.clone(),
            state_path,
            settings,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context::new(&cli, Settings::load()?);
    log::debug!(
        "Using configuration {} and state {}",
        ctx.dir.display(),
        ctx.state_path.display()
    );

    match cli.command {
        Command::Validate => commands::validate::run(&ctx),
        Command::Plan(args) => {
            let has_changes = commands::plan::run(&ctx, &args)?;
            if args.detailed_exitcode && has_changes {
                std::process::exit(2);
            }
            Ok(())
        }
        Command::Apply(args) => commands::apply::run(&ctx, &args, PlanMode::Normal),
        Command::Destroy(args) => commands::apply::run(&ctx, &args, PlanMode::Destroy),
        Command::Refresh(args) => commands::refresh::run(&ctx, &args),
        Command::State(cmd) => commands::state::run(&ctx, cmd),
        Command::Taint { address } => commands::state::set_tainted(&ctx, &address, true),
        Command::Untaint { address } => commands::state::set_tainted(&ctx, &address, false),
        Command::Output { name, json } => commands::output::run(&ctx, name.as_deref(), json),
        Command::Graph => commands::graph::run(&ctx),
        Command::ForceUnlock { lock_id } => commands::unlock::run(&ctx, &lock_id),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "terrace", &mut io::stdout());
            Ok(())
        }
    }
}
