use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use declarative::{ResourceAddress, Target};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "terrace")]
#[command(version)]
#[command(about = "Declarative infrastructure reconciliation", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration directory (or a single configuration file)
    #[arg(short = 'C', long = "chdir", value_name = "DIR", default_value = ".", global = true)]
    pub chdir: PathBuf,

    /// State file path
    #[arg(long, value_name = "PATH", env = "TERRACE_STATE", global = true)]
    pub state: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check configuration syntax, schemas and dependencies
    Validate,

    /// Show the changes required to reach the configured state
    Plan(PlanArgs),

    /// Apply the changes required to reach the configured state
    Apply(ApplyArgs),

    /// Destroy every managed resource
    Destroy(ApplyArgs),

    /// Update state to match real objects
    Refresh(RefreshArgs),

    /// Inspect or edit state
    #[command(subcommand)]
    State(StateCommand),

    /// Mark a resource for replacement on the next apply
    Taint {
        /// Resource address, e.g. local_file.motd
        address: ResourceAddress,
    },

    /// Clear a replacement mark
    Untaint {
        /// Resource address, e.g. local_file.motd
        address: ResourceAddress,
    },

    /// Show output values from state
    Output {
        /// Only show this output
        name: Option<String>,

        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the dependency graph in DOT format
    Graph,

    /// Remove a lock left behind by an interrupted operation
    ForceUnlock {
        /// Lock id reported by the failed lock attempt
        lock_id: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Shared arguments
// ============================================================================

#[derive(Args, Clone, Default)]
pub struct VarArgs {
    /// Set an input variable (repeatable)
    #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,
}

impl VarArgs {
    pub fn assignments(&self) -> std::collections::BTreeMap<String, String> {
        self.vars.iter().cloned().collect()
    }
}

fn parse_var(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .filter(|(name, _)| !name.is_empty())
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected NAME=VALUE, got \"{s}\""))
}

#[derive(Args, Clone)]
pub struct PlanArgs {
    /// Plan destruction of every managed resource
    #[arg(long)]
    pub destroy: bool,

    /// Limit planning to a resource or resource type (repeatable)
    #[arg(long, value_name = "ADDRESS")]
    pub target: Vec<Target>,

    /// Read real objects before planning
    #[arg(long, value_name = "BOOL", default_value_t = true, action = clap::ArgAction::Set)]
    pub refresh: bool,

    #[command(flatten)]
    pub vars: VarArgs,

    /// Exit with status 2 when the plan has changes
    #[arg(long)]
    pub detailed_exitcode: bool,

    /// Lock state while planning
    #[arg(long, value_name = "BOOL")]
    pub lock: Option<bool>,
}

#[derive(Args, Clone)]
pub struct ApplyArgs {
    /// Skip the confirmation prompt
    #[arg(long)]
    pub auto_approve: bool,

    /// Maximum number of concurrent operations
    #[arg(long, value_name = "N", env = "TERRACE_PARALLELISM")]
    pub parallelism: Option<usize>,

    /// Limit the operation to a resource or resource type (repeatable)
    #[arg(long, value_name = "ADDRESS")]
    pub target: Vec<Target>,

    /// Read real objects before planning
    #[arg(long, value_name = "BOOL", default_value_t = true, action = clap::ArgAction::Set)]
    pub refresh: bool,

    #[command(flatten)]
    pub vars: VarArgs,

    /// Lock state during the operation
    #[arg(long, value_name = "BOOL")]
    pub lock: Option<bool>,
}

#[derive(Args, Clone)]
pub struct RefreshArgs {
    /// Lock state during the operation
    #[arg(long, value_name = "BOOL")]
    pub lock: Option<bool>,
}

// ============================================================================
// State Commands
// ============================================================================

#[derive(Subcommand)]
pub enum StateCommand {
    /// List resources in state
    List,

    /// Show the recorded attributes of a resource
    Show {
        /// Resource address
        address: ResourceAddress,
    },

    /// Forget resources without destroying them
    Rm {
        /// Resource addresses
        #[arg(required = true)]
        addresses: Vec<ResourceAddress>,
    },

    /// Rename a resource in state
    Mv {
        /// Current address
        source: ResourceAddress,
        /// New address
        destination: ResourceAddress,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_plan_flags() {
        let cli = Cli::try_parse_from([
            "terrace",
            "plan",
            "--target",
            "local_file.motd",
            "--target",
            "null_resource",
            "--refresh=false",
            "--var",
            "greeting=hi=there",
            "--detailed-exitcode",
        ])
        .unwrap();
        let Command::Plan(args) = cli.command else {
            panic!("expected plan");
        };
        assert!(!args.refresh);
        assert!(args.detailed_exitcode);
        assert_eq!(args.target.len(), 2);
        assert_eq!(args.vars.vars, vec![("greeting".into(), "hi=there".into())]);
    }

    #[test]
    fn test_parse_apply_lock_false_and_global_flags() {
        let cli = Cli::try_parse_from([
            "terrace",
            "apply",
            "-C",
            "infra",
            "--auto-approve",
            "--lock=false",
            "--parallelism",
            "2",
        ])
        .unwrap();
        assert_eq!(cli.chdir, PathBuf::from("infra"));
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.lock, Some(false));
        assert_eq!(args.parallelism, Some(2));
        assert!(args.auto_approve);
    }

    #[test]
    fn test_rejects_bad_address_and_var() {
        assert!(Cli::try_parse_from(["terrace", "taint", "not-an-address"]).is_err());
        assert!(Cli::try_parse_from(["terrace", "plan", "--var", "novalue"]).is_err());
    }
}
