use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Seconds an external command may run before it is killed.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Top-level CLI entry point for the provisioning engine.
#[derive(Parser, Debug)]
#[command(
    name = "provision",
    about = "Idempotent, module-based machine provisioning",
    version = crate::VERSION
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone, Default)]
pub struct GlobalOpts {
    /// Override the configuration root directory
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Configuration document to load (repeatable; later files override earlier ones)
    #[arg(long = "config", global = true)]
    pub config: Vec<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Converge the machine to the configured state
    Apply(ApplyOpts),
    /// Print the execution plan without checking anything
    Plan(PlanOpts),
    /// Load and validate configuration, then plan
    Validate(ValidateOpts),
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
    /// Print version information
    Version,
}

impl Command {
    /// Name used for the log file.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Apply(_) => "apply",
            Self::Plan(_) => "plan",
            Self::Validate(_) => "validate",
            Self::Completions { .. } => "completions",
            Self::Version => "version",
        }
    }

    /// Device targeted by the command, if it takes one.
    #[must_use]
    pub fn device(&self) -> Option<&str> {
        match self {
            Self::Apply(opts) => Some(&opts.device),
            Self::Plan(opts) => Some(&opts.device),
            Self::Validate(opts) => Some(&opts.device),
            Self::Completions { .. } | Self::Version => None,
        }
    }

    /// Whether the command is an apply in dry-run mode.
    #[must_use]
    pub const fn dry_run(&self) -> bool {
        matches!(self, Self::Apply(opts) if opts.dry_run)
    }
}

/// Options for the `apply` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct ApplyOpts {
    /// Device to provision
    pub device: String,

    /// Report what would change without changing it
    #[arg(short = 'd', long)]
    pub dry_run: bool,

    /// Run only these modules (and their dependencies)
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,

    /// Per-command timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout: u64,

    /// Write the run report as JSON to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
}

/// Options for the `plan` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct PlanOpts {
    /// Device to plan for
    pub device: String,

    /// Plan only these modules (and their dependencies)
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,
}

/// Options for the `validate` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct ValidateOpts {
    /// Device to validate
    pub device: String,
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_apply_with_flags() {
        let cli = Cli::parse_from([
            "provision",
            "apply",
            "mbp",
            "--dry-run",
            "--only",
            "network,dotfiles",
            "--timeout",
            "30",
        ]);
        let Command::Apply(opts) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(opts.device, "mbp");
        assert!(opts.dry_run);
        assert_eq!(opts.only, vec!["network", "dotfiles"]);
        assert_eq!(opts.timeout, 30);
        assert_eq!(opts.report, None);
    }

    #[test]
    fn command_exposes_device_and_mode() {
        let cli = Cli::parse_from(["provision", "apply", "--dry-run", "mbp"]);
        assert_eq!(cli.command.device(), Some("mbp"));
        assert!(cli.command.dry_run());
        let cli = Cli::parse_from(["provision", "plan", "nas"]);
        assert_eq!(cli.command.device(), Some("nas"));
        assert!(!cli.command.dry_run());
        assert_eq!(Cli::parse_from(["provision", "version"]).command.device(), None);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let result = Cli::try_parse_from(["provision", "apply", "mbp", "--timeout", "0"]);
        assert!(result.is_err(), "a zero timeout would fail every command");
    }

    #[test]
    fn apply_defaults() {
        let cli = Cli::parse_from(["provision", "apply", "mbp"]);
        let Command::Apply(opts) = cli.command else {
            panic!("expected apply");
        };
        assert!(!opts.dry_run);
        assert!(opts.only.is_empty());
        assert_eq!(opts.timeout, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn parse_dry_run_short() {
        let cli = Cli::parse_from(["provision", "apply", "-d", "mbp"]);
        assert!(matches!(cli.command, Command::Apply(ApplyOpts { dry_run: true, .. })));
    }

    #[test]
    fn apply_requires_device() {
        assert!(Cli::try_parse_from(["provision", "apply"]).is_err());
    }

    #[test]
    fn config_is_repeatable_and_global() {
        let cli = Cli::parse_from([
            "provision",
            "plan",
            "nas",
            "--config",
            "base.toml",
            "--config",
            "nas.toml",
        ]);
        assert_eq!(
            cli.global.config,
            vec![PathBuf::from("base.toml"), PathBuf::from("nas.toml")]
        );
        assert_eq!(cli.command.name(), "plan");
    }

    #[test]
    fn parse_verbose_and_root() {
        let cli = Cli::parse_from(["provision", "-v", "--root", "/srv/provision", "validate", "nas"]);
        assert!(cli.verbose);
        assert_eq!(cli.global.root, Some(PathBuf::from("/srv/provision")));
        assert!(matches!(cli.command, Command::Validate(_)));
    }

    #[test]
    fn parse_completions_and_version() {
        let cli = Cli::parse_from(["provision", "completions", "zsh"]);
        assert!(matches!(cli.command, Command::Completions { shell: Shell::Zsh }));
        let cli = Cli::parse_from(["provision", "version"]);
        assert!(matches!(cli.command, Command::Version));
    }
}
