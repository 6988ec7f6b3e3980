use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "converge")]
#[command(version)]
#[command(about = "Bring this host to the state a manifest declares, idempotently", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Reconcile the host against a manifest
    Apply(ApplyArgs),

    /// Probe every action and show what differs, without changing anything
    Status(ManifestArgs),

    /// Validate a manifest without touching the host
    Check(ManifestArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct ManifestArgs {
    /// Path to the manifest (TOML)
    pub manifest: PathBuf,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Path to the manifest (TOML)
    pub manifest: PathBuf,

    /// Probe and validate only; report what would change
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Directory for the run report
    #[arg(long, env = "CONVERGE_REPORT_DIR")]
    pub report_dir: Option<PathBuf>,

    /// Directory for per-run backups
    #[arg(long, env = "CONVERGE_BACKUP_DIR")]
    pub backup_dir: Option<PathBuf>,

    /// Timeout for each external command, in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Print the report as JSON instead of status lines
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_flags() {
        let cli = Cli::parse_from([
            "converge",
            "-vv",
            "apply",
            "desktop.toml",
            "--dry-run",
            "--timeout",
            "60",
            "--json",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Apply(args) => {
                assert_eq!(args.manifest, PathBuf::from("desktop.toml"));
                assert!(args.dry_run);
                assert!(!args.yes);
                assert_eq!(args.timeout, Some(60));
                assert!(args.json);
            }
            _ => panic!("expected apply"),
        }
    }
}
