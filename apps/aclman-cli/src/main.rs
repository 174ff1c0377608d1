//! # aclman
//!
//! Enforces ownership, special mode bits and POSIX ACLs on directory trees
//! as described by `..aclman` policy files placed in the tree itself.
//!
//! ```text
//! aclman -R /org            # enforce everything below /org
//! aclman -Rn -v /org/Users  # show what would change
//! aclman --json -R /srv     # one JSON report per object on stdout
//! ```
//!
//! Exit status is 0 when every object was handled, 1 when any object or
//! policy file failed, and 130 after Ctrl-C.

mod config;
mod report;
mod runner;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

use aclman_fs::{
    locate_tool, Enforcer, EnforcerSettings, FileConfigLoader, PosixApplier, PosixStateReader,
    SystemIdentities,
};

use crate::config::{AclmanConfig, DEFAULT_CONFIG_PATH};
use crate::report::Reporter;
use crate::runner::RunStatus;

/// Set ownership and ACLs as configured by `..aclman` files.
#[derive(Parser, Debug)]
#[command(name = "aclman", version, about)]
struct Cli {
    /// Traverse subdirectories.
    #[arg(short = 'R', long)]
    recursive: bool,

    /// Compute and report changes without modifying anything.
    #[arg(short = 'n', long = "dry-run", visible_alias = "dry")]
    dry_run: bool,

    /// More log output on stderr (repeat for more).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Print one JSON report per visited object instead of command lines.
    #[arg(long)]
    json: bool,

    /// Directories processed in parallel (overrides the settings file).
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    workers: Option<u16>,

    /// Tool settings file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Files or directories to enforce.
    #[arg(default_value = ".")]
    paths: Vec<PathBuf>,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "aclman={level},aclman_fs={level},aclman_policy={level}"
        ))
    });
    // Logs go to stderr so they don't mix with reports on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn build_enforcer(cli: &Cli, config: &AclmanConfig) -> anyhow::Result<Enforcer> {
    let getfacl = locate_tool(&config.getfacl).context("getfacl is required to read ACLs")?;
    let setfacl = locate_tool(&config.setfacl).context("setfacl is required to write ACLs")?;
    tracing::debug!("Using {} and {}", getfacl.display(), setfacl.display());

    let identities = Arc::new(SystemIdentities::new());
    Ok(Enforcer::new(
        Arc::new(FileConfigLoader::new(config.config_file_name.clone())),
        Arc::new(PosixStateReader::new(getfacl, Arc::clone(&identities))),
        Arc::new(PosixApplier::new(setfacl, Arc::clone(&identities))),
        identities,
        EnforcerSettings {
            recursive: cli.recursive,
            dry_run: cli.dry_run,
            resolve: config.resolve_options(),
        },
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => AclmanConfig::load(path)?,
        None => AclmanConfig::load_or_default(std::path::Path::new(DEFAULT_CONFIG_PATH))?,
    };
    let workers = cli.workers.map(usize::from).unwrap_or(config.workers);
    let enforcer = Arc::new(build_enforcer(&cli, &config)?);
    if cli.dry_run {
        tracing::info!("Dry run, nothing will be modified");
    }

    let mut reporter = Reporter::new(std::io::stdout().lock(), cli.json, cli.dry_run);
    let status = runner::run(enforcer, cli.paths.clone(), workers, |report| {
        reporter.record(&report).context("cannot write report")
    })
    .await?;
    reporter.flush().context("cannot write report")?;

    let totals = reporter.totals();
    tracing::info!(
        "{} objects visited, {} changed, {} failed",
        totals.visited,
        totals.changed,
        totals.failed
    );

    Ok(match status {
        RunStatus::Interrupted => ExitCode::from(130),
        RunStatus::Completed if totals.failed > 0 => ExitCode::from(1),
        RunStatus::Completed => ExitCode::SUCCESS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults() {
        let cli = Cli::try_parse_from(["aclman"]).unwrap();
        assert!(!cli.recursive);
        assert!(!cli.dry_run);
        assert_eq!(cli.paths, vec![PathBuf::from(".")]);
        assert_eq!(cli.workers, None);
    }

    #[test]
    fn short_flags_combine() {
        let cli = Cli::try_parse_from(["aclman", "-Rnvv", "/org", "/srv"]).unwrap();
        assert!(cli.recursive);
        assert!(cli.dry_run);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.paths.len(), 2);
    }

    #[test]
    fn dry_alias_and_workers() {
        let cli = Cli::try_parse_from(["aclman", "--dry", "--workers", "8", "--json"]).unwrap();
        assert!(cli.dry_run);
        assert!(cli.json);
        assert_eq!(cli.workers, Some(8));
        assert!(Cli::try_parse_from(["aclman", "--workers", "0"]).is_err());
    }
}
