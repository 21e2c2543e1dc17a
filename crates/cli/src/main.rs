//! ldapsync command-line tool.
//!
//! Runs one-way reconciliation passes from an Active Directory style source
//! into an OpenLDAP style target, reports the next free `uidNumber`, and
//! generates / validates configuration files.

mod logging;
mod output;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

use ldapsync_core::config::{sample_config, AppConfig, DirectoryConfig};
use ldapsync_core::directory::{DryRunDirectory, LdapDirectory};
use ldapsync_core::errors::SyncError;
use ldapsync_core::shutdown::setup_signal_handlers;
use ldapsync_core::{Allocation, IdentifierAllocator, ReconciliationEngine};

/// Exit status when a pass aborts because neither directory returned any
/// accounts.
const EXIT_NOTHING_TO_RECONCILE: u8 = 2;

const EXIT_FAILURE: u8 = 1;

/// Log level for commands that do not read a configuration file.
const DEFAULT_CLI_LOG_LEVEL: &str = "warn";

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// ldapsync command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "ldapsync",
    version,
    about = "Reconcile accounts and passwords from Active Directory into OpenLDAP"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "/etc/ldapsync/config.toml")]
    config: PathBuf,

    /// Override the log level (trace, debug, info, warn, error, or a directive list).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one reconciliation pass.
    Sync {
        /// Read both directories but only log and record the writes.
        #[arg(long)]
        dry_run: bool,

        /// Print the pass report as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Print the uidNumber the next created account would receive.
    NextUid,

    /// Validate a configuration file.
    Validate,

    /// Generate a sample configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./ldapsync.toml")]
        output: PathBuf,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_status(&e))
        }
    }
}

/// Process status for a failed run. Only a pass with nothing to reconcile
/// gets its own status.
fn exit_status(error: &anyhow::Error) -> u8 {
    let nothing_to_reconcile = error
        .downcast_ref::<SyncError>()
        .is_some_and(SyncError::is_nothing_to_reconcile);
    if nothing_to_reconcile {
        EXIT_NOTHING_TO_RECONCILE
    } else {
        EXIT_FAILURE
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { output } => {
            init_cli_logging(cli.log_level.as_deref())?;
            cmd_init(&output)
        }
        Commands::Validate => {
            init_cli_logging(cli.log_level.as_deref())?;
            cmd_validate(&cli.config)
        }
        Commands::Sync { dry_run, json } => {
            let config = load_config(&cli.config)?;
            let _guard = init_logging(cli.log_level.as_deref(), &config)?;
            cmd_sync(&cli.config, &config, dry_run, json).await
        }
        Commands::NextUid => {
            let config = load_config(&cli.config)?;
            let _guard = init_logging(cli.log_level.as_deref(), &config)?;
            cmd_next_uid(&config).await
        }
    }
}

// ---------------------------------------------------------------------------
// Config & logging helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<AppConfig> {
    let mut config =
        AppConfig::load_from_file(path).context("failed to load configuration file")?;
    config
        .resolve_env_vars()
        .context("failed to resolve environment variables in config")?;
    config
        .validate()
        .context("configuration validation failed")?;
    Ok(config)
}

fn init_logging(flag: Option<&str>, config: &AppConfig) -> Result<Option<WorkerGuard>> {
    let filter = logging::build_filter(flag, &config.logging.level)?;
    logging::init(filter, config.logging.directory.as_deref())
}

fn init_cli_logging(flag: Option<&str>) -> Result<()> {
    let filter = logging::build_filter(flag, DEFAULT_CLI_LOG_LEVEL)?;
    logging::init(filter, None)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

async fn cmd_sync(config_path: &Path, config: &AppConfig, dry_run: bool, json: bool) -> Result<()> {
    info!("========================================");
    info!("  ldapsync v{}", env!("CARGO_PKG_VERSION"));
    info!("========================================");
    info!("Config file   : {}", config_path.display());
    info!("Source        : {} ({})", config.source.directory.url, config.source.base_dn);
    info!("Target        : {} ({})", config.target.directory.url, config.target.base_dn);
    info!("Excluded      : {} username(s)", config.sync.excluded_usernames.len());
    info!("Dry run       : {}", dry_run);
    info!("========================================");

    let source = LdapDirectory::new(&config.source.directory);
    let target = LdapDirectory::new(&config.target.directory);
    let shutdown = setup_signal_handlers();

    if dry_run {
        let engine = ReconciliationEngine::new(config, source, DryRunDirectory::new(target));
        let report = engine.run_pass(&shutdown).await?;
        let planned = engine.target().recorded();
        output::print_report(&report, Some(&planned), json)
    } else {
        let engine = ReconciliationEngine::new(config, source, target);
        let report = engine.run_pass(&shutdown).await?;
        output::print_report(&report, None, json)
    }
}

async fn cmd_next_uid(config: &AppConfig) -> Result<()> {
    let target = LdapDirectory::new(&config.target.directory);
    let allocator = IdentifierAllocator::from_config(&config.target);

    let allocation = allocator
        .next_identifier(&target)
        .await
        .context("failed to scan the target directory for identifiers")?;

    let next = match allocation {
        Allocation::Next(next) => next,
        Allocation::NoPrecedent => match config.target.first_identifier {
            Some(first) => {
                info!(first, "no identifiers in use, falling back to first_identifier");
                first
            }
            None => anyhow::bail!(
                "no identifiers in use under {} and target.first_identifier is not set",
                allocator.base_dn()
            ),
        },
    };

    println!("{next}");
    Ok(())
}

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, sample_config()).context("failed to write config file")?;

    println!("Sample configuration written to {}", output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit the config file with your directory servers and base DNs");
    println!(
        "  2. Set the referenced environment variables (LDAPSYNC_SOURCE_PASSWORD, LDAPSYNC_TARGET_PASSWORD)"
    );
    println!("  3. Validate with: ldapsync validate --config {}", output.display());
    println!(
        "  4. Preview a pass: ldapsync sync --dry-run --config {}",
        output.display()
    );

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  {}", style::success("TOML structure is valid"));

    // Missing passwords are reported but do not stop the remaining checks.
    match config.resolve_env_vars() {
        Ok(()) => println!("  {}", style::success("Environment variable references resolved")),
        Err(e) => println!("  {}", style::warn(&e.to_string())),
    }

    if let Err(e) = config.validate() {
        println!("  {}", style::error(&format!("Validation error: {e}")));
        anyhow::bail!("configuration validation failed");
    }
    println!("  {}", style::success("All required fields are valid"));

    println!();
    println!("{}", style::header("Configuration summary"));
    println!("  Source URL        : {}", config.source.directory.url);
    println!("  Source bind       : {}", bind_summary(&config.source.directory));
    println!("  Source base DN    : {}", config.source.base_dn);
    println!("  Target URL        : {}", config.target.directory.url);
    println!("  Target bind       : {}", bind_summary(&config.target.directory));
    println!("  Target base DN    : {}", config.target.base_dn);
    println!("  New account DN    : {}", config.target.account_dn_template);
    println!("  uidNumber scan    : {}", config.target.identifier_base_dn());
    println!(
        "  First uidNumber   : {}",
        config
            .target
            .first_identifier
            .map(|n| n.to_string())
            .unwrap_or_else(|| "not set".to_string())
    );
    println!("  Hash attribute    : {}", config.sync.password_hash_attribute);
    println!("  Excluded users    : {}", config.sync.excluded_usernames.len());
    println!(
        "  Template attrs    : {}",
        config.sync.new_account_template.len()
    );
    println!();
    println!("Configuration is valid.");

    Ok(())
}

fn bind_summary(directory: &DirectoryConfig) -> String {
    match (&directory.bind_dn, &directory.bind_password) {
        (None, _) => "anonymous".to_string(),
        (Some(dn), Some(_)) => format!("{dn} (password set)"),
        (Some(dn), None) => format!("{dn} (password NOT SET)"),
    }
}
