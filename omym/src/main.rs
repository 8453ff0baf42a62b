//! omym - music library organizer
//!
//! Subcommands:
//! - `organize <PATH>`: move audio files into the library layout
//! - `plan <PATH>`: organize with `--dry-run` forced
//! - `restore <PATH>`: move organized files back to where they came from
//! - `preferences`: show the artist-name preferences file
//!
//! Exit codes: 0 when everything succeeded, 1 when any file failed or a
//! batch was aborted, 130 on Ctrl-C (the open batch transaction is rolled
//! back when its future is dropped).

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use omym::config::{preferences_path, ArtistNamePreferences, Settings};
use omym::db::maintenance::{clear_all_state, clear_artist_cache};
use omym::services::restore::{self, CollisionPolicy, RestoreOutcome, RestoreReport, RestoreRequest};
use omym::utils::fs::is_strictly_inside;
use omym::{DirectoryReport, MusicProcessor, OrganizeError, ProcessorOptions};
use omym_common::config::{default_config_path, load_or_create_toml_config};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "omym=info,omym_common=info";

#[derive(Parser, Debug)]
#[command(name = "omym", version, about = "Organize a music collection into a tidy library")]
struct Cli {
    /// Configuration file (default: platform config dir)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// State database file
    #[arg(long, global = true, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Warnings and errors only
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Organize a directory or a single audio file
    Organize(OrganizeArgs),
    /// Show what organize would do without moving anything
    Plan(OrganizeArgs),
    /// Move organized files back to their original locations
    Restore(RestoreArgs),
    /// Show the artist-name preferences file
    Preferences {
        /// Print only the file path
        #[arg(long)]
        show_path: bool,
    },
}

#[derive(Args, Debug)]
struct OrganizeArgs {
    /// Source directory or audio file
    path: PathBuf,

    /// Library root (default: base_path setting, else the source directory)
    #[arg(long, value_name = "DIR")]
    target: Option<PathBuf>,

    #[arg(long)]
    dry_run: bool,

    /// Allow a library root inside the source tree
    #[arg(long)]
    force: bool,

    /// Clear processing state and the artist cache first
    #[arg(long)]
    clear_cache: bool,

    /// Clear the artist cache first
    #[arg(long)]
    clear_artist_cache: bool,
}

#[derive(Args, Debug)]
struct RestoreArgs {
    /// Organized library (or a directory inside it)
    path: PathBuf,

    /// Restore under this directory instead of the original locations
    #[arg(long, value_name = "DIR")]
    destination: Option<PathBuf>,

    #[arg(long)]
    dry_run: bool,

    #[arg(long, value_enum, default_value_t = CollisionPolicy::Abort)]
    collision_policy: CollisionPolicy,

    #[arg(long, default_value = restore::DEFAULT_BACKUP_SUFFIX)]
    backup_suffix: String,

    #[arg(long)]
    continue_on_error: bool,

    /// Restore at most N files
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Clear processing state after a restore without failures
    #[arg(long)]
    purge_state: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tokio::select! {
        result = run(cli) => match result {
            Ok(code) => code,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                ExitCode::from(1)
            }
        },
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted");
            ExitCode::from(130)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let toml_config = load_or_create_toml_config(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    let settings = Settings::resolve(&toml_config, cli.db.as_deref());

    init_logging(&settings, cli.verbose, cli.quiet)?;
    info!(
        "Starting omym v{} (config {})",
        env!("CARGO_PKG_VERSION"),
        config_path.display()
    );

    match cli.command {
        Command::Organize(args) => organize(&settings, args, false).await,
        Command::Plan(args) => organize(&settings, args, true).await,
        Command::Restore(args) => restore_library(&settings, args).await,
        Command::Preferences { show_path } => show_preferences(show_path),
    }
}

fn init_logging(settings: &Settings, verbose: bool, quiet: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("omym=debug,omym_common=debug")
    } else if quiet {
        EnvFilter::new("omym=warn,omym_common=warn")
    } else if let Ok(filter) = EnvFilter::try_from_default_env() {
        filter
    } else {
        let configured = settings.log_level.as_deref().unwrap_or(DEFAULT_LOG_FILTER);
        EnvFilter::try_new(configured).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    let file_layer = match &settings.log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .try_init()?;
    Ok(())
}

/// Absolute form of a path that may not exist yet
fn absolute(path: &Path) -> Result<PathBuf> {
    match path.canonicalize() {
        Ok(path) => Ok(path),
        Err(_) => Ok(std::env::current_dir()?.join(path)),
    }
}

async fn organize(settings: &Settings, args: OrganizeArgs, force_dry_run: bool) -> Result<ExitCode> {
    let dry_run = force_dry_run || args.dry_run;
    if !args.path.exists() {
        anyhow::bail!("Path does not exist: {}", args.path.display());
    }

    let source = absolute(&args.path)?;
    let source_dir = if source.is_dir() {
        source.clone()
    } else {
        source.parent().map(Path::to_path_buf).unwrap_or_else(|| source.clone())
    };
    let base_path = match args.target.as_ref().or(settings.base_path.as_ref()) {
        Some(target) => absolute(target)?,
        None => source_dir.clone(),
    };

    if !args.force && is_strictly_inside(&base_path, &source_dir) {
        return Err(OrganizeError::UnsafeTarget {
            source_dir,
            target: base_path,
        }
        .into());
    }

    let pool = omym_common::db::init_database(&settings.database_path)
        .await
        .with_context(|| format!("Failed to open database {}", settings.database_path.display()))?;

    if args.clear_cache {
        clear_all_state(&pool).await?;
        info!("Cleared processing state and artist cache");
    } else if args.clear_artist_cache {
        let deleted = clear_artist_cache(&pool).await?;
        info!(deleted, "Cleared artist cache");
    }

    let preferences = ArtistNamePreferences::load_or_create(&preferences_path()?)?;
    let mut options = ProcessorOptions::new(&base_path);
    options.dry_run = dry_run;
    options.unprocessed_dir_name = settings.unprocessed_dir_name.clone();

    info!(
        source = %source.display(),
        library = %base_path.display(),
        dry_run,
        "Organizing"
    );

    let mut processor = MusicProcessor::from_settings(pool.clone(), settings, options, preferences);
    let outcome = processor.process_path(&source).await;
    drop(processor);
    pool.close().await;

    let report = outcome?;
    print_report(&report, dry_run, settings.unprocessed_preview_limit);

    Ok(if report.failed > 0 {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

fn print_report(report: &DirectoryReport, dry_run: bool, preview_limit: usize) {
    let heading = if dry_run { "Plan" } else { "Organize" };
    println!(
        "{} finished in {:.1}s: {} processed, {} skipped, {} failed",
        heading,
        report.duration.as_secs_f64(),
        report.processed,
        report.skipped,
        report.failed
    );

    if dry_run {
        for result in report.results.iter().filter(|r| r.success) {
            if let Some(target) = &result.target_path {
                println!("  {} -> {}", result.source_path.display(), target.display());
            }
        }
    }

    if report.failed > 0 {
        println!("Failed files:");
        for result in report.failures() {
            println!(
                "  {}: {}",
                result.source_path.display(),
                result.error_message.as_deref().unwrap_or("unknown error")
            );
        }
    }

    let warnings: Vec<&String> = report.results.iter().flat_map(|r| r.warnings.iter()).collect();
    if !warnings.is_empty() {
        println!("Warnings:");
        for warning in warnings {
            println!("  {}", warning);
        }
    }

    if !report.quarantined.is_empty() {
        println!("Moved to unprocessed ({}):", report.quarantined.len());
        for (source, destination) in report.quarantined.iter().take(preview_limit) {
            println!("  {} -> {}", source.display(), destination.display());
        }
        if report.quarantined.len() > preview_limit {
            println!("  ... and {} more", report.quarantined.len() - preview_limit);
        }
    }
}

async fn restore_library(settings: &Settings, args: RestoreArgs) -> Result<ExitCode> {
    if !args.path.is_dir() {
        anyhow::bail!("Not a directory: {}", args.path.display());
    }

    let pool = omym_common::db::init_database(&settings.database_path)
        .await
        .with_context(|| format!("Failed to open database {}", settings.database_path.display()))?;

    let mut request = RestoreRequest::new(absolute(&args.path)?);
    request.destination_root = args.destination.as_deref().map(absolute).transpose()?;
    request.dry_run = args.dry_run;
    request.collision_policy = args.collision_policy;
    request.backup_suffix = args.backup_suffix;
    request.continue_on_error = args.continue_on_error;
    request.limit = args.limit;
    request.purge_state = args.purge_state;
    request.unprocessed_dir_name = settings.unprocessed_dir_name.clone();

    let outcome = restore::restore(&pool, &request).await;
    pool.close().await;

    let report = outcome?;
    print_restore_report(&report, request.dry_run);

    Ok(if report.failed > 0 {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

fn print_restore_report(report: &RestoreReport, dry_run: bool) {
    for result in &report.results {
        let label = match &result.outcome {
            RestoreOutcome::Moved => "restored".to_string(),
            RestoreOutcome::Planned => "would restore".to_string(),
            RestoreOutcome::AlreadyRestored => "already restored".to_string(),
            RestoreOutcome::SourceMissing => "missing".to_string(),
            RestoreOutcome::DestinationExists => "destination exists".to_string(),
            RestoreOutcome::Failed(message) => format!("failed: {}", message),
        };
        println!(
            "  [{}] {} -> {}",
            label,
            result.item.source_path.display(),
            result.item.destination_path.display()
        );
        if let Some(backup) = &result.backup_path {
            println!("      existing file moved to {}", backup.display());
        }
        for warning in result.assets.iter().filter_map(|a| a.warning()) {
            println!("      {}", warning);
        }
    }

    let heading = if dry_run { "Restore plan" } else { "Restore" };
    println!(
        "{}: {} restored, {} skipped, {} failed",
        heading, report.moved, report.skipped, report.failed
    );
    if report.purged {
        println!("Processing state cleared");
    }
}

fn show_preferences(show_path: bool) -> Result<ExitCode> {
    let path = preferences_path()?;
    if show_path {
        println!("{}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    let preferences = ArtistNamePreferences::load_or_create(&path)?;
    println!("Preferences file: {}", path.display());
    if preferences.entries().is_empty() {
        println!("No artist name preferences configured");
    }
    for (name, value) in preferences.entries() {
        if value.trim().is_empty() {
            println!("  {} = (not set)", name);
        } else {
            println!("  {} = {}", name, value);
        }
    }
    Ok(ExitCode::SUCCESS)
}
