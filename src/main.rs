//! Command-line interface for `drill-ledger`.
//!
//! Every subcommand works on the folders and database named by the configuration file
//! (or the built-in defaults when `--config` is not given).

mod display;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use drill_ledger::config::Config;
use drill_ledger::database::stats::load_records;
use drill_ledger::database::stats::material_counts;
use drill_ledger::database::stats::recovery_by_depth;
use drill_ledger::database::stats::Summary;
use drill_ledger::pipeline::FileOutcome;
use drill_ledger::pipeline::Pipeline;
use drill_ledger::watch::FolderWatcher;
use std::io::IsTerminal;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::debug;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "drill-ledger",
    version,
    about = "Collects daily drill-log workbooks into a cumulative drilling database"
)]
struct Cli {
    /// TOML configuration file; built-in defaults are used when omitted.
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose (DEBUG level) logging output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable TRACE level logging output.
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Creates an empty database workbook at the configured path.
    Init,

    /// Ingests the given daily logs and appends them to the database.
    Ingest {
        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,
    },

    /// Ingests every daily log currently in the source folder.
    Rescan,

    /// Watches the source folder; on a terminal, end of input (Ctrl-D) stops it.
    Watch,

    /// Prints the last written row of the database.
    Status,

    /// Prints summary figures and chart series of the database.
    Stats,

    /// Reads a daily log and prints its rows without touching the database.
    Check {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match (cli.debug, cli.verbose) {
        (true, _) => "trace",
        (false, true) => "debug",
        (false, false) => "info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .init();

    let config = load_config(cli.config.as_deref())?;
    let pipeline = Pipeline::new(&config).context("Invalid configuration")?;

    match cli.command {
        Commands::Init => handle_init(&pipeline),
        Commands::Ingest { files } => {
            let outcomes = files
                .into_iter()
                .map(|file| {
                    let outcome = pipeline.process(&file);
                    (file, outcome)
                })
                .collect();
            report_outcomes(outcomes)
        }
        Commands::Rescan => {
            let outcomes = pipeline
                .rescan()
                .with_context(|| format!("Cannot list '{}'", config.source_folder.display()))?;
            report_outcomes(outcomes)
        }
        Commands::Watch => handle_watch(&pipeline, &config),
        Commands::Status => handle_status(&pipeline),
        Commands::Stats => handle_stats(&config),
        Commands::Check { file } => handle_check(&pipeline, &file),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)?,
        None => {
            let config = Config::default();
            config.validate()?;
            config
        }
    };
    debug!(
        source_folder = %config.source_folder.display(),
        database_file = %config.database_file.display(),
        "Configuration loaded"
    );
    Ok(config)
}

fn handle_init(pipeline: &Pipeline) -> Result<()> {
    let appender = pipeline.appender();
    appender.create_empty()?;
    println!("Created {}", appender.path().display());
    Ok(())
}

fn report_outcomes(outcomes: Vec<(PathBuf, FileOutcome)>) -> Result<()> {
    if outcomes.is_empty() {
        println!("No daily logs found");
        return Ok(());
    }
    println!("{}", display::outcomes_table(&outcomes));
    let failed = outcomes
        .iter()
        .filter(|(_, outcome)| matches!(outcome, FileOutcome::Failed { .. }))
        .count();
    if failed > 0 {
        bail!("{} of {} files were not ingested", failed, outcomes.len());
    }
    Ok(())
}

fn handle_watch(pipeline: &Pipeline, config: &Config) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    // detached runs have no terminal and stop only when killed
    if std::io::stdin().is_terminal() {
        let stdin_shutdown = shutdown.clone();
        std::thread::spawn(move || {
            let mut sink = Vec::new();
            let _ = std::io::stdin().read_to_end(&mut sink);
            info!("Standard input closed, stopping");
            stdin_shutdown.store(true, Ordering::Relaxed);
        });
    }
    FolderWatcher::new(pipeline, &config.watch)
        .run(&shutdown)
        .with_context(|| format!("Cannot watch '{}'", config.source_folder.display()))
}

fn handle_status(pipeline: &Pipeline) -> Result<()> {
    let appender = pipeline.appender();
    let last_row = appender.last_row()?;
    println!("{}: last row {}", appender.path().display(), last_row);
    Ok(())
}

fn handle_stats(config: &Config) -> Result<()> {
    let records = load_records(&config.database_file, &config.database)?;
    println!("{}", display::summary_table(&Summary::from_records(&records)));
    let recovery = recovery_by_depth(&records);
    if !recovery.is_empty() {
        println!("\nRecovery by depth\n{}", display::recovery_table(&recovery));
    }
    let materials = material_counts(&records);
    if !materials.is_empty() {
        println!("\nMaterial distribution\n{}", display::material_table(&materials));
    }
    Ok(())
}

fn handle_check(pipeline: &Pipeline, file: &Path) -> Result<()> {
    let ingested = pipeline.ingestor().ingest(file)?;
    println!(
        "{}: hole {} logged {} ({} columns), {} rows, {} skipped",
        file.display(),
        ingested.metadata.hole_id,
        ingested.metadata.logging_date,
        ingested.mapping.kind(),
        ingested.rows.len(),
        ingested.skipped
    );
    if !ingested.rows.is_empty() {
        println!("{}", display::intervals_table(&ingested.rows));
    }
    Ok(())
}
