// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! tagsort: filename-driven file organizer

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use tagsort::config::{default_config_path, AppConfig, WatchPair};
use tagsort::events::{EngineEvent, EventLevel};
use tagsort::grammar::parse_filename;
use tagsort::history::Journal;
use tagsort::ledger::{BulkReport, MoveRecord};
use tagsort::{Engine, OrganizerError, Result};

/// tagsort CLI - organize files by the tags in their names
#[derive(Parser, Debug)]
#[command(name = "tagsort")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Moves files named `FOLDER, Name (tag).ext` into FOLDER/tag/Name.ext", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (default: ~/.watcher_pairs_config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Output format for results
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch the configured folders and organize new files
    Watch,

    /// Organize recent files once and exit
    Scan,

    /// Show where files with these names would be moved
    Parse {
        /// File names to parse
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Move history, undo and redo
    History {
        #[command(subcommand)]
        action: HistoryCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Create a configuration with a sample watch pair
    Init {
        /// Directory for the sample watch and target folders (default: current)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Force overwrite existing configuration
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryCommands {
    /// List recent log entries
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "10")]
        count: usize,
    },

    /// Move files back to where they came from
    Undo {
        /// Undo every move
        #[arg(long, conflicts_with = "id")]
        all: bool,

        /// Undo one specific move
        #[arg(long)]
        id: Option<String>,
    },

    /// Re-apply undone moves
    Redo {
        /// Redo every undone move
        #[arg(long, conflicts_with = "id")]
        all: bool,

        /// Redo one specific move
        #[arg(long)]
        id: Option<String>,
    },

    /// Check that every logged file is where the log says
    Verify,

    /// Export log entries between two dates
    Export {
        /// Output file; `.json` exports JSON, anything else plain text
        output: PathBuf,

        /// First day to include (YYYY-MM-DD, default: today)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last day to include (YYYY-MM-DD, default: today)
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Clear all history
    Clear {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path (default: the configuration path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let format = cli.format.as_str();

    match cli.command {
        Some(Commands::Watch) | None => run_watch(&config_path, format).await,
        Some(Commands::Scan) => run_scan(AppConfig::load(&config_path)?, format).await,
        Some(Commands::Parse { names }) => run_parse(&names, format),
        Some(Commands::History { action }) => {
            run_history_command(AppConfig::load(&config_path)?, action, format)
        }
        Some(Commands::Config { action }) => run_config_command(action, &config_path),
        Some(Commands::Init { dir, force }) => run_init(dir, force, &config_path),
    }
}

/// Run the engine until Ctrl+C or SIGTERM; SIGHUP reloads the configuration
async fn run_watch(config_path: &Path, format: &str) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    for problem in config.validate() {
        warn!("{}", problem);
    }

    let mut journal = Journal::open(config.log_path())?;
    let mut engine = Engine::new(config);
    let mut events = engine
        .take_events()
        .ok_or_else(|| OrganizerError::InvalidState("event stream already taken".into()))?;

    engine.start().await?;

    // Setup graceful shutdown
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = terminate => info!("Received SIGTERM, shutting down..."),
        }

        let _ = shutdown_tx.send(true);
    });

    let (reload_tx, mut reload_rx) = mpsc::unbounded_channel::<()>();
    #[cfg(unix)]
    tokio::spawn(async move {
        if let Ok(mut hangup) = signal::unix::signal(signal::unix::SignalKind::hangup()) {
            while hangup.recv().await.is_some() {
                if reload_tx.send(()).is_err() {
                    break;
                }
            }
        }
    });
    #[cfg(not(unix))]
    drop(reload_tx);

    info!("Organizer active. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                print_event(&event, format);
                if let Err(e) = journal.record(&event) {
                    warn!("Cannot write to activity log: {}", e);
                }
            }
            Some(()) = reload_rx.recv() => {
                match AppConfig::load(config_path) {
                    Ok(config) => {
                        engine.reload(config);
                    }
                    Err(e) => error!("Keeping previous configuration: {}", e),
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }

    engine.stop().await?;

    // Log whatever the worker reported while finishing its batch
    while let Ok(event) = events.try_recv() {
        print_event(&event, format);
        if let Err(e) = journal.record(&event) {
            warn!("Cannot write to activity log: {}", e);
        }
    }

    info!("tagsort stopped.");
    Ok(())
}

/// Organize recent files once
async fn run_scan(config: AppConfig, format: &str) -> Result<()> {
    let mut journal = Journal::open(config.log_path())?;
    let mut engine = Engine::new(config);
    let mut events = engine
        .take_events()
        .ok_or_else(|| OrganizerError::InvalidState("event stream already taken".into()))?;

    let found = engine.run_once().await?;

    let mut moved = 0;
    while let Ok(event) = events.try_recv() {
        if event.is_reversible() {
            moved += 1;
        }
        print_event(&event, format);
        journal.record(&event)?;
    }

    if format == "text" {
        println!("\nFound {} candidate(s), moved {}", found, moved);
    }
    Ok(())
}

fn print_event(event: &EngineEvent, format: &str) {
    if format == "json" {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Cannot serialize event: {}", e),
        }
        return;
    }

    let marker = match event.level {
        EventLevel::Info => "",
        EventLevel::Warning => "warning: ",
        EventLevel::Error => "error: ",
    };
    println!("[{}] {}{}", Local::now().format("%H:%M:%S"), marker, event.message);
}

/// Show the parsed destination of each name
fn run_parse(names: &[String], format: &str) -> Result<()> {
    let mut results = Vec::new();

    for name in names {
        match parse_filename(name) {
            Ok(parsed) => {
                if format == "text" {
                    let mut parts = vec![parsed.main_folder.clone()];
                    parts.extend(parsed.subfolder_path.iter().cloned());
                    parts.push(parsed.final_file_name.clone());
                    println!("{} → {}", name, parts.join("/"));
                }
                results.push(serde_json::json!({ "name": name, "destination": parsed }));
            }
            Err(rejection) => {
                if format == "text" {
                    println!("{} → ignored ({})", name, rejection);
                }
                results.push(serde_json::json!({ "name": name, "rejected": rejection.to_string() }));
            }
        }
    }

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }
    Ok(())
}

/// Run history commands
fn run_history_command(config: AppConfig, action: HistoryCommands, format: &str) -> Result<()> {
    let mut journal = Journal::open(config.log_path())?;

    match action {
        HistoryCommands::List { count } => {
            let entries = journal.log().get_recent(count)?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }
            println!("Recent history ({} entries):", entries.len());
            for entry in entries {
                let suffix = match &entry.record {
                    Some(record) if record.is_undone => format!(" [UNDONE] {}", record.id),
                    Some(record) => format!(" {}", record.id),
                    None => String::new(),
                };
                println!(
                    "  {} {}{}",
                    entry.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
                    entry.message,
                    suffix
                );
            }
        }
        HistoryCommands::Undo { all, id } => {
            if all {
                print_bulk("Undone", &journal.undo_all()?);
            } else {
                let result = match id {
                    Some(id) => journal.undo_entry(&id),
                    None => journal.undo_last(),
                };
                print_single(result)?;
            }
        }
        HistoryCommands::Redo { all, id } => {
            if all {
                print_bulk("Redone", &journal.redo_all()?);
            } else {
                let result = match id {
                    Some(id) => journal.redo_entry(&id),
                    None => journal.redo_last(),
                };
                print_single(result)?;
            }
        }
        HistoryCommands::Verify => {
            let status = journal.verify();
            let missing = status.iter().filter(|(_, present)| !present).count();
            for (record, present) in &status {
                let mark = if *present { "✓" } else { "✗" };
                println!("  {} {}", mark, record.current_location.display());
            }
            println!("{} file(s) checked, {} missing", status.len(), missing);
        }
        HistoryCommands::Export { output, from, to } => {
            let today = Local::now().date_naive();
            let from = local_bound(from.unwrap_or(today), false)?;
            let to = local_bound(to.unwrap_or(today), true)?;
            if from > to {
                return Err(OrganizerError::Config("--from is after --to".into()));
            }
            let count = journal.log().export(from, to, &output)?;
            println!("Exported {} entries to {:?}", count, output);
        }
        HistoryCommands::Clear { force } => {
            if !force {
                eprintln!("Use --force to confirm clearing history");
                return Ok(());
            }
            journal.clear()?;
            println!("History cleared");
        }
    }

    Ok(())
}

/// First or last second of a local calendar day, as a UTC instant
fn local_bound(date: NaiveDate, end_of_day: bool) -> Result<DateTime<Utc>> {
    let naive = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    }
    .ok_or_else(|| OrganizerError::Config(format!("Invalid date {}", date)))?;

    Ok(match naive.and_local_timezone(Local).earliest() {
        Some(local) => local.with_timezone(&Utc),
        None => Utc.from_utc_datetime(&naive),
    })
}

fn print_single(result: Result<MoveRecord>) -> Result<()> {
    match result {
        Ok(record) => {
            println!("{} → {}", record.message, record.current_location.display());
            Ok(())
        }
        Err(OrganizerError::NothingToUndo) => {
            println!("Nothing to undo");
            Ok(())
        }
        Err(OrganizerError::NothingToRedo) => {
            println!("Nothing to redo");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn print_bulk(action: &str, report: &BulkReport) {
    println!("{} {} move(s)", action, report.done.len());
    for (id, e) in &report.failed {
        println!("  failed {}: {}", id, e);
    }
}

/// Run config commands
fn run_config_command(action: ConfigCommands, config_path: &Path) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let config = AppConfig::load(config_path)?;
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        ConfigCommands::Generate { output, force } => {
            let output = output.unwrap_or_else(|| config_path.to_path_buf());
            if output.exists() && !force {
                return Err(OrganizerError::Config(format!(
                    "{:?} already exists. Use --force to overwrite",
                    output
                )));
            }
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            let config = AppConfig::load(config_path)?;
            let problems = config.validate();
            if problems.is_empty() {
                println!("Configuration at {:?} is valid", config_path);
                println!("  Watch pairs: {}", config.watch_pairs.len());
                println!("  Max file age: {}h", config.max_file_age_hours);
                println!("  Activity log: {:?}", config.log_path());
            } else {
                for problem in &problems {
                    println!("  - {}", problem);
                }
                return Err(OrganizerError::Config(format!(
                    "{} problem(s) in {:?}",
                    problems.len(),
                    config_path
                )));
            }
        }
    }

    Ok(())
}

/// Create sample folders and a configuration pointing at them
fn run_init(dir: Option<PathBuf>, force: bool, config_path: &Path) -> Result<()> {
    if config_path.exists() && !force {
        return Err(OrganizerError::Config(format!(
            "{:?} already exists. Use --force to overwrite",
            config_path
        )));
    }

    let base = dir.unwrap_or_else(|| PathBuf::from("."));
    let watch_dir = base.join("inbox");
    let target_dir = base.join("sorted");
    std::fs::create_dir_all(&watch_dir)?;
    std::fs::create_dir_all(&target_dir)?;

    let mut config = AppConfig::default();
    config.watch_pairs = vec![WatchPair::new(
        watch_dir.canonicalize()?,
        target_dir.canonicalize()?,
    )];
    config.save(config_path)?;

    println!("tagsort initialized in {:?}", base);
    println!("\nCreated:");
    println!("  - {}", config_path.display());
    println!("  - inbox/");
    println!("  - sorted/");
    println!("\nNext steps:");
    println!("  1. Drop a file named like `Docs, Report (2024).pdf` into inbox/");
    println!("  2. Start the organizer: tagsort watch");

    Ok(())
}
