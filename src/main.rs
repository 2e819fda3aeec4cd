//! # MedInteract CLI (`medinteract`)
//!
//! A thin client of the interaction engine.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `medinteract init [--force]` | Build or extend the index from the data directory |
//! | `medinteract analyze --case <file.json> [--json]` | Analyze a patient case |
//! | `medinteract prompt --case <file.json>` | Print the formatted query only |
//! | `medinteract stats` | Show index statistics |
//!
//! ## Patient case file
//!
//! ```json
//! {
//!   "current_medications": [{"name": "Lisinopril", "dosage": "10mg daily"}],
//!   "allergies": [{"name": "Penicillin", "reaction": "Rash"}],
//!   "conditions": ["Diabetes"],
//!   "new_medications": [{"name": "Metoprolol", "dosage": "25mg twice daily"}],
//!   "patient_info": {"age": "45", "gender": "Male", "blood_pressure": "120/80"},
//!   "additional_info": ""
//! }
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use medinteract::config::{self, Config};
use medinteract::sqlite_store::SqliteStore;
use medinteract::InteractionEngine;
use medinteract_core::models::{AnalysisResult, PatientCase};
use medinteract_core::prompt::format_query;
use medinteract_core::store::Store;

#[derive(Parser)]
#[command(
    name = "medinteract",
    about = "MedInteract: retrieval-augmented medication interaction analysis",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults are used if it does not exist.
    #[arg(long, global = true, default_value = "./config/medinteract.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest the data directory and build or extend the index.
    ///
    /// Chunks already in the index are skipped, so running this repeatedly
    /// against an unchanged directory adds nothing.
    Init {
        /// Re-run the pipeline even if the engine reports ready.
        #[arg(long)]
        force: bool,
    },

    /// Analyze a patient case for potential interactions.
    Analyze {
        /// Patient case JSON file.
        #[arg(long)]
        case: PathBuf,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the query that would be sent for a patient case.
    Prompt {
        /// Patient case JSON file.
        #[arg(long)]
        case: PathBuf,
    },

    /// Show index statistics.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_exists = cli.config.exists();
    let cfg = config::load_config(&cli.config)?;
    init_tracing(&cfg);
    if !config_exists {
        warn!(path = %cli.config.display(), "config file not found, using defaults");
    }

    match cli.command {
        Commands::Init { force } => run_init(cfg, force).await,
        Commands::Analyze { case, json } => run_analyze(cfg, &case, json).await,
        Commands::Prompt { case } => {
            let case = read_case(&case)?;
            print!("{}", format_query(&case));
            Ok(())
        }
        Commands::Stats => run_stats(&cfg).await,
    }
}

/// Log to stderr; `RUST_LOG` overrides `[log].filter`.
fn init_tracing(cfg: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.log.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_case(path: &Path) -> Result<PatientCase> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read patient case: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid patient case JSON: {}", path.display()))
}

async fn run_init(cfg: Config, force: bool) -> Result<()> {
    let mut engine = InteractionEngine::from_config(cfg)?;
    let outcome = if force {
        engine.reinitialize().await
    } else {
        engine.initialize().await
    };

    println!("{}", outcome.message);
    if let Some(report) = &outcome.report {
        println!("  pages loaded: {}", report.documents);
        println!("  files failed: {}", report.failed_files);
        println!("  chunks: {}", report.chunks);
        println!("  inserted: {}", report.inserted);
        println!("  already indexed: {}", report.skipped_existing);
        println!("  index entries: {}", report.total_entries);
    }

    if !outcome.ok {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_analyze(cfg: Config, case_path: &Path, json: bool) -> Result<()> {
    let case = read_case(case_path)?.sanitized();
    if !case.has_new_medication() {
        bail!("Please add at least one new medication to analyze.");
    }

    let mut engine = InteractionEngine::from_config(cfg)?;
    let result = engine.analyze(case).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        match &result {
            AnalysisResult::Analysis { analysis, sources } => {
                println!("{}", analysis.trim_end());
                if !sources.is_empty() {
                    println!();
                    println!("Sources:");
                    for (i, source) in sources.iter().enumerate() {
                        println!("  [{}] {} (page {})", i + 1, source.source, source.page);
                        println!("      {}", source.excerpt);
                    }
                }
            }
            AnalysisResult::Error { error } => eprintln!("{}", error),
        }
    }

    if result.is_error() {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_stats(cfg: &Config) -> Result<()> {
    let store = SqliteStore::new(cfg.index.path.clone());
    let entries = store.count().await?;

    println!("index: {}", store.path().display());
    if entries == 0 {
        println!("  entries: 0 (no index yet, run `medinteract init`)");
        return Ok(());
    }

    println!("  entries: {}", entries);
    println!("  sources: {}", store.source_count().await?);
    if let Some(model) = store.embedding_model().await? {
        println!("  embedding model: {}", model);
    }
    if let Some(created) = store.created_at().await? {
        println!("  created: {}", created);
    }
    store.close().await;
    Ok(())
}
