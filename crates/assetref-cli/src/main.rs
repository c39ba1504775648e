//! AssetRef CLI
//!
//! Command-line interface for finding the scenes and prefabs that reference
//! a script.

use anyhow::{Context, Result};
use assetref_indexer::watcher::forward_changes;
use assetref_indexer::{
    AssetIndex, CocosUuidCodec, FileWatcher, IndexConfig, IndexerError, ReferenceReport,
    ReferenceScanner, TokenCodec, WatcherOptions,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "assetref")]
#[command(about = "AssetRef - find the scenes and prefabs that reference a script")]
#[command(version)]
struct Cli {
    /// Project root (default: current directory)
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Config file (default: <project>/.assetref.yaml, then the user config)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find the documents that reference a file
    Find {
        /// Script to look up
        file: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Watch the project and answer one query per line on stdin
    Watch,

    /// Print the compressed token for a uuid
    Token {
        /// Dashed uuid
        uuid: String,

        /// Print the 22-character form (2 hex digits kept)
        #[arg(long)]
        min: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => IndexConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => IndexConfig::load(&cli.project),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Find { file, json } => cmd_find(&cli.project, &config, &file, json).await,
        Commands::Watch => cmd_watch(&cli.project, &config).await,
        Commands::Token { uuid, min } => cmd_token(&uuid, min),
    }
}

fn build_scanner(project: &Path, config: &IndexConfig) -> Result<ReferenceScanner> {
    let index = AssetIndex::for_project(project, config).context("Failed to open project")?;
    Ok(ReferenceScanner::new(index).with_max_concurrent_reads(config.max_concurrent_reads))
}

async fn cmd_find(project: &Path, config: &IndexConfig, file: &Path, json: bool) -> Result<()> {
    let scanner = build_scanner(project, config)?;
    let file = file
        .canonicalize()
        .with_context(|| format!("File not found: {}", file.display()))?;

    if !config.is_source_file(&file) {
        print_not_source(config);
        return Ok(());
    }

    match scanner.find_references(&file).await {
        Ok(report) if json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Ok(report) => print_report(&report),
        Err(e) => print_lookup_error(&file, &e)?,
    }

    Ok(())
}

async fn cmd_watch(project: &Path, config: &IndexConfig) -> Result<()> {
    let scanner = build_scanner(project, config)?;
    let index = scanner.index().clone();

    let assets = config.assets_root(project);
    let mut watcher = FileWatcher::new(WatcherOptions {
        debounce_duration: Duration::from_millis(config.debounce_ms),
        recursive: true,
    });
    watcher
        .watch(&assets)
        .with_context(|| format!("Failed to watch {}", assets.display()))?;
    tokio::spawn(forward_changes(watcher, index.clone(), config.meta_sync));

    // Populate ahead of the first query
    let warmup = index.clone();
    let delay = Duration::from_millis(config.warmup_delay_ms);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Err(e) = warmup.ensure_fresh().await {
            tracing::warn!(error = %e, "Warm-up scan failed");
        }
    });

    println!("Watching {}", assets.display());
    println!("Enter a file path per line to list its references. Ctrl+D to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                answer_query(&scanner, config, &project.join(line)).await;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}

/// Answer one query from the watch session; a failed lookup is reported
/// and the session goes on.
async fn answer_query(scanner: &ReferenceScanner, config: &IndexConfig, file: &Path) {
    if let Err(e) = lookup(scanner, config, file).await {
        println!("✗ Error: {:#}", e);
    }
}

async fn lookup(scanner: &ReferenceScanner, config: &IndexConfig, file: &Path) -> Result<()> {
    let file = match file.canonicalize() {
        Ok(file) => file,
        Err(_) => {
            println!("File not found: {}", file.display());
            return Ok(());
        }
    };

    if !config.is_source_file(&file) {
        print_not_source(config);
        return Ok(());
    }

    match scanner.find_references(&file).await {
        Ok(report) => print_report(&report),
        Err(e) => print_lookup_error(&file, &e)?,
    }

    Ok(())
}

fn cmd_token(uuid: &str, min: bool) -> Result<()> {
    let codec = if min {
        CocosUuidCodec::min()
    } else {
        CocosUuidCodec::new()
    };
    let token = codec.compress(uuid);
    if token == uuid {
        anyhow::bail!("Not a uuid: {}", uuid);
    }
    println!("{}", token);
    Ok(())
}

fn print_report(report: &ReferenceReport) {
    let name = report
        .target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    if let Some(reason) = &report.degraded {
        println!("Warning: results may be incomplete ({})", reason);
    }
    println!("References of [{}]:", name);
    println!("File count {}.", report.count());
    for (i, reference) in report.matches.iter().enumerate() {
        println!("[{}] {}", i + 1, reference.display());
    }
}

fn print_not_source(config: &IndexConfig) {
    let allowed = config.source_extensions.join("/");
    println!("Only {} files can be looked up.", allowed);
}

/// Missing metadata is an expected outcome; anything else is a real error.
fn print_lookup_error(file: &Path, error: &IndexerError) -> Result<()> {
    match error {
        IndexerError::MetadataNotFound(meta) => {
            println!(
                "No references possible: {} does not exist.",
                meta.display()
            );
            Ok(())
        }
        IndexerError::IdentifierMissing(meta) => {
            println!("No references possible: no uuid in {}.", meta.display());
            Ok(())
        }
        other => {
            let file = file.display();
            Err(anyhow::anyhow!("Lookup of {} failed: {}", file, other))
        }
    }
}
