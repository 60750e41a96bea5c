//! Manga tagger CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use manga_tagger::{build_catalogs, collect_events, DedupCoordinator, Outcome, Pipeline, Resolver, Store};
use shared::{Config, LibraryPaths, LogConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Chapter archives or directories to process (defaults to the intake directory)
    paths: Vec<PathBuf>,
}

#[derive(Debug, Default)]
struct RunStats {
    total: usize,
    tagged: usize,
    rejected: usize,
    no_match: usize,
    exceptions: usize,
}

impl RunStats {
    fn record(&mut self, outcome: &Outcome) {
        self.total += 1;
        match outcome {
            Outcome::Tagged(_) => self.tagged += 1,
            Outcome::Rejected(_) => self.rejected += 1,
            Outcome::NoMatch(_) => self.no_match += 1,
            Outcome::Exception(_) => self.exceptions += 1,
        }
    }

    fn print_summary(&self) {
        info!("=== Tagging Summary ===");
        info!("Chapters seen: {}", self.total);
        info!("Tagged: {}", self.tagged);
        info!("Rejected as duplicates: {}", self.rejected);
        info!("No match: {}", self.no_match);
        info!("Exceptions: {}", self.exceptions);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    shared::logging::init(LogConfig::from_config(&config, "manga-tagger", args.verbose))?;

    info!("Manga tagger starting");
    info!(config_file = %args.config.display(), "Loaded configuration");

    let paths = LibraryPaths::new(config.library_dir()).with_adult_library(config.adult_library_dir());
    paths
        .create_dirs()
        .context("Failed to create library directories")?;

    // Initialize database
    let db_path = config.database_path();
    info!(db_path = %db_path.display(), "Opening database");
    let store = Arc::new(Store::open(&db_path).context("Failed to open database")?);

    // Series already in the ledger never hit the catalogs again
    let coordinator = DedupCoordinator::new();
    let seeded = coordinator.seed_resolved(store.resolved_series()?);
    info!(series = seeded, "Loaded resolved series from ledger");

    let catalogs = build_catalogs(&config.catalogs).context("Failed to create catalog clients")?;
    let resolver = Resolver::new(catalogs, config.processing.path_length_limit);

    let intake_dir = config.intake_dir();
    let inputs = if args.paths.is_empty() {
        vec![intake_dir.clone()]
    } else {
        args.paths.clone()
    };
    let events = collect_events(&intake_dir, &inputs)?;
    info!("Found {} chapters to process", events.len());

    if events.is_empty() {
        info!("Nothing to do");
        return Ok(());
    }

    let pipeline = Arc::new(Pipeline::new(
        paths,
        config.processing.clone(),
        Arc::clone(&store),
        coordinator,
        resolver,
    ));

    let semaphore = Arc::new(Semaphore::new(config.processing.max_concurrent_files.max(1)));
    let mut tasks = Vec::new();

    for event in events {
        let permit = semaphore.clone().acquire_owned().await?;
        let pipeline = Arc::clone(&pipeline);

        tasks.push(tokio::spawn(async move {
            let outcome = pipeline.process(&event).await;
            drop(permit);
            outcome
        }));
    }

    let mut stats = RunStats::default();
    for task in tasks {
        match task.await {
            Ok(outcome) => stats.record(&outcome),
            Err(e) => error!(error = %e, "Chapter task panicked"),
        }
    }

    stats.print_summary();

    let ledger = store.stats()?;
    info!(
        processed_files = ledger.processed_files,
        series = ledger.series,
        "Ledger statistics"
    );

    Ok(())
}
