//! Retraining Binary
//!
//! Runs one retraining job against a CSV export or a synthetic dataset,
//! streaming job progress to the log until the job settles.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use podium::application::jobs::{JobTracker, RetrainingOrchestrator, RetrainingRequest};
use podium::application::ml::ModelRegistry;
use podium::application::prediction::PredictionCache;
use podium::config::Config;
use podium::domain::jobs::JobKind;
use podium::domain::ports::RaceDataSource;
use podium::domain::racing::EventSnapshot;
use podium::infrastructure::observability::PipelineMetrics;
use podium::infrastructure::progress_bus::{ProgressBus, ProgressItem};
use podium::infrastructure::repositories::{load_events, write_events};
use podium::infrastructure::{
    FileModelStore, HttpArtifactUploader, InMemoryRaceRepository, SyntheticRaceGenerator,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about = "Train and activate a finishing-order model", long_about = None)]
struct Args {
    /// Entrant-level CSV export; a synthetic dataset is generated when omitted
    #[arg(long)]
    input: Option<PathBuf>,

    /// Number of synthetic events to generate without --input
    #[arg(long, default_value_t = 400)]
    synthetic_events: usize,

    /// Seed for the synthetic generator
    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Write the loaded or generated events to this CSV before training
    #[arg(long)]
    export: Option<PathBuf>,

    /// First event date used (YYYY-MM-DD); defaults to the earliest event
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last event date used (YYYY-MM-DD); defaults to the latest event
    #[arg(long)]
    to: Option<NaiveDate>,

    /// End of the training partition for a chronological split
    #[arg(long, requires = "valid_end")]
    train_end: Option<NaiveDate>,

    /// End of the validation partition for a chronological split
    #[arg(long, requires = "train_end")]
    valid_end: Option<NaiveDate>,

    /// Version tag; derived from the current time when omitted
    #[arg(long)]
    version: Option<String>,

    /// Skip the remote copy even when MODEL_REMOTE_URL is set
    #[arg(long)]
    no_upload: bool,

    /// Print the Prometheus metrics after the job
    #[arg(long)]
    metrics: bool,
}

fn init_logging() {
    let filter = EnvFilter::from_default_env().add_directive(Level::INFO.into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}

fn load(args: &Args) -> Result<Vec<EventSnapshot>> {
    match &args.input {
        Some(path) => load_events(path),
        None => {
            info!(
                "No --input given, generating {} synthetic events (seed {})",
                args.synthetic_events, args.seed
            );
            Ok(SyntheticRaceGenerator::new(args.seed).generate(args.synthetic_events))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let args = Args::parse();
    let config = Config::from_env();
    info!("podium train {} starting", env!("CARGO_PKG_VERSION"));

    let events = load(&args)?;
    if let Some(path) = &args.export {
        write_events(path, &events)?;
    }
    let first = events.iter().map(|e| e.date).min().context("dataset is empty")?;
    let last = events.iter().map(|e| e.date).max().context("dataset is empty")?;
    let source: Arc<dyn RaceDataSource> = Arc::new(InMemoryRaceRepository::from_events(events));

    let metrics = Arc::new(PipelineMetrics::new()?);
    let cache = Arc::new(PredictionCache::new(config.cache.ttl()).with_metrics(Arc::clone(&metrics)));
    let store = Arc::new(FileModelStore::new(&config.model.model_dir));
    let registry = Arc::new(
        ModelRegistry::new(store, Arc::clone(&cache)).with_metrics(Arc::clone(&metrics)),
    );

    let bus = ProgressBus::new(config.progress.queue_capacity);
    let tracker = JobTracker::new(JobKind::Retraining, bus.clone())
        .with_heartbeat(config.progress.heartbeat)
        .with_metrics(Arc::clone(&metrics));
    let defaults = config
        .training
        .to_training_config(config.model.use_calibration);
    let mut orchestrator = RetrainingOrchestrator::new(source, Arc::clone(&registry), bus, defaults)
        .with_tracker(tracker);
    match (&config.model.remote_url, args.no_upload) {
        (Some(url), false) => {
            info!("Artifacts will be copied to {}", url);
            orchestrator = orchestrator.with_uploader(Arc::new(HttpArtifactUploader::new(
                url.clone(),
                config.model.remote_token.clone(),
            )));
        }
        (Some(_), true) => warn!("MODEL_REMOTE_URL is set but --no-upload was given"),
        (None, _) => {}
    }

    let request = RetrainingRequest {
        train_end: args.train_end,
        valid_end: args.valid_end,
        version: args.version.clone(),
        ..RetrainingRequest::new(args.from.unwrap_or(first), args.to.unwrap_or(last))
    };

    let mut stream = orchestrator.subscribe();
    let ack = orchestrator.start(request).await?;
    info!("Job {} started at {}", ack.job_id, ack.started_at);

    loop {
        match stream.next().await {
            ProgressItem::Event(event) => {
                match (event.counters.total, event.counters.current) {
                    (0, _) => info!("[{:>3}%] {}: {}", event.percent, event.phase, event.message),
                    (total, current) => info!(
                        "[{:>3}%] {}: {} ({}/{})",
                        event.percent, event.phase, event.message, current, total
                    ),
                }
                if event.is_terminal() {
                    break;
                }
            }
            ProgressItem::Heartbeat => info!("... still running"),
            ProgressItem::Idle => break,
        }
    }
    stream.detach();

    let snapshot = orchestrator.status();
    if let Some(err) = snapshot.last_error {
        anyhow::bail!("retraining failed: {}", err);
    }
    let result = snapshot
        .last_result
        .context("job finished without a result")?;

    println!("\n{}", "=".repeat(72));
    println!("Version      : {}", result.version);
    println!("Artifact     : {} bytes, sha256 {}", result.artifact.size_bytes, result.artifact.checksum);
    println!("Uploaded     : {}", result.uploaded);
    println!(
        "Trees        : {} (best iteration {}, early stop {})",
        result.metrics.n_trees, result.metrics.best_iteration, result.metrics.stopped_early
    );
    let parts = [
        ("train", Some(result.metrics.train)),
        ("valid", result.metrics.valid),
        ("test", result.metrics.test),
    ];
    for (name, part) in parts {
        if let Some(m) = part {
            println!(
                "{:<13}: n={:<6} events={:<5} logloss={:.4} auc={:.4} top1={:.3}",
                name, m.samples, m.events, m.log_loss, m.auc, m.top1_hit_rate
            );
        }
    }
    if let Some(gap) = result.metrics.overfit_gap {
        println!("Overfit gap  : {:+.4}", gap);
    }
    if let Some(gap) = result.metrics.generalization_gap {
        println!("Gen. gap     : {:+.4}", gap);
    }

    let importance = registry.feature_importance()?;
    if !importance.is_empty() {
        println!("\nTop features:");
        for fi in importance.iter().take(10) {
            println!("  {:<28} {:+.5}", fi.feature, fi.importance);
        }
    }
    println!("{}", "=".repeat(72));

    if args.metrics {
        println!("{}", metrics.gather());
    }
    Ok(())
}
