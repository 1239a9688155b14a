//! Backtest Binary
//!
//! Single EV-gated simulations, threshold sweeps, ad-hoc predictions and
//! model catalogue maintenance against the stored models.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use podium::application::jobs::JobTracker;
use podium::application::ml::ModelRegistry;
use podium::application::prediction::{PredictionCache, PredictionService};
use podium::application::simulation::{Simulator, SweepOrchestrator, SweepRequest};
use podium::config::{Config, load_sweep_grid};
use podium::domain::jobs::JobKind;
use podium::domain::ports::RaceDataSource;
use podium::domain::simulation::{BetSummary, BetType, SimulationReport, SweepReport};
use podium::infrastructure::observability::PipelineMetrics;
use podium::infrastructure::progress_bus::{ProgressBus, ProgressItem};
use podium::infrastructure::repositories::load_events;
use podium::infrastructure::{FileModelStore, InMemoryRaceRepository, SyntheticRaceGenerator};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(author, version, about = "EV wagering backtests over stored models", long_about = None)]
struct Cli {
    /// Entrant-level CSV export; a synthetic dataset is generated when omitted
    #[arg(long, global = true)]
    input: Option<PathBuf>,

    /// Number of synthetic events to generate without --input
    #[arg(long, global = true, default_value_t = 400)]
    synthetic_events: usize,

    /// Seed for the synthetic generator
    #[arg(long, global = true, default_value_t = 7)]
    seed: u64,

    /// Use this stored version instead of the newest one
    #[arg(long, global = true)]
    model_version: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate one EV threshold over a date range
    Run {
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: NaiveDate,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        to: NaiveDate,

        /// Overrides SIM_EV_THRESHOLD
        #[arg(long)]
        ev_threshold: Option<f64>,

        /// Output JSON file for the full report
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Sweep a grid of EV thresholds as a background job
    Sweep {
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: NaiveDate,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        to: NaiveDate,

        /// TOML file with a [sweep] table; SWEEP_* variables otherwise
        #[arg(long)]
        grid_config: Option<PathBuf>,

        /// Output JSON file for the sweep report
        #[arg(short, long, default_value = "sweep_results.json")]
        output: PathBuf,

        /// Number of top thresholds to display
        #[arg(short, long, default_value = "10")]
        top_n: usize,
    },
    /// Predict events with the active model (market baseline without one)
    Predict {
        #[arg(long = "event-id", required = true, num_args = 1..)]
        event_ids: Vec<String>,
    },
    /// List stored model versions, newest first
    Models,
    /// Delete a stored version
    DeleteModel { version: String },
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

fn print_summary(label: &str, s: &BetSummary) {
    println!(
        "{:<8} bets={:<6} hits={:<5} hit_rate={:>6.2}% staked={:>12} returned={:>12} roi={:>8}",
        label,
        s.bets,
        s.hits,
        s.hit_rate() * 100.0,
        s.total_staked,
        s.total_returned,
        s.roi().round_dp(4)
    );
}

fn print_report(report: &SimulationReport) {
    println!("\n{}", "=".repeat(96));
    println!(
        "Events evaluated: {}   skipped: {}",
        report.events_evaluated, report.events_skipped
    );
    print_summary("TOTAL", &report.total);
    for bet_type in [BetType::Win, BetType::Pair] {
        print_summary(&bet_type.to_string(), &report.summary_for(bet_type));
    }
    println!("{}", "=".repeat(96));
}

fn print_sweep(report: &SweepReport, top_n: usize) {
    let mut ranked: Vec<_> = report.points.iter().filter(|p| p.total.bets > 0).collect();
    ranked.sort_by(|a, b| {
        b.sharpe
            .partial_cmp(&a.sharpe)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    println!("\n{}", "=".repeat(80));
    println!(
        "{:>8} {:>8} {:>8} {:>10} {:>10}",
        "EV", "bets", "hits", "roi", "sharpe"
    );
    for p in ranked.into_iter().take(top_n) {
        println!(
            "{:>8.3} {:>8} {:>8} {:>10} {:>10.4}",
            p.ev_threshold,
            p.total.bets,
            p.total.hits,
            p.total.roi().round_dp(4),
            p.sharpe
        );
    }
    println!("{}", "=".repeat(80));
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let config = Config::from_env();

    let events = match &cli.input {
        Some(path) => load_events(path)?,
        None => SyntheticRaceGenerator::new(cli.seed).generate(cli.synthetic_events),
    };
    let source: Arc<dyn RaceDataSource> = Arc::new(InMemoryRaceRepository::from_events(events));

    let metrics = Arc::new(PipelineMetrics::new()?);
    let cache = Arc::new(PredictionCache::new(config.cache.ttl()).with_metrics(Arc::clone(&metrics)));
    let registry = Arc::new(
        ModelRegistry::new(
            Arc::new(FileModelStore::new(&config.model.model_dir)),
            Arc::clone(&cache),
        )
        .with_metrics(Arc::clone(&metrics)),
    );

    if let Commands::Models = cli.command {
        for info in registry.versions().await? {
            println!(
                "{:<28} {}  {:>10} bytes  {}",
                info.version,
                info.created_at.format("%Y-%m-%d %H:%M:%S"),
                info.size_bytes,
                info.checksum
            );
        }
        return Ok(());
    }
    if let Commands::DeleteModel { version } = &cli.command {
        // No model is active in this process yet.
        registry.delete(version).await?;
        println!("Deleted {}", version);
        return Ok(());
    }

    match &cli.model_version {
        Some(version) => {
            registry.switch_to(version).await?;
        }
        None => {
            if registry.load_latest().await?.is_none() {
                info!("No stored model under {:?}", config.model.model_dir);
            }
        }
    }

    match cli.command {
        Commands::Run {
            from,
            to,
            ev_threshold,
            output,
        } => {
            let mut policy = config.simulation.policy();
            if let Some(t) = ev_threshold {
                policy = policy.with_ev_threshold(t);
            }
            let report = Simulator::new(source, registry).run(from, to, &policy).await?;
            print_report(&report);
            if let Some(path) = output {
                std::fs::write(&path, serde_json::to_string_pretty(&report)?)
                    .with_context(|| format!("Failed to write {:?}", path))?;
                info!("Report written to {:?}", path);
            }
        }
        Commands::Sweep {
            from,
            to,
            grid_config,
            output,
            top_n,
        } => {
            let grid = match grid_config {
                Some(path) => {
                    info!("Loading sweep grid from: {:?}", path);
                    load_sweep_grid(&path)?
                }
                None => config.simulation.grid(),
            };
            let bus = ProgressBus::new(config.progress.queue_capacity);
            let tracker = JobTracker::new(JobKind::Sweep, bus.clone())
                .with_heartbeat(config.progress.heartbeat)
                .with_metrics(Arc::clone(&metrics));
            let orchestrator = SweepOrchestrator::new(source, registry, bus).with_tracker(tracker);

            let mut stream = orchestrator.subscribe();
            orchestrator.start(SweepRequest {
                from,
                to,
                grid,
                policy: config.simulation.policy(),
            })?;
            loop {
                match stream.next().await {
                    ProgressItem::Event(e) => {
                        info!("[{:>3}%] {}: {}", e.percent, e.phase, e.message);
                        if e.is_terminal() {
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
                anyhow::bail!("sweep failed: {}", err);
            }
            let report = snapshot.last_result.context("sweep finished without a result")?;
            print_sweep(&report, top_n);
            std::fs::write(&output, serde_json::to_string_pretty(&report)?)
                .with_context(|| format!("Failed to write {:?}", output))?;
            info!("Sweep report written to {:?}", output);
        }
        Commands::Predict { event_ids } => {
            let service = PredictionService::new(source, Arc::clone(&registry), cache)
                .with_metrics(Arc::clone(&metrics));
            for prediction in service.predict_many(&event_ids).await? {
                println!(
                    "{} ({:?}, calibrated: {})",
                    prediction.event_id, prediction.source, prediction.calibrated
                );
                for e in prediction.ranked() {
                    let ev = e
                        .expected_value()
                        .map(|v| format!("{:.3}", v))
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "  #{:<2} {:<12} p={:.4} odds={:<6} ev={}",
                        e.rank,
                        e.competitor_id,
                        e.probability,
                        e.odds.map(|o| o.to_string()).unwrap_or_else(|| "-".to_string()),
                        ev
                    );
                }
            }
        }
        Commands::Models | Commands::DeleteModel { .. } => {}
    }
    Ok(())
}
