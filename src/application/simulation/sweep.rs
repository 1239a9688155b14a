use super::simulator::{PreparedBatch, simulate};
use crate::application::jobs::{JobTracker, ProgressStream};
use crate::application::ml::ModelRegistry;
use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::jobs::{JobAck, JobKind, JobPhase, JobSnapshot};
use crate::domain::ports::RaceDataSource;
use crate::domain::simulation::{
    BettingPolicy, PlacedBet, SweepGrid, SweepReport, ThresholdResult,
};
use crate::infrastructure::progress_bus::ProgressBus;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Distribution};
use std::sync::Arc;
use tracing::info;

/// Mean per-bet return over its standard deviation; 0 when undefined.
pub fn sharpe_ratio(bets: &[PlacedBet]) -> f64 {
    if bets.len() < 2 {
        return 0.0;
    }
    let data = Data::new(bets.iter().map(PlacedBet::return_ratio).collect::<Vec<f64>>());
    match (data.mean(), data.std_dev()) {
        (Some(mean), Some(std_dev)) if std_dev.is_finite() && std_dev > 0.0 => mean / std_dev,
        _ => 0.0,
    }
}

/// Re-evaluates the betting gate at every grid threshold without re-predicting.
pub fn run_sweep(
    batch: &PreparedBatch,
    policy: &BettingPolicy,
    grid: &SweepGrid,
    mut on_point: impl FnMut(usize, usize),
) -> SweepReport {
    let thresholds = grid.thresholds();
    let total = thresholds.len();
    let mut report = SweepReport {
        events_evaluated: batch.events.len(),
        events_skipped: batch.skipped,
        points: Vec::with_capacity(total),
    };
    for (i, threshold) in thresholds.into_iter().enumerate() {
        let sim = simulate(batch, &policy.with_ev_threshold(threshold));
        report.points.push(ThresholdResult {
            ev_threshold: threshold,
            sharpe: sharpe_ratio(&sim.bets),
            total: sim.total,
            by_type: sim.by_type,
        });
        on_point(i + 1, total);
    }
    report
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRequest {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub grid: SweepGrid,
    /// Gate settings other than `ev_threshold`, which the grid supplies.
    pub policy: BettingPolicy,
}

/// Runs threshold sweeps as background jobs: `Preparing → Sweeping → Completed | Failed`.
pub struct SweepOrchestrator {
    source: Arc<dyn RaceDataSource>,
    registry: Arc<ModelRegistry>,
    tracker: JobTracker<SweepReport>,
}

impl SweepOrchestrator {
    pub fn new(source: Arc<dyn RaceDataSource>, registry: Arc<ModelRegistry>, bus: ProgressBus) -> Self {
        Self {
            source,
            registry,
            tracker: JobTracker::new(JobKind::Sweep, bus),
        }
    }

    pub fn with_tracker(mut self, tracker: JobTracker<SweepReport>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn status(&self) -> JobSnapshot<SweepReport> {
        self.tracker.snapshot()
    }

    pub fn subscribe(&self) -> ProgressStream<SweepReport> {
        self.tracker.subscribe()
    }

    /// Rejects bad ranges, grids and policies before any work starts.
    pub fn start(&self, request: SweepRequest) -> PipelineResult<JobAck> {
        if request.from > request.to {
            return Err(PipelineError::validation(format!(
                "sweep range {}..{} is inverted",
                request.from, request.to
            )));
        }
        request.grid.validate()?;
        request.policy.validate()?;
        let model = self.registry.current().ok_or(PipelineError::ModelNotLoaded)?;

        let ack = self.tracker.try_start()?;
        let source = Arc::clone(&self.source);
        let tracker = self.tracker.clone();
        tokio::spawn(async move {
            let outcome = async {
                tracker.progress(JobPhase::Preparing, 2, "loading settled events");
                let events = source.settled_events(request.from, request.to).await?;
                let progress = tracker.clone();
                let batch = PreparedBatch::prepare(source, &model, events, move |done, total| {
                    let pct = 5 + (done * 45 / total.max(1)) as u8;
                    progress.progress_counted(JobPhase::Preparing, pct, "predicting", done, total);
                })
                .await?;
                if batch.events.is_empty() {
                    return Err(PipelineError::data_unavailable(
                        "no settled events with complete odds in range",
                    ));
                }

                let sweeping = tracker.clone();
                let report = tokio::task::spawn_blocking(move || {
                    run_sweep(&batch, &request.policy, &request.grid, |done, total| {
                        let pct = 50 + (done * 49 / total.max(1)) as u8;
                        sweeping.progress_counted(JobPhase::Sweeping, pct, "sweeping", done, total);
                    })
                })
                .await
                .map_err(|e| PipelineError::Storage(anyhow::anyhow!("sweep task aborted: {}", e)))?;
                Ok::<SweepReport, PipelineError>(report)
            }
            .await;

            match outcome {
                Ok(report) => {
                    let message = match report.best_by_sharpe() {
                        Some(best) => format!(
                            "{} thresholds, best sharpe {:.3} at {}",
                            report.points.len(),
                            best.sharpe,
                            best.ev_threshold
                        ),
                        None => format!("{} thresholds, no bets placed", report.points.len()),
                    };
                    info!("Sweep: {}", message);
                    tracker.complete(report, message);
                }
                Err(e) => tracker.fail(&e),
            }
        });
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use crate::domain::simulation::BetType;

    fn bet(payout: Decimal) -> PlacedBet {
        PlacedBet {
            event_id: "R".to_string(),
            bet_type: BetType::Win,
            selections: vec!["a".to_string()],
            probability: 0.5,
            odds: 3.0,
            expected_value: 1.5,
            stake: dec!(100),
            payout,
            hit: !payout.is_zero(),
        }
    }

    #[test]
    fn test_sharpe_ratio() {
        assert_eq!(sharpe_ratio(&[]), 0.0);
        assert_eq!(sharpe_ratio(&[bet(dec!(300))]), 0.0);
        assert_eq!(sharpe_ratio(&[bet(dec!(300)), bet(dec!(300))]), 0.0);

        let s = sharpe_ratio(&[bet(dec!(300)), bet(Decimal::ZERO)]);
        // returns 2 and -1: mean 0.5, sample std sqrt(4.5)
        assert!((s - 0.5 / 4.5f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_sweep_reports_every_threshold() {
        let batch = PreparedBatch::default();
        let grid = SweepGrid {
            min: 1.0,
            max: 1.2,
            step: 0.1,
        };
        let mut calls = Vec::new();
        let report = run_sweep(&batch, &BettingPolicy::default(), &grid, |d, t| calls.push((d, t)));
        assert_eq!(report.points.len(), 3);
        assert_eq!(calls, vec![(1, 3), (2, 3), (3, 3)]);
        assert!(report.best_by_sharpe().is_none());
    }
}
