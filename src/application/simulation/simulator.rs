use super::betting::evaluate_event;
use crate::application::features::FeatureExtractor;
use crate::application::ml::{ModelRegistry, TrainedModel};
use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::ml::EventPrediction;
use crate::domain::ports::RaceDataSource;
use crate::domain::racing::EventSnapshot;
use crate::domain::simulation::{BettingPolicy, SimulationReport};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// A settled event with odds and its model prediction, ready for bet evaluation.
#[derive(Debug, Clone)]
pub struct PreparedEvent {
    pub event: EventSnapshot,
    pub prediction: EventPrediction,
}

/// Predictions for a backtest window, computed once.
#[derive(Debug, Clone, Default)]
pub struct PreparedBatch {
    pub events: Vec<PreparedEvent>,
    /// Events dropped for missing odds, missing results or empty features.
    pub skipped: usize,
}

impl PreparedBatch {
    /// Predicts every usable event with `model`, sharing one preloaded extractor.
    pub async fn prepare(
        source: Arc<dyn RaceDataSource>,
        model: &TrainedModel,
        events: Vec<EventSnapshot>,
        mut on_event: impl FnMut(usize, usize),
    ) -> PipelineResult<Self> {
        let total = events.len();
        let (usable, unusable): (Vec<EventSnapshot>, Vec<EventSnapshot>) = events
            .into_iter()
            .partition(|e| e.is_settled() && e.has_complete_odds());
        for event in &unusable {
            debug!("Simulator: skipping {} (missing odds or results)", event.event_id);
        }
        let mut batch = PreparedBatch {
            events: Vec::with_capacity(usable.len()),
            skipped: unusable.len(),
        };
        let done = batch.skipped;
        if done > 0 {
            on_event(done, total);
        }
        let Some(max_date) = usable.iter().map(|e| e.date).max() else {
            return Ok(batch);
        };

        let extractor = FeatureExtractor::preloaded(source, &usable, max_date).await?;
        for (i, event) in usable.into_iter().enumerate() {
            let rows = extractor.extract_rows(&event, None).await?;
            if rows.is_empty() {
                debug!("Simulator: skipping {} (no feature rows)", event.event_id);
                batch.skipped += 1;
            } else {
                let prediction = model.predict_event(&event, &rows, Utc::now())?;
                batch.events.push(PreparedEvent { event, prediction });
            }
            on_event(done + i + 1, total);
        }
        Ok(batch)
    }
}

/// Settles `policy` over a prepared batch.
pub fn simulate(batch: &PreparedBatch, policy: &BettingPolicy) -> SimulationReport {
    let mut report = SimulationReport {
        events_evaluated: batch.events.len(),
        events_skipped: batch.skipped,
        ..Default::default()
    };
    for prepared in &batch.events {
        for bet in evaluate_event(&prepared.event, &prepared.prediction, policy) {
            report.record(bet);
        }
    }
    report
}

/// Single backtest of the active model over a date window.
pub struct Simulator {
    source: Arc<dyn RaceDataSource>,
    registry: Arc<ModelRegistry>,
}

impl Simulator {
    pub fn new(source: Arc<dyn RaceDataSource>, registry: Arc<ModelRegistry>) -> Self {
        Self { source, registry }
    }

    pub async fn prepare(&self, from: NaiveDate, to: NaiveDate) -> PipelineResult<PreparedBatch> {
        if from > to {
            return Err(PipelineError::validation(format!(
                "backtest range {}..{} is inverted",
                from, to
            )));
        }
        let model = self.registry.current().ok_or(PipelineError::ModelNotLoaded)?;
        let events = self.source.settled_events(from, to).await?;
        PreparedBatch::prepare(Arc::clone(&self.source), &model, events, |_, _| {}).await
    }

    pub async fn run(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        policy: &BettingPolicy,
    ) -> PipelineResult<SimulationReport> {
        policy.validate()?;
        let batch = self.prepare(from, to).await?;
        let report = simulate(&batch, policy);
        info!(
            "Simulator: {} events, {} bets, ROI {}",
            report.events_evaluated,
            report.total.bets,
            report.total.roi().round_dp(4)
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ml::{EntrantPrediction, PredictionSource};
    use crate::domain::racing::Entrant;

    fn prepared(id: &str, odds: [f64; 3], probs: [f64; 3], winner: usize) -> PreparedEvent {
        let event = EventSnapshot {
            event_id: id.to_string(),
            entrants: (0..3)
                .map(|i| Entrant {
                    competitor_id: format!("{}-{}", id, i),
                    odds: Some(odds[i]),
                    finish_position: Some(if i == winner { 1 } else { i as u8 + 2 }),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        let prediction = EventPrediction {
            event_id: id.to_string(),
            source: PredictionSource::Model {
                version: "t".to_string(),
            },
            calibrated: true,
            computed_at: Utc::now(),
            entrants: (0..3)
                .map(|i| EntrantPrediction {
                    competitor_id: format!("{}-{}", id, i),
                    raw_score: probs[i],
                    probability: probs[i],
                    rank: i + 1,
                    odds: Some(odds[i]),
                })
                .collect(),
        };
        PreparedEvent { event, prediction }
    }

    #[test]
    fn test_widening_ev_band_never_loses_bets() {
        let batch = PreparedBatch {
            events: vec![
                prepared("A", [2.5, 4.0, 6.0], [0.5, 0.3, 0.2], 0),
                prepared("B", [1.5, 3.0, 12.0], [0.6, 0.3, 0.1], 2),
                prepared("C", [3.0, 3.0, 3.5], [0.4, 0.35, 0.25], 1),
            ],
            skipped: 1,
        };
        let narrow = BettingPolicy {
            ev_threshold: 1.1,
            max_ev: 1.3,
            ..Default::default()
        };
        let wide = BettingPolicy {
            ev_threshold: 0.8,
            max_ev: 3.0,
            ..Default::default()
        };
        let a = simulate(&batch, &narrow);
        let b = simulate(&batch, &wide);
        assert!(b.total.bets >= a.total.bets);
        assert_eq!(b.events_skipped, 1);

        let none = simulate(&batch, &wide.with_ev_threshold(wide.max_ev + 1.0));
        assert_eq!(none.total.bets, 0);
    }
}
