use crate::domain::ml::prediction::{
    EntrantPrediction, EventPrediction, PredictionSource, rank_descending, renormalize,
};
use crate::domain::racing::EventSnapshot;
use chrono::{DateTime, Utc};

/// Degraded-mode prediction from market odds alone.
///
/// Implied probability is `1 / odds`, renormalised across the field. Entrants
/// without usable odds get zero mass; a field with no odds at all is uniform.
pub fn market_baseline(event: &EventSnapshot, computed_at: DateTime<Utc>) -> EventPrediction {
    let implied: Vec<f64> = event
        .entrants
        .iter()
        .map(|e| e.market_odds().map_or(0.0, |o| 1.0 / o))
        .collect();
    let probabilities = renormalize(&implied);
    let ranks = rank_descending(&implied);

    let entrants = event
        .entrants
        .iter()
        .zip(implied.iter().zip(probabilities))
        .zip(ranks)
        .map(|((entrant, (raw, probability)), rank)| EntrantPrediction {
            competitor_id: entrant.competitor_id.clone(),
            raw_score: *raw,
            probability,
            rank,
            odds: entrant.market_odds(),
        })
        .collect();

    EventPrediction {
        event_id: event.event_id.clone(),
        source: PredictionSource::MarketBaseline,
        calibrated: false,
        computed_at,
        entrants,
    }
}
