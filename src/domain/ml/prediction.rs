use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a set of event probabilities came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionSource {
    Model { version: String },
    /// Degraded mode: renormalised 1/odds because no model is loaded.
    MarketBaseline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrantPrediction {
    pub competitor_id: String,
    pub raw_score: f64,
    pub probability: f64,
    /// 1-based predicted finishing rank.
    pub rank: usize,
    pub odds: Option<f64>,
}

impl EntrantPrediction {
    pub fn expected_value(&self) -> Option<f64> {
        self.odds.map(|o| self.probability * o)
    }
}

/// Closed-world prediction for one event: probabilities sum to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPrediction {
    pub event_id: String,
    pub source: PredictionSource,
    pub calibrated: bool,
    pub computed_at: DateTime<Utc>,
    /// In entrant input order.
    pub entrants: Vec<EntrantPrediction>,
}

impl EventPrediction {
    pub fn is_baseline(&self) -> bool {
        self.source == PredictionSource::MarketBaseline
    }

    /// Entrants ordered by predicted rank.
    pub fn ranked(&self) -> Vec<&EntrantPrediction> {
        let mut ranked: Vec<&EntrantPrediction> = self.entrants.iter().collect();
        ranked.sort_by_key(|e| e.rank);
        ranked
    }

    pub fn probability_sum(&self) -> f64 {
        self.entrants.iter().map(|e| e.probability).sum()
    }
}

/// Ordinal ranks by descending score; equal scores keep input order.
pub fn rank_descending(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut ranks = vec![0; scores.len()];
    for (position, idx) in order.into_iter().enumerate() {
        ranks[idx] = position + 1;
    }
    ranks
}

/// Scales non-negative weights to sum to one; uniform when the total is zero.
pub fn renormalize(weights: &[f64]) -> Vec<f64> {
    let cleaned: Vec<f64> = weights
        .iter()
        .map(|w| if w.is_finite() && *w > 0.0 { *w } else { 0.0 })
        .collect();
    let total: f64 = cleaned.iter().sum();
    if total <= 0.0 {
        let n = weights.len().max(1) as f64;
        return vec![1.0 / n; weights.len()];
    }
    cleaned.into_iter().map(|w| w / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_ties_keep_input_order() {
        let ranks = rank_descending(&[0.2, 0.9, 0.2, 0.5]);
        assert_eq!(ranks, vec![3, 1, 4, 2]);
    }

    #[test]
    fn test_renormalize_sums_to_one() {
        let p = renormalize(&[1.0, 3.0, -2.0, f64::NAN]);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert_eq!(p[2], 0.0);
        assert_eq!(p[1], 0.75);
    }

    #[test]
    fn test_renormalize_all_zero_is_uniform() {
        let p = renormalize(&[0.0, 0.0, 0.0, 0.0]);
        assert_eq!(p, vec![0.25; 4]);
    }
}
