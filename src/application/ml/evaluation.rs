//! Scoring metrics recorded alongside each trained version.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const PROB_EPS: f64 = 1e-15;

/// Binary cross-entropy; labels may be smoothed.
pub fn log_loss(labels: &[f64], probabilities: &[f64]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let total: f64 = labels
        .iter()
        .zip(probabilities)
        .map(|(y, p)| {
            let p = p.clamp(PROB_EPS, 1.0 - PROB_EPS);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum();
    total / labels.len() as f64
}

/// ROC-AUC via the Mann-Whitney rank statistic, averaging tied ranks.
///
/// Returns 0.5 when only one class is present.
pub fn roc_auc(labels: &[f64], scores: &[f64]) -> f64 {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].partial_cmp(&scores[b]).unwrap_or(std::cmp::Ordering::Equal));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = avg_rank;
        }
        i = j + 1;
    }

    let positives = labels.iter().filter(|y| **y >= 0.5).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return 0.5;
    }
    let positive_rank_sum: f64 = labels
        .iter()
        .zip(&ranks)
        .filter(|(y, _)| **y >= 0.5)
        .map(|(_, r)| r)
        .sum();
    let u = positive_rank_sum - (positives * (positives + 1)) as f64 / 2.0;
    u / (positives * negatives) as f64
}

/// Share of events whose top-scored entrant actually won.
pub fn top1_hit_rate(event_ids: &[String], labels: &[f64], scores: &[f64]) -> f64 {
    let mut best: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for ((event, y), s) in event_ids.iter().zip(labels).zip(scores) {
        let entry = best.entry(event.as_str()).or_insert((f64::NEG_INFINITY, 0.0));
        if *s > entry.0 {
            *entry = (*s, *y);
        }
    }
    if best.is_empty() {
        return 0.0;
    }
    let hits = best.values().filter(|(_, y)| *y >= 0.5).count();
    hits as f64 / best.len() as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PartitionMetrics {
    pub samples: usize,
    pub events: usize,
    pub log_loss: f64,
    pub auc: f64,
    pub top1_hit_rate: f64,
}

impl PartitionMetrics {
    pub fn compute(event_ids: &[String], labels: &[f64], probabilities: &[f64]) -> Self {
        let events = event_ids
            .iter()
            .map(String::as_str)
            .collect::<std::collections::BTreeSet<_>>()
            .len();
        Self {
            samples: labels.len(),
            events,
            log_loss: log_loss(labels, probabilities),
            auc: roc_auc(labels, probabilities),
            top1_hit_rate: top1_hit_rate(event_ids, labels, probabilities),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auc_perfect_and_inverted() {
        let y = [0.0, 0.0, 1.0, 1.0];
        assert_eq!(roc_auc(&y, &[0.1, 0.2, 0.8, 0.9]), 1.0);
        assert_eq!(roc_auc(&y, &[0.9, 0.8, 0.2, 0.1]), 0.0);
        assert_eq!(roc_auc(&y, &[0.5, 0.5, 0.5, 0.5]), 0.5);
        assert_eq!(roc_auc(&[1.0, 1.0], &[0.1, 0.2]), 0.5);
    }

    #[test]
    fn test_log_loss_penalises_confident_errors() {
        let good = log_loss(&[1.0, 0.0], &[0.9, 0.1]);
        let bad = log_loss(&[1.0, 0.0], &[0.1, 0.9]);
        assert!(good < bad);
        assert!(log_loss(&[1.0], &[1.0]).is_finite());
    }

    #[test]
    fn test_top1_hit_rate_per_event() {
        let events: Vec<String> = ["a", "a", "b", "b"].iter().map(|s| s.to_string()).collect();
        let labels = [1.0, 0.0, 1.0, 0.0];
        let scores = [0.7, 0.3, 0.2, 0.6];
        assert_eq!(top1_hit_rate(&events, &labels, &scores), 0.5);
    }
}
