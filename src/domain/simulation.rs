//! Wagering policy, settled bets and backtest reports.

use crate::domain::errors::{PipelineError, PipelineResult};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BetType {
    /// Single entrant to finish first.
    Win,
    /// Two entrants to both finish in the top two, order irrelevant.
    Pair,
}

impl fmt::Display for BetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetType::Win => write!(f, "WIN"),
            BetType::Pair => write!(f, "PAIR"),
        }
    }
}

/// EV gating rules for simulated wagers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BettingPolicy {
    pub ev_threshold: f64,
    /// EVs above this are treated as likely odds errors.
    pub max_ev: f64,
    /// Probability floor that filters noisy longshots.
    pub min_probability: f64,
    pub stake: Decimal,
    pub win_bets: bool,
    pub pair_bets: bool,
    /// Pair candidates are drawn from the top-K predicted entrants.
    pub pair_top_k: usize,
    /// Heuristic: pair odds ≈ odds1 × odds2 / divisor.
    pub pair_odds_divisor: f64,
}

impl Default for BettingPolicy {
    fn default() -> Self {
        Self {
            ev_threshold: 1.0,
            max_ev: 2.0,
            min_probability: 0.01,
            stake: dec!(100),
            win_bets: true,
            pair_bets: true,
            pair_top_k: 3,
            pair_odds_divisor: 3.0,
        }
    }
}

impl BettingPolicy {
    pub fn validate(&self) -> PipelineResult<()> {
        if !self.ev_threshold.is_finite() || !self.max_ev.is_finite() {
            return Err(PipelineError::validation("EV bounds must be finite"));
        }
        if !(0.0..=1.0).contains(&self.min_probability) {
            return Err(PipelineError::validation(format!(
                "min_probability {} outside [0, 1]",
                self.min_probability
            )));
        }
        if self.stake <= Decimal::ZERO {
            return Err(PipelineError::validation("stake must be positive"));
        }
        if self.pair_bets && (self.pair_top_k < 2 || self.pair_odds_divisor <= 0.0) {
            return Err(PipelineError::validation(
                "pair bets need top_k >= 2 and a positive odds divisor",
            ));
        }
        Ok(())
    }

    /// Gate shared by every bet type.
    pub fn qualifies(&self, probability: f64, expected_value: f64) -> bool {
        probability >= self.min_probability
            && expected_value >= self.ev_threshold
            && expected_value <= self.max_ev
    }

    pub fn with_ev_threshold(&self, ev_threshold: f64) -> Self {
        Self {
            ev_threshold,
            ..self.clone()
        }
    }
}

/// One simulated wager after settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedBet {
    pub event_id: String,
    pub bet_type: BetType,
    pub selections: Vec<String>,
    pub probability: f64,
    pub odds: f64,
    pub expected_value: f64,
    pub stake: Decimal,
    pub payout: Decimal,
    pub hit: bool,
}

impl PlacedBet {
    /// Per-bet return relative to stake: `payout / stake - 1`.
    pub fn return_ratio(&self) -> f64 {
        if self.stake.is_zero() {
            return 0.0;
        }
        let ratio = self.payout / self.stake - Decimal::ONE;
        ratio.to_f64().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BetSummary {
    pub bets: usize,
    pub hits: usize,
    pub total_staked: Decimal,
    pub total_returned: Decimal,
}

impl BetSummary {
    pub fn record(&mut self, bet: &PlacedBet) {
        self.bets += 1;
        if bet.hit {
            self.hits += 1;
        }
        self.total_staked += bet.stake;
        self.total_returned += bet.payout;
    }

    pub fn profit(&self) -> Decimal {
        self.total_returned - self.total_staked
    }

    pub fn hit_rate(&self) -> f64 {
        if self.bets == 0 {
            0.0
        } else {
            self.hits as f64 / self.bets as f64
        }
    }

    /// Profit over stake; zero when nothing was staked.
    pub fn roi(&self) -> Decimal {
        if self.total_staked.is_zero() {
            Decimal::ZERO
        } else {
            self.profit() / self.total_staked
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimulationReport {
    pub events_evaluated: usize,
    pub events_skipped: usize,
    pub total: BetSummary,
    pub by_type: BTreeMap<BetType, BetSummary>,
    pub bets: Vec<PlacedBet>,
}

impl SimulationReport {
    pub fn record(&mut self, bet: PlacedBet) {
        self.total.record(&bet);
        self.by_type.entry(bet.bet_type).or_default().record(&bet);
        self.bets.push(bet);
    }

    pub fn summary_for(&self, bet_type: BetType) -> BetSummary {
        self.by_type.get(&bet_type).cloned().unwrap_or_default()
    }
}

/// Dense grid of EV thresholds, `min..=max` in `step` increments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepGrid {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl SweepGrid {
    /// Largest number of thresholds a single sweep may evaluate.
    pub const MAX_POINTS: usize = 2_000;

    pub fn validate(&self) -> PipelineResult<()> {
        if !(self.min.is_finite() && self.max.is_finite() && self.step.is_finite()) {
            return Err(PipelineError::validation("sweep bounds must be finite"));
        }
        if self.step <= 0.0 {
            return Err(PipelineError::validation("sweep step must be positive"));
        }
        if self.min > self.max {
            return Err(PipelineError::validation(format!(
                "sweep min {} exceeds max {}",
                self.min, self.max
            )));
        }
        if self.point_count(0.0).is_none() {
            return Err(PipelineError::validation(format!(
                "sweep grid {}..={} step {} exceeds {} points",
                self.min,
                self.max,
                self.step,
                Self::MAX_POINTS
            )));
        }
        Ok(())
    }

    /// Grid size, or `None` when it is undefined or above `MAX_POINTS`.
    /// Counted in `f64` so a tiny step cannot overflow the cast.
    fn point_count(&self, slack: f64) -> Option<usize> {
        let intervals = ((self.max - self.min) / self.step + slack).floor();
        if !intervals.is_finite() || intervals < 0.0 || intervals >= Self::MAX_POINTS as f64 {
            return None;
        }
        Some(intervals as usize + 1)
    }

    /// Thresholds in ascending order; empty for a grid that fails validation.
    pub fn thresholds(&self) -> Vec<f64> {
        let points = self.point_count(1e-9).unwrap_or(0);
        (0..points)
            .map(|i| {
                let t = self.min + i as f64 * self.step;
                (t * 1e6).round() / 1e6
            })
            .filter(|t| *t <= self.max + 1e-9)
            .collect()
    }
}

impl Default for SweepGrid {
    fn default() -> Self {
        Self {
            min: 0.8,
            max: 2.0,
            step: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdResult {
    pub ev_threshold: f64,
    pub total: BetSummary,
    pub by_type: BTreeMap<BetType, BetSummary>,
    /// Mean per-bet return divided by its standard deviation.
    pub sharpe: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SweepReport {
    pub events_evaluated: usize,
    pub events_skipped: usize,
    pub points: Vec<ThresholdResult>,
}

impl SweepReport {
    /// Threshold with the highest Sharpe-like ratio among points that placed bets.
    pub fn best_by_sharpe(&self) -> Option<&ThresholdResult> {
        self.points
            .iter()
            .filter(|p| p.total.bets > 0)
            .max_by(|a, b| {
                a.sharpe
                    .partial_cmp(&b.sharpe)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_thresholds_inclusive() {
        let grid = SweepGrid {
            min: 1.0,
            max: 1.5,
            step: 0.1,
        };
        assert!(grid.validate().is_ok());
        assert_eq!(grid.thresholds(), vec![1.0, 1.1, 1.2, 1.3, 1.4, 1.5]);
    }

    #[test]
    fn test_grid_validation() {
        let inverted = SweepGrid {
            min: 2.0,
            max: 1.0,
            step: 0.1,
        };
        assert!(matches!(
            inverted.validate(),
            Err(PipelineError::Validation { .. })
        ));

        let zero_step = SweepGrid {
            min: 1.0,
            max: 2.0,
            step: 0.0,
        };
        assert!(zero_step.validate().is_err());

        let huge = SweepGrid {
            min: 0.0,
            max: 100.0,
            step: 0.001,
        };
        assert!(huge.validate().is_err());
    }

    #[test]
    fn test_subnormal_step_is_rejected_without_overflow() {
        let grid = SweepGrid {
            min: 0.0,
            max: 1.0,
            step: 1e-320,
        };
        assert!(matches!(
            grid.validate(),
            Err(PipelineError::Validation { .. })
        ));
        assert!(grid.thresholds().is_empty());

        let at_limit = SweepGrid {
            min: 0.0,
            max: (SweepGrid::MAX_POINTS - 1) as f64,
            step: 1.0,
        };
        assert!(at_limit.validate().is_ok());
        assert_eq!(at_limit.thresholds().len(), SweepGrid::MAX_POINTS);
    }

    #[test]
    fn test_policy_gate_bounds_inclusive() {
        let policy = BettingPolicy::default();
        assert!(policy.qualifies(0.5, 1.0));
        assert!(policy.qualifies(0.5, 2.0));
        assert!(!policy.qualifies(0.5, 2.01));
        assert!(!policy.qualifies(0.005, 1.5));
    }

    #[test]
    fn test_summary_roi() {
        let mut summary = BetSummary::default();
        let bet = PlacedBet {
            event_id: "R1".to_string(),
            bet_type: BetType::Win,
            selections: vec!["a".to_string()],
            probability: 0.5,
            odds: 2.5,
            expected_value: 1.25,
            stake: dec!(100),
            payout: dec!(250),
            hit: true,
        };
        summary.record(&bet);
        summary.record(&PlacedBet {
            payout: Decimal::ZERO,
            hit: false,
            ..bet.clone()
        });
        assert_eq!(summary.total_staked, dec!(200));
        assert_eq!(summary.profit(), dec!(50));
        assert_eq!(summary.roi(), dec!(0.25));
        assert_eq!(summary.hit_rate(), 0.5);
        assert_eq!(bet.return_ratio(), 1.5);
    }
}
