//! Wagering gate and threshold sweep defaults.

use super::Lookup;
use crate::domain::simulation::{BettingPolicy, SweepGrid};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct SimulationEnvConfig {
    pub ev_threshold: f64,
    pub max_ev: f64,
    pub min_probability: f64,
    pub stake: Decimal,
    pub pair_top_k: usize,
    pub pair_odds_divisor: f64,
    pub sweep_min: f64,
    pub sweep_max: f64,
    pub sweep_step: f64,
}

impl Default for SimulationEnvConfig {
    fn default() -> Self {
        let policy = BettingPolicy::default();
        let grid = SweepGrid::default();
        Self {
            ev_threshold: policy.ev_threshold,
            max_ev: policy.max_ev,
            min_probability: policy.min_probability,
            stake: policy.stake,
            pair_top_k: policy.pair_top_k,
            pair_odds_divisor: policy.pair_odds_divisor,
            sweep_min: grid.min,
            sweep_max: grid.max,
            sweep_step: grid.step,
        }
    }
}

impl SimulationEnvConfig {
    pub(super) fn from_lookup(get: &Lookup) -> Self {
        let d = Self::default();
        Self {
            ev_threshold: super::parse_or(get, "SIM_EV_THRESHOLD", d.ev_threshold),
            max_ev: super::parse_or(get, "SIM_MAX_EV", d.max_ev),
            min_probability: super::parse_or(get, "SIM_MIN_PROBABILITY", d.min_probability),
            stake: super::parse_or(get, "SIM_STAKE", d.stake),
            pair_top_k: super::parse_or(get, "SIM_PAIR_TOP_K", d.pair_top_k),
            pair_odds_divisor: super::parse_or(get, "SIM_PAIR_ODDS_DIVISOR", d.pair_odds_divisor),
            sweep_min: super::parse_or(get, "SWEEP_MIN", d.sweep_min),
            sweep_max: super::parse_or(get, "SWEEP_MAX", d.sweep_max),
            sweep_step: super::parse_or(get, "SWEEP_STEP", d.sweep_step),
        }
    }

    pub fn policy(&self) -> BettingPolicy {
        BettingPolicy {
            ev_threshold: self.ev_threshold,
            max_ev: self.max_ev,
            min_probability: self.min_probability,
            stake: self.stake,
            pair_top_k: self.pair_top_k,
            pair_odds_divisor: self.pair_odds_divisor,
            ..Default::default()
        }
    }

    pub fn grid(&self) -> SweepGrid {
        SweepGrid {
            min: self.sweep_min,
            max: self.sweep_max,
            step: self.sweep_step,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SweepFile {
    sweep: SweepGridToml,
}

#[derive(Debug, Deserialize)]
struct SweepGridToml {
    min: f64,
    max: f64,
    step: f64,
}

/// Reads a `[sweep]` table with `min`, `max` and `step`.
///
/// Bounds are not validated here; the sweep rejects bad grids when it starts.
pub fn load_sweep_grid(path: &Path) -> Result<SweepGrid> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read sweep grid file: {:?}", path))?;
    parse_sweep_grid(&content).with_context(|| format!("Failed to parse sweep grid TOML: {:?}", path))
}

pub fn parse_sweep_grid(content: &str) -> Result<SweepGrid> {
    let file: SweepFile = toml::from_str(content)?;
    Ok(SweepGrid {
        min: file.sweep.min,
        max: file.sweep.max,
        step: file.sweep.step,
    })
}
