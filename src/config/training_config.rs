//! Gradient boosting hyperparameters for retraining jobs.

use super::Lookup;
use crate::application::ml::{BoostingParams, TrainingConfig};

#[derive(Debug, Clone)]
pub struct TrainingEnvConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: u16,
    pub min_samples_leaf: usize,
    pub subsample: f64,
    pub early_stopping_rounds: usize,
    pub label_smoothing: f64,
    pub seed: u64,
}

impl Default for TrainingEnvConfig {
    fn default() -> Self {
        let boosting = BoostingParams::default();
        Self {
            n_estimators: boosting.n_estimators,
            learning_rate: boosting.learning_rate,
            max_depth: boosting.max_depth,
            min_samples_leaf: boosting.min_samples_leaf,
            subsample: boosting.subsample,
            early_stopping_rounds: boosting.early_stopping_rounds,
            label_smoothing: 0.0,
            seed: boosting.seed,
        }
    }
}

impl TrainingEnvConfig {
    pub(super) fn from_lookup(get: &Lookup) -> Self {
        let d = Self::default();
        Self {
            n_estimators: super::parse_or(get, "TRAIN_N_ESTIMATORS", d.n_estimators),
            learning_rate: super::parse_or(get, "TRAIN_LEARNING_RATE", d.learning_rate),
            max_depth: super::parse_or(get, "TRAIN_MAX_DEPTH", d.max_depth),
            min_samples_leaf: super::parse_or(get, "TRAIN_MIN_SAMPLES_LEAF", d.min_samples_leaf),
            subsample: super::parse_or(get, "TRAIN_SUBSAMPLE", d.subsample),
            early_stopping_rounds: super::parse_or(
                get,
                "TRAIN_EARLY_STOPPING_ROUNDS",
                d.early_stopping_rounds,
            ),
            label_smoothing: super::parse_or(get, "TRAIN_LABEL_SMOOTHING", d.label_smoothing),
            seed: super::parse_or(get, "TRAIN_SEED", d.seed),
        }
    }

    /// Training defaults for the orchestrator; the split stays trailing.
    pub fn to_training_config(&self, use_calibration: bool) -> TrainingConfig {
        TrainingConfig {
            boosting: BoostingParams {
                n_estimators: self.n_estimators,
                learning_rate: self.learning_rate,
                max_depth: self.max_depth,
                min_samples_leaf: self.min_samples_leaf,
                subsample: self.subsample,
                early_stopping_rounds: self.early_stopping_rounds,
                seed: self.seed,
            },
            label_smoothing: self.label_smoothing,
            use_calibration,
            ..Default::default()
        }
    }
}
