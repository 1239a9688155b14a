use super::boosting::{BoostingParams, GradientBoostedTrees, sigmoid};
use super::calibration::IsotonicCalibrator;
use super::dataset::{Dataset, SplitPlan};
use super::evaluation::{PartitionMetrics, roc_auc};
use super::scaler::StandardScaler;
use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::ml::feature_schema;
use crate::domain::ml::prediction::{
    EntrantPrediction, EventPrediction, PredictionSource, rank_descending, renormalize,
};
use crate::domain::racing::EventSnapshot;
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Bundle format written by this build.
pub const ARTIFACT_FORMAT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub boosting: BoostingParams,
    pub split: SplitPlan,
    /// Applied to the training partition only.
    pub label_smoothing: f64,
    /// Whether inference applies the fitted calibrator by default.
    pub use_calibration: bool,
    /// Compute permutation importance on the validation partition.
    pub compute_importance: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            boosting: BoostingParams::default(),
            split: SplitPlan::default(),
            label_smoothing: 0.0,
            use_calibration: true,
            compute_importance: true,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> PipelineResult<()> {
        self.boosting.validate()?;
        self.split.validate()?;
        if !(0.0..0.5).contains(&self.label_smoothing) {
            return Err(PipelineError::validation(format!(
                "label_smoothing {} outside [0, 0.5)",
                self.label_smoothing
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub train: PartitionMetrics,
    pub valid: Option<PartitionMetrics>,
    pub test: Option<PartitionMetrics>,
    /// Train AUC minus Valid AUC.
    pub overfit_gap: Option<f64>,
    /// Valid AUC minus Test AUC.
    pub generalization_gap: Option<f64>,
    pub n_trees: usize,
    pub best_iteration: usize,
    pub stopped_early: bool,
    pub calibrated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    /// Drop in validation AUC when the column is shuffled.
    pub importance: f64,
}

/// Immutable, versioned model bundle. Superseded, never mutated.
#[derive(Debug, Serialize, Deserialize)]
pub struct TrainedModel {
    pub format: u32,
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub schema: Vec<String>,
    pub ensemble: GradientBoostedTrees,
    pub scaler: StandardScaler,
    pub calibrator: Option<IsotonicCalibrator>,
    pub use_calibration: bool,
    pub metrics: TrainingMetrics,
    pub feature_importance: Vec<FeatureImportance>,
}

impl TrainedModel {
    pub fn to_bytes(&self) -> PipelineResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| PipelineError::Storage(e.into()))
    }

    /// Decodes a bundle and checks it against the running feature schema.
    pub fn from_bytes(version: &str, bytes: &[u8]) -> PipelineResult<Self> {
        let model: TrainedModel =
            serde_json::from_slice(bytes).map_err(|e| PipelineError::CorruptArtifact {
                version: version.to_string(),
                reason: e.to_string(),
            })?;
        if model.schema.as_slice() != feature_schema() || model.scaler.width() != model.schema.len() {
            return Err(PipelineError::SchemaMismatch {
                expected: feature_schema().len(),
                actual: model.schema.len(),
            });
        }
        Ok(model)
    }

    pub fn is_calibrated(&self) -> bool {
        self.use_calibration && self.calibrator.is_some()
    }

    /// Raw log-odds scores for unscaled schema-ordered rows.
    pub fn raw_scores(&self, rows: &[Vec<f64>]) -> PipelineResult<Vec<f64>> {
        if let Some(bad) = rows.iter().find(|r| r.len() != self.schema.len()) {
            return Err(PipelineError::SchemaMismatch {
                expected: self.schema.len(),
                actual: bad.len(),
            });
        }
        self.ensemble.decision_function(&self.scaler.transform(rows))
    }

    /// Closed-world win probabilities for one event's rows, entrant order preserved.
    ///
    /// Falls back to the uncalibrated sigmoid when calibration maps the whole field
    /// to zero.
    pub fn predict_event(
        &self,
        event: &EventSnapshot,
        rows: &[Vec<f64>],
        computed_at: DateTime<Utc>,
    ) -> PipelineResult<EventPrediction> {
        if rows.is_empty() {
            return Err(PipelineError::data_unavailable(format!(
                "event {} produced no feature rows",
                event.event_id
            )));
        }
        let raw = self.raw_scores(rows)?;
        let uncalibrated: Vec<f64> = raw.iter().map(|s| sigmoid(*s)).collect();

        let mut calibrated = false;
        let weights = match self.calibrator.as_ref().filter(|_| self.use_calibration) {
            Some(calibrator) => {
                let mapped: Vec<f64> = raw.iter().map(|s| calibrator.transform(*s)).collect();
                if mapped.iter().sum::<f64>() > 0.0 {
                    calibrated = true;
                    mapped
                } else {
                    warn!(
                        "Predictor: calibration zeroed event {}, using raw probabilities",
                        event.event_id
                    );
                    uncalibrated
                }
            }
            None => uncalibrated,
        };

        let probabilities = renormalize(&weights);
        let ranks = rank_descending(&raw);
        let entrants = event
            .entrants
            .iter()
            .zip(raw.iter().zip(probabilities))
            .zip(ranks)
            .map(|((entrant, (raw_score, probability)), rank)| EntrantPrediction {
                competitor_id: entrant.competitor_id.clone(),
                raw_score: *raw_score,
                probability,
                rank,
                odds: entrant.market_odds(),
            })
            .collect();

        Ok(EventPrediction {
            event_id: event.event_id.clone(),
            source: PredictionSource::Model {
                version: self.version.clone(),
            },
            calibrated,
            computed_at,
            entrants,
        })
    }
}

/// Fits scaler, ensemble and calibrator on `dataset` and scores every partition.
pub fn train(
    dataset: &Dataset,
    config: &TrainingConfig,
    version: impl Into<String>,
) -> PipelineResult<TrainedModel> {
    config.validate()?;
    if dataset.is_empty() {
        return Err(PipelineError::data_unavailable("training matrix is empty"));
    }
    let version = version.into();
    let mut parts = dataset.split(&config.split)?;
    parts.train.smooth_labels(config.label_smoothing);
    info!(
        "Predictor: training {} on {} train / {} valid / {} test rows",
        version,
        parts.train.len(),
        parts.valid.len(),
        parts.test.len()
    );

    let scaler = StandardScaler::fit(&parts.train.rows);
    let train_x = scaler.transform(&parts.train.rows);
    let valid_x = scaler.transform(&parts.valid.rows);
    let test_x = scaler.transform(&parts.test.rows);

    let valid = (!valid_x.is_empty()).then_some((valid_x.as_slice(), parts.valid.labels.as_slice()));
    let (ensemble, trace) = GradientBoostedTrees::fit(&train_x, &parts.train.labels, valid, &config.boosting)?;

    let train_scores = ensemble.decision_function(&train_x)?;
    let valid_scores = ensemble.decision_function(&valid_x)?;
    let test_scores = ensemble.decision_function(&test_x)?;

    let calibrator = IsotonicCalibrator::fit(&valid_scores, &parts.valid.labels);
    if calibrator.is_none() {
        warn!("Predictor: no validation rows, {} ships uncalibrated", version);
    }

    let metric = |ids: &[String], labels: &[f64], scores: &[f64]| {
        let probs: Vec<f64> = scores.iter().map(|s| sigmoid(*s)).collect();
        PartitionMetrics::compute(ids, labels, &probs)
    };
    let train_labels = dataset_labels(&parts.train.labels);
    let train_m = metric(&parts.train.event_ids, &train_labels, &train_scores);
    let valid_m = (!parts.valid.is_empty())
        .then(|| metric(&parts.valid.event_ids, &parts.valid.labels, &valid_scores));
    let test_m = (!parts.test.is_empty())
        .then(|| metric(&parts.test.event_ids, &parts.test.labels, &test_scores));

    let feature_importance = if config.compute_importance && !valid_x.is_empty() {
        permutation_importance(&ensemble, &valid_x, &parts.valid.labels, config.boosting.seed)?
    } else {
        Vec::new()
    };

    let metrics = TrainingMetrics {
        train: train_m,
        valid: valid_m,
        test: test_m,
        overfit_gap: valid_m.map(|v| train_m.auc - v.auc),
        generalization_gap: valid_m.zip(test_m).map(|(v, t)| v.auc - t.auc),
        n_trees: ensemble.n_trees(),
        best_iteration: trace.best_iteration,
        stopped_early: trace.stopped_early,
        calibrated: calibrator.is_some(),
    };
    info!(
        "Predictor: {} trained with {} trees, valid AUC {:?}",
        version,
        metrics.n_trees,
        metrics.valid.map(|v| v.auc)
    );

    Ok(TrainedModel {
        format: ARTIFACT_FORMAT,
        version,
        created_at: Utc::now(),
        schema: feature_schema().to_vec(),
        ensemble,
        scaler,
        calibrator,
        use_calibration: config.use_calibration,
        metrics,
        feature_importance,
    })
}

/// Hard labels for scoring a smoothed training partition.
fn dataset_labels(labels: &[f64]) -> Vec<f64> {
    labels.iter().map(|y| if *y >= 0.5 { 1.0 } else { 0.0 }).collect()
}

/// AUC drop per shuffled column, most important first.
fn permutation_importance(
    ensemble: &GradientBoostedTrees,
    rows: &[Vec<f64>],
    labels: &[f64],
    seed: u64,
) -> PipelineResult<Vec<FeatureImportance>> {
    let baseline = roc_auc(labels, &ensemble.decision_function(rows)?);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut importances = Vec::with_capacity(feature_schema().len());

    for (col, name) in feature_schema().iter().enumerate() {
        let mut column: Vec<f64> = rows.iter().map(|r| r[col]).collect();
        column.shuffle(&mut rng);
        let permuted: Vec<Vec<f64>> = rows
            .iter()
            .zip(column)
            .map(|(r, v)| {
                let mut r = r.clone();
                r[col] = v;
                r
            })
            .collect();
        let auc = roc_auc(labels, &ensemble.decision_function(&permuted)?);
        importances.push(FeatureImportance {
            feature: name.clone(),
            importance: baseline - auc,
        });
    }
    importances.sort_by(|a, b| {
        b.importance
            .partial_cmp(&a.importance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(importances)
}
