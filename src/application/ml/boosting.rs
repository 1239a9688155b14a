use crate::domain::errors::{PipelineError, PipelineResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};
use std::fmt;
use tracing::debug;

type Tree = DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Rows below which subsampling is skipped for an iteration.
const MIN_SAMPLED_ROWS: usize = 8;

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: u16,
    pub min_samples_leaf: usize,
    /// Row sampling rate per iteration, in `(0, 1]`.
    pub subsample: f64,
    /// Patience window on validation loss; 0 disables early stopping.
    pub early_stopping_rounds: usize,
    pub seed: u64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            learning_rate: 0.05,
            max_depth: 4,
            min_samples_leaf: 5,
            subsample: 0.8,
            early_stopping_rounds: 30,
            seed: 42,
        }
    }
}

impl BoostingParams {
    pub fn validate(&self) -> PipelineResult<()> {
        if self.n_estimators == 0 {
            return Err(PipelineError::validation("n_estimators must be at least 1"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(PipelineError::validation("learning_rate must be in (0, 1]"));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(PipelineError::validation("subsample must be in (0, 1]"));
        }
        if self.max_depth == 0 {
            return Err(PipelineError::validation("max_depth must be at least 1"));
        }
        Ok(())
    }

    fn tree_params(&self) -> DecisionTreeRegressorParameters {
        DecisionTreeRegressorParameters::default()
            .with_max_depth(self.max_depth)
            .with_min_samples_leaf(self.min_samples_leaf.max(1))
            .with_min_samples_split(self.min_samples_leaf.max(1) * 2)
    }
}

/// Validation loss per boosting round and the round that was kept.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BoostingTrace {
    pub valid_losses: Vec<f64>,
    pub best_iteration: usize,
    pub stopped_early: bool,
}

/// Gradient-boosted regression trees under logistic loss.
///
/// Scores are log-odds; [`sigmoid`] maps them to win probabilities.
#[derive(Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    base_score: f64,
    learning_rate: f64,
    trees: Vec<Tree>,
}

impl fmt::Debug for GradientBoostedTrees {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GradientBoostedTrees")
            .field("base_score", &self.base_score)
            .field("learning_rate", &self.learning_rate)
            .field("trees", &self.trees.len())
            .finish()
    }
}

fn matrix(rows: &[Vec<f64>]) -> PipelineResult<DenseMatrix<f64>> {
    DenseMatrix::from_2d_vec(&rows.to_vec())
        .map_err(|e| PipelineError::training(format!("matrix creation failed: {}", e)))
}

fn mean_log_loss(labels: &[f64], scores: &[f64]) -> f64 {
    let probs: Vec<f64> = scores.iter().map(|s| sigmoid(*s)).collect();
    super::evaluation::log_loss(labels, &probs)
}

impl GradientBoostedTrees {
    /// Fits on `(x, y)`; when `valid` is given, stops once its loss has not improved
    /// for `early_stopping_rounds` rounds and keeps the best round's trees.
    pub fn fit(
        x: &[Vec<f64>],
        y: &[f64],
        valid: Option<(&[Vec<f64>], &[f64])>,
        params: &BoostingParams,
    ) -> PipelineResult<(Self, BoostingTrace)> {
        params.validate()?;
        if x.is_empty() || x.len() != y.len() {
            return Err(PipelineError::data_unavailable(format!(
                "cannot boost on {} rows with {} labels",
                x.len(),
                y.len()
            )));
        }

        let prior = (y.iter().sum::<f64>() / y.len() as f64).clamp(1e-6, 1.0 - 1e-6);
        let base_score = (prior / (1.0 - prior)).ln();
        let x_all = matrix(x)?;
        let mut f_train = vec![base_score; x.len()];

        let valid = match valid {
            Some((vx, vy)) if !vx.is_empty() => Some((matrix(vx)?, vy)),
            _ => None,
        };
        let mut f_valid = valid
            .as_ref()
            .map(|(_, vy)| vec![base_score; vy.len()])
            .unwrap_or_default();

        let mut rng = StdRng::seed_from_u64(params.seed);
        let tree_params = params.tree_params();
        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut trace = BoostingTrace::default();
        let mut best_loss = f64::INFINITY;

        for round in 0..params.n_estimators {
            let residuals: Vec<f64> = y
                .iter()
                .zip(&f_train)
                .map(|(yi, fi)| yi - sigmoid(*fi))
                .collect();

            let sampled: Vec<usize> = if params.subsample < 1.0 {
                (0..x.len()).filter(|_| rng.random_bool(params.subsample)).collect()
            } else {
                Vec::new()
            };
            let fitted = if sampled.len() >= MIN_SAMPLED_ROWS {
                let sx: Vec<Vec<f64>> = sampled.iter().map(|&i| x[i].clone()).collect();
                let sy: Vec<f64> = sampled.iter().map(|&i| residuals[i]).collect();
                Tree::fit(&matrix(&sx)?, &sy, tree_params.clone())
            } else {
                Tree::fit(&x_all, &residuals, tree_params.clone())
            };
            let tree = fitted
                .map_err(|e| PipelineError::training(format!("tree {} failed: {}", round, e)))?;

            let step = tree
                .predict(&x_all)
                .map_err(|e| PipelineError::training(format!("tree {} predict: {}", round, e)))?;
            for (fi, si) in f_train.iter_mut().zip(step) {
                *fi += params.learning_rate * si;
            }

            if let Some((vx, vy)) = &valid {
                let vstep = tree
                    .predict(vx)
                    .map_err(|e| PipelineError::training(format!("tree {} predict: {}", round, e)))?;
                for (fi, si) in f_valid.iter_mut().zip(vstep) {
                    *fi += params.learning_rate * si;
                }
                let loss = mean_log_loss(vy, &f_valid);
                trace.valid_losses.push(loss);
                if loss < best_loss {
                    best_loss = loss;
                    trace.best_iteration = round;
                }
            } else {
                trace.best_iteration = round;
            }
            trees.push(tree);

            if valid.is_some()
                && params.early_stopping_rounds > 0
                && round - trace.best_iteration >= params.early_stopping_rounds
            {
                debug!(
                    "Boosting: early stop at round {} (best {}, valid loss {:.5})",
                    round, trace.best_iteration, best_loss
                );
                trace.stopped_early = true;
                break;
            }
        }

        trees.truncate(trace.best_iteration + 1);
        Ok((
            Self {
                base_score,
                learning_rate: params.learning_rate,
                trees,
            },
            trace,
        ))
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Raw log-odds scores for already-scaled rows.
    pub fn decision_function(&self, rows: &[Vec<f64>]) -> PipelineResult<Vec<f64>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let x = matrix(rows)?;
        let mut scores = vec![self.base_score; rows.len()];
        for tree in &self.trees {
            let step = tree
                .predict(&x)
                .map_err(|e| PipelineError::training(format!("predict failed: {}", e)))?;
            for (s, v) in scores.iter_mut().zip(step) {
                *s += self.learning_rate * v;
            }
        }
        Ok(scores)
    }

    pub fn predict_proba(&self, rows: &[Vec<f64>]) -> PipelineResult<Vec<f64>> {
        Ok(self
            .decision_function(rows)?
            .into_iter()
            .map(sigmoid)
            .collect())
    }
}
