use serde::{Deserialize, Serialize};

/// Monotone map from min-max normalised raw scores to empirical win frequency.
///
/// Fitted with pool-adjacent-violators on the validation partition. Inputs outside
/// the fitted range are clamped; between knots the map interpolates linearly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsotonicCalibrator {
    score_min: f64,
    score_max: f64,
    knots_x: Vec<f64>,
    knots_y: Vec<f64>,
}

struct Block {
    x_sum: f64,
    y_sum: f64,
    weight: f64,
}

impl Block {
    fn mean_y(&self) -> f64 {
        self.y_sum / self.weight
    }
}

impl IsotonicCalibrator {
    /// Returns `None` when there is nothing to calibrate against.
    pub fn fit(scores: &[f64], labels: &[f64]) -> Option<Self> {
        if scores.is_empty() || scores.len() != labels.len() {
            return None;
        }
        let score_min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let score_max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !score_min.is_finite() || !score_max.is_finite() {
            return None;
        }

        let mut pairs: Vec<(f64, f64)> = scores
            .iter()
            .map(|s| normalise(*s, score_min, score_max))
            .zip(labels.iter().copied())
            .collect();
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut blocks: Vec<Block> = Vec::with_capacity(pairs.len());
        for (x, y) in pairs {
            blocks.push(Block {
                x_sum: x,
                y_sum: y,
                weight: 1.0,
            });
            while blocks.len() > 1 {
                let n = blocks.len();
                if blocks[n - 2].mean_y() <= blocks[n - 1].mean_y() {
                    break;
                }
                let last = blocks.pop();
                if let (Some(last), Some(prev)) = (last, blocks.last_mut()) {
                    prev.x_sum += last.x_sum;
                    prev.y_sum += last.y_sum;
                    prev.weight += last.weight;
                }
            }
        }

        Some(Self {
            score_min,
            score_max,
            knots_x: blocks.iter().map(|b| b.x_sum / b.weight).collect(),
            knots_y: blocks.iter().map(Block::mean_y).collect(),
        })
    }

    pub fn transform(&self, score: f64) -> f64 {
        let x = normalise(score, self.score_min, self.score_max);
        let (Some(first_x), Some(last_x)) = (self.knots_x.first(), self.knots_x.last()) else {
            return 0.0;
        };
        if x <= *first_x {
            return self.knots_y[0];
        }
        if x >= *last_x {
            return self.knots_y[self.knots_y.len() - 1];
        }
        let hi = self.knots_x.partition_point(|k| *k < x);
        let lo = hi - 1;
        let span = self.knots_x[hi] - self.knots_x[lo];
        if span <= f64::EPSILON {
            return self.knots_y[hi];
        }
        let t = (x - self.knots_x[lo]) / span;
        self.knots_y[lo] + t * (self.knots_y[hi] - self.knots_y[lo])
    }
}

fn normalise(score: f64, min: f64, max: f64) -> f64 {
    let range = max - min;
    if range <= f64::EPSILON {
        0.5
    } else {
        ((score - min) / range).clamp(0.0, 1.0)
    }
}
