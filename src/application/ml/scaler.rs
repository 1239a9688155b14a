use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Distribution};

/// Per-column standardisation fitted on the training partition only.
///
/// Constant or single-valued columns keep a unit scale so they transform to zero
/// instead of dividing by zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let columns = rows.first().map_or(0, Vec::len);
        let mut means = Vec::with_capacity(columns);
        let mut scales = Vec::with_capacity(columns);

        for col in 0..columns {
            let data = Data::new(rows.iter().map(|r| r[col]).collect::<Vec<f64>>());
            let mean = data.mean().filter(|m| m.is_finite()).unwrap_or(0.0);
            let std_dev = data
                .std_dev()
                .filter(|s| s.is_finite() && *s > f64::EPSILON)
                .unwrap_or(1.0);
            means.push(mean);
            scales.push(std_dev);
        }
        Self { means, scales }
    }

    pub fn width(&self) -> usize {
        self.means.len()
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }
}
