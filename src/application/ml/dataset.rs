use crate::application::features::FeatureExtractor;
use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::ports::RaceDataSource;
use crate::domain::racing::EventSnapshot;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Schema-ordered training rows with their finishing positions.
///
/// Rows are grouped by event and ordered chronologically.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub rows: Vec<Vec<f64>>,
    pub positions: Vec<u8>,
    pub dates: Vec<NaiveDate>,
    pub event_ids: Vec<String>,
}

impl Dataset {
    /// Features every settled event in `events` as of its own date.
    ///
    /// One preloaded extractor serves the whole batch.
    pub async fn build(
        source: Arc<dyn RaceDataSource>,
        events: &[EventSnapshot],
    ) -> PipelineResult<Self> {
        let mut settled: Vec<&EventSnapshot> = events.iter().filter(|e| e.is_settled()).collect();
        settled.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.event_id.cmp(&b.event_id)));
        let Some(max_date) = settled.last().map(|e| e.date) else {
            return Err(PipelineError::data_unavailable("no settled events in range"));
        };

        let owned: Vec<EventSnapshot> = settled.iter().map(|e| (*e).clone()).collect();
        let extractor = FeatureExtractor::preloaded(source, &owned, max_date).await?;

        let mut dataset = Dataset::default();
        let mut skipped = 0usize;
        for event in &owned {
            let rows = extractor.extract_rows(event, None).await?;
            if rows.is_empty() {
                skipped += 1;
                continue;
            }
            for (row, entrant) in rows.into_iter().zip(&event.entrants) {
                dataset.rows.push(row);
                dataset.positions.push(entrant.finish_position.unwrap_or(u8::MAX));
                dataset.dates.push(event.date);
                dataset.event_ids.push(event.event_id.clone());
            }
        }
        if skipped > 0 {
            warn!("Dataset: {} events produced no features", skipped);
        }
        if dataset.is_empty() {
            return Err(PipelineError::data_unavailable("no feature rows produced"));
        }
        info!(
            "Dataset: {} rows from {} events ({} to {})",
            dataset.len(),
            owned.len() - skipped,
            owned.first().map(|e| e.date).unwrap_or(max_date),
            max_date
        );
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Winner = 1, everyone else = 0.
    pub fn labels(&self) -> Vec<f64> {
        self.positions
            .iter()
            .map(|p| if *p == 1 { 1.0 } else { 0.0 })
            .collect()
    }

    fn select(&self, labels: &[f64], keep: impl Fn(usize) -> bool) -> Partition {
        let mut part = Partition::default();
        for i in (0..self.len()).filter(|i| keep(*i)) {
            part.rows.push(self.rows[i].clone());
            part.labels.push(labels[i]);
            part.dates.push(self.dates[i]);
            part.event_ids.push(self.event_ids[i].clone());
        }
        part
    }

    pub fn split(&self, plan: &SplitPlan) -> PipelineResult<Partitions> {
        plan.validate()?;
        let labels = self.labels();
        let partitions = match *plan {
            SplitPlan::Trailing { valid_fraction } => {
                let boundary = self.trailing_boundary(valid_fraction);
                Partitions {
                    train: self.select(&labels, |i| i < boundary),
                    valid: self.select(&labels, |i| i >= boundary),
                    test: Partition::default(),
                }
            }
            SplitPlan::Chronological {
                train_end,
                valid_end,
            } => Partitions {
                train: self.select(&labels, |i| self.dates[i] <= train_end),
                valid: self.select(&labels, |i| {
                    self.dates[i] > train_end && self.dates[i] <= valid_end
                }),
                test: self.select(&labels, |i| self.dates[i] > valid_end),
            },
        };
        if partitions.train.is_empty() {
            return Err(PipelineError::data_unavailable("training partition is empty"));
        }
        Ok(partitions)
    }

    /// First row index of the validation tail, moved forward to an event boundary.
    fn trailing_boundary(&self, valid_fraction: f64) -> usize {
        let n = self.len();
        let mut boundary = ((n as f64) * (1.0 - valid_fraction)).round() as usize;
        boundary = boundary.clamp(1.min(n), n);
        while boundary > 0 && boundary < n && self.event_ids[boundary] == self.event_ids[boundary - 1] {
            boundary += 1;
        }
        boundary
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SplitPlan {
    /// Last `valid_fraction` of the chronologically sorted rows become Valid; no Test.
    Trailing { valid_fraction: f64 },
    /// Train `<= train_end < ` Valid `<= valid_end <` Test.
    Chronological {
        train_end: NaiveDate,
        valid_end: NaiveDate,
    },
}

impl Default for SplitPlan {
    fn default() -> Self {
        SplitPlan::Trailing {
            valid_fraction: 0.2,
        }
    }
}

impl SplitPlan {
    pub fn validate(&self) -> PipelineResult<()> {
        match *self {
            SplitPlan::Trailing { valid_fraction } => {
                if !(valid_fraction > 0.0 && valid_fraction < 1.0) {
                    return Err(PipelineError::validation(format!(
                        "valid_fraction {} outside (0, 1)",
                        valid_fraction
                    )));
                }
            }
            SplitPlan::Chronological {
                train_end,
                valid_end,
            } => {
                if train_end >= valid_end {
                    return Err(PipelineError::validation(format!(
                        "train_end {} must precede valid_end {}",
                        train_end, valid_end
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub rows: Vec<Vec<f64>>,
    pub labels: Vec<f64>,
    pub dates: Vec<NaiveDate>,
    pub event_ids: Vec<String>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.dates.iter().min()?;
        let max = self.dates.iter().max()?;
        Some((*min, *max))
    }

    /// Pulls winner labels toward `1 - epsilon` and the rest toward `epsilon`.
    pub fn smooth_labels(&mut self, epsilon: f64) {
        if epsilon <= 0.0 {
            return;
        }
        for y in &mut self.labels {
            *y = *y * (1.0 - epsilon) + (1.0 - *y) * epsilon;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Partitions {
    pub train: Partition,
    pub valid: Partition,
    pub test: Partition,
}
