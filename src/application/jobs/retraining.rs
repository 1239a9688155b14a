use super::tracker::{JobTracker, ProgressStream};
use crate::application::ml::{Dataset, ModelRegistry, SplitPlan, TrainingConfig, TrainingMetrics, train};
use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::jobs::{JobAck, JobKind, JobPhase, JobSnapshot};
use crate::domain::ports::{ArtifactInfo, ArtifactUploader, RaceDataSource};
use crate::infrastructure::progress_bus::ProgressBus;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Parameters of one retraining run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrainingRequest {
    /// Settled events dated within `[data_from, data_to]` are used.
    pub data_from: NaiveDate,
    pub data_to: NaiveDate,
    /// Both set: three-way chronological split. Both unset: trailing split.
    pub train_end: Option<NaiveDate>,
    pub valid_end: Option<NaiveDate>,
    /// Caller-supplied tag; timestamp-derived when absent.
    pub version: Option<String>,
    /// Overrides the orchestrator's default training config.
    pub config: Option<TrainingConfig>,
}

impl RetrainingRequest {
    pub fn new(data_from: NaiveDate, data_to: NaiveDate) -> Self {
        Self {
            data_from,
            data_to,
            train_end: None,
            valid_end: None,
            version: None,
            config: None,
        }
    }

    fn resolve(&self, defaults: &TrainingConfig) -> PipelineResult<(TrainingConfig, String)> {
        if self.data_from > self.data_to {
            return Err(PipelineError::validation(format!(
                "data range {}..{} is inverted",
                self.data_from, self.data_to
            )));
        }
        let mut config = self.config.clone().unwrap_or_else(|| defaults.clone());
        match (self.train_end, self.valid_end) {
            (Some(train_end), Some(valid_end)) => {
                if train_end < self.data_from || valid_end > self.data_to {
                    return Err(PipelineError::validation(
                        "split dates must fall inside the data range",
                    ));
                }
                config.split = SplitPlan::Chronological {
                    train_end,
                    valid_end,
                };
            }
            (None, None) => {}
            _ => {
                return Err(PipelineError::validation(
                    "train_end and valid_end must be given together",
                ));
            }
        }
        config.validate()?;

        let version = match &self.version {
            Some(v) => validate_version(v)?,
            None => Utc::now().format("v%Y%m%d-%H%M%S%3f").to_string(),
        };
        Ok((config, version))
    }
}

fn validate_version(version: &str) -> PipelineResult<String> {
    let ok = !version.is_empty()
        && version.len() <= 64
        && !version.starts_with('.')
        && version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(version.to_string())
    } else {
        Err(PipelineError::validation(format!("invalid version tag {:?}", version)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrainingResult {
    pub version: String,
    pub metrics: TrainingMetrics,
    pub artifact: ArtifactInfo,
    pub uploaded: bool,
}

/// Runs training as a background job and activates the result.
///
/// `Preparing → Training → Saving → [Uploading] → Completed | Failed`. A failed
/// upload fails the job; the saved version stays in the catalogue but is not
/// activated.
pub struct RetrainingOrchestrator {
    source: Arc<dyn RaceDataSource>,
    registry: Arc<ModelRegistry>,
    uploader: Option<Arc<dyn ArtifactUploader>>,
    tracker: JobTracker<RetrainingResult>,
    defaults: TrainingConfig,
}

impl RetrainingOrchestrator {
    pub fn new(
        source: Arc<dyn RaceDataSource>,
        registry: Arc<ModelRegistry>,
        bus: ProgressBus,
        defaults: TrainingConfig,
    ) -> Self {
        Self {
            source,
            registry,
            uploader: None,
            tracker: JobTracker::new(JobKind::Retraining, bus),
            defaults,
        }
    }

    pub fn with_uploader(mut self, uploader: Arc<dyn ArtifactUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    /// Replaces the tracker, e.g. to attach metrics or a shorter heartbeat.
    pub fn with_tracker(mut self, tracker: JobTracker<RetrainingResult>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn tracker(&self) -> &JobTracker<RetrainingResult> {
        &self.tracker
    }

    pub fn status(&self) -> JobSnapshot<RetrainingResult> {
        self.tracker.snapshot()
    }

    pub fn subscribe(&self) -> ProgressStream<RetrainingResult> {
        self.tracker.subscribe()
    }

    /// Validates the request, claims the job slot and returns immediately.
    pub async fn start(&self, request: RetrainingRequest) -> PipelineResult<JobAck> {
        let (config, version) = request.resolve(&self.defaults)?;
        if self
            .registry
            .versions()
            .await?
            .iter()
            .any(|info| info.version == version)
        {
            return Err(PipelineError::validation(format!(
                "version {} already exists",
                version
            )));
        }

        let ack = self.tracker.try_start()?;
        let job = RetrainingJob {
            source: Arc::clone(&self.source),
            registry: Arc::clone(&self.registry),
            uploader: self.uploader.clone(),
            tracker: self.tracker.clone(),
        };
        tokio::spawn(async move {
            let tracker = job.tracker.clone();
            match job.run(request, config, version).await {
                Ok(result) => {
                    let message = format!("version {} active", result.version);
                    tracker.complete(result, message);
                }
                Err(e) => tracker.fail(&e),
            }
        });
        Ok(ack)
    }
}

struct RetrainingJob {
    source: Arc<dyn RaceDataSource>,
    registry: Arc<ModelRegistry>,
    uploader: Option<Arc<dyn ArtifactUploader>>,
    tracker: JobTracker<RetrainingResult>,
}

impl RetrainingJob {
    async fn run(
        self,
        request: RetrainingRequest,
        config: TrainingConfig,
        version: String,
    ) -> PipelineResult<RetrainingResult> {
        self.tracker
            .progress(JobPhase::Preparing, 5, "loading settled events");
        let events = self
            .source
            .settled_events(request.data_from, request.data_to)
            .await?;
        if events.is_empty() {
            return Err(PipelineError::data_unavailable(format!(
                "no settled events between {} and {}",
                request.data_from, request.data_to
            )));
        }
        self.tracker.progress_counted(
            JobPhase::Preparing,
            10,
            "building features",
            0,
            events.len(),
        );
        let dataset = Dataset::build(Arc::clone(&self.source), &events).await?;
        self.tracker.progress_counted(
            JobPhase::Preparing,
            20,
            format!("{} feature rows", dataset.len()),
            events.len(),
            events.len(),
        );

        self.tracker.progress(JobPhase::Training, 25, "fitting ensemble");
        let train_version = version.clone();
        let model = tokio::task::spawn_blocking(move || train(&dataset, &config, train_version))
            .await
            .map_err(|e| PipelineError::training(format!("training task aborted: {}", e)))??;
        self.tracker.progress(
            JobPhase::Training,
            70,
            format!("{} trees kept", model.metrics.n_trees),
        );

        self.tracker.progress(JobPhase::Saving, 75, "writing artifact");
        let bytes = model.to_bytes()?;
        let artifact = self.registry.store().save(&version, &bytes).await?;
        info!(
            "Retraining: saved {} ({} bytes, sha256 {})",
            version, artifact.size_bytes, artifact.checksum
        );

        let mut uploaded = false;
        if let Some(uploader) = &self.uploader {
            self.tracker.progress(JobPhase::Uploading, 85, "uploading artifact");
            if let Err(e) = uploader.upload(&version, &bytes).await {
                warn!("Retraining: upload of {} failed, not activating: {:#}", version, e);
                return Err(e.into());
            }
            uploaded = true;
        }

        let metrics = model.metrics.clone();
        self.registry.activate(Arc::new(model));

        Ok(RetrainingResult {
            version,
            metrics,
            artifact,
            uploaded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[test]
    fn test_request_validation() {
        let defaults = TrainingConfig::default();
        assert!(RetrainingRequest::new(day(10), day(1)).resolve(&defaults).is_err());

        let mut half = RetrainingRequest::new(day(1), day(30));
        half.train_end = Some(day(10));
        assert!(half.resolve(&defaults).is_err());

        half.valid_end = Some(day(20));
        let (config, version) = half.resolve(&defaults).unwrap();
        assert!(matches!(config.split, SplitPlan::Chronological { .. }));
        assert!(version.starts_with('v'));

        half.version = Some("../escape".to_string());
        assert!(matches!(
            half.resolve(&defaults),
            Err(PipelineError::Validation { .. })
        ));
    }
}
