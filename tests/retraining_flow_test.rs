mod common;

use anyhow::Result;
use async_trait::async_trait;
use podium::application::jobs::{JobTracker, RetrainingOrchestrator, RetrainingRequest};
use podium::domain::errors::PipelineError;
use podium::domain::jobs::{JobKind, JobPhase, JobStatus};
use podium::domain::ports::{ArtifactUploader, RaceDataSource};
use podium::infrastructure::progress_bus::{ProgressBus, ProgressItem};
use podium::infrastructure::InMemoryRaceRepository;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct RecordingUploader {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl ArtifactUploader for RecordingUploader {
    async fn upload(&self, _version: &str, bundle: &[u8]) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(!bundle.is_empty());
        if self.fail {
            anyhow::bail!("remote rejected the artifact");
        }
        Ok(())
    }
}

fn orchestrator(tag: &str) -> (RetrainingOrchestrator, Arc<podium::application::ml::ModelRegistry>, std::path::PathBuf) {
    let events = common::events(31, 90);
    let source: Arc<dyn RaceDataSource> = Arc::new(InMemoryRaceRepository::from_events(events));
    let (registry, _, dir) = common::registry(tag);
    let bus = ProgressBus::default();
    let tracker = JobTracker::new(JobKind::Retraining, bus.clone()).with_heartbeat(Duration::from_millis(200));
    let orchestrator = RetrainingOrchestrator::new(source, Arc::clone(&registry), bus, common::quick_config())
        .with_tracker(tracker);
    (orchestrator, registry, dir)
}

fn full_range() -> RetrainingRequest {
    let events = common::events(31, 90);
    RetrainingRequest::new(events[0].date, events.last().unwrap().date)
}

#[tokio::test]
async fn test_successful_run_activates_new_version() {
    let (orchestrator, registry, dir) = orchestrator("success");
    let mut stream = orchestrator.subscribe();

    let request = RetrainingRequest {
        version: Some("v-it-1".to_string()),
        ..full_range()
    };
    let ack = orchestrator.start(request).await.unwrap();
    assert_eq!(ack.kind, JobKind::Retraining);

    let seen = common::wait_terminal(&mut stream, Duration::from_secs(120)).await;
    let phases: Vec<JobPhase> = seen
        .iter()
        .filter_map(|item| match item {
            ProgressItem::Event(e) => Some(e.phase),
            _ => None,
        })
        .collect();
    for expected in [JobPhase::Preparing, JobPhase::Training, JobPhase::Saving, JobPhase::Completed] {
        assert!(phases.contains(&expected), "missing {:?} in {:?}", expected, phases);
    }
    assert!(!phases.contains(&JobPhase::Uploading));

    let snapshot = orchestrator.status();
    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.percent, 100);
    let result = snapshot.last_result.unwrap();
    assert_eq!(result.version, "v-it-1");
    assert!(!result.uploaded);
    assert_eq!(registry.active_version().as_deref(), Some("v-it-1"));

    let listed = registry.versions().await.unwrap();
    assert_eq!(listed[0].version, "v-it-1");
    assert_eq!(listed[0].checksum, result.artifact.checksum);

    // A repeated tag is refused before any work starts.
    let again = RetrainingRequest {
        version: Some("v-it-1".to_string()),
        ..full_range()
    };
    assert!(matches!(
        orchestrator.start(again).await,
        Err(PipelineError::Validation { .. })
    ));

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_second_start_while_running_conflicts() {
    let (orchestrator, _registry, dir) = orchestrator("conflict");
    let first = orchestrator.start(full_range()).await.unwrap();

    match orchestrator.start(full_range()).await {
        Err(PipelineError::ConcurrencyConflict { kind, started_at }) => {
            assert_eq!(kind, JobKind::Retraining);
            assert_eq!(started_at, first.started_at);
        }
        other => panic!("expected conflict, got {:?}", other.map(|a| a.job_id)),
    }
    assert_eq!(orchestrator.status().job_id, Some(first.job_id));

    let mut stream = orchestrator.subscribe();
    common::wait_terminal(&mut stream, Duration::from_secs(120)).await;
    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_failed_upload_keeps_previous_model_active() {
    let (orchestrator, registry, dir) = orchestrator("upload");
    let uploader = Arc::new(RecordingUploader {
        calls: AtomicUsize::new(0),
        fail: true,
    });
    let orchestrator = orchestrator.with_uploader(uploader.clone());

    let previous = Arc::new(common::trained(&common::events(31, 40), "v-prev").await);
    registry.activate(previous);

    let mut stream = orchestrator.subscribe();
    orchestrator
        .start(RetrainingRequest {
            version: Some("v-it-2".to_string()),
            ..full_range()
        })
        .await
        .unwrap();
    common::wait_terminal(&mut stream, Duration::from_secs(120)).await;

    let snapshot = orchestrator.status();
    assert_eq!(snapshot.status, JobStatus::Failed);
    assert_eq!(snapshot.phase, JobPhase::Failed);
    assert!(snapshot.last_error.unwrap().contains("remote rejected"));
    assert_eq!(uploader.calls.load(Ordering::SeqCst), 1);
    assert_eq!(registry.active_version().as_deref(), Some("v-prev"));
    // Saved before the upload, so still in the catalogue.
    assert!(registry.versions().await.unwrap().iter().any(|i| i.version == "v-it-2"));

    // The slot is free again after a failure.
    assert!(orchestrator.start(full_range()).await.is_ok());
    common::wait_terminal(&mut stream, Duration::from_secs(120)).await;
    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_empty_range_fails_job() {
    let (orchestrator, registry, dir) = orchestrator("empty");
    let far = chrono::NaiveDate::from_ymd_opt(1990, 1, 1).unwrap();
    let mut stream = orchestrator.subscribe();
    orchestrator
        .start(RetrainingRequest::new(far, far))
        .await
        .unwrap();
    common::wait_terminal(&mut stream, Duration::from_secs(30)).await;

    let snapshot = orchestrator.status();
    assert_eq!(snapshot.status, JobStatus::Failed);
    assert!(snapshot.last_error.unwrap().contains("no settled events"));
    assert!(registry.current().is_none());
    std::fs::remove_dir_all(&dir).ok();
}
