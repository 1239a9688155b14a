use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::jobs::{
    JobAck, JobKind, JobPhase, JobSnapshot, JobStatus, ProgressCounters, ProgressEvent,
};
use crate::infrastructure::observability::PipelineMetrics;
use crate::infrastructure::progress_bus::{ProgressBus, ProgressItem, Subscription};
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(15);

/// Single-flight state of one kind of background job plus its progress bus.
///
/// Every state change happens under one mutex and is then published outside it,
/// so status reads never wait on the job itself.
pub struct JobTracker<R> {
    kind: JobKind,
    state: Arc<Mutex<JobSnapshot<R>>>,
    bus: ProgressBus,
    heartbeat: Duration,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl<R> Clone for JobTracker<R> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            state: Arc::clone(&self.state),
            bus: self.bus.clone(),
            heartbeat: self.heartbeat,
            metrics: self.metrics.clone(),
        }
    }
}

impl<R: Clone> JobTracker<R> {
    pub fn new(kind: JobKind, bus: ProgressBus) -> Self {
        Self {
            kind,
            state: Arc::new(Mutex::new(JobSnapshot {
                kind,
                status: JobStatus::Idle,
                phase: JobPhase::Idle,
                job_id: None,
                started_at: None,
                finished_at: None,
                percent: 0,
                message: String::new(),
                counters: ProgressCounters::default(),
                last_result: None,
                last_error: None,
            })),
            bus,
            heartbeat: DEFAULT_HEARTBEAT,
            metrics: None,
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    fn lock(&self) -> MutexGuard<'_, JobSnapshot<R>> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("JobTracker[{}]: Lock poisoned, recovering", self.kind);
                poisoned.into_inner()
            }
        }
    }

    /// Claims the slot or reports the running job's start time.
    ///
    /// The previous result is kept until this run completes.
    pub fn try_start(&self) -> PipelineResult<JobAck> {
        let now = Utc::now();
        let job_id = Uuid::new_v4();
        {
            let mut state = self.lock();
            if state.status == JobStatus::Running {
                return Err(PipelineError::ConcurrencyConflict {
                    kind: self.kind,
                    started_at: state.started_at.unwrap_or(now),
                });
            }
            state.status = JobStatus::Running;
            state.phase = JobPhase::Preparing;
            state.job_id = Some(job_id);
            state.started_at = Some(now);
            state.finished_at = None;
            state.percent = 0;
            state.message = "starting".to_string();
            state.counters = ProgressCounters::default();
            state.last_error = None;
        }
        info!("JobTracker[{}]: job {} started", self.kind, job_id);
        self.bus.publish(&ProgressEvent::new(
            self.kind,
            JobPhase::Preparing,
            0,
            "starting",
        ));
        Ok(JobAck {
            job_id,
            kind: self.kind,
            started_at: now,
        })
    }

    fn apply(&self, event: ProgressEvent) {
        {
            let mut state = self.lock();
            state.phase = event.phase;
            state.percent = event.percent;
            state.message = event.message.clone();
            state.counters = event.counters;
        }
        self.bus.publish(&event);
    }

    pub fn progress(&self, phase: JobPhase, percent: u8, message: impl Into<String>) {
        self.apply(ProgressEvent::new(self.kind, phase, percent, message));
    }

    pub fn progress_counted(
        &self,
        phase: JobPhase,
        percent: u8,
        message: impl Into<String>,
        current: usize,
        total: usize,
    ) {
        self.apply(ProgressEvent::new(self.kind, phase, percent, message).with_counters(current, total));
    }

    fn finish(&self, status: JobStatus, phase: JobPhase, message: String, result: Option<R>, err: Option<String>) {
        let now = Utc::now();
        let (started_at, percent) = {
            let mut state = self.lock();
            state.status = status;
            state.phase = phase;
            state.finished_at = Some(now);
            state.percent = if status == JobStatus::Completed { 100 } else { state.percent };
            state.message = message.clone();
            if result.is_some() {
                state.last_result = result;
            }
            state.last_error = err;
            (state.started_at, state.percent)
        };
        if let (Some(metrics), Some(started_at)) = (&self.metrics, started_at) {
            let secs = (now - started_at).num_milliseconds() as f64 / 1000.0;
            metrics.record_job(self.kind, status == JobStatus::Completed, secs);
        }
        self.bus.publish(&ProgressEvent::new(self.kind, phase, percent, message));
    }

    pub fn complete(&self, result: R, message: impl Into<String>) {
        let message = message.into();
        info!("JobTracker[{}]: completed: {}", self.kind, message);
        self.finish(JobStatus::Completed, JobPhase::Completed, message, Some(result), None);
    }

    pub fn fail(&self, err: &PipelineError) {
        error!("JobTracker[{}]: failed: {}", self.kind, err);
        let message = err.to_string();
        self.finish(JobStatus::Failed, JobPhase::Failed, message.clone(), None, Some(message));
    }

    pub fn snapshot(&self) -> JobSnapshot<R> {
        self.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.lock().status == JobStatus::Running
    }

    pub fn subscribe(&self) -> ProgressStream<R> {
        ProgressStream {
            subscription: self.bus.subscribe(),
            tracker: self.clone(),
        }
    }
}

/// A subscriber bound to the tracker whose status decides heartbeat vs idle.
pub struct ProgressStream<R> {
    subscription: Subscription,
    tracker: JobTracker<R>,
}

impl<R: Clone> ProgressStream<R> {
    pub async fn next(&mut self) -> ProgressItem {
        let tracker = &self.tracker;
        self.subscription
            .next(tracker.heartbeat, || tracker.is_running())
            .await
    }

    pub fn detach(&mut self) {
        self.subscription.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> JobTracker<u32> {
        JobTracker::new(JobKind::Sweep, ProgressBus::default())
            .with_heartbeat(Duration::from_millis(20))
    }

    #[test]
    fn test_second_start_conflicts_without_touching_state() {
        let t = tracker();
        let ack = t.try_start().unwrap();
        t.progress(JobPhase::Sweeping, 40, "halfway");

        let err = t.try_start().unwrap_err();
        match err {
            PipelineError::ConcurrencyConflict { kind, started_at } => {
                assert_eq!(kind, JobKind::Sweep);
                assert_eq!(started_at, ack.started_at);
            }
            other => panic!("unexpected {:?}", other),
        }
        let snap = t.snapshot();
        assert_eq!(snap.percent, 40);
        assert_eq!(snap.job_id, Some(ack.job_id));
    }

    #[test]
    fn test_failure_releases_slot() {
        let t = tracker();
        t.try_start().unwrap();
        t.fail(&PipelineError::training("boom"));
        let snap = t.snapshot();
        assert_eq!(snap.status, JobStatus::Failed);
        assert!(snap.last_error.unwrap().contains("boom"));
        assert!(t.try_start().is_ok());
    }

    #[test]
    fn test_completion_keeps_result() {
        let t = tracker();
        t.try_start().unwrap();
        t.complete(7, "done");
        let snap = t.snapshot();
        assert_eq!(snap.last_result, Some(7));
        assert_eq!(snap.percent, 100);
        assert!(snap.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_stream_sees_terminal_event_then_idle() {
        let t = tracker();
        t.try_start().unwrap();
        let mut stream = t.subscribe();
        assert_eq!(stream.next().await, ProgressItem::Heartbeat);

        t.complete(1, "done");
        match stream.next().await {
            ProgressItem::Event(e) => assert!(e.is_terminal()),
            other => panic!("expected terminal event, got {:?}", other),
        }
        assert_eq!(stream.next().await, ProgressItem::Idle);
    }
}
