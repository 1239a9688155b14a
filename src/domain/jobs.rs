//! Background job vocabulary shared by retraining and threshold sweeps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    Retraining,
    Sweep,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Retraining => write!(f, "retraining"),
            JobKind::Sweep => write!(f, "sweep"),
        }
    }
}

/// Phase of a background job.
///
/// Retraining walks `Preparing → Training → Saving → [Uploading] → Completed | Failed`,
/// sweeps walk `Preparing → Sweeping → Completed | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum JobPhase {
    #[default]
    Idle,
    Preparing,
    Training,
    Saving,
    Uploading,
    Sweeping,
    Completed,
    Failed,
}

impl JobPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Completed | JobPhase::Failed)
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobPhase::Idle => "idle",
            JobPhase::Preparing => "preparing",
            JobPhase::Training => "training",
            JobPhase::Saving => "saving",
            JobPhase::Uploading => "uploading",
            JobPhase::Sweeping => "sweeping",
            JobPhase::Completed => "completed",
            JobPhase::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum JobStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProgressCounters {
    pub current: usize,
    pub total: usize,
}

/// Typed progress message broadcast to subscribers of a running job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub kind: JobKind,
    pub phase: JobPhase,
    pub percent: u8,
    pub message: String,
    pub counters: ProgressCounters,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(kind: JobKind, phase: JobPhase, percent: u8, message: impl Into<String>) -> Self {
        Self {
            kind,
            phase,
            percent: percent.min(100),
            message: message.into(),
            counters: ProgressCounters::default(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_counters(mut self, current: usize, total: usize) -> Self {
        self.counters = ProgressCounters { current, total };
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}

/// Returned by a start call: the job runs in the background from here on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobAck {
    pub job_id: uuid::Uuid,
    pub kind: JobKind,
    pub started_at: DateTime<Utc>,
}

/// Point-in-time copy of a job's state, safe to hand to pollers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot<R> {
    pub kind: JobKind,
    pub status: JobStatus,
    pub phase: JobPhase,
    pub job_id: Option<uuid::Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub percent: u8,
    pub message: String,
    pub counters: ProgressCounters,
    pub last_result: Option<R>,
    pub last_error: Option<String>,
}

impl<R> JobSnapshot<R> {
    pub fn is_running(&self) -> bool {
        self.status == JobStatus::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_is_capped() {
        let event = ProgressEvent::new(JobKind::Sweep, JobPhase::Sweeping, 250, "over");
        assert_eq!(event.percent, 100);
    }

    #[test]
    fn test_terminal_phases() {
        assert!(JobPhase::Completed.is_terminal());
        assert!(JobPhase::Failed.is_terminal());
        assert!(!JobPhase::Uploading.is_terminal());
        assert!(!JobPhase::Idle.is_terminal());
    }
}
