use crate::domain::racing::{EventSnapshot, HandlerRole, HistoricalRecord};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Storage/query collaborator that serves events and settled history.
///
/// Results may arrive in any order; consumers sort when they need to.
#[async_trait]
pub trait RaceDataSource: Send + Sync {
    /// Single event by id, settled or not.
    async fn event(&self, event_id: &str) -> Result<Option<EventSnapshot>>;

    /// Settled events dated within `[from, to]`.
    async fn settled_events(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<EventSnapshot>>;

    /// Settled runs of the given competitors dated strictly before `before`.
    async fn competitor_history(
        &self,
        competitor_ids: &[String],
        before: NaiveDate,
    ) -> Result<Vec<HistoricalRecord>>;

    /// Settled runs ridden, trained or sired by the given handlers, strictly before `before`.
    async fn handler_history(
        &self,
        role: HandlerRole,
        handler_ids: &[String],
        before: NaiveDate,
    ) -> Result<Vec<HistoricalRecord>>;
}

/// Registry entry for a fully persisted model version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub version: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub checksum: String,
}

/// Versioned persistence of serialized model bundles.
///
/// The bundle is opaque here; it is written and read as one unit.
#[async_trait]
pub trait ModelStore: Send + Sync {
    async fn save(&self, version: &str, bundle: &[u8]) -> Result<ArtifactInfo>;

    /// Fails with `PipelineError::VersionNotFound` for unknown versions.
    async fn load(&self, version: &str) -> Result<Vec<u8>>;

    /// Fully persisted versions, newest first.
    async fn list(&self) -> Result<Vec<ArtifactInfo>>;

    async fn delete(&self, version: &str) -> Result<()>;
}

/// Optional remote copy of artifacts for cross-environment serving.
#[async_trait]
pub trait ArtifactUploader: Send + Sync {
    async fn upload(&self, version: &str, bundle: &[u8]) -> Result<()>;
}

/// Time source, swappable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
