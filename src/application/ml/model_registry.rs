use super::predictor::{FeatureImportance, TrainedModel};
use crate::application::prediction::PredictionCache;
use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::ports::{ArtifactInfo, ModelStore};
use crate::infrastructure::observability::PipelineMetrics;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Process-wide holder of the active model plus the version catalogue.
///
/// Activation swaps the `Arc` under a short write lock; readers holding the
/// previous `Arc` keep a consistent model until they drop it.
pub struct ModelRegistry {
    store: Arc<dyn ModelStore>,
    active: RwLock<Option<Arc<TrainedModel>>>,
    cache: Arc<PredictionCache>,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl ModelRegistry {
    pub fn new(store: Arc<dyn ModelStore>, cache: Arc<PredictionCache>) -> Self {
        Self {
            store,
            active: RwLock::new(None),
            cache,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> Arc<dyn ModelStore> {
        Arc::clone(&self.store)
    }

    /// Snapshot of the active model, if any.
    pub fn current(&self) -> Option<Arc<TrainedModel>> {
        match self.active.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn active_version(&self) -> Option<String> {
        self.current().map(|m| m.version.clone())
    }

    /// Makes `model` the active one and drops every cached prediction.
    ///
    /// The swap happens before the invalidation, so a reader that sees the new
    /// cache generation also sees the new model.
    pub fn activate(&self, model: Arc<TrainedModel>) {
        let version = model.version.clone();
        let created_at = model.created_at;
        {
            let mut guard = self.active.write().unwrap_or_else(|p| p.into_inner());
            *guard = Some(model);
        }
        self.cache.invalidate_all();
        if let Some(metrics) = &self.metrics {
            metrics.set_active_model(created_at);
        }
        info!("ModelRegistry: active model is now {}", version);
    }

    /// Loads a stored version and activates it.
    pub async fn switch_to(&self, version: &str) -> PipelineResult<Arc<TrainedModel>> {
        let bytes = self.store.load(version).await?;
        let model = Arc::new(TrainedModel::from_bytes(version, &bytes)?);
        self.activate(Arc::clone(&model));
        Ok(model)
    }

    /// Activates the newest loadable version; `None` when the store is empty.
    ///
    /// Versions that fail to decode are skipped with a warning.
    pub async fn load_latest(&self) -> PipelineResult<Option<Arc<TrainedModel>>> {
        for info in self.store.list().await? {
            match self.switch_to(&info.version).await {
                Ok(model) => return Ok(Some(model)),
                Err(e) => warn!("ModelRegistry: skipping version {}: {}", info.version, e),
            }
        }
        Ok(None)
    }

    /// Fully persisted versions, newest first.
    pub async fn versions(&self) -> PipelineResult<Vec<ArtifactInfo>> {
        Ok(self.store.list().await?)
    }

    /// Removes a stored version; the active one cannot be deleted.
    pub async fn delete(&self, version: &str) -> PipelineResult<()> {
        if self.active_version().as_deref() == Some(version) {
            return Err(PipelineError::validation(format!(
                "version {} is active and cannot be deleted",
                version
            )));
        }
        self.store.delete(version).await?;
        info!("ModelRegistry: deleted version {}", version);
        Ok(())
    }

    pub fn feature_importance(&self) -> PipelineResult<Vec<FeatureImportance>> {
        self.current()
            .map(|m| m.feature_importance.clone())
            .ok_or(PipelineError::ModelNotLoaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ml::dataset::Dataset;
    use crate::application::ml::predictor::{TrainingConfig, train};
    use crate::application::ml::boosting::BoostingParams;
    use crate::domain::ml::EventPrediction;
    use crate::domain::ml::PredictionSource;
    use crate::infrastructure::persistence::FileModelStore;
    use crate::infrastructure::repositories::InMemoryRaceRepository;
    use crate::infrastructure::synthetic::SyntheticRaceGenerator;
    use chrono::Utc;

    async fn trained(version: &str) -> TrainedModel {
        let events = SyntheticRaceGenerator::new(3).generate(30);
        let repo = Arc::new(InMemoryRaceRepository::from_events(events.clone()));
        let ds = Dataset::build(repo, &events).await.unwrap();
        let config = TrainingConfig {
            boosting: BoostingParams {
                n_estimators: 5,
                ..Default::default()
            },
            compute_importance: false,
            ..Default::default()
        };
        train(&ds, &config, version).unwrap()
    }

    fn registry(tag: &str) -> (ModelRegistry, Arc<PredictionCache>) {
        let dir = std::env::temp_dir().join(format!("podium_registry_{}_{}", tag, uuid::Uuid::new_v4()));
        let cache = Arc::new(PredictionCache::default());
        (
            ModelRegistry::new(Arc::new(FileModelStore::new(dir)), cache.clone()),
            cache,
        )
    }

    #[tokio::test]
    async fn test_nothing_loaded() {
        let (registry, _) = registry("empty");
        assert!(registry.current().is_none());
        assert!(matches!(
            registry.feature_importance(),
            Err(PipelineError::ModelNotLoaded)
        ));
        assert!(registry.load_latest().await.unwrap().is_none());
        let err = registry.switch_to("missing").await.unwrap_err();
        assert!(matches!(err, PipelineError::VersionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_switch_invalidates_cache_and_guards_delete() {
        let (registry, cache) = registry("switch");
        let model = trained("v1").await;
        registry.store().save("v1", &model.to_bytes().unwrap()).await.unwrap();

        cache.put(
            "R1",
            EventPrediction {
                event_id: "R1".to_string(),
                source: PredictionSource::MarketBaseline,
                calibrated: false,
                computed_at: Utc::now(),
                entrants: vec![],
            },
        );
        let held = registry.load_latest().await.unwrap().unwrap();
        assert_eq!(held.version, "v1");
        assert!(cache.is_empty());

        let err = registry.delete("v1").await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation { .. }));
    }
}
