use super::cache::PredictionCache;
use crate::application::features::FeatureExtractor;
use crate::application::ml::{ModelRegistry, market_baseline};
use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::ml::EventPrediction;
use crate::domain::ports::RaceDataSource;
use crate::infrastructure::observability::PipelineMetrics;
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info};

/// Synchronous per-event prediction for the serving path.
///
/// Model predictions are memoised in the cache; baseline predictions are not,
/// so activating a model takes effect on the next call.
pub struct PredictionService {
    source: Arc<dyn RaceDataSource>,
    registry: Arc<ModelRegistry>,
    cache: Arc<PredictionCache>,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl PredictionService {
    pub fn new(
        source: Arc<dyn RaceDataSource>,
        registry: Arc<ModelRegistry>,
        cache: Arc<PredictionCache>,
    ) -> Self {
        Self {
            source,
            registry,
            cache,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn predict(&self, event_id: &str) -> PipelineResult<Arc<EventPrediction>> {
        if let Some(hit) = self.cache.get(event_id) {
            debug!("PredictionService: cache hit for {}", event_id);
            return Ok(hit);
        }

        let event = self
            .source
            .event(event_id)
            .await?
            .ok_or_else(|| PipelineError::data_unavailable(format!("unknown event {}", event_id)))?;
        if event.entrants.is_empty() {
            return Err(PipelineError::data_unavailable(format!(
                "event {} has no entrants",
                event_id
            )));
        }

        // Captured before the model: an activation after this point bumps it.
        let generation = self.cache.generation();
        let Some(model) = self.registry.current() else {
            info!("PredictionService: no model loaded, using market baseline for {}", event_id);
            self.count("baseline");
            return Ok(Arc::new(market_baseline(&event, self.cache.now())));
        };

        let rows = FeatureExtractor::new(Arc::clone(&self.source))
            .extract_rows(&event, None)
            .await?;
        let prediction = model.predict_event(&event, &rows, self.cache.now())?;
        self.count("model");
        Ok(self.cache.put_if_current(generation, event_id, prediction))
    }

    /// Predicts several events concurrently, failing on the first error.
    pub async fn predict_many(&self, event_ids: &[String]) -> PipelineResult<Vec<Arc<EventPrediction>>> {
        try_join_all(event_ids.iter().map(|id| self.predict(id))).await
    }

    fn count(&self, source: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_prediction(source);
        }
    }
}
