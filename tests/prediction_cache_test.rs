mod common;

use chrono::{Duration, TimeZone, Utc};
use podium::application::ml::ModelRegistry;
use podium::application::prediction::{PredictionCache, PredictionService};
use podium::domain::errors::PipelineError;
use podium::domain::ml::PredictionSource;
use podium::domain::ports::{Clock, RaceDataSource};
use podium::domain::racing::{EventSnapshot, HandlerRole, HistoricalRecord};
use podium::infrastructure::{FileModelStore, InMemoryRaceRepository, ManualClock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Repository that can park the next history lookup until released.
struct GatedSource {
    inner: InMemoryRaceRepository,
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl GatedSource {
    fn new(events: Vec<EventSnapshot>) -> Self {
        Self {
            inner: InMemoryRaceRepository::from_events(events),
            armed: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait::async_trait]
impl RaceDataSource for GatedSource {
    async fn event(&self, event_id: &str) -> anyhow::Result<Option<EventSnapshot>> {
        self.inner.event(event_id).await
    }

    async fn settled_events(
        &self,
        from: chrono::NaiveDate,
        to: chrono::NaiveDate,
    ) -> anyhow::Result<Vec<EventSnapshot>> {
        self.inner.settled_events(from, to).await
    }

    async fn competitor_history(
        &self,
        competitor_ids: &[String],
        before: chrono::NaiveDate,
    ) -> anyhow::Result<Vec<HistoricalRecord>> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.competitor_history(competitor_ids, before).await
    }

    async fn handler_history(
        &self,
        role: HandlerRole,
        handler_ids: &[String],
        before: chrono::NaiveDate,
    ) -> anyhow::Result<Vec<HistoricalRecord>> {
        self.inner.handler_history(role, handler_ids, before).await
    }
}

fn source(events: &[EventSnapshot]) -> Arc<dyn RaceDataSource> {
    Arc::new(InMemoryRaceRepository::from_events(events.to_vec()))
}

#[tokio::test]
async fn test_baseline_served_without_model_and_not_cached() {
    let events = common::events(51, 30);
    let (registry, cache, _dir) = common::registry("baseline");
    let service = PredictionService::new(source(&events), registry, Arc::clone(&cache));

    let target = &events[20];
    let prediction = service.predict(&target.event_id).await.unwrap();
    assert_eq!(prediction.source, PredictionSource::MarketBaseline);
    assert!(!prediction.calibrated);
    let total: f64 = prediction.entrants.iter().map(|e| e.probability).sum();
    assert!((total - 1.0).abs() < 1e-9);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_model_prediction_is_memoised_until_activation() {
    let events = common::events(52, 60);
    let (registry, cache, _dir) = common::registry("memo");
    registry.activate(Arc::new(common::trained(&events[..40], "v-a").await));
    let service = PredictionService::new(source(&events), Arc::clone(&registry), Arc::clone(&cache));

    let id = &events[50].event_id;
    let first = service.predict(id).await.unwrap();
    assert_eq!(
        first.source,
        PredictionSource::Model {
            version: "v-a".to_string()
        }
    );
    let second = service.predict(id).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.len(), 1);

    // A new active model must never be served stale predictions.
    registry.activate(Arc::new(common::trained(&events[..45], "v-b").await));
    assert!(cache.is_empty());
    let third = service.predict(id).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(
        third.source,
        PredictionSource::Model {
            version: "v-b".to_string()
        }
    );
}

#[tokio::test]
async fn test_entries_expire_after_ttl() {
    let events = common::events(53, 50);
    let clock = Arc::new(ManualClock::at(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()));
    let cache = Arc::new(PredictionCache::with_clock(Duration::seconds(60), clock.clone()));
    let dir = common::temp_dir("ttl");
    let registry = Arc::new(ModelRegistry::new(
        Arc::new(FileModelStore::new(&dir)),
        Arc::clone(&cache),
    ));
    registry.activate(Arc::new(common::trained(&events[..40], "v-ttl").await));
    let service = PredictionService::new(source(&events), registry, Arc::clone(&cache));

    let id = &events[45].event_id;
    let first = service.predict(id).await.unwrap();
    assert_eq!(first.computed_at, clock.now());

    clock.advance(Duration::seconds(59));
    assert!(Arc::ptr_eq(&first, &service.predict(id).await.unwrap()));

    clock.advance(Duration::seconds(1));
    let refreshed = service.predict(id).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &refreshed));
    assert_eq!(refreshed.computed_at, first.computed_at + Duration::seconds(60));
    assert_eq!(refreshed.entrants, first.entrants);
}

#[tokio::test]
async fn test_unknown_event_is_data_unavailable() {
    let events = common::events(54, 10);
    let (registry, cache, _dir) = common::registry("unknown");
    let service = PredictionService::new(source(&events), registry, cache);
    assert!(matches!(
        service.predict("NOPE").await,
        Err(PipelineError::DataUnavailable { .. })
    ));
}

#[tokio::test]
async fn test_concurrent_predictions_share_the_cache() {
    let events = common::events(55, 60);
    let (registry, cache, _dir) = common::registry("many");
    registry.activate(Arc::new(common::trained(&events[..40], "v-many").await));
    let service = PredictionService::new(source(&events), registry, Arc::clone(&cache));

    let ids: Vec<String> = events[40..50].iter().map(|e| e.event_id.clone()).collect();
    let batch = service.predict_many(&ids).await.unwrap();
    assert_eq!(batch.len(), ids.len());
    assert_eq!(cache.len(), ids.len());
    for (prediction, id) in batch.iter().zip(&ids) {
        assert_eq!(&prediction.event_id, id);
        assert!(Arc::ptr_eq(prediction, &service.predict(id).await.unwrap()));
    }

    let mut with_unknown = ids.clone();
    with_unknown.push("NOPE".to_string());
    assert!(service.predict_many(&with_unknown).await.is_err());
}

#[tokio::test]
async fn test_prediction_straddling_a_model_switch_is_not_cached() {
    let events = common::events(56, 60);
    let gated = Arc::new(GatedSource::new(events.clone()));
    let (registry, cache, _dir) = common::registry("switch");
    registry.activate(Arc::new(common::trained(&events[..40], "v1").await));
    let next = Arc::new(common::trained(&events[..45], "v2").await);
    let service = Arc::new(PredictionService::new(
        gated.clone(),
        Arc::clone(&registry),
        Arc::clone(&cache),
    ));

    let id = events[50].event_id.clone();
    gated.armed.store(true, Ordering::SeqCst);
    let in_flight = {
        let service = Arc::clone(&service);
        let id = id.clone();
        tokio::spawn(async move { service.predict(&id).await })
    };

    // v1 was read and the lookup is parked; switch models underneath it.
    gated.entered.notified().await;
    registry.activate(next);
    gated.release.notify_one();

    let straddling = in_flight.await.unwrap().unwrap();
    assert_eq!(
        straddling.source,
        PredictionSource::Model {
            version: "v1".to_string()
        }
    );
    assert!(cache.is_empty());

    let served = service.predict(&id).await.unwrap();
    assert_eq!(
        served.source,
        PredictionSource::Model {
            version: "v2".to_string()
        }
    );
    assert!(Arc::ptr_eq(&served, &service.predict(&id).await.unwrap()));
}
