#![allow(dead_code)]

use podium::application::jobs::ProgressStream;
use podium::application::ml::{BoostingParams, Dataset, ModelRegistry, TrainedModel, TrainingConfig, train};
use podium::application::prediction::PredictionCache;
use podium::domain::racing::EventSnapshot;
use podium::infrastructure::progress_bus::ProgressItem;
use podium::infrastructure::{FileModelStore, InMemoryRaceRepository, SyntheticRaceGenerator};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub fn temp_dir(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("podium_it_{}_{}", tag, uuid::Uuid::new_v4()))
}

pub fn events(seed: u64, n: usize) -> Vec<EventSnapshot> {
    SyntheticRaceGenerator::new(seed).generate(n)
}

pub fn quick_config() -> TrainingConfig {
    TrainingConfig {
        boosting: BoostingParams {
            n_estimators: 25,
            learning_rate: 0.2,
            early_stopping_rounds: 8,
            ..Default::default()
        },
        compute_importance: false,
        ..Default::default()
    }
}

pub async fn trained(events: &[EventSnapshot], version: &str) -> TrainedModel {
    let repo = Arc::new(InMemoryRaceRepository::from_events(events.to_vec()));
    let dataset = Dataset::build(repo, events).await.expect("dataset");
    train(&dataset, &quick_config(), version).expect("training")
}

pub fn registry(tag: &str) -> (Arc<ModelRegistry>, Arc<PredictionCache>, PathBuf) {
    let dir = temp_dir(tag);
    let cache = Arc::new(PredictionCache::default());
    let registry = Arc::new(ModelRegistry::new(
        Arc::new(FileModelStore::new(&dir)),
        Arc::clone(&cache),
    ));
    (registry, cache, dir)
}

/// Drains a job stream until its terminal event, failing the test after `limit`.
pub async fn wait_terminal<R: Clone>(stream: &mut ProgressStream<R>, limit: Duration) -> Vec<ProgressItem> {
    let mut seen = Vec::new();
    let drained = tokio::time::timeout(limit, async {
        loop {
            let item = stream.next().await;
            let done = match &item {
                ProgressItem::Event(e) => e.is_terminal(),
                ProgressItem::Heartbeat => false,
                ProgressItem::Idle => true,
            };
            seen.push(item);
            if done {
                break;
            }
        }
    })
    .await;
    assert!(drained.is_ok(), "job did not settle within {:?}", limit);
    seen
}
