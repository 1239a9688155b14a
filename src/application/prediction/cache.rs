use crate::domain::ml::EventPrediction;
use crate::domain::ports::Clock;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::observability::PipelineMetrics;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info};

pub const DEFAULT_TTL_SECS: i64 = 300;

#[derive(Debug, Clone)]
struct CacheEntry {
    computed_at: DateTime<Utc>,
    payload: Arc<EventPrediction>,
}

/// Short-TTL memo of event predictions keyed by event id.
///
/// Expired entries are evicted by the read that finds them. Invalidation takes
/// the write lock, so a recompute after `invalidate` always misses.
///
/// `invalidate_all` also advances a generation counter. A writer that captured
/// the generation before reading the active model uses `put_if_current`, so a
/// result computed across a model switch is never stored.
pub struct PredictionCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    generation: AtomicU64,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl std::fmt::Debug for PredictionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionCache")
            .field("ttl", &self.ttl)
            .field("entries", &"<RwLock>")
            .finish()
    }
}

impl Default for PredictionCache {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_TTL_SECS))
    }
}

impl PredictionCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            ttl,
            clock,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn record(&self, hit: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_cache(hit);
        }
    }

    /// Cached payload if younger than the TTL; an expired entry is removed.
    pub fn get(&self, event_id: &str) -> Option<Arc<EventPrediction>> {
        let now = self.clock.now();
        {
            let guard = match self.entries.read() {
                Ok(guard) => guard,
                Err(poisoned) => {
                    error!("PredictionCache: Lock poisoned during read, recovering");
                    poisoned.into_inner()
                }
            };
            match guard.get(event_id) {
                None => {
                    self.record(false);
                    return None;
                }
                Some(entry) if now - entry.computed_at < self.ttl => {
                    self.record(true);
                    return Some(Arc::clone(&entry.payload));
                }
                Some(_) => {}
            }
        }

        let mut guard = self.entries.write().unwrap_or_else(|p| p.into_inner());
        if guard
            .get(event_id)
            .is_some_and(|entry| now - entry.computed_at >= self.ttl)
        {
            guard.remove(event_id);
            debug!("PredictionCache: evicted expired entry for {}", event_id);
        }
        drop(guard);
        self.record(false);
        None
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Stores a payload stamped with the current clock time, replacing any entry.
    pub fn put(&self, event_id: impl Into<String>, payload: EventPrediction) -> Arc<EventPrediction> {
        let payload = Arc::new(payload);
        let entry = CacheEntry {
            computed_at: self.clock.now(),
            payload: Arc::clone(&payload),
        };
        let mut guard = self.entries.write().unwrap_or_else(|p| p.into_inner());
        guard.insert(event_id.into(), entry);
        payload
    }

    /// Like [`put`](Self::put), but only while no `invalidate_all` has run since
    /// `generation` was read. The payload is returned either way.
    pub fn put_if_current(
        &self,
        generation: u64,
        event_id: impl Into<String>,
        payload: EventPrediction,
    ) -> Arc<EventPrediction> {
        let event_id = event_id.into();
        let payload = Arc::new(payload);
        let mut guard = self.entries.write().unwrap_or_else(|p| p.into_inner());
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(
                "PredictionCache: dropping {} computed before the last invalidation",
                event_id
            );
            return payload;
        }
        guard.insert(
            event_id,
            CacheEntry {
                computed_at: self.clock.now(),
                payload: Arc::clone(&payload),
            },
        );
        payload
    }

    pub fn invalidate(&self, event_id: &str) -> bool {
        let mut guard = self.entries.write().unwrap_or_else(|p| p.into_inner());
        guard.remove(event_id).is_some()
    }

    pub fn invalidate_all(&self) -> usize {
        let mut guard = self.entries.write().unwrap_or_else(|p| p.into_inner());
        let dropped = guard.len();
        guard.clear();
        self.generation.fetch_add(1, Ordering::SeqCst);
        info!("PredictionCache: invalidated {} entries", dropped);
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|g| g.len()).unwrap_or_else(|p| p.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ml::PredictionSource;
    use crate::infrastructure::clock::ManualClock;

    fn payload(id: &str) -> EventPrediction {
        EventPrediction {
            event_id: id.to_string(),
            source: PredictionSource::MarketBaseline,
            calibrated: false,
            computed_at: Utc::now(),
            entrants: vec![],
        }
    }

    #[test]
    fn test_hit_before_ttl_returns_same_payload() {
        let clock = Arc::new(ManualClock::default());
        let cache = PredictionCache::with_clock(Duration::seconds(300), clock.clone());
        let stored = cache.put("R1", payload("R1"));

        clock.advance(Duration::seconds(299));
        let hit = cache.get("R1").unwrap();
        assert!(Arc::ptr_eq(&stored, &hit));
    }

    #[test]
    fn test_expired_entry_is_evicted_on_read() {
        let clock = Arc::new(ManualClock::default());
        let cache = PredictionCache::with_clock(Duration::seconds(300), clock.clone());
        cache.put("R1", payload("R1"));

        clock.advance(Duration::seconds(300));
        assert!(cache.get("R1").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_forces_miss() {
        let cache = PredictionCache::default();
        cache.put("R1", payload("R1"));
        cache.put("R2", payload("R2"));
        assert!(cache.invalidate("R1"));
        assert!(!cache.invalidate("R1"));
        assert!(cache.get("R1").is_none());
        assert_eq!(cache.invalidate_all(), 1);
        assert!(cache.get("R2").is_none());
    }

    #[test]
    fn test_put_after_invalidate_all_is_dropped() {
        let cache = PredictionCache::default();
        let before = cache.generation();
        cache.invalidate_all();
        assert_ne!(cache.generation(), before);

        let returned = cache.put_if_current(before, "R1", payload("R1"));
        assert_eq!(returned.event_id, "R1");
        assert!(cache.is_empty());

        let current = cache.generation();
        let stored = cache.put_if_current(current, "R1", payload("R1"));
        assert!(Arc::ptr_eq(&stored, &cache.get("R1").unwrap()));
    }
}
