//! In-memory race data source
//!
//! Thread-safe via `Arc<RwLock>`; history rows are derived on demand from the
//! settled events it holds. Used by tests, the synthetic demo mode and the
//! CSV-backed operator binaries.

use crate::domain::ports::RaceDataSource;
use crate::domain::racing::{EventSnapshot, HandlerRole, HistoricalRecord};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct InMemoryRaceRepository {
    events: Arc<RwLock<Vec<EventSnapshot>>>,
}

impl InMemoryRaceRepository {
    pub fn new() -> Self {
        Self::from_events(Vec::new())
    }

    pub fn from_events(events: Vec<EventSnapshot>) -> Self {
        Self {
            events: Arc::new(RwLock::new(events)),
        }
    }

    /// Inserts or replaces an event by id.
    pub async fn upsert(&self, event: EventSnapshot) {
        let mut events = self.events.write().await;
        match events.iter_mut().find(|e| e.event_id == event.event_id) {
            Some(existing) => *existing = event,
            None => events.push(event),
        }
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    async fn history_where(
        &self,
        before: NaiveDate,
        keep: impl Fn(&HistoricalRecord) -> bool,
    ) -> Vec<HistoricalRecord> {
        let events = self.events.read().await;
        events
            .iter()
            .filter(|e| e.date < before && e.is_settled())
            .flat_map(|e| e.to_history())
            .filter(|r| keep(r))
            .collect()
    }
}

impl Default for InMemoryRaceRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RaceDataSource for InMemoryRaceRepository {
    async fn event(&self, event_id: &str) -> Result<Option<EventSnapshot>> {
        let events = self.events.read().await;
        Ok(events.iter().find(|e| e.event_id == event_id).cloned())
    }

    async fn settled_events(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<EventSnapshot>> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|e| e.date >= from && e.date <= to && e.is_settled())
            .cloned()
            .collect())
    }

    async fn competitor_history(
        &self,
        competitor_ids: &[String],
        before: NaiveDate,
    ) -> Result<Vec<HistoricalRecord>> {
        let wanted: HashSet<&str> = competitor_ids.iter().map(String::as_str).collect();
        Ok(self
            .history_where(before, |r| wanted.contains(r.competitor_id.as_str()))
            .await)
    }

    async fn handler_history(
        &self,
        role: HandlerRole,
        handler_ids: &[String],
        before: NaiveDate,
    ) -> Result<Vec<HistoricalRecord>> {
        let wanted: HashSet<&str> = handler_ids.iter().map(String::as_str).collect();
        Ok(self
            .history_where(before, |r| r.handler(role).is_some_and(|h| wanted.contains(h)))
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::racing::Entrant;

    fn event(id: &str, day: u32, settled: bool) -> EventSnapshot {
        EventSnapshot {
            event_id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            entrants: ["a", "b"]
                .iter()
                .enumerate()
                .map(|(i, c)| Entrant {
                    competitor_id: c.to_string(),
                    jockey_id: Some(format!("j{}", i)),
                    finish_position: settled.then_some(i as u8 + 1),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_history_is_strictly_before() {
        let repo = InMemoryRaceRepository::from_events(vec![
            event("R1", 1, true),
            event("R2", 5, true),
            event("R3", 9, false),
        ]);
        let day5 = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();

        let rows = repo.competitor_history(&["a".to_string()], day5).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_id, "R1");

        let rows = repo
            .handler_history(HandlerRole::Jockey, &["j1".to_string()], day5.succ_opt().unwrap())
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.competitor_id == "b"));
    }

    #[tokio::test]
    async fn test_settled_events_range_is_inclusive() {
        let repo = InMemoryRaceRepository::from_events(vec![
            event("R1", 1, true),
            event("R2", 5, true),
            event("R3", 9, false),
        ]);
        let from = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let settled = repo.settled_events(from, to).await.unwrap();
        assert_eq!(settled.len(), 2);

        assert!(repo.event("R3").await.unwrap().is_some());
        repo.upsert(event("R3", 9, true)).await;
        assert_eq!(repo.settled_events(from, to).await.unwrap().len(), 3);
        assert_eq!(repo.len().await, 3);
    }
}
