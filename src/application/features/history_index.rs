use crate::domain::racing::{HandlerRole, HistoricalRecord};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};

/// Canonical ordering for history rows: oldest first, ties by event id.
pub fn sort_history(records: &mut [HistoricalRecord]) {
    records.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.event_id.cmp(&b.event_id)));
}

/// Prefix of a sorted history that lies strictly before `cutoff`.
pub fn strictly_before(records: &[HistoricalRecord], cutoff: NaiveDate) -> &[HistoricalRecord] {
    let end = records.partition_point(|r| r.date < cutoff);
    &records[..end]
}

/// Read-only per-competitor and per-handler history, preloaded once per batch.
///
/// Every row is dated strictly before `max_date`, so the index can only answer
/// queries whose cutoff is at or before that date.
#[derive(Debug, Clone)]
pub struct HistoryIndex {
    max_date: NaiveDate,
    competitors: HashMap<String, Vec<HistoricalRecord>>,
    handlers: HashMap<(HandlerRole, String), Vec<HistoricalRecord>>,
    loaded_competitors: HashSet<String>,
    loaded_handlers: HashSet<(HandlerRole, String)>,
}

impl HistoryIndex {
    pub fn new(max_date: NaiveDate) -> Self {
        Self {
            max_date,
            competitors: HashMap::new(),
            handlers: HashMap::new(),
            loaded_competitors: HashSet::new(),
            loaded_handlers: HashSet::new(),
        }
    }

    pub fn max_date(&self) -> NaiveDate {
        self.max_date
    }

    /// Registers the result of one bulk competitor query.
    ///
    /// `requested` marks ids as covered even when they have no rows, so an empty
    /// history is served from the index instead of triggering a fallback lookup.
    pub fn load_competitors(&mut self, requested: &[String], records: Vec<HistoricalRecord>) {
        self.loaded_competitors.extend(requested.iter().cloned());
        for record in records {
            if record.date >= self.max_date || !self.loaded_competitors.contains(&record.competitor_id) {
                continue;
            }
            self.competitors
                .entry(record.competitor_id.clone())
                .or_default()
                .push(record);
        }
        for rows in self.competitors.values_mut() {
            sort_history(rows);
        }
    }

    pub fn load_handlers(
        &mut self,
        role: HandlerRole,
        requested: &[String],
        records: Vec<HistoricalRecord>,
    ) {
        let requested: HashSet<&str> = requested.iter().map(String::as_str).collect();
        for id in &requested {
            self.loaded_handlers.insert((role, id.to_string()));
        }
        for record in records {
            if record.date >= self.max_date {
                continue;
            }
            let Some(handler) = record.handler(role) else {
                continue;
            };
            if !requested.contains(handler) {
                continue;
            }
            self.handlers
                .entry((role, handler.to_string()))
                .or_default()
                .push(record);
        }
        for rows in self.handlers.values_mut() {
            sort_history(rows);
        }
    }

    fn covers(&self, cutoff: NaiveDate) -> bool {
        cutoff <= self.max_date
    }

    /// History of a competitor before `cutoff`, or `None` when the index cannot answer.
    pub fn competitor_before(&self, competitor_id: &str, cutoff: NaiveDate) -> Option<&[HistoricalRecord]> {
        if !self.covers(cutoff) || !self.loaded_competitors.contains(competitor_id) {
            return None;
        }
        Some(
            self.competitors
                .get(competitor_id)
                .map(|rows| strictly_before(rows, cutoff))
                .unwrap_or(&[]),
        )
    }

    pub fn handler_before(
        &self,
        role: HandlerRole,
        handler_id: &str,
        cutoff: NaiveDate,
    ) -> Option<&[HistoricalRecord]> {
        let key = (role, handler_id.to_string());
        if !self.covers(cutoff) || !self.loaded_handlers.contains(&key) {
            return None;
        }
        Some(
            self.handlers
                .get(&key)
                .map(|rows| strictly_before(rows, cutoff))
                .unwrap_or(&[]),
        )
    }

    pub fn competitor_count(&self) -> usize {
        self.loaded_competitors.len()
    }

    pub fn record_count(&self) -> usize {
        self.competitors.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::racing::{Going, Surface};

    fn record(id: &str, event: &str, date: NaiveDate, pos: u8) -> HistoricalRecord {
        HistoricalRecord {
            competitor_id: id.to_string(),
            event_id: event.to_string(),
            date,
            venue: "ascot".to_string(),
            distance_m: 1600,
            surface: Surface::Turf,
            going: Going::Good,
            field_size: 8,
            jockey_id: Some("j1".to_string()),
            trainer_id: None,
            sire_id: None,
            finish_position: pos,
            odds: None,
            popularity: None,
            running_positions: None,
            final_split_secs: None,
            finish_time_secs: None,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_cutoff_is_strict() {
        let mut index = HistoryIndex::new(day(20));
        index.load_competitors(
            &["h1".to_string()],
            vec![
                record("h1", "e2", day(10), 2),
                record("h1", "e1", day(5), 1),
                record("h1", "e3", day(15), 3),
            ],
        );
        let rows = index.competitor_before("h1", day(10)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_id, "e1");
        assert_eq!(index.competitor_before("h1", day(16)).unwrap().len(), 3);
    }

    #[test]
    fn test_uncovered_queries_return_none() {
        let mut index = HistoryIndex::new(day(20));
        index.load_competitors(&["h1".to_string()], vec![]);
        assert_eq!(index.competitor_before("h1", day(12)).unwrap().len(), 0);
        assert!(index.competitor_before("h2", day(12)).is_none());
        assert!(index.competitor_before("h1", day(21)).is_none());
    }

    #[test]
    fn test_rows_at_or_after_max_date_are_dropped() {
        let mut index = HistoryIndex::new(day(20));
        index.load_competitors(
            &["h1".to_string()],
            vec![record("h1", "e1", day(19), 1), record("h1", "e2", day(20), 1)],
        );
        assert_eq!(index.record_count(), 1);
    }

    #[test]
    fn test_handler_rows_grouped_by_role() {
        let mut index = HistoryIndex::new(day(20));
        index.load_handlers(
            HandlerRole::Jockey,
            &["j1".to_string()],
            vec![record("h1", "e1", day(3), 1), record("h2", "e1", day(3), 4)],
        );
        assert_eq!(index.handler_before(HandlerRole::Jockey, "j1", day(4)).unwrap().len(), 2);
        assert!(index.handler_before(HandlerRole::Trainer, "j1", day(4)).is_none());
    }
}
