use super::history_index::{HistoryIndex, sort_history, strictly_before};
use super::stats;
use crate::domain::errors::PipelineResult;
use crate::domain::ml::feature_registry::{
    ConditionFeatures, FeatureVector, HANDLER_ROLES, IdentityFeatures, MarketFeatures,
    PhysicalFeatures, SeasonalFeatures,
};
use crate::domain::ml::Measured;
use crate::domain::ports::RaceDataSource;
use crate::domain::racing::{Entrant, EventSnapshot, HandlerRole, HistoricalRecord};
use chrono::{Datelike, NaiveDate};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::f64::consts::PI;
use std::sync::Arc;
use tracing::{debug, info};

/// Turns events into schema-ordered feature rows, one per entrant.
///
/// A preloaded extractor answers history queries from an in-memory index built
/// once per batch; anything the index does not cover falls back to a direct
/// query against the data source. Both paths apply the same strict cutoff and the
/// same ordering, so they produce identical rows. Create a fresh extractor for
/// every batch: the index is never refreshed.
pub struct FeatureExtractor {
    source: Arc<dyn RaceDataSource>,
    index: Option<HistoryIndex>,
}

impl FeatureExtractor {
    /// Extractor without a preload; every history lookup goes to the data source.
    pub fn new(source: Arc<dyn RaceDataSource>) -> Self {
        Self {
            source,
            index: None,
        }
    }

    /// Bulk-loads all history for the competitors and handlers in `events`,
    /// bounded by `max_date` (exclusive).
    pub async fn preloaded(
        source: Arc<dyn RaceDataSource>,
        events: &[EventSnapshot],
        max_date: NaiveDate,
    ) -> PipelineResult<Self> {
        let competitor_ids: Vec<String> = events
            .iter()
            .flat_map(|e| e.competitor_ids())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut index = HistoryIndex::new(max_date);
        let records = source.competitor_history(&competitor_ids, max_date).await?;
        index.load_competitors(&competitor_ids, records);

        for role in HANDLER_ROLES {
            let handler_ids: Vec<String> = events
                .iter()
                .flat_map(|e| e.entrants.iter().filter_map(|en| en.handler(role)))
                .map(str::to_string)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            if handler_ids.is_empty() {
                continue;
            }
            let records = source.handler_history(role, &handler_ids, max_date).await?;
            index.load_handlers(role, &handler_ids, records);
        }

        info!(
            "FeatureExtractor: preloaded {} history rows for {} competitors (max date {})",
            index.record_count(),
            index.competitor_count(),
            max_date
        );

        Ok(Self {
            source,
            index: Some(index),
        })
    }

    pub fn is_preloaded(&self) -> bool {
        self.index.is_some()
    }

    /// One feature vector per entrant, in entrant order.
    ///
    /// `cutoff` defaults to the event date and is never allowed past it. An event
    /// without entrants yields an empty vector.
    pub async fn extract(
        &self,
        event: &EventSnapshot,
        cutoff: Option<NaiveDate>,
    ) -> PipelineResult<Vec<FeatureVector>> {
        if event.entrants.is_empty() {
            debug!("FeatureExtractor: event {} has no entrants", event.event_id);
            return Ok(Vec::new());
        }
        let cutoff = cutoff.map_or(event.date, |c| c.min(event.date));

        let mut rows = Vec::with_capacity(event.entrants.len());
        for entrant in &event.entrants {
            rows.push(self.extract_entrant(event, entrant, cutoff).await?);
        }
        Ok(rows)
    }

    /// Schema-ordered numeric rows for an event.
    pub async fn extract_rows(
        &self,
        event: &EventSnapshot,
        cutoff: Option<NaiveDate>,
    ) -> PipelineResult<Vec<Vec<f64>>> {
        Ok(self
            .extract(event, cutoff)
            .await?
            .iter()
            .map(FeatureVector::to_row)
            .collect())
    }

    async fn extract_entrant(
        &self,
        event: &EventSnapshot,
        entrant: &Entrant,
        cutoff: NaiveDate,
    ) -> PipelineResult<FeatureVector> {
        let history = self.competitor_history(&entrant.competitor_id, cutoff).await?;

        let mut fv = FeatureVector {
            competitor_id: entrant.competitor_id.clone(),
            identity: identity(event, entrant),
            conditions: conditions(event),
            physical: physical(entrant),
            market: market(entrant),
            form: stats::form(&history, cutoff),
            aptitude: stats::aptitude(&history, event),
            style: stats::running_style(&history),
            seasonal: seasonal(event.date),
            pace: stats::pace(&history),
            popularity: stats::popularity(&history),
            ..Default::default()
        };

        for role in HANDLER_ROLES {
            if let Some(handler_id) = entrant.handler(role) {
                let records = self.handler_history(role, handler_id, cutoff).await?;
                *fv.handler_mut(role) = stats::handler(&records, cutoff);
            }
        }
        Ok(fv)
    }

    async fn competitor_history(
        &self,
        competitor_id: &str,
        cutoff: NaiveDate,
    ) -> PipelineResult<Cow<'_, [HistoricalRecord]>> {
        if let Some(rows) = self
            .index
            .as_ref()
            .and_then(|index| index.competitor_before(competitor_id, cutoff))
        {
            return Ok(Cow::Borrowed(rows));
        }
        let ids = [competitor_id.to_string()];
        let fetched = self.source.competitor_history(&ids, cutoff).await?;
        Ok(Cow::Owned(direct_rows(fetched, cutoff, |r| {
            r.competitor_id == competitor_id
        })))
    }

    async fn handler_history(
        &self,
        role: HandlerRole,
        handler_id: &str,
        cutoff: NaiveDate,
    ) -> PipelineResult<Cow<'_, [HistoricalRecord]>> {
        if let Some(rows) = self
            .index
            .as_ref()
            .and_then(|index| index.handler_before(role, handler_id, cutoff))
        {
            return Ok(Cow::Borrowed(rows));
        }
        let ids = [handler_id.to_string()];
        let fetched = self.source.handler_history(role, &ids, cutoff).await?;
        Ok(Cow::Owned(direct_rows(fetched, cutoff, |r| {
            r.handler(role) == Some(handler_id)
        })))
    }
}

/// Applies the index's filtering and ordering to a direct query result.
fn direct_rows<F>(mut rows: Vec<HistoricalRecord>, cutoff: NaiveDate, keep: F) -> Vec<HistoricalRecord>
where
    F: Fn(&HistoricalRecord) -> bool,
{
    rows.retain(|r| keep(r));
    sort_history(&mut rows);
    let end = strictly_before(&rows, cutoff).len();
    rows.truncate(end);
    rows
}

fn identity(event: &EventSnapshot, entrant: &Entrant) -> IdentityFeatures {
    let field = event.field_size();
    IdentityFeatures {
        gate: Measured::Observed(entrant.gate as f64),
        gate_ratio: if entrant.gate == 0 {
            Measured::Missing
        } else {
            Measured::Observed(entrant.gate as f64 / field as f64)
        },
        field_size: Measured::Observed(field as f64),
    }
}

fn conditions(event: &EventSnapshot) -> ConditionFeatures {
    ConditionFeatures {
        distance_m: Measured::Observed(event.distance_m as f64),
        surface_code: Measured::Observed(event.surface.code()),
        going_code: Measured::Observed(event.going.code()),
        off_going: Measured::Observed(if event.going.is_off() { 1.0 } else { 0.0 }),
    }
}

fn physical(entrant: &Entrant) -> PhysicalFeatures {
    PhysicalFeatures {
        age: Measured::from_option(entrant.age.map(f64::from)),
        sex_code: Measured::from_option(entrant.sex.map(|s| s.code())),
        carried_weight: Measured::from_option(entrant.carried_weight),
        body_weight: Measured::from_option(entrant.body_weight),
        body_weight_change: Measured::from_option(entrant.body_weight_change),
    }
}

fn market(entrant: &Entrant) -> MarketFeatures {
    MarketFeatures {
        odds_log: Measured::from_option(entrant.market_odds().map(f64::ln)),
        popularity: Measured::from_option(entrant.popularity.map(f64::from)),
    }
}

fn seasonal(date: NaiveDate) -> SeasonalFeatures {
    let angle = 2.0 * PI * (date.month0() as f64) / 12.0;
    SeasonalFeatures {
        month_sin: Measured::Observed(angle.sin()),
        month_cos: Measured::Observed(angle.cos()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ml::feature_registry::{column_index, feature_count};
    use crate::infrastructure::repositories::InMemoryRaceRepository;
    use crate::infrastructure::synthetic::SyntheticRaceGenerator;

    fn fixture() -> (Arc<InMemoryRaceRepository>, Vec<EventSnapshot>) {
        let events = SyntheticRaceGenerator::new(7).generate(40);
        (Arc::new(InMemoryRaceRepository::from_events(events.clone())), events)
    }

    #[tokio::test]
    async fn test_empty_event_yields_empty_rows() {
        let (repo, _) = fixture();
        let extractor = FeatureExtractor::new(repo);
        let event = EventSnapshot::default();
        assert!(extractor.extract(&event, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_preloaded_matches_direct_path() {
        let (repo, events) = fixture();
        let batch = &events[20..];
        let max_date = batch.iter().map(|e| e.date).max().unwrap();

        let direct = FeatureExtractor::new(repo.clone());
        let preloaded = FeatureExtractor::preloaded(repo.clone(), batch, max_date)
            .await
            .unwrap();
        assert!(preloaded.is_preloaded());

        for event in batch {
            let a = direct.extract_rows(event, None).await.unwrap();
            let b = preloaded.extract_rows(event, None).await.unwrap();
            assert_eq!(a, b, "paths diverged for {}", event.event_id);
            assert!(a.iter().all(|row| row.len() == feature_count()));
        }
    }

    #[tokio::test]
    async fn test_cutoff_past_preload_falls_back() {
        let (repo, events) = fixture();
        let early_max = events[10].date;
        let target = events.last().unwrap();

        let preloaded = FeatureExtractor::preloaded(repo.clone(), &events[..1], early_max)
            .await
            .unwrap();
        let direct = FeatureExtractor::new(repo);
        assert_eq!(
            preloaded.extract_rows(target, None).await.unwrap(),
            direct.extract_rows(target, None).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_cutoff_never_exceeds_event_date() {
        let (repo, events) = fixture();
        let target = &events[30];
        let extractor = FeatureExtractor::new(repo);
        let later = target.date + chrono::Duration::days(400);
        assert_eq!(
            extractor.extract_rows(target, Some(later)).await.unwrap(),
            extractor.extract_rows(target, None).await.unwrap()
        );
    }

    #[test]
    fn test_seasonal_encoding_is_cyclic() {
        let jan = seasonal(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert!((jan.month_sin.value()).abs() < 1e-12);
        assert!((jan.month_cos.value() - 1.0).abs() < 1e-12);
        let jul = seasonal(NaiveDate::from_ymd_opt(2024, 7, 15).unwrap());
        assert!((jul.month_cos.value() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_market_odds_logged() {
        let entrant = Entrant {
            odds: Some(std::f64::consts::E),
            popularity: Some(2),
            ..Default::default()
        };
        let m = market(&entrant);
        assert!((m.odds_log.value() - 1.0).abs() < 1e-12);
        assert_eq!(m.popularity.value(), 2.0);
        assert!(column_index("mkt_odds_log").is_some());
    }
}
