//! CSV import/export of events, one row per entrant.

use crate::domain::racing::{Entrant, EventSnapshot, Going, Sex, Surface};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::info;

/// Flat per-entrant record; event columns repeat on every row of the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrantRow {
    pub event_id: String,
    pub date: NaiveDate,
    pub venue: String,
    pub distance_m: u32,
    pub surface: Surface,
    pub going: Going,
    pub competitor_id: String,
    pub name: Option<String>,
    pub gate: u8,
    pub jockey_id: Option<String>,
    pub trainer_id: Option<String>,
    pub sire_id: Option<String>,
    pub age: Option<u8>,
    pub sex: Option<Sex>,
    pub carried_weight: Option<f64>,
    pub body_weight: Option<f64>,
    pub body_weight_change: Option<f64>,
    pub odds: Option<f64>,
    pub popularity: Option<u8>,
    pub finish_position: Option<u8>,
    pub running_positions: Option<String>,
    pub final_split_secs: Option<f64>,
    pub finish_time_secs: Option<f64>,
}

impl EntrantRow {
    fn from_parts(event: &EventSnapshot, e: &Entrant) -> Self {
        Self {
            event_id: event.event_id.clone(),
            date: event.date,
            venue: event.venue.clone(),
            distance_m: event.distance_m,
            surface: event.surface,
            going: event.going,
            competitor_id: e.competitor_id.clone(),
            name: e.name.clone(),
            gate: e.gate,
            jockey_id: e.jockey_id.clone(),
            trainer_id: e.trainer_id.clone(),
            sire_id: e.sire_id.clone(),
            age: e.age,
            sex: e.sex,
            carried_weight: e.carried_weight,
            body_weight: e.body_weight,
            body_weight_change: e.body_weight_change,
            odds: e.odds,
            popularity: e.popularity,
            finish_position: e.finish_position,
            running_positions: e.running_positions.clone(),
            final_split_secs: e.final_split_secs,
            finish_time_secs: e.finish_time_secs,
        }
    }

    fn into_entrant(self) -> Entrant {
        Entrant {
            competitor_id: self.competitor_id,
            name: self.name,
            gate: self.gate,
            jockey_id: self.jockey_id,
            trainer_id: self.trainer_id,
            sire_id: self.sire_id,
            age: self.age,
            sex: self.sex,
            carried_weight: self.carried_weight,
            body_weight: self.body_weight,
            body_weight_change: self.body_weight_change,
            odds: self.odds,
            popularity: self.popularity,
            finish_position: self.finish_position,
            running_positions: self.running_positions,
            final_split_secs: self.final_split_secs,
            finish_time_secs: self.finish_time_secs,
        }
    }
}

/// Groups entrant rows into events, ordered by date then id.
pub fn events_from_rows(rows: impl IntoIterator<Item = EntrantRow>) -> Vec<EventSnapshot> {
    let mut by_id: BTreeMap<String, EventSnapshot> = BTreeMap::new();
    for row in rows {
        let event = by_id
            .entry(row.event_id.clone())
            .or_insert_with(|| EventSnapshot {
                event_id: row.event_id.clone(),
                date: row.date,
                venue: row.venue.clone(),
                distance_m: row.distance_m,
                surface: row.surface,
                going: row.going,
                entrants: Vec::new(),
            });
        event.entrants.push(row.into_entrant());
    }
    let mut events: Vec<EventSnapshot> = by_id.into_values().collect();
    events.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.event_id.cmp(&b.event_id)));
    events
}

pub fn load_events(path: &Path) -> Result<Vec<EventSnapshot>> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let mut rdr = csv::Reader::from_reader(BufReader::new(file));
    let mut rows = Vec::new();
    for (line, result) in rdr.deserialize().enumerate() {
        let row: EntrantRow =
            result.with_context(|| format!("Invalid entrant row {} in {:?}", line + 1, path))?;
        rows.push(row);
    }
    let events = events_from_rows(rows);
    info!("Loaded {} events from {:?}", events.len(), path);
    Ok(events)
}

pub fn write_events(path: &Path, events: &[EventSnapshot]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    let mut wtr = csv::Writer::from_writer(BufWriter::new(file));
    for event in events {
        for entrant in &event.entrants {
            wtr.serialize(EntrantRow::from_parts(event, entrant))?;
        }
    }
    wtr.flush().context("Failed to flush CSV writer")?;
    info!("Wrote {} events to {:?}", events.len(), path);
    Ok(())
}
