use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Surface {
    #[default]
    Turf,
    Dirt,
    Synthetic,
}

impl Surface {
    pub fn code(&self) -> f64 {
        match self {
            Surface::Turf => 0.0,
            Surface::Dirt => 1.0,
            Surface::Synthetic => 2.0,
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Surface::Turf => write!(f, "TURF"),
            Surface::Dirt => write!(f, "DIRT"),
            Surface::Synthetic => write!(f, "SYNTHETIC"),
        }
    }
}

/// Track condition, ordered from fastest to slowest going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Going {
    #[default]
    Firm,
    Good,
    Soft,
    Heavy,
}

impl Going {
    pub fn code(&self) -> f64 {
        match self {
            Going::Firm => 0.0,
            Going::Good => 1.0,
            Going::Soft => 2.0,
            Going::Heavy => 3.0,
        }
    }

    /// Anything slower than good counts as an off-going race.
    pub fn is_off(&self) -> bool {
        matches!(self, Going::Soft | Going::Heavy)
    }
}

impl fmt::Display for Going {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Sex {
    #[default]
    Male,
    Female,
    Gelding,
}

impl Sex {
    pub fn code(&self) -> f64 {
        match self {
            Sex::Male => 0.0,
            Sex::Female => 1.0,
            Sex::Gelding => 2.0,
        }
    }
}

/// People and bloodlines associated with a runner, each carrying its own leaderboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandlerRole {
    Jockey,
    Trainer,
    Sire,
}

impl fmt::Display for HandlerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerRole::Jockey => write!(f, "jockey"),
            HandlerRole::Trainer => write!(f, "trainer"),
            HandlerRole::Sire => write!(f, "sire"),
        }
    }
}

/// One competitor's participation in one event.
///
/// `finish_position` is only populated once the event has settled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Entrant {
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
    /// Position at each call point, e.g. `"5-4-2-1"`.
    pub running_positions: Option<String>,
    /// Time for the final sectional in seconds.
    pub final_split_secs: Option<f64>,
    pub finish_time_secs: Option<f64>,
}

impl Entrant {
    /// Market odds usable for wagering (strictly positive).
    pub fn market_odds(&self) -> Option<f64> {
        self.odds.filter(|o| o.is_finite() && *o > 0.0)
    }

    pub fn handler(&self, role: HandlerRole) -> Option<&str> {
        match role {
            HandlerRole::Jockey => self.jockey_id.as_deref(),
            HandlerRole::Trainer => self.trainer_id.as_deref(),
            HandlerRole::Sire => self.sire_id.as_deref(),
        }
    }
}

/// An event instance. Immutable once settled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EventSnapshot {
    pub event_id: String,
    pub date: NaiveDate,
    pub venue: String,
    pub distance_m: u32,
    pub surface: Surface,
    pub going: Going,
    pub entrants: Vec<Entrant>,
}

impl EventSnapshot {
    pub fn field_size(&self) -> usize {
        self.entrants.len()
    }

    /// True once every entrant carries a finishing position.
    pub fn is_settled(&self) -> bool {
        !self.entrants.is_empty() && self.entrants.iter().all(|e| e.finish_position.is_some())
    }

    /// True when every entrant has usable market odds.
    pub fn has_complete_odds(&self) -> bool {
        !self.entrants.is_empty() && self.entrants.iter().all(|e| e.market_odds().is_some())
    }

    pub fn competitor_ids(&self) -> impl Iterator<Item = &str> {
        self.entrants.iter().map(|e| e.competitor_id.as_str())
    }

    /// Converts the settled entrants into history rows for later events.
    pub fn to_history(&self) -> Vec<HistoricalRecord> {
        self.entrants
            .iter()
            .filter_map(|e| {
                let finish_position = e.finish_position?;
                Some(HistoricalRecord {
                    competitor_id: e.competitor_id.clone(),
                    event_id: self.event_id.clone(),
                    date: self.date,
                    venue: self.venue.clone(),
                    distance_m: self.distance_m,
                    surface: self.surface,
                    going: self.going,
                    field_size: self.entrants.len() as u8,
                    jockey_id: e.jockey_id.clone(),
                    trainer_id: e.trainer_id.clone(),
                    sire_id: e.sire_id.clone(),
                    finish_position,
                    odds: e.odds,
                    popularity: e.popularity,
                    running_positions: e.running_positions.clone(),
                    final_split_secs: e.final_split_secs,
                    finish_time_secs: e.finish_time_secs,
                })
            })
            .collect()
    }
}

/// A settled past run of a competitor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoricalRecord {
    pub competitor_id: String,
    pub event_id: String,
    pub date: NaiveDate,
    pub venue: String,
    pub distance_m: u32,
    pub surface: Surface,
    pub going: Going,
    pub field_size: u8,
    pub jockey_id: Option<String>,
    pub trainer_id: Option<String>,
    pub sire_id: Option<String>,
    pub finish_position: u8,
    pub odds: Option<f64>,
    pub popularity: Option<u8>,
    pub running_positions: Option<String>,
    pub final_split_secs: Option<f64>,
    pub finish_time_secs: Option<f64>,
}

impl HistoricalRecord {
    pub fn handler(&self, role: HandlerRole) -> Option<&str> {
        match role {
            HandlerRole::Jockey => self.jockey_id.as_deref(),
            HandlerRole::Trainer => self.trainer_id.as_deref(),
            HandlerRole::Sire => self.sire_id.as_deref(),
        }
    }

    pub fn won(&self) -> bool {
        self.finish_position == 1
    }

    pub fn placed(&self) -> bool {
        self.finish_position <= 2
    }

    pub fn showed(&self) -> bool {
        self.finish_position <= 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entrant(id: &str, pos: Option<u8>, odds: Option<f64>) -> Entrant {
        Entrant {
            competitor_id: id.to_string(),
            finish_position: pos,
            odds,
            ..Default::default()
        }
    }

    #[test]
    fn test_settled_and_odds_flags() {
        let mut event = EventSnapshot {
            event_id: "R1".to_string(),
            entrants: vec![entrant("a", Some(1), Some(2.0)), entrant("b", None, Some(0.0))],
            ..Default::default()
        };
        assert!(!event.is_settled());
        assert!(!event.has_complete_odds());

        event.entrants[1] = entrant("b", Some(2), Some(3.5));
        assert!(event.is_settled());
        assert!(event.has_complete_odds());
    }

    #[test]
    fn test_to_history_skips_unsettled() {
        let event = EventSnapshot {
            event_id: "R1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            entrants: vec![entrant("a", Some(1), None), entrant("b", None, None)],
            ..Default::default()
        };
        let history = event.to_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].competitor_id, "a");
        assert_eq!(history[0].field_size, 2);
        assert!(history[0].won());
    }
}
