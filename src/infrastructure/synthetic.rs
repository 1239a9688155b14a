//! Seeded generator of settled races for tests and demo runs.
//!
//! Every competitor carries a latent ability that drives both its finishing
//! order and the market odds, so models trained on the output have signal to
//! find. One event per day, ids sort in date order.

use crate::domain::racing::{Entrant, EventSnapshot, Going, Sex, Surface};
use chrono::{Datelike, Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const VENUES: [&str; 4] = ["Northfield", "Eastbrook", "Westmoor", "Southgate"];
const DISTANCES: [u32; 5] = [1200, 1400, 1600, 2000, 2400];
const MARKET_MARGIN: f64 = 0.8;

#[derive(Debug, Clone)]
struct Competitor {
    id: String,
    ability: f64,
    trainer: usize,
    sire: usize,
    sex: Sex,
    born: i32,
    body_weight: f64,
}

pub struct SyntheticRaceGenerator {
    rng: StdRng,
    start: NaiveDate,
    competitors: Vec<Competitor>,
    jockey_skill: Vec<f64>,
}

impl SyntheticRaceGenerator {
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let jockey_skill: Vec<f64> = (0..10).map(|_| rng.random_range(-0.3..0.3)).collect();
        let competitors = (0..36)
            .map(|i| {
                // sum of uniforms: roughly bell-shaped ability
                let ability: f64 = (0..4).map(|_| rng.random_range(-0.5..0.5)).sum();
                Competitor {
                    id: format!("H{:03}", i),
                    ability,
                    trainer: rng.random_range(0..6),
                    sire: rng.random_range(0..5),
                    sex: match rng.random_range(0..3) {
                        0 => Sex::Male,
                        1 => Sex::Female,
                        _ => Sex::Gelding,
                    },
                    born: rng.random_range(2016..2021),
                    body_weight: rng.random_range(430.0..520.0),
                }
            })
            .collect();
        Self {
            rng,
            start: NaiveDate::from_ymd_opt(2023, 1, 2).unwrap_or_default(),
            competitors,
            jockey_skill,
        }
    }

    pub fn starting(mut self, start: NaiveDate) -> Self {
        self.start = start;
        self
    }

    /// `n_events` settled events with complete odds, dated one day apart.
    pub fn generate(&mut self, n_events: usize) -> Vec<EventSnapshot> {
        (0..n_events).map(|i| self.event(i)).collect()
    }

    fn event(&mut self, index: usize) -> EventSnapshot {
        let rng = &mut self.rng;
        let date = self.start + Duration::days(index as i64);
        let distance_m = DISTANCES[rng.random_range(0..DISTANCES.len())];
        let going = match rng.random_range(0..10) {
            0..=3 => Going::Good,
            4..=5 => Going::Firm,
            6..=8 => Going::Soft,
            _ => Going::Heavy,
        };
        let surface = if rng.random_bool(0.7) { Surface::Turf } else { Surface::Dirt };

        let field = rng.random_range(6..=10);
        let mut pool: Vec<usize> = (0..self.competitors.len()).collect();
        pool.shuffle(&mut *rng);
        let runners: Vec<usize> = pool.into_iter().take(field).collect();
        let jockeys: Vec<usize> = {
            let mut j: Vec<usize> = (0..self.jockey_skill.len()).collect();
            j.shuffle(&mut *rng);
            j.into_iter().take(field).collect()
        };

        let performance: Vec<f64> = runners
            .iter()
            .zip(&jockeys)
            .map(|(&c, &j)| {
                let going_penalty = if going.is_off() { rng.random_range(-0.2..0.2) } else { 0.0 };
                self.competitors[c].ability
                    + self.jockey_skill[j]
                    + going_penalty
                    + rng.random_range(-0.6..0.6)
            })
            .collect();

        // Market sees ability with its own noise.
        let market: Vec<f64> = runners
            .iter()
            .map(|&c| (2.0 * (self.competitors[c].ability + rng.random_range(-0.25..0.25))).exp())
            .collect();
        let market_total: f64 = market.iter().sum();
        let odds: Vec<f64> = market
            .iter()
            .map(|m| {
                let implied = m / market_total;
                ((MARKET_MARGIN / implied) * 10.0).round().max(11.0) / 10.0
            })
            .collect();

        let mut finish_order: Vec<usize> = (0..field).collect();
        finish_order.sort_by(|&a, &b| {
            performance[b]
                .partial_cmp(&performance[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut positions = vec![0u8; field];
        for (place, &slot) in finish_order.iter().enumerate() {
            positions[slot] = place as u8 + 1;
        }
        let mut by_odds: Vec<usize> = (0..field).collect();
        by_odds.sort_by(|&a, &b| odds[a].partial_cmp(&odds[b]).unwrap_or(std::cmp::Ordering::Equal));
        let mut popularity = vec![0u8; field];
        for (rank, &slot) in by_odds.iter().enumerate() {
            popularity[slot] = rank as u8 + 1;
        }

        let base_time = distance_m as f64 / 16.5;
        let entrants = (0..field)
            .map(|slot| {
                let competitor = &self.competitors[runners[slot]];
                let pos = positions[slot];
                let early = (pos as i32 + rng.random_range(-3..=3)).clamp(1, field as i32);
                let mid = ((early + pos as i32) / 2).max(1);
                let weight_change = rng.random_range(-8..=8) as f64;
                Entrant {
                    competitor_id: competitor.id.clone(),
                    name: Some(format!("Runner {}", competitor.id)),
                    gate: slot as u8 + 1,
                    jockey_id: Some(format!("J{:02}", jockeys[slot])),
                    trainer_id: Some(format!("T{:02}", competitor.trainer)),
                    sire_id: Some(format!("S{:02}", competitor.sire)),
                    age: Some((date.year() - competitor.born).clamp(2, 12) as u8),
                    sex: Some(competitor.sex),
                    carried_weight: Some(rng.random_range(52.0..58.0_f64).round()),
                    body_weight: Some(competitor.body_weight + weight_change),
                    body_weight_change: Some(weight_change),
                    odds: Some(odds[slot]),
                    popularity: Some(popularity[slot]),
                    finish_position: Some(pos),
                    running_positions: Some(format!("{}-{}-{}", early, mid, pos)),
                    final_split_secs: Some(36.0 - performance[slot] + rng.random_range(-0.3..0.3)),
                    finish_time_secs: Some(base_time - performance[slot] + pos as f64 * 0.1),
                }
            })
            .collect();

        EventSnapshot {
            event_id: format!("E{:05}", index),
            date,
            venue: VENUES[index % VENUES.len()].to_string(),
            distance_m,
            surface,
            going,
            entrants,
        }
    }
}
