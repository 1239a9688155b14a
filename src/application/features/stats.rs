//! Pure statistics over a competitor's or handler's settled history.
//!
//! Every function expects rows already restricted to the temporal cutoff and
//! sorted oldest first; none of them look at dates other than for recency.

use crate::domain::ml::feature_registry::{
    AptitudeFeatures, FormFeatures, HandlerFeatures, PaceFeatures, PopularityFeatures,
    RunningStyleFeatures,
};
use crate::domain::ml::Measured;
use crate::domain::racing::{EventSnapshot, HistoricalRecord};
use chrono::{Duration, NaiveDate};

/// Distance window (metres) for distance aptitude.
pub const DISTANCE_BAND_M: u32 = 200;
/// Popularity rank at or below which a runner counts as a favourite.
pub const FAVOURITE_MAX_POPULARITY: u8 = 3;
/// Popularity rank at or above which a runner counts as a longshot.
pub const LONGSHOT_MIN_POPULARITY: u8 = 6;
/// Leaderboard window for a handler's recent wins.
pub const RECENT_WINDOW_DAYS: i64 = 365;

fn rate<F>(rows: &[&HistoricalRecord], pred: F) -> Measured
where
    F: Fn(&HistoricalRecord) -> bool,
{
    Measured::ratio(rows.iter().filter(|r| pred(**r)).count(), rows.len())
}

fn avg_finish_last(history: &[HistoricalRecord], n: usize) -> Measured {
    Measured::mean(
        history
            .iter()
            .rev()
            .take(n)
            .map(|r| r.finish_position as f64),
    )
}

pub fn form(history: &[HistoricalRecord], cutoff: NaiveDate) -> FormFeatures {
    let all: Vec<&HistoricalRecord> = history.iter().collect();
    FormFeatures {
        avg_finish_last_3: avg_finish_last(history, 3),
        avg_finish_last_5: avg_finish_last(history, 5),
        avg_finish_last_10: avg_finish_last(history, 10),
        avg_finish_all: avg_finish_last(history, usize::MAX),
        best_finish: Measured::from_option(
            history.iter().map(|r| r.finish_position as f64).reduce(f64::min),
        ),
        last_finish: Measured::from_option(history.last().map(|r| r.finish_position as f64)),
        win_rate: rate(&all, HistoricalRecord::won),
        place_rate: rate(&all, HistoricalRecord::placed),
        show_rate: rate(&all, HistoricalRecord::showed),
        starts: Measured::Observed(history.len() as f64),
        days_since_last: Measured::from_option(
            history.last().map(|r| (cutoff - r.date).num_days() as f64),
        ),
    }
}

pub fn aptitude(history: &[HistoricalRecord], event: &EventSnapshot) -> AptitudeFeatures {
    let venue: Vec<&HistoricalRecord> = history.iter().filter(|r| r.venue == event.venue).collect();
    let distance: Vec<&HistoricalRecord> = history
        .iter()
        .filter(|r| r.distance_m.abs_diff(event.distance_m) <= DISTANCE_BAND_M)
        .collect();
    let surface: Vec<&HistoricalRecord> =
        history.iter().filter(|r| r.surface == event.surface).collect();
    let going: Vec<&HistoricalRecord> = history.iter().filter(|r| r.going == event.going).collect();

    AptitudeFeatures {
        venue_win_rate: rate(&venue, HistoricalRecord::won),
        venue_place_rate: rate(&venue, HistoricalRecord::placed),
        venue_starts: Measured::Observed(venue.len() as f64),
        distance_win_rate: rate(&distance, HistoricalRecord::won),
        distance_place_rate: rate(&distance, HistoricalRecord::placed),
        surface_win_rate: rate(&surface, HistoricalRecord::won),
        surface_place_rate: rate(&surface, HistoricalRecord::placed),
        going_place_rate: rate(&going, HistoricalRecord::placed),
    }
}

/// Parses call-point positions such as `"5-4-2-1"`; `None` on any malformed token.
pub fn parse_positions(raw: &str) -> Option<Vec<u8>> {
    let positions: Option<Vec<u8>> = raw
        .split(['-', ' '])
        .filter(|t| !t.is_empty())
        .map(|t| t.parse::<u8>().ok().filter(|p| *p > 0))
        .collect();
    positions.filter(|p| !p.is_empty())
}

pub fn running_style(history: &[HistoricalRecord]) -> RunningStyleFeatures {
    let mut early_ratios = Vec::new();
    let mut gains = Vec::new();
    let mut front = 0usize;
    let mut closers = 0usize;

    for record in history {
        let Some(positions) = record.running_positions.as_deref().and_then(parse_positions) else {
            continue;
        };
        let first_call = positions[0];
        let field = record.field_size.max(1) as f64;
        early_ratios.push(first_call as f64 / field);
        gains.push(first_call as f64 - record.finish_position as f64);
        if first_call <= 2 {
            front += 1;
        }
        if first_call as f64 > field / 2.0 && record.showed() {
            closers += 1;
        }
    }

    let parsed = early_ratios.len();
    RunningStyleFeatures {
        early_position_ratio: Measured::mean(early_ratios),
        late_gain: Measured::mean(gains),
        front_runner_rate: Measured::ratio(front, parsed),
        closer_rate: Measured::ratio(closers, parsed),
    }
}

pub fn pace(history: &[HistoricalRecord]) -> PaceFeatures {
    let splits: Vec<f64> = history
        .iter()
        .filter_map(|r| r.final_split_secs)
        .filter(|s| s.is_finite() && *s > 0.0)
        .collect();
    let speeds = history.iter().filter_map(|r| {
        r.finish_time_secs
            .filter(|t| t.is_finite() && *t > 0.0)
            .map(|t| r.distance_m as f64 / t)
    });

    PaceFeatures {
        avg_final_split: Measured::mean(splits.iter().copied()),
        best_final_split: Measured::from_option(splits.iter().copied().reduce(f64::min)),
        avg_speed_mps: Measured::mean(speeds),
    }
}

pub fn popularity(history: &[HistoricalRecord]) -> PopularityFeatures {
    let favourites: Vec<&HistoricalRecord> = history
        .iter()
        .filter(|r| r.popularity.is_some_and(|p| p <= FAVOURITE_MAX_POPULARITY))
        .collect();
    let longshots: Vec<&HistoricalRecord> = history
        .iter()
        .filter(|r| r.popularity.is_some_and(|p| p >= LONGSHOT_MIN_POPULARITY))
        .collect();
    let with_popularity = || history.iter().filter_map(|r| r.popularity.map(|p| (p, r)));

    PopularityFeatures {
        favourite_win_rate: rate(&favourites, HistoricalRecord::won),
        favourite_runs: Measured::Observed(favourites.len() as f64),
        longshot_show_rate: rate(&longshots, HistoricalRecord::showed),
        avg_popularity: Measured::mean(with_popularity().map(|(p, _)| p as f64)),
        outperformance: Measured::mean(
            with_popularity().map(|(p, r)| p as f64 - r.finish_position as f64),
        ),
    }
}

/// Leaderboard statistics for one handler from its settled rides before `cutoff`.
pub fn handler(records: &[HistoricalRecord], cutoff: NaiveDate) -> HandlerFeatures {
    let all: Vec<&HistoricalRecord> = records.iter().collect();
    let window_start = cutoff - Duration::days(RECENT_WINDOW_DAYS);
    let recent_wins = records
        .iter()
        .filter(|r| r.date >= window_start && r.won())
        .count();

    HandlerFeatures {
        win_rate: rate(&all, HistoricalRecord::won),
        place_rate: rate(&all, HistoricalRecord::placed),
        show_rate: rate(&all, HistoricalRecord::showed),
        starts: Measured::Observed(records.len() as f64),
        recent_wins: Measured::Observed(recent_wins as f64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::racing::{Going, Surface};

    fn run(date: (i32, u32, u32), pos: u8) -> HistoricalRecord {
        HistoricalRecord {
            competitor_id: "h1".to_string(),
            event_id: format!("e-{}-{}", date.1, date.2),
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            venue: "york".to_string(),
            distance_m: 1400,
            surface: Surface::Turf,
            going: Going::Good,
            field_size: 10,
            jockey_id: None,
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

    #[test]
    fn test_form_windows_use_most_recent_runs() {
        let history = vec![
            run((2024, 1, 1), 9),
            run((2024, 2, 1), 1),
            run((2024, 3, 1), 2),
            run((2024, 4, 1), 3),
        ];
        let cutoff = NaiveDate::from_ymd_opt(2024, 4, 11).unwrap();
        let f = form(&history, cutoff);
        assert_eq!(f.avg_finish_last_3.value(), 2.0);
        assert_eq!(f.avg_finish_all.value(), 3.75);
        assert_eq!(f.best_finish.value(), 1.0);
        assert_eq!(f.last_finish.value(), 3.0);
        assert_eq!(f.win_rate.value(), 0.25);
        assert_eq!(f.show_rate.value(), 0.75);
        assert_eq!(f.days_since_last.value(), 10.0);
    }

    #[test]
    fn test_empty_history_is_missing() {
        let cutoff = NaiveDate::from_ymd_opt(2024, 4, 11).unwrap();
        let f = form(&[], cutoff);
        assert!(f.avg_finish_last_3.is_missing());
        assert!(f.days_since_last.is_missing());
        assert_eq!(f.starts.value(), 0.0);
        assert!(running_style(&[]).late_gain.is_missing());
        assert!(pace(&[]).avg_final_split.is_missing());
    }

    #[test]
    fn test_parse_positions() {
        assert_eq!(parse_positions("5-4-2-1"), Some(vec![5, 4, 2, 1]));
        assert_eq!(parse_positions("3 3 1"), Some(vec![3, 3, 1]));
        assert_eq!(parse_positions("x-1"), None);
        assert_eq!(parse_positions(""), None);
    }

    #[test]
    fn test_running_style_closer() {
        let mut r = run((2024, 1, 1), 2);
        r.running_positions = Some("8-7-4-2".to_string());
        let style = running_style(&[r]);
        assert_eq!(style.early_position_ratio.value(), 0.8);
        assert_eq!(style.late_gain.value(), 6.0);
        assert_eq!(style.closer_rate.value(), 1.0);
        assert_eq!(style.front_runner_rate.value(), 0.0);
    }

    #[test]
    fn test_handler_recent_wins_window() {
        let records = vec![run((2022, 1, 1), 1), run((2024, 1, 1), 1), run((2024, 2, 1), 5)];
        let cutoff = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let h = handler(&records, cutoff);
        assert_eq!(h.recent_wins.value(), 1.0);
        assert_eq!(h.starts.value(), 3.0);
        assert!((h.win_rate.value() - 2.0 / 3.0).abs() < 1e-12);
    }
}
