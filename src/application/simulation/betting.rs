//! EV gating and settlement of simulated win and pair bets for one event.

use crate::domain::ml::{EntrantPrediction, EventPrediction};
use crate::domain::racing::EventSnapshot;
use crate::domain::simulation::{BetType, BettingPolicy, PlacedBet};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::collections::HashMap;

/// Floor for `1 - p` in the pair probability approximation.
const PAIR_DENOM_EPS: f64 = 1e-9;

/// Approximate probability that two entrants fill the top two, in either order.
///
/// `p1·p2/(1−p1)` reads as "1 wins, then 2 beats the rest"; the mirrored term is
/// added and the sum clipped at 1.
pub fn pair_probability(p1: f64, p2: f64) -> f64 {
    let first_then_second = p1 * (p2 / (1.0 - p1).max(PAIR_DENOM_EPS));
    let second_then_first = p2 * (p1 / (1.0 - p2).max(PAIR_DENOM_EPS));
    (first_then_second + second_then_first).min(1.0)
}

/// Combined pair odds heuristic: `odds1 × odds2 / divisor`.
pub fn pair_odds(o1: f64, o2: f64, divisor: f64) -> f64 {
    o1 * o2 / divisor
}

fn payout(stake: Decimal, odds: f64, hit: bool) -> Decimal {
    if !hit {
        return Decimal::ZERO;
    }
    Decimal::from_f64(odds)
        .map(|o| (stake * o).round_dp(2))
        .unwrap_or(Decimal::ZERO)
}

/// All bets the policy places on one settled event.
///
/// Predictions without odds are never bet on.
pub fn evaluate_event(
    event: &EventSnapshot,
    prediction: &EventPrediction,
    policy: &BettingPolicy,
) -> Vec<PlacedBet> {
    let finishes: HashMap<&str, u8> = event
        .entrants
        .iter()
        .filter_map(|e| e.finish_position.map(|p| (e.competitor_id.as_str(), p)))
        .collect();
    let finish = |id: &str| finishes.get(id).copied();

    let mut bets = Vec::new();
    if policy.win_bets {
        for entrant in &prediction.entrants {
            let Some(odds) = entrant.odds else { continue };
            let ev = entrant.probability * odds;
            if !policy.qualifies(entrant.probability, ev) {
                continue;
            }
            let hit = finish(&entrant.competitor_id) == Some(1);
            bets.push(PlacedBet {
                event_id: event.event_id.clone(),
                bet_type: BetType::Win,
                selections: vec![entrant.competitor_id.clone()],
                probability: entrant.probability,
                odds,
                expected_value: ev,
                stake: policy.stake,
                payout: payout(policy.stake, odds, hit),
                hit,
            });
        }
    }

    if policy.pair_bets {
        let top: Vec<&EntrantPrediction> = prediction
            .ranked()
            .into_iter()
            .take(policy.pair_top_k)
            .collect();
        for (i, a) in top.iter().enumerate() {
            for b in &top[i + 1..] {
                let (Some(oa), Some(ob)) = (a.odds, b.odds) else { continue };
                let probability = pair_probability(a.probability, b.probability);
                let odds = pair_odds(oa, ob, policy.pair_odds_divisor);
                let ev = probability * odds;
                if !policy.qualifies(probability, ev) {
                    continue;
                }
                let in_top_two = |id: &str| finish(id).is_some_and(|p| p <= 2);
                let hit = in_top_two(&a.competitor_id) && in_top_two(&b.competitor_id);
                bets.push(PlacedBet {
                    event_id: event.event_id.clone(),
                    bet_type: BetType::Pair,
                    selections: vec![a.competitor_id.clone(), b.competitor_id.clone()],
                    probability,
                    odds,
                    expected_value: ev,
                    stake: policy.stake,
                    payout: payout(policy.stake, odds, hit),
                    hit,
                });
            }
        }
    }
    bets
}
