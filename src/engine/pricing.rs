//! Token pricing: the deterministic formula the tick overwrites with, and the
//! linear slippage trades apply in between.
//!
//! The two paths deliberately coexist. A trade moves the price immediately;
//! the next tick recomputes from the formula and discards the slippage. The
//! tick wins on its firing boundary.

use std::collections::BTreeSet;

use super::state::{GameState, Sps, Timestamp};

/// Price bonus per completed milestone.
pub const MILESTONE_BONUS: f64 = 25.0;
/// Weight of the assigned doers' average reputation.
pub const REPUTATION_WEIGHT: f64 = 1.5;
/// Window before the deadline in which an unfinished SPS trades at a discount.
pub const CRUNCH_WINDOW_MS: u64 = 60_000;
pub const CRUNCH_FACTOR: f64 = 0.5;
/// Immediate price impact per traded unit.
pub const SLIPPAGE_PER_UNIT: f64 = 0.1;

/// Formula-driven token price for an open SPS. Stateless: reads only the SPS,
/// the roster, and the passed-in clock.
pub fn token_price(sps: &Sps, state: &GameState, now: Timestamp) -> f64 {
    let completed = sps.completed_count();
    let total = sps.milestones.len();

    // Distinct doers only; a participant holding two milestones counts once.
    // Assignees that have since disconnected are skipped.
    let doers: BTreeSet<_> = sps
        .milestones
        .iter()
        .filter_map(|m| m.assigned_to)
        .collect();
    let reps: Vec<i64> = doers
        .iter()
        .filter_map(|id| state.participant(*id))
        .map(|p| p.reputation)
        .collect();
    let avg_rep = if reps.is_empty() {
        0.0
    } else {
        reps.iter().sum::<i64>() as f64 / reps.len() as f64
    };

    let mut price = state.config.base_token_price
        + MILESTONE_BONUS * completed as f64
        + REPUTATION_WEIGHT * avg_rep;

    // Time crunch: near the deadline with work outstanding, the market panics.
    if sps.deadline.saturating_sub(now) < CRUNCH_WINDOW_MS && completed < total {
        price *= CRUNCH_FACTOR;
    }

    round2(price.max(state.config.min_token_price))
}

pub fn buy_impact(price: f64, amount: u32) -> f64 {
    price + SLIPPAGE_PER_UNIT * amount as f64
}

pub fn sell_impact(price: f64, amount: u32) -> f64 {
    price - SLIPPAGE_PER_UNIT * amount as f64
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
