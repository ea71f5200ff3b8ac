//! The periodic sweep: settle everything past its deadline, reprice the rest,
//! then push one consistent snapshot to every observer.

use super::events::{Notice, Outbound};
use super::pricing::token_price;
use super::settlement::settle;
use super::state::{GameState, Timestamp};
use crate::logging::{log, obj, v_num, Level};

/// One complete pass over all open SPS. Runs on the engine task, so the pass
/// can never overlap itself or interleave with actions.
pub fn run_tick(state: &mut GameState, now: Timestamp) -> Vec<Outbound> {
    let mut out = Vec::new();
    let open = state.open_sps_ids();
    let swept = open.len();
    for id in open {
        let deadline_hit = match state.sps(id) {
            Some(sps) => now >= sps.deadline,
            None => continue,
        };
        if deadline_hit {
            // Deadline settles unconditionally; milestones mid-review count
            // as incomplete.
            settle(state, id, now, &mut out);
        } else {
            let price = match state.sps(id) {
                Some(sps) => token_price(sps, state, now),
                None => continue,
            };
            // The formula overwrites wholesale; any slippage since the last
            // tick is discarded here.
            state.set_price(id, price, now);
        }
    }
    out.push(Outbound::all(snapshot(state, now)));
    log(
        Level::Debug,
        "tick",
        obj(&[("swept", v_num(swept as f64))]),
    );
    out
}

/// A consistent view of every SPS and market, taken between mutations.
pub fn snapshot(state: &GameState, now: Timestamp) -> Notice {
    Notice::StateSnapshot {
        sps: state.all_sps().cloned().collect(),
        markets: state.markets().clone(),
        timestamp: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::state::{SessionId, SpsStatus};

    #[test]
    fn reprices_open_sps_and_snapshots() {
        let mut state = GameState::new(Config::default());
        state.add_participant(SessionId(1), "creator");
        let id = state.create_sps(SessionId(1), "t", "", 100.0, &["a".to_string()], 3600, 0);
        // Trade-shaped distortion, overwritten by the sweep.
        state.set_price(id, 55.5, 10);

        let out = run_tick(&mut state, 1_000);
        assert_eq!(state.sps(id).unwrap().token.price, 10.0);
        assert!(matches!(
            out.last().unwrap().notice,
            Notice::StateSnapshot { .. }
        ));
        // creation + distortion + tick recompute
        assert_eq!(state.market(id).unwrap().history.len(), 3);
    }

    #[test]
    fn deadline_settles_even_mid_review() {
        let mut state = GameState::new(Config::default());
        state.add_participant(SessionId(1), "creator");
        let id = state.create_sps(SessionId(1), "t", "", 100.0, &["a".to_string()], 10, 0);
        state.sps_mut(id).unwrap().milestones[0].status =
            crate::engine::state::MilestoneStatus::Review;

        let out = run_tick(&mut state, 10_000);
        assert_eq!(state.sps(id).unwrap().status, SpsStatus::Settled);
        assert_eq!(state.sps(id).unwrap().token.price, 0.1);
        assert!(matches!(
            out.last().unwrap().notice,
            Notice::StateSnapshot { .. }
        ));
    }

    #[test]
    fn settled_sps_is_left_alone() {
        let mut state = GameState::new(Config::default());
        state.add_participant(SessionId(1), "creator");
        let id = state.create_sps(SessionId(1), "t", "", 100.0, &[], 10, 0);
        run_tick(&mut state, 10_000);
        let history_len = state.market(id).unwrap().history.len();

        run_tick(&mut state, 11_000);
        assert_eq!(
            state.market(id).unwrap().history.len(),
            history_len,
            "no price writes after settlement"
        );
    }
}
