//! Settlement: resolve a finished SPS into payouts and reputation changes.
//!
//! The only path that ever marks an SPS settled. Idempotent: re-invoking on a
//! settled SPS is a no-op, so the deadline sweep and the all-milestones-done
//! trigger can both call in without coordination.

use super::events::{Notice, Outbound};
use super::state::{GameState, SpsId, Timestamp};
use crate::logging::{json_log, obj, v_num, v_str};

/// Token redemption value when every milestone completed.
pub const SUCCESS_VALUE: f64 = 100.0;
/// Holding size above which a losing position costs reputation.
pub const LOSS_REP_THRESHOLD: u32 = 5;
pub const SPECULATOR_WIN_REP: i64 = 1;
pub const SPECULATOR_LOSS_REP: i64 = 1;
pub const CREATOR_SUCCESS_REP: i64 = 5;
pub const CREATOR_FAILURE_REP: i64 = 3;

/// Close out an SPS: pay every holder `qty * final_value`, clear positions,
/// adjust reputations, freeze the book. Notifies each touched participant and
/// broadcasts the settled record.
pub fn settle(state: &mut GameState, sps_id: SpsId, now: Timestamp, out: &mut Vec<Outbound>) {
    let (success, creator_id) = match state.sps(sps_id) {
        Some(sps) if sps.is_open() => (sps.all_completed(), sps.creator_id),
        _ => return, // unknown or already settled
    };
    let final_value = if success { SUCCESS_VALUE } else { 0.0 };

    let holders: Vec<_> = state
        .participants()
        .filter(|p| p.holding(sps_id) > 0)
        .map(|p| p.id)
        .collect();

    for session in holders {
        if let Some(p) = state.participant_mut(session) {
            let qty = match p.holdings.remove(&sps_id) {
                Some(q) => q,
                None => continue,
            };
            let payout = qty as f64 * final_value;
            p.balance += payout;
            if payout > 0.0 {
                p.reputation += SPECULATOR_WIN_REP;
            } else if qty > LOSS_REP_THRESHOLD {
                p.reputation -= SPECULATOR_LOSS_REP;
            }
            out.push(Outbound::to(
                session,
                Notice::ParticipantInfo {
                    participant: p.clone(),
                },
            ));
        }
    }

    if let Some(sps) = state.sps_mut(sps_id) {
        sps.status = super::state::SpsStatus::Settled;
    }
    // The floor clamp applies here too: a failed SPS reads as the floor, not 0.
    state.set_price(sps_id, final_value, now);

    if let Some(creator) = state.participant_mut(creator_id) {
        creator.reputation += if success {
            CREATOR_SUCCESS_REP
        } else {
            -CREATOR_FAILURE_REP
        };
        out.push(Outbound::to(
            creator_id,
            Notice::ParticipantInfo {
                participant: creator.clone(),
            },
        ));
    }

    if let Some(sps) = state.sps(sps_id) {
        out.push(Outbound::all(Notice::SpsUpdated { sps: sps.clone() }));
    }

    json_log(
        "settlement",
        obj(&[
            ("event", v_str("settled")),
            ("sps", v_str(&sps_id.to_string())),
            ("outcome", v_str(if success { "success" } else { "failure" })),
            ("final_value", v_num(final_value)),
        ]),
    );
}
