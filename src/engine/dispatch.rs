//! Action dispatch: validate inbound participant actions against the
//! registries and apply them, emitting routed notifications.
//!
//! Invalid or stale actions are dropped without an error surfacing to the
//! client; the guards return early and leave state untouched. This is the
//! intended resilience policy against stale client views, not an oversight.

use super::events::{Action, ApprovalEffect, Notice, Outbound};
use super::pricing::{buy_impact, sell_impact};
use super::settlement::settle;
use super::state::{GameState, MilestoneStatus, SessionId, SpsId, Timestamp};
use crate::logging::{json_log, log, obj, v_num, v_str, Level};

/// Reputation granted to a doer when a milestone passes validation.
pub const MILESTONE_REP_BONUS: i64 = 2;

/// Notifications to send now, plus approval effects to fire later.
#[derive(Debug, Default)]
pub struct DispatchOutput {
    pub outbound: Vec<Outbound>,
    pub scheduled: Vec<(Timestamp, ApprovalEffect)>,
}

pub fn dispatch(
    state: &mut GameState,
    session: SessionId,
    action: Action,
    now: Timestamp,
) -> DispatchOutput {
    let mut output = DispatchOutput::default();
    match action {
        Action::Join { name } => join(state, session, &name, now, &mut output.outbound),
        Action::CreateSps {
            title,
            description,
            reward_pool,
            milestone_descriptions,
            duration_seconds,
        } => create_sps(
            state,
            session,
            &title,
            &description,
            reward_pool,
            &milestone_descriptions,
            duration_seconds,
            now,
            &mut output.outbound,
        ),
        Action::Buy { sps_id, amount } => {
            trade(state, session, sps_id, amount, Side::Buy, now, &mut output.outbound)
        }
        Action::Sell { sps_id, amount } => {
            trade(state, session, sps_id, amount, Side::Sell, now, &mut output.outbound)
        }
        Action::ClaimMilestone {
            sps_id,
            milestone_id,
        } => claim(state, session, sps_id, &milestone_id, &mut output.outbound),
        Action::SubmitMilestone {
            sps_id,
            milestone_id,
        } => submit(state, session, sps_id, milestone_id, now, &mut output),
    }
    output
}

/// A connection went away: drop the participant and refresh the roster.
pub fn handle_disconnect(state: &mut GameState, session: SessionId) -> Vec<Outbound> {
    let mut out = Vec::new();
    if state.remove_participant(session) {
        json_log(
            "session",
            obj(&[
                ("event", v_str("left")),
                ("session", v_str(&session.to_string())),
            ]),
        );
        out.push(Outbound::all(Notice::ParticipantList {
            participants: state.roster(),
        }));
    }
    out
}

/// Apply a due milestone approval. The milestone must still be in review and
/// the SPS still open; anything else means the world moved on and the effect
/// is discarded.
pub fn apply_approval(
    state: &mut GameState,
    effect: &ApprovalEffect,
    now: Timestamp,
    out: &mut Vec<Outbound>,
) {
    let (assignee, reward, all_done) = {
        let Some(sps) = state.sps_mut(effect.sps_id) else {
            return;
        };
        if !sps.is_open() {
            return;
        }
        let reward = sps.reward_pool / sps.milestones.len().max(1) as f64;
        let Some(milestone) = sps.milestone_mut(&effect.milestone_id) else {
            return;
        };
        if milestone.status != MilestoneStatus::Review {
            return; // superseded before the timer fired
        }
        milestone.status = MilestoneStatus::Completed;
        let assignee = milestone.assigned_to;
        (assignee, reward, sps.all_completed())
    };

    if let Some(doer_id) = assignee {
        // A doer that disconnected mid-review forfeits the payout; the
        // milestone still counts as completed.
        if let Some(doer) = state.participant_mut(doer_id) {
            doer.balance += reward;
            doer.reputation += MILESTONE_REP_BONUS;
            out.push(Outbound::to(
                doer_id,
                Notice::ParticipantInfo {
                    participant: doer.clone(),
                },
            ));
        }
    }

    if let Some(sps) = state.sps(effect.sps_id) {
        out.push(Outbound::all(Notice::SpsUpdated { sps: sps.clone() }));
    }
    json_log(
        "milestone",
        obj(&[
            ("event", v_str("approved")),
            ("milestone", v_str(&effect.milestone_id)),
            ("reward", v_num(reward)),
        ]),
    );

    // Every milestone done before the deadline settles the SPS right away.
    if all_done {
        settle(state, effect.sps_id, now, out);
    }
}

fn join(
    state: &mut GameState,
    session: SessionId,
    name: &str,
    now: Timestamp,
    out: &mut Vec<Outbound>,
) {
    let participant = state.add_participant(session, name);
    json_log(
        "session",
        obj(&[
            ("event", v_str("joined")),
            ("session", v_str(&session.to_string())),
            ("name", v_str(&participant.display_name)),
        ]),
    );
    out.push(Outbound::to(session, Notice::ParticipantInfo { participant }));
    out.push(Outbound::all(Notice::ParticipantList {
        participants: state.roster(),
    }));
    // The joiner gets the world as of right now; everyone else sees it on the
    // next tick anyway.
    out.push(Outbound::to(session, super::tick::snapshot(state, now)));
}

#[allow(clippy::too_many_arguments)]
fn create_sps(
    state: &mut GameState,
    session: SessionId,
    title: &str,
    description: &str,
    reward_pool: f64,
    milestone_descriptions: &[String],
    duration_seconds: u64,
    now: Timestamp,
    out: &mut Vec<Outbound>,
) {
    if state.participant(session).is_none() {
        return drop_action(session, "create_sps", "unknown participant");
    }
    if !reward_pool.is_finite() || reward_pool < 0.0 {
        return drop_action(session, "create_sps", "bad reward pool");
    }
    let id = state.create_sps(
        session,
        title,
        description,
        reward_pool,
        milestone_descriptions,
        duration_seconds,
        now,
    );
    json_log(
        "sps",
        obj(&[
            ("event", v_str("created")),
            ("sps", v_str(&id.to_string())),
            ("creator", v_str(&session.to_string())),
            ("milestones", v_num(milestone_descriptions.len() as f64)),
            ("reward_pool", v_num(reward_pool)),
        ]),
    );
    if let Some(sps) = state.sps(id) {
        out.push(Outbound::all(Notice::SpsCreated { sps: sps.clone() }));
    }
}

#[derive(Clone, Copy)]
enum Side {
    Buy,
    Sell,
}

fn trade(
    state: &mut GameState,
    session: SessionId,
    sps_id: SpsId,
    amount: u32,
    side: Side,
    now: Timestamp,
    out: &mut Vec<Outbound>,
) {
    if amount == 0 {
        return drop_action(session, "trade", "zero amount");
    }
    // Cost and revenue use the pre-slippage price; the impact lands after.
    let price = match state.sps(sps_id) {
        Some(sps) if sps.is_open() => sps.token.price,
        _ => return drop_action(session, "trade", "sps missing or settled"),
    };
    let notional = price * amount as f64;

    let Some(p) = state.participant_mut(session) else {
        return drop_action(session, "trade", "unknown participant");
    };
    match side {
        Side::Buy => {
            if p.balance < notional {
                return drop_action(session, "buy", "insufficient balance");
            }
            p.balance -= notional;
            *p.holdings.entry(sps_id).or_insert(0) += amount;
        }
        Side::Sell => {
            if p.holding(sps_id) < amount {
                return drop_action(session, "sell", "insufficient holdings");
            }
            p.balance += notional;
            let remaining = p.holding(sps_id) - amount;
            if remaining == 0 {
                p.holdings.remove(&sps_id);
            } else {
                p.holdings.insert(sps_id, remaining);
            }
        }
    }
    let info = Notice::ParticipantInfo {
        participant: p.clone(),
    };

    let impacted = match side {
        Side::Buy => buy_impact(price, amount),
        Side::Sell => sell_impact(price, amount),
    };
    let applied = state.set_price(sps_id, impacted, now);

    out.push(Outbound::to(session, info));
    out.push(Outbound::all(Notice::MarketTick {
        sps_id,
        price: applied,
    }));
}

fn claim(
    state: &mut GameState,
    session: SessionId,
    sps_id: SpsId,
    milestone_id: &str,
    out: &mut Vec<Outbound>,
) {
    if state.participant(session).is_none() {
        return drop_action(session, "claim", "unknown participant");
    }
    let Some(sps) = state.sps_mut(sps_id) else {
        return drop_action(session, "claim", "unknown sps");
    };
    if !sps.is_open() {
        return drop_action(session, "claim", "sps settled");
    }
    let Some(milestone) = sps.milestone_mut(milestone_id) else {
        return drop_action(session, "claim", "unknown milestone");
    };
    // First claim wins; later claims fall through without effect.
    if milestone.status != MilestoneStatus::Pending || milestone.assigned_to.is_some() {
        return drop_action(session, "claim", "already assigned");
    }
    milestone.assigned_to = Some(session);
    if let Some(sps) = state.sps(sps_id) {
        out.push(Outbound::all(Notice::SpsUpdated { sps: sps.clone() }));
    }
}

fn submit(
    state: &mut GameState,
    session: SessionId,
    sps_id: SpsId,
    milestone_id: String,
    now: Timestamp,
    output: &mut DispatchOutput,
) {
    if state.participant(session).is_none() {
        return drop_action(session, "submit", "unknown participant");
    }
    let Some(sps) = state.sps_mut(sps_id) else {
        return drop_action(session, "submit", "unknown sps");
    };
    if !sps.is_open() {
        return drop_action(session, "submit", "sps settled");
    }
    let Some(milestone) = sps.milestone_mut(&milestone_id) else {
        return drop_action(session, "submit", "unknown milestone");
    };
    // Only the assignee may submit, and only from pending.
    if milestone.status != MilestoneStatus::Pending || milestone.assigned_to != Some(session) {
        return drop_action(session, "submit", "not submittable by this actor");
    }
    milestone.status = MilestoneStatus::Review;

    let fire_at = now + state.config.validation_delay_ms;
    output.scheduled.push((
        fire_at,
        ApprovalEffect {
            sps_id,
            milestone_id,
        },
    ));
    if let Some(sps) = state.sps(sps_id) {
        output
            .outbound
            .push(Outbound::all(Notice::SpsUpdated { sps: sps.clone() }));
    }
}

fn drop_action(session: SessionId, action: &str, reason: &str) {
    log(
        Level::Debug,
        "dispatch",
        obj(&[
            ("event", v_str("dropped")),
            ("session", v_str(&session.to_string())),
            ("action", v_str(action)),
            ("reason", v_str(reason)),
        ]),
    );
}
