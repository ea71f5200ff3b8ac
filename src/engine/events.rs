//! Engine inputs and outbound notifications, including their wire shapes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::state::{Market, Participant, SessionId, Sps, SpsId, Timestamp};

/// Inbound participant action, tagged JSON on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Join {
        name: String,
    },
    #[serde(rename_all = "camelCase")]
    CreateSps {
        title: String,
        description: String,
        reward_pool: f64,
        milestone_descriptions: Vec<String>,
        duration_seconds: u64,
    },
    #[serde(rename_all = "camelCase")]
    Buy { sps_id: SpsId, amount: u32 },
    #[serde(rename_all = "camelCase")]
    Sell { sps_id: SpsId, amount: u32 },
    #[serde(rename_all = "camelCase")]
    ClaimMilestone { sps_id: SpsId, milestone_id: String },
    #[serde(rename_all = "camelCase")]
    SubmitMilestone { sps_id: SpsId, milestone_id: String },
}

/// Everything the engine can process: a participant action, a connection
/// going away, or a scheduler tick. All three funnel through one channel so
/// mutations never interleave.
#[derive(Debug, Clone)]
pub enum Input {
    Action { session: SessionId, action: Action },
    Disconnect { session: SessionId },
    Tick,
}

/// Outbound notification payload, tagged JSON on the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    ParticipantInfo {
        participant: Participant,
    },
    ParticipantList {
        participants: Vec<Participant>,
    },
    StateSnapshot {
        sps: Vec<Sps>,
        markets: BTreeMap<SpsId, Market>,
        timestamp: Timestamp,
    },
    SpsCreated {
        sps: Sps,
    },
    SpsUpdated {
        sps: Sps,
    },
    #[serde(rename_all = "camelCase")]
    MarketTick { sps_id: SpsId, price: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    All,
    Session(SessionId),
}

/// A routed notification. Delivery is fire-and-forget.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub to: Recipient,
    pub notice: Notice,
}

impl Outbound {
    pub fn all(notice: Notice) -> Self {
        Self {
            to: Recipient::All,
            notice,
        }
    }

    pub fn to(session: SessionId, notice: Notice) -> Self {
        Self {
            to: Recipient::Session(session),
            notice,
        }
    }
}

/// A milestone approval waiting out its validation delay. Carries no state
/// beyond the target; the milestone is re-checked when the effect fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalEffect {
    pub sps_id: SpsId,
    pub milestone_id: String,
}
