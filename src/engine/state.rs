//! Shared game state: the participant roster, SPS registry, and per-SPS
//! markets. All mutation funnels through one owner (the engine task), so
//! nothing here needs interior locking.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Logical time in epoch milliseconds. The engine never reads a clock; the
/// shell stamps every input.
pub type Timestamp = u64;

/// Identity of a connected participant, assigned at accept time and decoupled
/// from any transport identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpsId(pub u64);

impl fmt::Display for SpsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sps-{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: SessionId,
    pub display_name: String,
    pub balance: f64,
    pub reputation: i64,
    /// Long-only token positions, quantities strictly positive.
    pub holdings: BTreeMap<SpsId, u32>,
}

impl Participant {
    pub fn holding(&self, sps: SpsId) -> u32 {
        self.holdings.get(&sps).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MilestoneStatus {
    Pending,
    Review,
    Completed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub id: String,
    pub description: String,
    pub status: MilestoneStatus,
    pub assigned_to: Option<SessionId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpsStatus {
    Open,
    Settled,
}

#[derive(Debug, Clone, Serialize)]
pub struct Token {
    pub price: f64,
    pub supply: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sps {
    pub id: SpsId,
    pub creator_id: SessionId,
    pub title: String,
    pub description: String,
    pub reward_pool: f64,
    pub status: SpsStatus,
    pub created_at: Timestamp,
    pub deadline: Timestamp,
    pub milestones: Vec<Milestone>,
    pub token: Token,
}

impl Sps {
    pub fn is_open(&self) -> bool {
        self.status == SpsStatus::Open
    }

    pub fn milestone(&self, id: &str) -> Option<&Milestone> {
        self.milestones.iter().find(|m| m.id == id)
    }

    pub fn milestone_mut(&mut self, id: &str) -> Option<&mut Milestone> {
        self.milestones.iter_mut().find(|m| m.id == id)
    }

    pub fn completed_count(&self) -> usize {
        self.milestones
            .iter()
            .filter(|m| m.status == MilestoneStatus::Completed)
            .count()
    }

    pub fn all_completed(&self) -> bool {
        self.milestones
            .iter()
            .all(|m| m.status == MilestoneStatus::Completed)
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PricePoint {
    #[serde(rename = "t")]
    pub ts: Timestamp,
    #[serde(rename = "p")]
    pub price: f64,
}

/// Append-only price trace for one SPS token.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    pub history: Vec<PricePoint>,
    pub last_price: f64,
}

/// The single authoritative state object. Registries are BTreeMaps so sweeps
/// and snapshots iterate in a stable order.
#[derive(Debug)]
pub struct GameState {
    pub config: Config,
    participants: BTreeMap<SessionId, Participant>,
    sps: BTreeMap<SpsId, Sps>,
    markets: BTreeMap<SpsId, Market>,
    next_sps_id: u64,
}

impl GameState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            participants: BTreeMap::new(),
            sps: BTreeMap::new(),
            markets: BTreeMap::new(),
            next_sps_id: 1,
        }
    }

    // --- session registry ---

    /// Register a participant. A repeated join for the same session resets the
    /// record, matching the trivial name-registration model.
    pub fn add_participant(&mut self, session: SessionId, name: &str) -> Participant {
        let display_name = if name.trim().is_empty() {
            format!("anon-{}", session.0)
        } else {
            name.trim().to_string()
        };
        let participant = Participant {
            id: session,
            display_name,
            balance: self.config.initial_balance,
            reputation: self.config.initial_reputation,
            holdings: BTreeMap::new(),
        };
        self.participants.insert(session, participant.clone());
        participant
    }

    /// Drop a participant. Holdings are discarded, not liquidated, and any
    /// milestone assignments are left dangling.
    pub fn remove_participant(&mut self, session: SessionId) -> bool {
        self.participants.remove(&session).is_some()
    }

    pub fn participant(&self, session: SessionId) -> Option<&Participant> {
        self.participants.get(&session)
    }

    pub fn participant_mut(&mut self, session: SessionId) -> Option<&mut Participant> {
        self.participants.get_mut(&session)
    }

    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    pub fn roster(&self) -> Vec<Participant> {
        self.participants.values().cloned().collect()
    }

    // --- SPS registry ---

    /// Create an SPS and seed its market with the opening price point.
    /// Ids come from a monotonic counter, collision-free under concurrent
    /// near-simultaneous creation.
    pub fn create_sps(
        &mut self,
        creator_id: SessionId,
        title: &str,
        description: &str,
        reward_pool: f64,
        milestone_descriptions: &[String],
        duration_secs: u64,
        now: Timestamp,
    ) -> SpsId {
        let id = SpsId(self.next_sps_id);
        self.next_sps_id += 1;

        let milestones = milestone_descriptions
            .iter()
            .enumerate()
            .map(|(idx, desc)| Milestone {
                id: format!("{}-m{}", id, idx),
                description: desc.clone(),
                status: MilestoneStatus::Pending,
                assigned_to: None,
            })
            .collect();

        let price = self.config.base_token_price;
        self.sps.insert(
            id,
            Sps {
                id,
                creator_id,
                title: title.to_string(),
                description: description.to_string(),
                reward_pool,
                status: SpsStatus::Open,
                created_at: now,
                deadline: now + duration_secs * 1000,
                milestones,
                token: Token {
                    price,
                    supply: self.config.token_supply,
                },
            },
        );
        self.markets.insert(
            id,
            Market {
                history: vec![PricePoint { ts: now, price }],
                last_price: price,
            },
        );
        id
    }

    pub fn sps(&self, id: SpsId) -> Option<&Sps> {
        self.sps.get(&id)
    }

    pub fn sps_mut(&mut self, id: SpsId) -> Option<&mut Sps> {
        self.sps.get_mut(&id)
    }

    pub fn all_sps(&self) -> impl Iterator<Item = &Sps> {
        self.sps.values()
    }

    pub fn open_sps_ids(&self) -> Vec<SpsId> {
        self.sps
            .values()
            .filter(|s| s.is_open())
            .map(|s| s.id)
            .collect()
    }

    // --- market ---

    pub fn market(&self, id: SpsId) -> Option<&Market> {
        self.markets.get(&id)
    }

    pub fn markets(&self) -> &BTreeMap<SpsId, Market> {
        &self.markets
    }

    /// Write a token price: floor-clamped, mirrored into the market, appended
    /// to the history. Returns the applied price.
    pub fn set_price(&mut self, id: SpsId, price: f64, now: Timestamp) -> f64 {
        let clamped = price.max(self.config.min_token_price);
        if let Some(sps) = self.sps.get_mut(&id) {
            sps.token.price = clamped;
        }
        if let Some(market) = self.markets.get_mut(&id) {
            market.last_price = clamped;
            market.history.push(PricePoint {
                ts: now,
                price: clamped,
            });
        }
        clamped
    }
}
