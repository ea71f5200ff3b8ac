//! The game-economy engine: one serialized mutator over shared registries.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  WebSocket   │────►│  Input queue │────►│  Dispatcher  │
//! │  connections │     │  (mpsc)      │     │  (guards)    │
//! └──────────────┘     └──────────────┘     └──────┬───────┘
//!        ▲                    ▲                    │
//!        │                    │ ticks, deferred    ▼
//! ┌──────┴───────┐     ┌──────┴───────┐     ┌──────────────┐
//! │  Outbound    │◄────│  Scheduler / │◄────│  GameState   │
//! │  fan-out     │     │  effect heap │     │  (registries)│
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! Actions, ticks, and deferred milestone approvals all mutate state on one
//! task, so no two mutations ever interleave and every snapshot is taken at
//! a mutation boundary.

pub mod dispatch;
pub mod effects;
pub mod events;
pub mod pricing;
pub mod settlement;
pub mod state;
pub mod tick;

use effects::EffectQueue;
use events::{Input, Outbound};
use state::{GameState, Timestamp};

use crate::config::Config;

/// The deterministic core: game state plus the pending-approval heap.
/// Clock-free; callers stamp every call with `now`.
pub struct Engine {
    state: GameState,
    effects: EffectQueue,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        Self {
            state: GameState::new(config),
            effects: EffectQueue::new(),
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Process one input. Due approvals drain first so an effect never fires
    /// logically after an input with a later timestamp.
    pub fn handle(&mut self, input: Input, now: Timestamp) -> Vec<Outbound> {
        let mut out = self.drain_due(now);
        match input {
            Input::Action { session, action } => {
                let output = dispatch::dispatch(&mut self.state, session, action, now);
                for (fire_at, effect) in output.scheduled {
                    self.effects.schedule(fire_at, effect);
                }
                out.extend(output.outbound);
            }
            Input::Disconnect { session } => {
                out.extend(dispatch::handle_disconnect(&mut self.state, session));
            }
            Input::Tick => {
                out.extend(tick::run_tick(&mut self.state, now));
            }
        }
        out
    }

    /// Fire every deferred effect that has come due.
    pub fn drain_due(&mut self, now: Timestamp) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Some(effect) = self.effects.pop_due(now) {
            dispatch::apply_approval(&mut self.state, &effect, now, &mut out);
        }
        out
    }

    /// When the runtime should next wake to drain an effect.
    pub fn next_effect_deadline(&self) -> Option<Timestamp> {
        self.effects.next_deadline()
    }

    #[cfg(test)]
    pub fn pending_effects(&self) -> usize {
        self.effects.len()
    }
}
