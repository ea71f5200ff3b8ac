//! Async shell around the engine: the single mutator task.
//!
//! All inputs — connection actions, disconnects, ticks — arrive on one mpsc
//! channel; deferred approvals wake the task via `sleep_until`-style timing.
//! Outbound batches fan out to per-connection senders, fire-and-forget.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::engine::events::{Input, Outbound, Recipient};
use crate::engine::state::SessionId;
use crate::engine::Engine;
use crate::logging::{log, obj, v_str, Level};

/// Per-connection outbound senders, keyed by session. The engine serializes
/// each notice once and pushes text frames; the writer half of every
/// connection drains its own queue.
pub type ClientMap = Arc<Mutex<HashMap<SessionId, mpsc::UnboundedSender<String>>>>;

pub fn new_client_map() -> ClientMap {
    Arc::new(Mutex::new(HashMap::new()))
}

pub fn now_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Run the engine until the input channel closes. Ticks fire on a fixed
/// period and never overlap: the next tick waits for the previous pass to
/// finish because both run on this task.
pub async fn run_engine(
    mut engine: Engine,
    mut inputs: mpsc::UnboundedReceiver<Input>,
    clients: ClientMap,
    tick_ms: u64,
) {
    let mut ticker = interval(Duration::from_millis(tick_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let effect_wait = wait_for_deadline(engine.next_effect_deadline());
        tokio::select! {
            _ = ticker.tick() => {
                deliver(&clients, engine.handle(Input::Tick, now_ms()));
            }
            _ = effect_wait => {
                deliver(&clients, engine.drain_due(now_ms()));
            }
            maybe = inputs.recv() => match maybe {
                Some(input) => deliver(&clients, engine.handle(input, now_ms())),
                None => break,
            },
        }
    }
    log(
        Level::Info,
        "runtime",
        obj(&[("event", v_str("engine stopped"))]),
    );
}

async fn wait_for_deadline(deadline: Option<u64>) {
    match deadline {
        Some(at) => {
            let delta = at.saturating_sub(now_ms());
            tokio::time::sleep(Duration::from_millis(delta)).await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Route a batch of notifications. Sends never block; a closed receiver just
/// means that connection is already gone.
pub fn deliver(clients: &ClientMap, batch: Vec<Outbound>) {
    if batch.is_empty() {
        return;
    }
    let Ok(map) = clients.lock() else {
        return;
    };
    for outbound in batch {
        let text = match serde_json::to_string(&outbound.notice) {
            Ok(text) => text,
            Err(_) => continue,
        };
        match outbound.to {
            Recipient::All => {
                for sender in map.values() {
                    let _ = sender.send(text.clone());
                }
            }
            Recipient::Session(session) => {
                if let Some(sender) = map.get(&session) {
                    let _ = sender.send(text);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::events::Notice;
    use crate::engine::state::{Participant, SpsId};
    use std::collections::BTreeMap;

    fn participant(id: u64) -> Participant {
        Participant {
            id: SessionId(id),
            display_name: format!("p{}", id),
            balance: 0.0,
            reputation: 0,
            holdings: BTreeMap::new(),
        }
    }

    #[test]
    fn broadcast_reaches_every_connection() {
        let clients = new_client_map();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        clients.lock().unwrap().insert(SessionId(1), tx1);
        clients.lock().unwrap().insert(SessionId(2), tx2);

        deliver(
            &clients,
            vec![Outbound::all(Notice::MarketTick {
                sps_id: SpsId(1),
                price: 10.5,
            })],
        );
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn personal_notice_reaches_only_its_session() {
        let clients = new_client_map();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        clients.lock().unwrap().insert(SessionId(1), tx1);
        clients.lock().unwrap().insert(SessionId(2), tx2);

        deliver(
            &clients,
            vec![Outbound::to(
                SessionId(1),
                Notice::ParticipantInfo {
                    participant: participant(1),
                },
            )],
        );
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn dead_receiver_does_not_block_delivery() {
        let clients = new_client_map();
        let (tx1, rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        clients.lock().unwrap().insert(SessionId(1), tx1);
        clients.lock().unwrap().insert(SessionId(2), tx2);
        drop(rx1);

        deliver(
            &clients,
            vec![Outbound::all(Notice::MarketTick {
                sps_id: SpsId(1),
                price: 10.5,
            })],
        );
        assert!(rx2.try_recv().is_ok());
    }
}
