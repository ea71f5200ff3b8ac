//! WebSocket transport: accept connections, assign session identities, pump
//! frames between the wire and the engine's input channel.

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::engine::events::{Action, Input};
use crate::engine::state::SessionId;
use crate::logging::{json_log, log, obj, v_num, v_str, Level};
use crate::runtime::ClientMap;

/// Accept loop. Sessions get a fresh id per connection; identity is never
/// derived from the socket itself.
pub async fn run(
    addr: &str,
    inputs: mpsc::UnboundedSender<Input>,
    clients: ClientMap,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    json_log(
        "server",
        obj(&[("event", v_str("listening")), ("addr", v_str(addr))]),
    );
    let mut next_session: u64 = 1;
    loop {
        let (stream, peer) = listener.accept().await?;
        let session = SessionId(next_session);
        next_session += 1;
        json_log(
            "server",
            obj(&[
                ("event", v_str("connected")),
                ("session", v_num(session.0 as f64)),
                ("peer", v_str(&peer.to_string())),
            ]),
        );
        tokio::spawn(connection(stream, session, inputs.clone(), clients.clone()));
    }
}

async fn connection(
    stream: TcpStream,
    session: SessionId,
    inputs: mpsc::UnboundedSender<Input>,
    clients: ClientMap,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(err) => {
            log(
                Level::Warn,
                "server",
                obj(&[
                    ("event", v_str("handshake failed")),
                    ("error", v_str(&err.to_string())),
                ]),
            );
            return;
        }
    };
    let (mut write, mut read) = ws.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    if let Ok(mut map) = clients.lock() {
        map.insert(session, tx);
    }

    // Writer half: drain this connection's queue until it closes or the peer
    // stops accepting frames.
    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if write.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = read.next().await {
        if msg.is_close() {
            break;
        }
        let Ok(text) = msg.into_text() else {
            continue;
        };
        match serde_json::from_str::<Action>(&text) {
            Ok(action) => {
                if inputs.send(Input::Action { session, action }).is_err() {
                    break; // engine gone, nothing left to do
                }
            }
            // Malformed frames are dropped, the wire-level face of the
            // engine's silent-rejection policy.
            Err(_) => continue,
        }
    }

    if let Ok(mut map) = clients.lock() {
        map.remove(&session);
    }
    let _ = inputs.send(Input::Disconnect { session });
    writer.abort();
    json_log(
        "server",
        obj(&[
            ("event", v_str("disconnected")),
            ("session", v_num(session.0 as f64)),
        ]),
    );
}
