//! WebSocket entrypoint and connection handler.
//!
//! Upgrades HTTP to WS, hands the connection to a [`SessionOrchestrator`]
//! and pumps frames between the socket and the orchestrator.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::orchestrator::SessionOrchestrator;
use crate::server::GatewayState;
use crate::ws_protocol::ClientMessage;

const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

fn to_ws(msg: ClientMessage) -> Option<Message> {
    match msg {
        ClientMessage::Text(text) => Some(Message::Text(text)),
        ClientMessage::Binary(bytes) => Some(Message::Binary(bytes.to_vec())),
        ClientMessage::Close => None,
    }
}

async fn handle_connection(socket: WebSocket, state: GatewayState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ClientMessage>();

    // Everything bound for the client goes through this one writer.
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let Some(frame) = to_ws(msg) else {
                let _ = sender.send(Message::Close(None)).await;
                break;
            };
            if sender.send(frame).await.is_err() {
                break;
            }
        }
    });

    let mut orchestrator = match SessionOrchestrator::connect(state.deps.clone(), tx.clone()).await {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!(error = %e, "Failed to initialise session");
            let _ = tx.send(ClientMessage::Close);
            drop(tx);
            let _ = tokio::time::timeout(WRITER_DRAIN_TIMEOUT, send_task).await;
            return;
        }
    };
    drop(tx);

    let mut writer_done = false;
    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => orchestrator.handle_text(&text).await,
                Some(Ok(Message::Binary(pcm))) => {
                    orchestrator.receive_audio(&pcm).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket receive failed");
                    break;
                }
            },
            _ = &mut send_task => {
                debug!("Client writer stopped");
                writer_done = true;
                break;
            }
        }
    }

    let session_id = orchestrator.session_id().to_string();
    orchestrator.disconnect().await;
    if !writer_done && tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut send_task).await.is_err() {
        send_task.abort();
    }

    info!(session_id, "WebSocket connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn client_messages_map_to_frames() {
        assert_eq!(to_ws(ClientMessage::Text("{}".into())), Some(Message::Text("{}".into())));
        assert_eq!(
            to_ws(ClientMessage::Binary(Bytes::from_static(&[1, 2]))),
            Some(Message::Binary(vec![1, 2]))
        );
        assert_eq!(to_ws(ClientMessage::Close), None);
    }
}
