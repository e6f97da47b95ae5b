//! WebSocket upgrade at `/ws`: one task per session, draining both the
//! client's inbound stream and the session's outbound queue so per-session
//! FIFO ordering holds in both directions.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::protocol::{ClientMessage, CoordinatorMessage};
use crate::state::CoordinatorState;

pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<CoordinatorState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<CoordinatorState>) {
    let mut client_id: Option<String> = None;
    let mut outbound_rx: Option<mpsc::Receiver<CoordinatorMessage>> = None;

    loop {
        tokio::select! {
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if !dispatch(&text, &state, &mut socket, &mut client_id, &mut outbound_rx).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!(%err, "websocket read error");
                        break;
                    }
                }
            }
            outbound = recv_outbound(&mut outbound_rx) => {
                match outbound {
                    Some(message) => {
                        if send(&mut socket, &message).await.is_err() {
                            break;
                        }
                    }
                    None => {}
                }
            }
        }
    }

    if let Some(id) = client_id {
        state.disconnect(&id);
    }
}

async fn recv_outbound(rx: &mut Option<mpsc::Receiver<CoordinatorMessage>>) -> Option<CoordinatorMessage> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Returns `false` when the session should be torn down.
async fn dispatch(
    text: &str,
    state: &Arc<CoordinatorState>,
    socket: &mut WebSocket,
    client_id: &mut Option<String>,
    outbound_rx: &mut Option<mpsc::Receiver<CoordinatorMessage>>,
) -> bool {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(err) => {
            let _ = send(socket, &CoordinatorMessage::Error { message: err.to_string() }).await;
            return true;
        }
    };

    match message {
        ClientMessage::ClientRegister(payload) => {
            let id = payload.client_id.clone();
            match state.register(payload) {
                Ok((rx, reply)) => {
                    *client_id = Some(id);
                    *outbound_rx = Some(rx);
                    send(socket, &reply).await.is_ok()
                }
                Err(err) => send(socket, &CoordinatorMessage::Error { message: err.to_string() }).await.is_ok(),
            }
        }
        ClientMessage::ClientHeartbeat(payload) => {
            state.heartbeat(payload);
            true
        }
        ClientMessage::IocReport(ioc) => {
            if let Err(err) = state.ws_report_ioc(ioc) {
                warn!(%err, "ioc_report rejected");
                // A report from an unregistered client is dropped silently
                // (just the warning above); every other failure still gets
                // an error reply.
                if !matches!(err, crate::error::CoordinatorError::UnregisteredClient(_)) {
                    let _ = send(socket, &CoordinatorMessage::Error { message: err.to_string() }).await;
                }
            }
            true
        }
        ClientMessage::DetectionEvent(payload) => {
            state.detection_event(payload);
            true
        }
        ClientMessage::SyncRequest(_) => send(socket, &state.sync_response()).await.is_ok(),
    }
}

async fn send(socket: &mut WebSocket, message: &CoordinatorMessage) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message).unwrap_or_else(|_| "{}".to_string());
    socket.send(Message::Text(text)).await
}
