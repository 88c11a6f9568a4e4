//! WebSocket handling

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use lantern_protocol::{ClientMessage, ServerMessage};

use crate::orchestrator::{TurnOrchestrator, UiSink};
use crate::session_guard::ConnectionId;
use crate::state::AppState;
use crate::store::BOOTSTRAP_PROMPT;

/// Frames that can be sent through the outbound channel
#[derive(Debug)]
enum OutboundFrame {
    /// JSON-serialized ServerMessage
    Json(ServerMessage),
    /// Raw pong response
    Pong(Bytes),
    /// Close the socket server-side and stop writing
    Close,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = ConnectionId::fresh();
    info!(
        component = "websocket",
        event = "ws.connection.opened",
        connection_id = %conn_id,
        "WebSocket connection opened"
    );

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Channel for sending messages to this client
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundFrame>(100);

    // Forward outbound frames to the socket
    let send_conn_id = conn_id;
    let send_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let result = match frame {
                OutboundFrame::Json(server_msg) => match serde_json::to_string(&server_msg) {
                    Ok(json) => ws_tx.send(Message::Text(json.into())).await,
                    Err(e) => {
                        warn!(
                            component = "websocket",
                            event = "ws.send.serialize_failed",
                            connection_id = %send_conn_id,
                            error = %e,
                            "Failed to serialize server message"
                        );
                        continue;
                    }
                },
                OutboundFrame::Pong(data) => ws_tx.send(Message::Pong(data)).await,
                OutboundFrame::Close => {
                    debug!(
                        component = "websocket",
                        event = "ws.send.close",
                        connection_id = %send_conn_id,
                        "Closing socket server-side"
                    );
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            };

            if result.is_err() {
                debug!(
                    component = "websocket",
                    event = "ws.send.disconnected",
                    connection_id = %send_conn_id,
                    "WebSocket send failed, client disconnected"
                );
                break;
            }
        }
    });

    // Bridge ServerMessages into the outbound channel for the registry.
    let (server_tx, server_rx) = mpsc::channel::<ServerMessage>(100);
    let bridge_task = tokio::spawn(bridge_server_messages(server_rx, outbound_tx.clone()));

    state.connections.register(conn_id, server_tx).await;

    // This connection becomes the sole active session; the previous tab (if
    // any) is notified and no longer served.
    if let Some(evicted) = state.guard.admit(conn_id) {
        info!(
            component = "websocket",
            event = "ws.session.takeover",
            connection_id = %conn_id,
            evicted_connection_id = %evicted,
            "New connection admitted, evicting previous one"
        );
        state.connections.notify_evicted(evicted).await;
        state.connections.remove(evicted).await;
    }

    // Replay history (bootstrap kickoff elided) to the new connection.
    let replayable = { state.history.lock().await.ui.replay() };
    state
        .connections
        .replay_history(conn_id, replayable)
        .await;

    let orchestrator = TurnOrchestrator::new(state.clone());

    // A fresh conversation kicks itself off with the synthetic prompt.
    let needs_bootstrap = { state.history.lock().await.ui.is_empty() };
    if needs_bootstrap {
        let _ = orchestrator
            .run_turn(&state.connections, conn_id, BOOTSTRAP_PROMPT)
            .await;
    }

    // Handle incoming messages
    while let Some(result) = ws_rx.next().await {
        let msg = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Ping(data)) => {
                let _ = outbound_tx.send(OutboundFrame::Pong(data)).await;
                continue;
            }
            Ok(Message::Close(_)) => {
                info!(
                    component = "websocket",
                    event = "ws.connection.close_frame",
                    connection_id = %conn_id,
                    "Client sent close frame"
                );
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(
                    component = "websocket",
                    event = "ws.connection.error",
                    connection_id = %conn_id,
                    error = %e,
                    "WebSocket error"
                );
                break;
            }
        };

        // An evicted tab gets no further service.
        if !state.guard.is_active(conn_id) {
            debug!(
                component = "websocket",
                event = "ws.connection.stale_input",
                connection_id = %conn_id,
                "Input from evicted connection ignored"
            );
            break;
        }

        let client_msg: ClientMessage = match serde_json::from_str(&msg) {
            Ok(m) => m,
            Err(e) => {
                warn!(
                    component = "websocket",
                    event = "ws.message.parse_failed",
                    connection_id = %conn_id,
                    error = %e,
                    payload_bytes = msg.len(),
                    "Failed to parse client message"
                );
                state
                    .connections
                    .notify_error(conn_id, &format!("unrecognized message: {e}"))
                    .await;
                continue;
            }
        };

        match client_msg {
            ClientMessage::UserInput { content } => {
                let _ = orchestrator
                    .run_turn(&state.connections, conn_id, &content)
                    .await;
            }
            ClientMessage::NewSession => {
                // No turn is in flight here: turns run inline on this loop.
                {
                    let mut history = state.history.lock().await;
                    history.reset_all();
                }
                state.model.set_memory(Vec::new());
                info!(
                    component = "websocket",
                    event = "ws.session.reset",
                    connection_id = %conn_id,
                    "Conversation reset"
                );
                let _ = orchestrator
                    .run_turn(&state.connections, conn_id, BOOTSTRAP_PROMPT)
                    .await;
            }
        }
    }

    info!(
        component = "websocket",
        event = "ws.connection.closed",
        connection_id = %conn_id,
        "WebSocket connection closed"
    );
    state.connections.remove(conn_id).await;
    state.guard.evict(conn_id);
    send_task.abort();
    bridge_task.abort();
}

/// Forward registry messages to the socket writer. The registry holds the
/// only sender, so when it deregisters this connection (takeover by a newer
/// tab, or normal cleanup) the channel closes — at that point the final
/// eviction notice has already been forwarded, and a close frame follows so
/// the socket is terminated rather than left idling on a dead session.
async fn bridge_server_messages(
    mut server_rx: mpsc::Receiver<ServerMessage>,
    outbound_tx: mpsc::Sender<OutboundFrame>,
) {
    while let Some(msg) = server_rx.recv().await {
        if outbound_tx.send(OutboundFrame::Json(msg)).await.is_err() {
            return;
        }
    }
    let _ = outbound_tx.send(OutboundFrame::Close).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deregistered_connection_gets_eviction_notice_then_close() {
        let (server_tx, server_rx) = mpsc::channel(8);
        let (outbound_tx, mut outbound_rx) = mpsc::channel(8);
        let bridge = tokio::spawn(bridge_server_messages(server_rx, outbound_tx));

        server_tx.send(ServerMessage::Evicted).await.unwrap();
        // The registry dropping its sender is what eviction looks like here.
        drop(server_tx);

        assert!(matches!(
            outbound_rx.recv().await,
            Some(OutboundFrame::Json(ServerMessage::Evicted))
        ));
        assert!(matches!(outbound_rx.recv().await, Some(OutboundFrame::Close)));
        assert!(outbound_rx.recv().await.is_none());
        bridge.await.unwrap();
    }

    #[tokio::test]
    async fn bridge_stops_quietly_when_the_writer_is_gone() {
        let (server_tx, server_rx) = mpsc::channel(8);
        let (outbound_tx, outbound_rx) = mpsc::channel(8);
        drop(outbound_rx);
        let bridge = tokio::spawn(bridge_server_messages(server_rx, outbound_tx));
        server_tx
            .send(ServerMessage::Error {
                message: "late".to_string(),
            })
            .await
            .unwrap();
        bridge.await.unwrap();
    }
}
