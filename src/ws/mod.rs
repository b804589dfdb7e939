pub mod connection;
pub mod handlers;
pub mod lobby;
pub mod round;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
    FutureExt,
};
use serde::Deserialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::error::GameError;
use crate::protocol::{ClientMessage, ServerMessage, PROTOCOL_VERSION};
use crate::state::{reconnect, AppState};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Resume a seat during the handshake, same as `reconnect-attempt`
    pub reconnect_token: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::debug!(
        "WebSocket connection request (reconnect: {})",
        params.reconnect_token.is_some()
    );

    ws.on_upgrade(move |socket| handle_socket(socket, params, state))
}

async fn send(sender: &mut SplitSink<WebSocket, Message>, msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to serialize server message: {}", e);
            true
        }
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, params: WsQuery, state: Arc<AppState>) {
    let connection_id = ulid::Ulid::new().to_string();
    let (mut sender, mut receiver) = socket.split();
    let mut outbound = state.hub.register(&connection_id);

    tracing::info!("WebSocket connected: {}", connection_id);

    let welcome = ServerMessage::Welcome {
        protocol: PROTOCOL_VERSION.to_string(),
        connection_id: connection_id.clone(),
        server_now: chrono::Utc::now().to_rfc3339(),
    };
    if !send(&mut sender, &welcome).await {
        tracing::error!("Failed to send welcome message to {}", connection_id);
        reconnect::disconnect(&state, &connection_id).await;
        return;
    }

    if let Some(token) = params.reconnect_token.filter(|t| !t.trim().is_empty()) {
        let reply = reconnect::reconnect(&state, &connection_id, token.trim()).await;
        if !send(&mut sender, &reply).await {
            reconnect::disconnect(&state, &connection_id).await;
            return;
        }
    }

    loop {
        tokio::select! {
            // Room broadcasts and direct messages queued by other connections
            queued = outbound.recv() => {
                match queued {
                    Some(msg) => {
                        if !send(&mut sender, &msg).await {
                            break;
                        }
                    }
                    None => break,
                }
            }

            // Handle client messages
            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        // The raw text is not logged: it may carry a reconnect token
                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => dispatch(client_msg, &connection_id, &state).await,
                            Err(e) => {
                                tracing::debug!("Unparseable message from {}: {}", connection_id, e);
                                let err = GameError::Validation(format!("Invalid message format: {}", e));
                                Some((&err).into())
                            }
                        };
                        if let Some(reply) = reply {
                            if !send(&mut sender, &reply).await {
                                tracing::error!("Failed to send response to {}", connection_id);
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed by {}", connection_id);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket error on {}: {}", connection_id, e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    reconnect::disconnect(&state, &connection_id).await;
    tracing::info!("WebSocket connection closed: {}", connection_id);
}

/// Run a handler, turning a panic into a generic error for this client only
async fn dispatch(
    msg: ClientMessage,
    connection_id: &str,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    let event = msg.event_name();
    let match_id = msg.match_id().unwrap_or("-").to_string();

    match AssertUnwindSafe(handlers::handle_message(msg, connection_id, state))
        .catch_unwind()
        .await
    {
        Ok(reply) => reply,
        Err(_) => {
            tracing::error!(
                "Handler for {} panicked (connection {}, match {})",
                event,
                connection_id,
                match_id
            );
            Some((&GameError::Internal).into())
        }
    }
}
