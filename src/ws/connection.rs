//! Connection-level handlers: reconnect, heartbeat and focus relay

use super::handlers::HandlerResult;
use crate::protocol::ServerMessage;
use crate::state::{reconnect, rules, AppState};
use crate::types::MatchId;
use chrono::Utc;
use std::sync::Arc;

pub async fn handle_reconnect(
    state: &Arc<AppState>,
    connection: &str,
    reconnect_token: String,
) -> HandlerResult {
    Ok(Some(
        reconnect::reconnect(state, connection, &reconnect_token).await,
    ))
}

/// Refreshes presence without broadcasting; clients measure latency from the pong
pub async fn handle_ping(
    state: &Arc<AppState>,
    connection: &str,
    ts: Option<i64>,
) -> HandlerResult {
    let now = Utc::now();
    state.sessions.touch(connection).await;
    if let Some(match_id) = state.registry.match_for_connection(connection).await {
        state
            .registry
            .mutate(
                &match_id,
                |m| Ok(rules::heartbeat(m, connection, now)),
                |_| {},
            )
            .await?;
    }

    Ok(Some(ServerMessage::Pong {
        ts,
        server_now: now.to_rfc3339(),
    }))
}

/// Tell the opponent that a seated player's window lost or regained focus
pub async fn handle_focus(
    state: &Arc<AppState>,
    connection: &str,
    match_id: MatchId,
    focused: bool,
) -> HandlerResult {
    let Some(m) = state.registry.get_match(&match_id).await else {
        return Ok(None);
    };
    if m.seat_of(connection).is_none() {
        return Ok(None);
    }
    let Some(player) = m.player_by_connection(connection) else {
        return Ok(None);
    };

    state.hub.emit_to_room_except(
        &m.id,
        connection,
        &ServerMessage::OpponentFocus {
            player_name: player.name.clone(),
            focused,
        },
    );
    Ok(None)
}
