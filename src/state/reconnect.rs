//! Reconnection coordinator.
//!
//! A reconnect token resolves to a session, the session to a match seat by
//! player name, and the seat is rebound to the new connection. Connection
//! ids are never trusted across reconnects.

use super::{rules, AppState};
use crate::error::GameError;
use crate::protocol::ServerMessage;
use crate::types::*;
use chrono::Utc;

fn failed(reason: &str) -> ServerMessage {
    ServerMessage::ReconnectFailed {
        reason: reason.to_string(),
        clear_credentials: true,
    }
}

/// Resume a seat from a reconnect token.
///
/// Always answers the caller; a failure tells the client to discard its
/// stored credential.
pub async fn reconnect(state: &AppState, connection: &str, token: &str) -> ServerMessage {
    let Some(session) = state.sessions.find_by_reconnect_token(token).await else {
        tracing::info!("Reconnect from {} with unknown token", connection);
        return failed(&GameError::InvalidReconnectToken.to_string());
    };

    let Some(m) = state.registry.get_match(&session.match_id).await else {
        tracing::info!(
            "Reconnect from {} for vanished match {}",
            connection,
            session.match_id
        );
        return failed("Match no longer exists");
    };
    if m.state == MatchState::Finished {
        return failed("Match has already finished");
    }
    let Some(previous) = m.player_by_name(&session.player_name).map(|p| p.id.clone()) else {
        return failed("Player is no longer part of this match");
    };

    state.sessions.reconnect(&session.id, connection).await;
    if previous != connection {
        // A stale socket for this seat must not pause the match when it closes
        state.registry.unbind_connection(&previous).await;
        state.hub.leave_room(&m.id, &previous);
    }
    state.registry.bind_connection(connection, &m.id).await;

    let name = session.player_name.clone();
    let result = state
        .commit_with(
            &m.id,
            |current| {
                let patch = rules::rebind_seat(current, &name, connection, Utc::now())
                    .ok_or(GameError::InvalidReconnectToken)?;
                let resumed = patch.state == Some(MatchState::Playing);
                Ok(Some((patch, resumed)))
            },
            |updated, resumed| {
                state.hub.join_room(&updated.id, connection);
                if *resumed {
                    state.hub.emit_to_room(
                        &updated.id,
                        &ServerMessage::MatchResumed {
                            snapshot: updated.clone(),
                        },
                    );
                }
                state.announce_update(updated);
                state.hub.emit_to_room_except(
                    &updated.id,
                    connection,
                    &ServerMessage::PlayerReconnected {
                        player_name: name.clone(),
                    },
                );
            },
        )
        .await;

    match result {
        Ok(Some((updated, resumed))) => {
            tracing::info!(
                "{} reconnected to match {} on {}{}",
                session.player_name,
                updated.id,
                connection,
                if resumed { " (resumed)" } else { "" }
            );
            ServerMessage::ReconnectSuccess {
                match_id: updated.id.clone(),
                player_name: session.player_name,
                role: session.role,
                is_host: session.is_host,
                game_role: updated.seat_of(connection),
                snapshot: updated,
            }
        }
        Ok(None) => failed("Player is no longer part of this match"),
        Err(e) => {
            tracing::warn!("Reconnect to match {} failed: {}", m.id, e);
            failed(&e.to_string())
        }
    }
}

/// Tear down a closed connection. A running match pauses and the opponent
/// is told who left.
pub async fn disconnect(state: &AppState, connection: &str) {
    state.hub.unregister(connection);
    state.sessions.disconnect_connection(connection).await;

    let Some(match_id) = state.registry.unbind_connection(connection).await else {
        return;
    };

    let result = state
        .commit_with(
            &match_id,
            |m| {
                let Some(player) = m.player_by_connection(connection) else {
                    return Ok(None);
                };
                let name = player.name.clone();
                Ok(rules::disconnect(m, connection, Utc::now()).map(|patch| (patch, name)))
            },
            |m, name| {
                state.hub.emit_to_room(
                    &m.id,
                    &ServerMessage::PlayerDisconnected {
                        player_name: name.clone(),
                    },
                );
                let snapshot = m.clone();
                let msg = if m.state == MatchState::Paused {
                    ServerMessage::MatchPaused { snapshot }
                } else {
                    ServerMessage::MatchUpdated { snapshot }
                };
                state.hub.emit_to_room(&m.id, &msg);
            },
        )
        .await;

    match result {
        Ok(Some((m, name))) => {
            tracing::info!("{} disconnected from match {} ({:?})", name, m.id, m.state)
        }
        Ok(None) => {}
        Err(e) => tracing::debug!("Disconnect of {} from {}: {}", connection, match_id, e),
    }
}
