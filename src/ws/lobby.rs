//! Lobby handlers: creating, joining and starting a match

use super::handlers::HandlerResult;
use crate::error::GameError;
use crate::protocol::ServerMessage;
use crate::questions::QuestionRequest;
use crate::state::rules::{self, JoinKind};
use crate::state::AppState;
use crate::types::*;
use chrono::Utc;
use std::sync::Arc;

/// A socket holds one seat at a time. A seat in a finished or deleted match
/// is released; any other seat blocks the request unless it is in `target`,
/// where the join rules decide.
async fn release_seat(
    state: &Arc<AppState>,
    connection: &str,
    target: Option<&str>,
) -> Result<(), GameError> {
    let Some(bound) = state.registry.match_for_connection(connection).await else {
        return Ok(());
    };
    match state.registry.get_match(&bound).await {
        Some(m) if m.state != MatchState::Finished => {
            if target.is_some_and(|id| id.trim().eq_ignore_ascii_case(&m.id)) {
                Ok(())
            } else {
                Err(GameError::WrongState(format!(
                    "Already playing in match {}",
                    m.id
                )))
            }
        }
        _ => {
            state.registry.unbind_connection(connection).await;
            state.hub.leave_room(&bound, connection);
            Ok(())
        }
    }
}

pub async fn handle_create_match(
    state: &Arc<AppState>,
    connection: &str,
    player_name: String,
    settings: MatchSettings,
) -> HandlerResult {
    let name = rules::validate_player_name(&player_name)?;
    release_seat(state, connection, None).await?;

    // Slow path: may call out to the generator or the trivia API
    let questions = state
        .questions
        .get_questions(QuestionRequest::new(
            state.config.initial_question_count,
            &settings,
        ))
        .await;
    let needed = state.config.min_playable_questions;
    if questions.len() < needed {
        return Err(GameError::InsufficientQuestions {
            got: questions.len(),
            needed,
        });
    }

    let m = state
        .registry
        .create_match(connection, &name, settings, questions)
        .await;
    let credentials = state
        .sessions
        .create_session(connection, &m.id, &name, SeatRole::Host)
        .await;
    state.hub.join_room(&m.id, connection);

    tracing::info!(
        "Match {} created by {} with {} questions ({} coins)",
        m.id,
        name,
        m.questions.len(),
        m.initial_coins
    );

    Ok(Some(ServerMessage::MatchCreated {
        match_id: m.id.clone(),
        snapshot: m,
        session_id: credentials.session_id,
        reconnect_token: credentials.reconnect_token,
    }))
}

pub async fn handle_join_match(
    state: &Arc<AppState>,
    connection: &str,
    match_id: MatchId,
    player_name: String,
) -> HandlerResult {
    let name = rules::validate_player_name(&player_name)?;
    release_seat(state, connection, Some(&match_id)).await?;
    let now = Utc::now();

    let (m, (kind, previous, _)) = state
        .commit_with(
            &match_id,
            |m| {
                let previous = m.player_by_name(&name).map(|p| p.id.clone());
                let was_paused = m.state == MatchState::Paused;
                let (patch, kind) = rules::join(m, connection, &name, now)?;
                Ok(Some((patch, (kind, previous, was_paused))))
            },
            |m, (kind, previous, was_paused)| {
                if let Some(old) = previous.as_deref().filter(|old| *old != connection) {
                    state.hub.leave_room(&m.id, old);
                }
                state.hub.join_room(&m.id, connection);
                if *was_paused && m.state == MatchState::Playing {
                    state.hub.emit_to_room(
                        &m.id,
                        &ServerMessage::MatchResumed {
                            snapshot: m.clone(),
                        },
                    );
                }
                state.announce_update(m);
                if *kind == JoinKind::Rejoin {
                    state.hub.emit_to_room_except(
                        &m.id,
                        connection,
                        &ServerMessage::PlayerReconnected {
                            player_name: name.clone(),
                        },
                    );
                }
            },
        )
        .await?
        .ok_or(GameError::Internal)?;

    if let Some(old) = previous.filter(|old| old != connection) {
        state.registry.unbind_connection(&old).await;
    }
    state.registry.bind_connection(connection, &m.id).await;

    let player = m.player_by_name(&name).ok_or(GameError::Internal)?;
    let credentials = state
        .sessions
        .create_session(connection, &m.id, &name, player.role)
        .await;

    match kind {
        JoinKind::NewPlayer => tracing::info!("{} joined match {}", name, m.id),
        JoinKind::Rejoin => tracing::info!("{} rejoined match {} by name", name, m.id),
    }

    Ok(Some(ServerMessage::JoinedMatch {
        match_id: m.id.clone(),
        role: player.role,
        is_host: player.is_host(),
        game_role: m.seat_of(connection),
        session_id: credentials.session_id,
        reconnect_token: credentials.reconnect_token,
    }))
}

pub async fn handle_choose_role(
    state: &Arc<AppState>,
    connection: &str,
    match_id: MatchId,
    choice: RoleChoice,
) -> HandlerResult {
    let coin = rand::random::<bool>();
    if let Some(m) = state
        .commit(&match_id, |m| {
            rules::assign_roles(m, connection, choice, coin).map(Some)
        })
        .await?
    {
        tracing::info!(
            "Match {}: {:?} challenges, {:?} moderates",
            m.id,
            m.challenger_name,
            m.moderator_name
        );
    }
    Ok(None)
}

pub async fn handle_start_match(
    state: &Arc<AppState>,
    connection: &str,
    match_id: MatchId,
) -> HandlerResult {
    let current = state
        .registry
        .get_match(&match_id)
        .await
        .ok_or_else(|| GameError::match_not_found(&match_id))?;
    if current.host_id != connection {
        return Err(GameError::Unauthorized(
            "Only the host can start the match".to_string(),
        ));
    }

    state.top_up_questions(&current.id).await?;

    let coin = rand::random::<bool>();
    let min_questions = state.config.min_playable_questions;
    if let Some((m, ())) = state
        .commit_with(
            &current.id,
            |m| {
                Ok(Some((
                    rules::start(m, connection, coin, min_questions)?,
                    (),
                )))
            },
            |m, _| {
                state.hub.emit_to_room(
                    &m.id,
                    &ServerMessage::MatchStarted {
                        snapshot: m.clone(),
                    },
                );
            },
        )
        .await?
    {
        tracing::info!(
            "Match {} started: {} questions buffered",
            m.id,
            m.questions.len()
        );
    }
    Ok(None)
}
