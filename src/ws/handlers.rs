//! WebSocket message dispatch
//!
//! Every event handler returns `Result<Option<ServerMessage>, GameError>`.
//! Errors are turned into an `error` reply for the acting connection here and
//! never reach the match room.

use crate::error::GameError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use std::sync::Arc;

use super::{connection, lobby, round};

pub type HandlerResult = Result<Option<ServerMessage>, GameError>;

/// Handle a client message and return the reply for the sender, if any
pub async fn handle_message(
    msg: ClientMessage,
    connection_id: &str,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    let event = msg.event_name();
    let match_id = msg.match_id().unwrap_or("-").to_uppercase();
    if !matches!(msg, ClientMessage::Ping { .. }) {
        tracing::info!("{} from {} (match {})", event, connection_id, match_id);
    }

    let result = match msg {
        // Lobby
        ClientMessage::CreateMatch {
            player_name,
            settings,
        } => lobby::handle_create_match(state, connection_id, player_name, settings).await,

        ClientMessage::JoinMatch {
            match_id,
            player_name,
        } => lobby::handle_join_match(state, connection_id, match_id, player_name).await,

        ClientMessage::ChooseRole { match_id, choice } => {
            lobby::handle_choose_role(state, connection_id, match_id, choice).await
        }

        ClientMessage::StartMatch { match_id } => {
            lobby::handle_start_match(state, connection_id, match_id).await
        }

        // Rounds
        ClientMessage::SubmitAnswer { match_id, answer } => {
            round::handle_submit_answer(state, connection_id, match_id, answer).await
        }

        ClientMessage::MakeDecision { match_id, decision } => {
            round::handle_make_decision(state, connection_id, match_id, decision).await
        }

        ClientMessage::NextRound { match_id } => {
            round::handle_next_round(state, connection_id, match_id).await
        }

        ClientMessage::RequestSkip { match_id, reason } => {
            round::handle_request_skip(state, connection_id, match_id, reason).await
        }

        ClientMessage::CancelSkip { match_id } => {
            round::handle_cancel_skip(state, connection_id, match_id).await
        }

        ClientMessage::RequestPostAnswerReport { match_id, reason } => {
            round::handle_request_report(state, connection_id, match_id, reason).await
        }

        ClientMessage::CancelPostAnswerReport { match_id } => {
            round::handle_cancel_report(state, connection_id, match_id).await
        }

        // Connection
        ClientMessage::ReconnectAttempt { reconnect_token } => {
            connection::handle_reconnect(state, connection_id, reconnect_token).await
        }

        ClientMessage::FocusLost { match_id } => {
            connection::handle_focus(state, connection_id, match_id, false).await
        }

        ClientMessage::FocusRegained { match_id } => {
            connection::handle_focus(state, connection_id, match_id, true).await
        }

        ClientMessage::Ping { ts } => connection::handle_ping(state, connection_id, ts).await,
    };

    match result {
        Ok(reply) => reply,
        Err(GameError::Internal) => {
            tracing::error!(
                "{} from {} (match {}) failed internally",
                event,
                connection_id,
                match_id
            );
            Some((&GameError::Internal).into())
        }
        Err(e) => {
            tracing::warn!(
                "{} from {} (match {}) rejected: {}",
                event,
                connection_id,
                match_id,
                e
            );
            Some((&e).into())
        }
    }
}
