//! In-game handlers: answers, decisions, round advance, skip and report

use super::handlers::HandlerResult;
use crate::cleanup;
use crate::error::GameError;
use crate::protocol::ServerMessage;
use crate::state::rules::{self, Concurrence};
use crate::state::AppState;
use crate::types::*;
use std::sync::Arc;

pub async fn handle_submit_answer(
    state: &Arc<AppState>,
    connection: &str,
    match_id: MatchId,
    answer: String,
) -> HandlerResult {
    if let Some(m) = state
        .commit(&match_id, |m| rules::submit_answer(m, connection, &answer))
        .await?
    {
        if m.phase == RoundPhase::Decision {
            tracing::info!(
                "Match {}: both answered, challenger {}",
                m.id,
                if m.round.challenger_correct {
                    "correct"
                } else {
                    "wrong"
                }
            );
        }
    }
    Ok(None)
}

pub async fn handle_make_decision(
    state: &Arc<AppState>,
    connection: &str,
    match_id: MatchId,
    decision: Decision,
) -> HandlerResult {
    if let Some(m) = state
        .commit(&match_id, |m| rules::make_decision(m, connection, decision))
        .await?
    {
        tracing::info!(
            "Match {}: {:?} -> {:?} (scores {}:{}, coins {})",
            m.id,
            decision,
            m.round.outcome,
            m.challenger_score,
            m.moderator_score,
            m.challenger_coins
        );
    }
    Ok(None)
}

pub async fn handle_next_round(
    state: &Arc<AppState>,
    connection: &str,
    match_id: MatchId,
) -> HandlerResult {
    let current = state
        .registry
        .get_match(&match_id)
        .await
        .ok_or_else(|| GameError::match_not_found(&match_id))?;
    if current.seat_of(connection).is_some()
        && current.phase == RoundPhase::Result
        && rules::evaluate_winner(&current).is_none()
    {
        state.top_up_questions(&current.id).await?;
    }

    let Some(m) = state
        .commit(&current.id, |m| rules::next_round(m, connection))
        .await?
    else {
        return Ok(None);
    };

    if m.state == MatchState::Finished {
        tracing::info!("Match {} finished: {:?}", m.id, m.winner);
        cleanup::schedule_match_removal(state.clone(), m.id.clone());
    } else {
        tracing::debug!("Match {}: question {}", m.id, m.current_question + 1);
    }
    Ok(None)
}

/// Apply a skip or report request. Once both players agree, the question is
/// announced as reported and goes to the blocklist.
async fn commit_concurrence<F>(state: &Arc<AppState>, match_id: &str, compute: F) -> HandlerResult
where
    F: FnOnce(&Match) -> Result<Option<Concurrence>, GameError>,
{
    // Agreement advances the round, so make sure there is somewhere to go
    state.top_up_questions(match_id).await?;

    let result = state
        .commit_with(
            match_id,
            |m| {
                Ok(compute(m)?.map(|c| {
                    let reported = c.reported.map(|id| (id, c.rolled_back));
                    (c.patch, reported)
                }))
            },
            |m, reported| {
                state.announce_update(m);
                if let Some((question_id, rolled_back)) = reported {
                    state.hub.emit_to_room(
                        &m.id,
                        &ServerMessage::QuestionReported {
                            question_id: question_id.clone(),
                            rolled_back: *rolled_back,
                        },
                    );
                }
            },
        )
        .await?;

    if let Some((m, Some((question_id, rolled_back)))) = result {
        tracing::info!(
            "Match {}: question {} dropped by both players{}",
            m.id,
            question_id,
            if rolled_back {
                ", points rolled back"
            } else {
                ""
            }
        );
        state.blocklist.report(&question_id).await;
    }
    Ok(None)
}

pub async fn handle_request_skip(
    state: &Arc<AppState>,
    connection: &str,
    match_id: MatchId,
    reason: Option<String>,
) -> HandlerResult {
    if let Some(reason) = reason.as_deref().filter(|r| !r.trim().is_empty()) {
        tracing::info!("Match {}: skip requested ({})", match_id, reason);
    }
    commit_concurrence(state, &match_id, |m| rules::request_skip(m, connection)).await
}

pub async fn handle_cancel_skip(
    state: &Arc<AppState>,
    connection: &str,
    match_id: MatchId,
) -> HandlerResult {
    state
        .commit(&match_id, |m| Ok(rules::cancel_skip(m, connection)))
        .await?;
    Ok(None)
}

pub async fn handle_request_report(
    state: &Arc<AppState>,
    connection: &str,
    match_id: MatchId,
    reason: Option<String>,
) -> HandlerResult {
    if let Some(reason) = reason.as_deref().filter(|r| !r.trim().is_empty()) {
        tracing::info!("Match {}: question report ({})", match_id, reason);
    }
    commit_concurrence(state, &match_id, |m| rules::request_report(m, connection)).await
}

pub async fn handle_cancel_report(
    state: &Arc<AppState>,
    connection: &str,
    match_id: MatchId,
) -> HandlerResult {
    state
        .commit(&match_id, |m| Ok(rules::cancel_report(m, connection)))
        .await?;
    Ok(None)
}
