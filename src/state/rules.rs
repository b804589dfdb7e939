//! Game rules.
//!
//! Every function here is pure: it inspects a match snapshot and returns the
//! complete patch the event produces, or `Ok(None)` when the event is a
//! tolerated no-op (stale sender, duplicate answer, cancel without request).
//! The registry applies the patch in one step, so no partial state is ever
//! observable.

use super::registry::MatchPatch;
use crate::error::GameError;
use crate::types::*;
use chrono::{DateTime, Utc};

/// Outcome of a skip or post-answer report request
#[derive(Debug, Clone, PartialEq)]
pub struct Concurrence {
    pub patch: MatchPatch,
    /// Set once both players agreed; this question goes to the blocklist
    pub reported: Option<QuestionId>,
    /// Points or coins were reversed for the invalidated question
    pub rolled_back: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    NewPlayer,
    /// Name matched an existing seat; treated as a reconnect
    Rejoin,
}

/// Parse an option index sent as text ("0".."3")
pub fn parse_answer(answer: &str) -> Result<usize, GameError> {
    answer
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|idx| *idx < OPTION_COUNT)
        .ok_or_else(|| GameError::Validation(format!("Invalid answer: {:?}", answer)))
}

pub fn validate_player_name(name: &str) -> Result<String, GameError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(GameError::Validation("Player name is required".to_string()));
    }
    if trimmed.chars().count() > 24 {
        return Err(GameError::Validation(
            "Player name must be at most 24 characters".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

pub fn join(
    m: &Match,
    connection: &str,
    name: &str,
    now: DateTime<Utc>,
) -> Result<(MatchPatch, JoinKind), GameError> {
    if m.state == MatchState::Finished {
        return Err(GameError::WrongState(
            "Match has already finished".to_string(),
        ));
    }

    // One connection, one seat
    if let Some(seated) = m.player_by_connection(connection) {
        if seated.name != name {
            return Err(GameError::WrongState(format!(
                "This connection already plays as {}",
                seated.name
            )));
        }
    }

    if m.player_by_name(name).is_some() {
        let patch = rebind_seat(m, name, connection, now).ok_or(GameError::Internal)?;
        return Ok((patch, JoinKind::Rejoin));
    }

    if m.is_full() {
        return Err(GameError::MatchFull);
    }

    let mut players = m.players.clone();
    players.push(Player {
        id: connection.to_string(),
        name: name.to_string(),
        role: SeatRole::Player2,
        game_role: None,
        connected: true,
        last_seen: now,
    });

    let state = (players.len() == 2).then_some(MatchState::RoleSelection);
    Ok((
        MatchPatch {
            players: Some(players),
            state,
            ..Default::default()
        },
        JoinKind::NewPlayer,
    ))
}

/// Point the seat held by `name` at a new connection.
/// Resumes a paused match once both players are back.
pub fn rebind_seat(
    m: &Match,
    name: &str,
    connection: &str,
    now: DateTime<Utc>,
) -> Option<MatchPatch> {
    let mut players = m.players.clone();
    let player = players.iter_mut().find(|p| p.name == name)?;
    player.id = connection.to_string();
    player.connected = true;
    player.last_seen = now;
    let is_host = player.is_host();

    let mut patch = MatchPatch::default();
    if is_host {
        patch.host_id = Some(connection.to_string());
    }
    if m.challenger_name.as_deref() == Some(name) {
        patch.challenger_id = Some(connection.to_string());
    }
    if m.moderator_name.as_deref() == Some(name) {
        patch.moderator_id = Some(connection.to_string());
    }
    if m.state == MatchState::Paused && players.len() == 2 && players.iter().all(|p| p.connected) {
        patch.state = Some(MatchState::Playing);
    }
    patch.players = Some(players);
    Some(patch)
}

fn roles_patch(m: &Match, host_is_challenger: bool) -> MatchPatch {
    let mut players = m.players.clone();
    let (challenger_idx, moderator_idx) = if host_is_challenger { (0, 1) } else { (1, 0) };
    players[challenger_idx].game_role = Some(GameRole::Challenger);
    players[moderator_idx].game_role = Some(GameRole::Moderator);

    MatchPatch {
        challenger_id: Some(players[challenger_idx].id.clone()),
        challenger_name: Some(players[challenger_idx].name.clone()),
        moderator_id: Some(players[moderator_idx].id.clone()),
        moderator_name: Some(players[moderator_idx].name.clone()),
        players: Some(players),
        ..Default::default()
    }
}

/// Host picks roles. `coin` decides a `random` choice.
pub fn assign_roles(
    m: &Match,
    connection: &str,
    choice: RoleChoice,
    coin: bool,
) -> Result<MatchPatch, GameError> {
    if m.host_id != connection {
        return Err(GameError::Unauthorized(
            "Only the host can choose roles".to_string(),
        ));
    }
    if m.players.len() != 2 {
        return Err(GameError::WrongState(
            "Waiting for a second player".to_string(),
        ));
    }
    if m.state != MatchState::RoleSelection {
        return Err(GameError::WrongState(
            "Roles can only be chosen during role selection".to_string(),
        ));
    }

    let host_is_challenger = match choice {
        RoleChoice::Challenger => true,
        RoleChoice::Moderator => false,
        RoleChoice::Random => coin,
    };

    Ok(MatchPatch {
        state: Some(MatchState::Setup),
        ..roles_patch(m, host_is_challenger)
    })
}

/// Host starts play. Roles still unassigned are decided by `coin`.
pub fn start(
    m: &Match,
    connection: &str,
    coin: bool,
    min_questions: usize,
) -> Result<MatchPatch, GameError> {
    if m.host_id != connection {
        return Err(GameError::Unauthorized(
            "Only the host can start the match".to_string(),
        ));
    }
    if !matches!(m.state, MatchState::RoleSelection | MatchState::Setup) {
        return Err(GameError::WrongState(format!(
            "Cannot start a match in state {:?}",
            m.state
        )));
    }
    if m.players.len() != 2 {
        return Err(GameError::WrongState(
            "Waiting for a second player".to_string(),
        ));
    }

    let available = m.questions.len().saturating_sub(m.current_question);
    if available < min_questions.max(1) {
        return Err(GameError::InsufficientQuestions {
            got: available,
            needed: min_questions.max(1),
        });
    }

    let base = if m.state == MatchState::RoleSelection {
        roles_patch(m, coin)
    } else {
        MatchPatch::default()
    };

    Ok(MatchPatch {
        state: Some(MatchState::Playing),
        phase: Some(RoundPhase::Answering),
        current_question: Some(m.current_question),
        round: Some(RoundState::default()),
        ..base
    })
}

pub fn submit_answer(
    m: &Match,
    connection: &str,
    answer: &str,
) -> Result<Option<MatchPatch>, GameError> {
    let Some(seat) = m.seat_of(connection) else {
        return Ok(None);
    };
    if m.state != MatchState::Playing || m.phase != RoundPhase::Answering {
        return Err(GameError::WrongState(
            "Answers are only accepted while answering".to_string(),
        ));
    }
    let index = parse_answer(answer)?;

    let mut round = m.round.clone();
    match seat {
        GameRole::Challenger if !round.challenger_answered => {
            round.challenger_answer = Some(index);
            round.challenger_answered = true;
        }
        GameRole::Moderator if !round.moderator_answered => {
            round.moderator_answer = Some(index);
            round.moderator_answered = true;
        }
        // Already answered: duplicate delivery
        _ => return Ok(None),
    }

    let mut patch = MatchPatch::default();
    if round.challenger_answered && round.moderator_answered {
        let question = m.question().ok_or(GameError::Internal)?;
        round.challenger_correct = round.challenger_answer == Some(question.correct_index);
        if round.challenger_correct {
            patch.challenger_score = Some(m.challenger_score + 1);
        }
        patch.phase = Some(RoundPhase::Decision);
    }
    patch.round = Some(round);
    Ok(Some(patch))
}

pub fn make_decision(
    m: &Match,
    connection: &str,
    decision: Decision,
) -> Result<Option<MatchPatch>, GameError> {
    match m.seat_of(connection) {
        None => return Ok(None),
        Some(GameRole::Moderator) => {
            return Err(GameError::Unauthorized(
                "Only the challenger can trust or doubt".to_string(),
            ))
        }
        Some(GameRole::Challenger) => {}
    }
    if m.state != MatchState::Playing || m.phase != RoundPhase::Decision {
        return Err(GameError::WrongState(
            "Decisions are only accepted in the decision phase".to_string(),
        ));
    }

    let question = m.question().ok_or(GameError::Internal)?;
    let moderator_correct = m.round.moderator_answer == Some(question.correct_index);
    let challenger = m.challenger_name.as_deref().unwrap_or("Challenger");
    let moderator = m.moderator_name.as_deref().unwrap_or("Moderator");

    let mut round = m.round.clone();
    round.decision = Some(decision);
    let mut patch = MatchPatch {
        phase: Some(RoundPhase::Result),
        ..Default::default()
    };

    match decision {
        Decision::Trust => {
            patch.moderator_score = Some(m.moderator_score + 1);
            round.outcome = Some(RoundOutcome::TrustAwarded);
            round.round_result = format!(
                "{} trusts {}. {} earns 1 point.",
                challenger, moderator, moderator
            );
        }
        Decision::Doubt => {
            // Charge first, refund if the doubt was justified
            let mut coins = m.challenger_coins - 1;
            round.show_moderator_answer = true;
            if moderator_correct {
                patch.moderator_score = Some(m.moderator_score + 1);
                round.outcome = Some(RoundOutcome::DoubtCoinLost);
                round.round_result = format!(
                    "{} doubts. {} was right and earns 1 point. Coin lost!",
                    challenger, moderator
                );
            } else {
                coins += 1;
                round.outcome = Some(RoundOutcome::DoubtCoinSaved);
                round.round_result = format!(
                    "{} doubts. {} was wrong. Coin retained.",
                    challenger, moderator
                );
            }
            patch.challenger_coins = Some(coins);
        }
    }

    patch.round = Some(round);
    Ok(Some(patch))
}

/// Winner check, in priority order: coins run out, a single player at the
/// winning score, both at it (higher score wins, equal is a draw).
pub fn evaluate_winner(m: &Match) -> Option<Winner> {
    let challenger = Winner::Player {
        name: m.challenger_name.clone().unwrap_or_default(),
    };
    let moderator = Winner::Player {
        name: m.moderator_name.clone().unwrap_or_default(),
    };

    if m.challenger_coins <= 0 {
        return Some(moderator);
    }

    match (
        m.challenger_score >= WINNING_SCORE,
        m.moderator_score >= WINNING_SCORE,
    ) {
        (true, false) => Some(challenger),
        (false, true) => Some(moderator),
        (true, true) => Some(leader(m)),
        (false, false) => None,
    }
}

/// Higher score wins, equal scores draw
fn leader(m: &Match) -> Winner {
    let name = match m.challenger_score.cmp(&m.moderator_score) {
        std::cmp::Ordering::Greater => m.challenger_name.clone(),
        std::cmp::Ordering::Less => m.moderator_name.clone(),
        std::cmp::Ordering::Equal => return Winner::Draw,
    };
    Winner::Player {
        name: name.unwrap_or_default(),
    }
}

/// Move to the next buffered question with fresh round scratch
fn advance(m: &Match) -> Result<MatchPatch, GameError> {
    let next = m.current_question + 1;
    if next >= m.questions.len() {
        return Err(GameError::InsufficientQuestions { got: 0, needed: 1 });
    }
    Ok(MatchPatch {
        current_question: Some(next),
        phase: Some(RoundPhase::Answering),
        round: Some(RoundState::default()),
        ..Default::default()
    })
}

pub fn next_round(m: &Match, connection: &str) -> Result<Option<MatchPatch>, GameError> {
    if m.seat_of(connection).is_none() {
        return Ok(None);
    }
    if m.state != MatchState::Playing || m.phase != RoundPhase::Result {
        return Err(GameError::WrongState(
            "The next round can only start after the result".to_string(),
        ));
    }

    let winner = evaluate_winner(m).or_else(|| {
        // Nothing left to ask even after a refill: settle on the scores so far
        (m.current_question + 1 >= m.questions.len()).then(|| leader(m))
    });
    if let Some(winner) = winner {
        return Ok(Some(MatchPatch {
            state: Some(MatchState::Finished),
            winner: Some(winner),
            ..Default::default()
        }));
    }

    advance(m).map(Some)
}

/// Mark the player on `connection` as gone; pauses a running match
pub fn disconnect(m: &Match, connection: &str, now: DateTime<Utc>) -> Option<MatchPatch> {
    let mut players = m.players.clone();
    let player = players.iter_mut().find(|p| p.id == connection)?;
    player.connected = false;
    player.last_seen = now;

    let state = (m.state == MatchState::Playing).then_some(MatchState::Paused);
    Some(MatchPatch {
        players: Some(players),
        state,
        ..Default::default()
    })
}

pub fn heartbeat(m: &Match, connection: &str, now: DateTime<Utc>) -> Option<MatchPatch> {
    let mut players = m.players.clone();
    let player = players.iter_mut().find(|p| p.id == connection)?;
    player.last_seen = now;
    Some(MatchPatch {
        players: Some(players),
        ..Default::default()
    })
}

fn seated_name<'a>(m: &'a Match, connection: &str) -> Option<&'a str> {
    m.seat_of(connection)?;
    m.player_by_connection(connection).map(|p| p.name.as_str())
}

pub fn request_skip(m: &Match, connection: &str) -> Result<Option<Concurrence>, GameError> {
    let Some(name) = seated_name(m, connection) else {
        return Ok(None);
    };
    if m.state != MatchState::Playing || m.phase != RoundPhase::Answering {
        return Err(GameError::WrongState(
            "Questions can only be skipped while answering".to_string(),
        ));
    }
    if m.round.skip_requests.iter().any(|n| n == name) {
        return Ok(None);
    }

    let mut round = m.round.clone();
    round.skip_requests.push(name.to_string());

    if round.skip_requests.len() < 2 {
        return Ok(Some(Concurrence {
            patch: MatchPatch {
                round: Some(round),
                ..Default::default()
            },
            reported: None,
            rolled_back: false,
        }));
    }

    // Nothing has been scored yet in the answering phase
    let question = m.question().ok_or(GameError::Internal)?;
    Ok(Some(Concurrence {
        patch: MatchPatch {
            reported_question: Some(m.current_question),
            ..advance(m)?
        },
        reported: Some(question.id.clone()),
        rolled_back: false,
    }))
}

pub fn cancel_skip(m: &Match, connection: &str) -> Option<MatchPatch> {
    let name = seated_name(m, connection)?;
    let mut round = m.round.clone();
    let before = round.skip_requests.len();
    round.skip_requests.retain(|n| n != name);
    (round.skip_requests.len() != before).then(|| MatchPatch {
        round: Some(round),
        ..Default::default()
    })
}

pub fn request_report(m: &Match, connection: &str) -> Result<Option<Concurrence>, GameError> {
    let Some(name) = seated_name(m, connection) else {
        return Ok(None);
    };
    if m.state != MatchState::Playing
        || !matches!(m.phase, RoundPhase::Decision | RoundPhase::Result)
    {
        return Err(GameError::WrongState(
            "Questions can only be reported after both players answered".to_string(),
        ));
    }
    if m.round.report_requests.iter().any(|n| n == name) {
        return Ok(None);
    }

    let mut round = m.round.clone();
    round.report_requests.push(name.to_string());

    if round.report_requests.len() < 2 {
        return Ok(Some(Concurrence {
            patch: MatchPatch {
                round: Some(round),
                ..Default::default()
            },
            reported: None,
            rolled_back: false,
        }));
    }

    // Undo exactly what submit_answer and make_decision applied
    let mut challenger_score = m.challenger_score;
    let mut moderator_score = m.moderator_score;
    let mut coins = m.challenger_coins;

    if m.round.challenger_correct {
        challenger_score = challenger_score.saturating_sub(1);
    }
    if m.phase == RoundPhase::Result {
        match m.round.outcome {
            Some(RoundOutcome::TrustAwarded) => {
                moderator_score = moderator_score.saturating_sub(1);
            }
            Some(RoundOutcome::DoubtCoinLost) => {
                moderator_score = moderator_score.saturating_sub(1);
                coins += 1;
            }
            Some(RoundOutcome::DoubtCoinSaved) | None => {}
        }
    }

    let rolled_back = challenger_score != m.challenger_score
        || moderator_score != m.moderator_score
        || coins != m.challenger_coins;

    let question = m.question().ok_or(GameError::Internal)?;
    Ok(Some(Concurrence {
        patch: MatchPatch {
            reported_question: Some(m.current_question),
            challenger_score: Some(challenger_score),
            moderator_score: Some(moderator_score),
            challenger_coins: Some(coins),
            ..advance(m)?
        },
        reported: Some(question.id.clone()),
        rolled_back,
    }))
}

pub fn cancel_report(m: &Match, connection: &str) -> Option<MatchPatch> {
    let name = seated_name(m, connection)?;
    let mut round = m.round.clone();
    let before = round.report_requests.len();
    round.report_requests.retain(|n| n != name);
    (round.report_requests.len() != before).then(|| MatchPatch {
        round: Some(round),
        ..Default::default()
    })
}
