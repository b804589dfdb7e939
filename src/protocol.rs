use crate::types::*;
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    CreateMatch {
        player_name: String,
        #[serde(default)]
        settings: MatchSettings,
    },
    JoinMatch {
        match_id: MatchId,
        player_name: String,
    },
    /// Host-only: decide who challenges
    ChooseRole {
        match_id: MatchId,
        choice: RoleChoice,
    },
    /// Host-only
    StartMatch {
        match_id: MatchId,
    },
    SubmitAnswer {
        match_id: MatchId,
        /// Option index as text ("0".."3")
        answer: String,
    },
    /// Challenger-only
    MakeDecision {
        match_id: MatchId,
        decision: Decision,
    },
    NextRound {
        match_id: MatchId,
    },
    ReconnectAttempt {
        reconnect_token: String,
    },
    RequestSkip {
        match_id: MatchId,
        #[serde(default)]
        reason: Option<String>,
    },
    CancelSkip {
        match_id: MatchId,
    },
    RequestPostAnswerReport {
        match_id: MatchId,
        #[serde(default)]
        reason: Option<String>,
    },
    CancelPostAnswerReport {
        match_id: MatchId,
    },
    /// Informational only, relayed to the opponent
    FocusLost {
        match_id: MatchId,
    },
    FocusRegained {
        match_id: MatchId,
    },
    Ping {
        #[serde(default)]
        ts: Option<i64>,
    },
}

impl ClientMessage {
    /// Event name for logging
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::CreateMatch { .. } => "create-match",
            ClientMessage::JoinMatch { .. } => "join-match",
            ClientMessage::ChooseRole { .. } => "choose-role",
            ClientMessage::StartMatch { .. } => "start-match",
            ClientMessage::SubmitAnswer { .. } => "submit-answer",
            ClientMessage::MakeDecision { .. } => "make-decision",
            ClientMessage::NextRound { .. } => "next-round",
            ClientMessage::ReconnectAttempt { .. } => "reconnect-attempt",
            ClientMessage::RequestSkip { .. } => "request-skip",
            ClientMessage::CancelSkip { .. } => "cancel-skip",
            ClientMessage::RequestPostAnswerReport { .. } => "request-post-answer-report",
            ClientMessage::CancelPostAnswerReport { .. } => "cancel-post-answer-report",
            ClientMessage::FocusLost { .. } => "focus-lost",
            ClientMessage::FocusRegained { .. } => "focus-regained",
            ClientMessage::Ping { .. } => "ping",
        }
    }

    /// Match referenced by the event, if any
    pub fn match_id(&self) -> Option<&str> {
        match self {
            ClientMessage::JoinMatch { match_id, .. }
            | ClientMessage::ChooseRole { match_id, .. }
            | ClientMessage::StartMatch { match_id }
            | ClientMessage::SubmitAnswer { match_id, .. }
            | ClientMessage::MakeDecision { match_id, .. }
            | ClientMessage::NextRound { match_id }
            | ClientMessage::RequestSkip { match_id, .. }
            | ClientMessage::CancelSkip { match_id }
            | ClientMessage::RequestPostAnswerReport { match_id, .. }
            | ClientMessage::CancelPostAnswerReport { match_id }
            | ClientMessage::FocusLost { match_id }
            | ClientMessage::FocusRegained { match_id } => Some(match_id),
            ClientMessage::CreateMatch { .. }
            | ClientMessage::ReconnectAttempt { .. }
            | ClientMessage::Ping { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        connection_id: ConnectionId,
        server_now: String,
    },
    MatchCreated {
        match_id: MatchId,
        #[serde(rename = "match")]
        snapshot: Match,
        session_id: SessionId,
        reconnect_token: String,
    },
    JoinedMatch {
        match_id: MatchId,
        role: SeatRole,
        is_host: bool,
        game_role: Option<GameRole>,
        /// Fresh credentials; a rejoin by name revokes the previous token
        session_id: SessionId,
        reconnect_token: String,
    },
    MatchStarted {
        #[serde(rename = "match")]
        snapshot: Match,
    },
    /// Broadcast to the room on every mutation
    MatchUpdated {
        #[serde(rename = "match")]
        snapshot: Match,
    },
    MatchPaused {
        #[serde(rename = "match")]
        snapshot: Match,
    },
    MatchResumed {
        #[serde(rename = "match")]
        snapshot: Match,
    },
    PlayerDisconnected {
        player_name: String,
    },
    PlayerReconnected {
        player_name: String,
    },
    ReconnectSuccess {
        match_id: MatchId,
        player_name: String,
        role: SeatRole,
        is_host: bool,
        game_role: Option<GameRole>,
        #[serde(rename = "match")]
        snapshot: Match,
    },
    ReconnectFailed {
        reason: String,
        /// Client should discard its stored credential
        clear_credentials: bool,
    },
    /// Both players agreed to drop the question
    QuestionReported {
        question_id: QuestionId,
        rolled_back: bool,
    },
    OpponentFocus {
        player_name: String,
        focused: bool,
    },
    Pong {
        ts: Option<i64>,
        server_now: String,
    },
    Error {
        code: String,
        message: String,
    },
}

impl From<&crate::error::GameError> for ServerMessage {
    fn from(err: &crate::error::GameError) -> Self {
        ServerMessage::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}
