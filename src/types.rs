use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type MatchId = String;
pub type ConnectionId = String;
pub type SessionId = String;
pub type QuestionId = String;

/// Score either player needs to win a match
pub const WINNING_SCORE: u32 = 5;

/// Number of answer options every question carries
pub const OPTION_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum MatchState {
    Lobby,
    RoleSelection,
    Setup,
    Playing,
    Paused,
    Finished,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoundPhase {
    Answering,
    Decision,
    Result,
}

/// Seat role: who created the match and who joined it
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SeatRole {
    Host,
    Player2,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameRole {
    Challenger,
    Moderator,
}

/// Host's pick during role selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoleChoice {
    Challenger,
    Moderator,
    Random,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Trust,
    Doubt,
}

/// Machine-readable result of a decision; `round_result` carries the prose
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RoundOutcome {
    TrustAwarded,
    DoubtCoinLost,
    DoubtCoinSaved,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Winner {
    Player { name: String },
    Draw,
}

/// Settings chosen by the host at creation, forwarded to the question source.
/// `None` means "mixed" difficulty / "any" category.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchSettings {
    #[serde(default, deserialize_with = "deserialize_difficulty")]
    pub difficulty: Option<Difficulty>,
    #[serde(default, deserialize_with = "deserialize_category")]
    pub category: Option<String>,
}

/// Accepts "easy" | "medium" | "hard"; anything else (e.g. "mixed") means no preference
fn deserialize_difficulty<'de, D>(deserializer: D) -> Result<Option<Difficulty>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(Difficulty::parse))
}

fn deserialize_category<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("any")))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    pub question: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    pub category: String,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub reported: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Current connection; rewritten on every reconnect
    pub id: ConnectionId,
    pub name: String,
    pub role: SeatRole,
    pub game_role: Option<GameRole>,
    pub connected: bool,
    pub last_seen: DateTime<Utc>,
}

impl Player {
    pub fn is_host(&self) -> bool {
        self.role == SeatRole::Host
    }
}

/// Per-round scratch fields, replaced wholesale at the start of every answering phase
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoundState {
    pub challenger_answer: Option<usize>,
    pub moderator_answer: Option<usize>,
    pub challenger_answered: bool,
    pub moderator_answered: bool,
    pub challenger_correct: bool,
    pub decision: Option<Decision>,
    pub round_result: String,
    pub outcome: Option<RoundOutcome>,
    pub show_moderator_answer: bool,
    /// Display names of players asking to skip the current question
    pub skip_requests: Vec<String>,
    /// Display names of players asking to invalidate the current question after answering
    pub report_requests: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: MatchId,
    pub version: u64,
    pub state: MatchState,
    pub phase: RoundPhase,
    pub settings: MatchSettings,
    pub host_id: ConnectionId,
    pub host_name: String,
    pub players: Vec<Player>,
    pub challenger_id: Option<ConnectionId>,
    pub moderator_id: Option<ConnectionId>,
    pub challenger_name: Option<String>,
    pub moderator_name: Option<String>,
    pub challenger_score: u32,
    pub moderator_score: u32,
    pub challenger_coins: i32,
    pub initial_coins: i32,
    pub current_question: usize,
    pub questions: Vec<Question>,
    #[serde(flatten)]
    pub round: RoundState,
    pub winner: Option<Winner>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Match {
    pub fn question(&self) -> Option<&Question> {
        self.questions.get(self.current_question)
    }

    /// Questions buffered after the current one
    pub fn questions_ahead(&self) -> usize {
        self.questions
            .len()
            .saturating_sub(self.current_question + 1)
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= 2
    }

    pub fn player_by_connection(&self, connection: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == connection)
    }

    pub fn player_by_name(&self, name: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.name == name)
    }

    /// Game role currently bound to this connection, if any
    pub fn seat_of(&self, connection: &str) -> Option<GameRole> {
        if self.challenger_id.as_deref() == Some(connection) {
            Some(GameRole::Challenger)
        } else if self.moderator_id.as_deref() == Some(connection) {
            Some(GameRole::Moderator)
        } else {
            None
        }
    }

    pub fn all_disconnected(&self) -> bool {
        self.players.iter().all(|p| !p.connected)
    }
}

/// Durable reconnect credential bound to a match seat.
/// Not `Serialize`: the token must never leave the server except in the
/// create/join reply to its owner.
#[derive(Clone)]
pub struct Session {
    pub id: SessionId,
    pub reconnect_token: String,
    pub connection_id: Option<ConnectionId>,
    pub match_id: MatchId,
    pub player_name: String,
    pub role: SeatRole,
    pub is_host: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub connected: bool,
    pub disconnected_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connection_id", &self.connection_id)
            .field("match_id", &self.match_id)
            .field("player_name", &self.player_name)
            .field("role", &self.role)
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}

/// Identifiers handed to a client once, at create/join time
#[derive(Debug, Clone)]
pub struct SessionCredentials {
    pub session_id: SessionId,
    pub reconnect_token: String,
}
