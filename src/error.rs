use thiserror::Error;

/// Errors surfaced to the acting connection as an `error` event.
/// Never broadcast to a match room.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GameError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Match is already full")]
    MatchFull,

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    WrongState(String),

    #[error("Only {got} of {needed} questions available. Try a broader category or difficulty.")]
    InsufficientQuestions { got: usize, needed: usize },

    #[error("Reconnect token is invalid or expired. Please rejoin the match.")]
    InvalidReconnectToken,

    #[error("Something went wrong on the server")]
    Internal,
}

impl GameError {
    /// Stable machine-readable code sent alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            GameError::Validation(_) => "VALIDATION_FAILED",
            GameError::NotFound(_) => "MATCH_NOT_FOUND",
            GameError::MatchFull => "MATCH_FULL",
            GameError::Unauthorized(_) => "UNAUTHORIZED",
            GameError::WrongState(_) => "WRONG_STATE",
            GameError::InsufficientQuestions { .. } => "INSUFFICIENT_QUESTIONS",
            GameError::InvalidReconnectToken => "RECONNECT_FAILED",
            GameError::Internal => "INTERNAL_ERROR",
        }
    }

    pub fn match_not_found(match_id: &str) -> Self {
        GameError::NotFound(format!("Match {}", match_id))
    }
}
