//! HTTP endpoints for status checks and debugging.

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::types::*;
use crate::ws;

/// HTTP routes plus the WebSocket endpoint
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/health", get(health))
        .route("/debug/matches", get(list_matches))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub timestamp: String,
}

/// Public view of a player. Connection ids and credentials stay server-side.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummary {
    pub name: String,
    pub role: SeatRole,
    pub game_role: Option<GameRole>,
    pub connected: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    pub id: MatchId,
    pub state: MatchState,
    pub phase: RoundPhase,
    pub players: Vec<PlayerSummary>,
    pub challenger_score: u32,
    pub moderator_score: u32,
    pub challenger_coins: i32,
    pub current_question: usize,
    pub question_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl From<&Match> for MatchSummary {
    fn from(m: &Match) -> Self {
        Self {
            id: m.id.clone(),
            state: m.state,
            phase: m.phase,
            players: m
                .players
                .iter()
                .map(|p| PlayerSummary {
                    name: p.name.clone(),
                    role: p.role,
                    game_role: p.game_role,
                    connected: p.connected,
                })
                .collect(),
            challenger_score: m.challenger_score,
            moderator_score: m.moderator_score,
            challenger_coins: m.challenger_coins,
            current_question: m.current_question,
            question_count: m.questions.len(),
            created_at: m.created_at,
            last_activity: m.last_activity,
        }
    }
}

/// GET /
pub async fn status() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "Trust or Doubt server running",
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// GET /health
pub async fn health() -> &'static str {
    "OK"
}

/// List live matches, newest first.
///
/// GET /debug/matches
pub async fn list_matches(State(state): State<Arc<AppState>>) -> Json<Vec<MatchSummary>> {
    let mut matches = state.registry.list().await;
    matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Json(matches.iter().map(MatchSummary::from).collect())
}
