//! Background housekeeping: idle match and stale session sweeps, plus the
//! delayed removal of finished matches.

use crate::state::AppState;
use crate::types::{MatchId, MatchState};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub matches: usize,
    pub sessions: usize,
}

/// One pass over matches and sessions
pub async fn sweep_once(state: &AppState) -> SweepReport {
    let now = Utc::now();

    let idle = state
        .registry
        .sweep_idle(now, state.config.match_idle_timeout)
        .await;
    for id in &idle {
        state.sessions.remove_for_match(id).await;
        state.hub.close_room(id);
    }

    let live: HashSet<MatchId> = state
        .registry
        .list()
        .await
        .into_iter()
        .filter(|m| m.state != MatchState::Finished)
        .map(|m| m.id)
        .collect();
    let sessions = state
        .sessions
        .sweep(
            now,
            &live,
            state.config.session_max_age,
            state.config.session_grace,
        )
        .await;

    SweepReport {
        matches: idle.len(),
        sessions,
    }
}

/// Spawn the periodic sweeper. Abort the handle on shutdown.
pub fn spawn_sweeper(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.cleanup_interval);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            let report = sweep_once(&state).await;
            if report != SweepReport::default() {
                tracing::info!(
                    "Cleanup removed {} idle matches and {} stale sessions",
                    report.matches,
                    report.sessions
                );
            }
        }
    })
}

/// Remove a finished match after the configured grace period, leaving
/// clients time to show the result
pub fn schedule_match_removal(state: Arc<AppState>, match_id: MatchId) -> JoinHandle<()> {
    let delay = state.config.finished_match_ttl;
    tracing::debug!("Match {} will be removed in {:?}", match_id, delay);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        state.remove_match(&match_id).await;
    })
}
