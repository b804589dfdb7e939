pub mod hub;
pub mod reconnect;
pub mod registry;
pub mod rules;
pub mod session;

pub use hub::ConnectionHub;
pub use registry::{MatchPatch, MatchRegistry};
pub use session::SessionStore;

use crate::config::ServerConfig;
use crate::error::GameError;
use crate::protocol::ServerMessage;
use crate::questions::{Blocklist, QuestionPipeline, QuestionRequest, QuestionSource};
use crate::types::*;
use std::collections::HashSet;
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub registry: MatchRegistry,
    pub sessions: SessionStore,
    pub hub: ConnectionHub,
    pub questions: Arc<dyn QuestionSource>,
    pub blocklist: Arc<Blocklist>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        questions: Arc<dyn QuestionSource>,
        blocklist: Arc<Blocklist>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry: MatchRegistry::new(),
            sessions: SessionStore::new(),
            hub: ConnectionHub::new(),
            questions,
            blocklist,
        }
    }

    /// State backed by the built-in question pool only, with an in-memory blocklist
    pub fn offline(config: ServerConfig) -> Self {
        let blocklist = Arc::new(Blocklist::in_memory());
        let questions = Arc::new(QuestionPipeline::new(blocklist.clone()));
        Self::new(config, questions, blocklist)
    }

    /// Send the current snapshot to everyone in the match's room
    pub fn announce_update(&self, m: &Match) {
        self.hub.emit_to_room(
            &m.id,
            &ServerMessage::MatchUpdated {
                snapshot: m.clone(),
            },
        );
    }

    /// Apply a rule to a match and broadcast `match-updated` to its room
    pub async fn commit<F>(&self, match_id: &str, compute: F) -> Result<Option<Match>, GameError>
    where
        F: FnOnce(&Match) -> Result<Option<MatchPatch>, GameError>,
    {
        self.registry
            .mutate(match_id, compute, |m| self.announce_update(m))
            .await
    }

    /// Like [`commit`](Self::commit) with custom announcements. `compute`
    /// can pass a value along to `publish`, which runs under the registry
    /// lock and must only emit through the hub.
    pub async fn commit_with<T, F, P>(
        &self,
        match_id: &str,
        compute: F,
        publish: P,
    ) -> Result<Option<(Match, T)>, GameError>
    where
        F: FnOnce(&Match) -> Result<Option<(MatchPatch, T)>, GameError>,
        P: FnOnce(&Match, &T),
    {
        self.registry.mutate_with(match_id, compute, publish).await
    }

    /// Fetch more questions when fewer than the refill threshold remain ahead.
    ///
    /// Runs before the action that needs them: the fetch may take seconds and
    /// must not sit between reading a match and patching it.
    pub async fn top_up_questions(&self, match_id: &str) -> Result<usize, GameError> {
        let m = self
            .registry
            .get_match(match_id)
            .await
            .ok_or_else(|| GameError::match_not_found(match_id))?;
        if m.state == MatchState::Finished
            || m.questions_ahead() >= self.config.question_refill_threshold
        {
            return Ok(0);
        }

        let request = QuestionRequest::for_match(&m, self.config.question_refill_batch);
        let fresh = self.questions.get_questions(request).await;
        if fresh.is_empty() {
            tracing::warn!("Match {}: question refill returned nothing", m.id);
            return Ok(0);
        }

        // Another refill may have landed while this one was in flight.
        // Only the questions still ahead count: a replayed pool may repeat
        // ones already played.
        let updated = self
            .commit(&m.id, |current| {
                let known: HashSet<&str> = current
                    .questions
                    .iter()
                    .skip(current.current_question)
                    .map(|q| q.id.as_str())
                    .collect();
                let append: Vec<Question> = fresh
                    .into_iter()
                    .filter(|q| !known.contains(q.id.as_str()))
                    .collect();
                if append.is_empty() {
                    return Ok(None);
                }
                Ok(Some(MatchPatch {
                    append_questions: append,
                    ..Default::default()
                }))
            })
            .await?;

        let added = updated
            .map(|after| after.questions.len() - m.questions.len())
            .unwrap_or(0);
        tracing::info!("Match {}: refilled {} questions", m.id, added);
        Ok(added)
    }

    /// Delete a match together with its sessions and room
    pub async fn remove_match(&self, match_id: &str) -> bool {
        let removed = self.registry.delete_match(match_id).await;
        let sessions = self.sessions.remove_for_match(match_id).await;
        self.hub.close_room(match_id);
        if removed.is_some() {
            tracing::info!("Removed match {} ({} sessions)", match_id, sessions);
        }
        removed.is_some()
    }
}
