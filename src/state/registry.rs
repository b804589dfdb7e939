//! Match registry: sole owner of live matches.
//!
//! Every change to a match goes through a [`MatchPatch`] applied under the
//! registry's write lock, so a broadcast always sees one coherent snapshot.

use crate::error::GameError;
use crate::types::*;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

/// Match codes: uppercase alphanumerics without 0/O and 1/I/L
const CODE_CHARS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
pub const CODE_LENGTH: usize = 6;

fn generate_match_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
        .collect()
}

/// Uniform in [1, 3]
pub fn random_initial_coins() -> i32 {
    rand::rng().random_range(1..=3)
}

/// Partial update for a match. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchPatch {
    pub state: Option<MatchState>,
    pub phase: Option<RoundPhase>,
    pub players: Option<Vec<Player>>,
    pub host_id: Option<ConnectionId>,
    pub challenger_id: Option<ConnectionId>,
    pub moderator_id: Option<ConnectionId>,
    pub challenger_name: Option<String>,
    pub moderator_name: Option<String>,
    pub challenger_score: Option<u32>,
    pub moderator_score: Option<u32>,
    pub challenger_coins: Option<i32>,
    pub current_question: Option<usize>,
    /// Appended to the question buffer, never replacing it
    pub append_questions: Vec<Question>,
    /// Index of a question to flag as reported
    pub reported_question: Option<usize>,
    pub round: Option<RoundState>,
    pub winner: Option<Winner>,
}

impl MatchPatch {
    /// Merge into `m`, bump `version` and stamp activity
    pub fn apply(self, m: &mut Match, now: DateTime<Utc>) {
        if let Some(state) = self.state {
            m.state = state;
        }
        if let Some(phase) = self.phase {
            m.phase = phase;
        }
        if let Some(players) = self.players {
            debug_assert!(players.len() <= 2);
            m.players = players;
        }
        if let Some(host_id) = self.host_id {
            m.host_id = host_id;
        }
        if let Some(id) = self.challenger_id {
            m.challenger_id = Some(id);
        }
        if let Some(id) = self.moderator_id {
            m.moderator_id = Some(id);
        }
        if let Some(name) = self.challenger_name {
            m.challenger_name = Some(name);
        }
        if let Some(name) = self.moderator_name {
            m.moderator_name = Some(name);
        }
        if let Some(score) = self.challenger_score {
            m.challenger_score = score;
        }
        if let Some(score) = self.moderator_score {
            m.moderator_score = score;
        }
        if let Some(coins) = self.challenger_coins {
            m.challenger_coins = coins;
        }
        if let Some(idx) = self.reported_question {
            if let Some(q) = m.questions.get_mut(idx) {
                q.reported = true;
            }
        }
        m.questions.extend(self.append_questions);
        if let Some(idx) = self.current_question {
            // Monotonic
            m.current_question = m.current_question.max(idx);
        }
        if let Some(round) = self.round {
            m.round = round;
        }
        if let Some(winner) = self.winner {
            if m.state == MatchState::Finished && m.winner.is_none() {
                m.winner = Some(winner);
            }
        }
        m.version += 1;
        m.last_activity = now;
    }
}

/// Owns all live matches, plus a reverse index from connection to match
#[derive(Default)]
pub struct MatchRegistry {
    matches: RwLock<HashMap<MatchId, Match>>,
    connections: RwLock<HashMap<ConnectionId, MatchId>>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a match in `lobby` with the host as its only player
    pub async fn create_match(
        &self,
        host_connection: &str,
        host_name: &str,
        settings: MatchSettings,
        questions: Vec<Question>,
    ) -> Match {
        let now = Utc::now();
        let initial_coins = random_initial_coins();

        let mut matches = self.matches.write().await;
        let id = loop {
            let code = generate_match_code();
            if !matches.contains_key(&code) {
                break code;
            }
        };

        let new_match = Match {
            id: id.clone(),
            version: 1,
            state: MatchState::Lobby,
            phase: RoundPhase::Answering,
            settings,
            host_id: host_connection.to_string(),
            host_name: host_name.to_string(),
            players: vec![Player {
                id: host_connection.to_string(),
                name: host_name.to_string(),
                role: SeatRole::Host,
                game_role: None,
                connected: true,
                last_seen: now,
            }],
            challenger_id: None,
            moderator_id: None,
            challenger_name: None,
            moderator_name: None,
            challenger_score: 0,
            moderator_score: 0,
            challenger_coins: initial_coins,
            initial_coins,
            current_question: 0,
            questions,
            round: RoundState::default(),
            winner: None,
            created_at: now,
            last_activity: now,
        };

        matches.insert(id.clone(), new_match.clone());
        drop(matches);

        self.connections
            .write()
            .await
            .insert(host_connection.to_string(), id);

        new_match
    }

    /// Case-insensitive lookup
    pub async fn get_match(&self, id: &str) -> Option<Match> {
        self.matches
            .read()
            .await
            .get(&id.trim().to_uppercase())
            .cloned()
    }

    /// Merge `patch` into the match and bump its version
    pub async fn update(&self, id: &str, patch: MatchPatch) -> Result<Match, GameError> {
        let mut matches = self.matches.write().await;
        let m = matches
            .get_mut(&id.trim().to_uppercase())
            .ok_or_else(|| GameError::match_not_found(id))?;
        patch.apply(m, Utc::now());
        Ok(m.clone())
    }

    /// Compute a patch from the current snapshot and apply it, all under one
    /// write lock. `publish` runs before the lock is released so broadcasts
    /// for a match leave in the order their updates were applied.
    ///
    /// Returns `Ok(None)` when `compute` decided there is nothing to do.
    pub async fn mutate<F, P>(
        &self,
        id: &str,
        compute: F,
        publish: P,
    ) -> Result<Option<Match>, GameError>
    where
        F: FnOnce(&Match) -> Result<Option<MatchPatch>, GameError>,
        P: FnOnce(&Match),
    {
        let result = self
            .mutate_with(
                id,
                |m| Ok(compute(m)?.map(|patch| (patch, ()))),
                |m, _| publish(m),
            )
            .await?;
        Ok(result.map(|(m, _)| m))
    }

    /// [`mutate`](Self::mutate) where `compute` also hands a value to
    /// `publish` and back to the caller
    pub async fn mutate_with<T, F, P>(
        &self,
        id: &str,
        compute: F,
        publish: P,
    ) -> Result<Option<(Match, T)>, GameError>
    where
        F: FnOnce(&Match) -> Result<Option<(MatchPatch, T)>, GameError>,
        P: FnOnce(&Match, &T),
    {
        let mut matches = self.matches.write().await;
        let m = matches
            .get_mut(&id.trim().to_uppercase())
            .ok_or_else(|| GameError::match_not_found(id))?;

        let Some((patch, extra)) = compute(m)? else {
            return Ok(None);
        };
        patch.apply(m, Utc::now());
        publish(m, &extra);
        Ok(Some((m.clone(), extra)))
    }

    pub async fn delete_match(&self, id: &str) -> Option<Match> {
        let id = id.trim().to_uppercase();
        let removed = self.matches.write().await.remove(&id);
        if removed.is_some() {
            self.connections.write().await.retain(|_, m| *m != id);
        }
        removed
    }

    pub async fn bind_connection(&self, connection: &str, match_id: &str) {
        self.connections
            .write()
            .await
            .insert(connection.to_string(), match_id.to_uppercase());
    }

    pub async fn unbind_connection(&self, connection: &str) -> Option<MatchId> {
        self.connections.write().await.remove(connection)
    }

    pub async fn match_for_connection(&self, connection: &str) -> Option<MatchId> {
        self.connections.read().await.get(connection).cloned()
    }

    pub async fn list(&self) -> Vec<Match> {
        self.matches.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.matches.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.matches.read().await.is_empty()
    }

    /// Delete matches where nobody is connected and nothing happened for `timeout`
    pub async fn sweep_idle(&self, now: DateTime<Utc>, timeout: Duration) -> Vec<MatchId> {
        let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);
        let expired: Vec<MatchId> = self
            .matches
            .read()
            .await
            .values()
            .filter(|m| m.all_disconnected() && now - m.last_activity > timeout)
            .map(|m| m.id.clone())
            .collect();

        for id in &expired {
            self.delete_match(id).await;
        }
        expired
    }
}
