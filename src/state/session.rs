//! Session store: durable reconnect credentials bound to a match seat.
//!
//! A session survives its connection. The reconnect token is a bearer
//! secret, so it is compared in constant time and never logged.

use crate::types::*;
use chrono::{DateTime, Utc};
use rand::RngCore;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::RwLock;

/// Hex-encoded random bytes from the thread-local CSPRNG
fn random_hex(len: usize) -> String {
    let mut buf = vec![0u8; len];
    rand::rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Constant-time byte comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

fn exceeds(since: DateTime<Utc>, now: DateTime<Utc>, limit: Duration) -> bool {
    (now - since)
        .to_std()
        .map(|elapsed| elapsed > limit)
        .unwrap_or(false)
}

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue fresh credentials for a seat. Any older session for the same
    /// seat is revoked, so only the newest token can resume it.
    pub async fn create_session(
        &self,
        connection: &str,
        match_id: &str,
        player_name: &str,
        role: SeatRole,
    ) -> SessionCredentials {
        let now = Utc::now();
        let session = Session {
            id: random_hex(16),
            reconnect_token: random_hex(32),
            connection_id: Some(connection.to_string()),
            match_id: match_id.to_string(),
            player_name: player_name.to_string(),
            role,
            is_host: role == SeatRole::Host,
            created_at: now,
            last_activity: now,
            connected: true,
            disconnected_at: None,
        };
        let credentials = SessionCredentials {
            session_id: session.id.clone(),
            reconnect_token: session.reconnect_token.clone(),
        };

        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| !(s.match_id == match_id && s.player_name == player_name));
        sessions.insert(session.id.clone(), session);

        credentials
    }

    pub async fn find_by_reconnect_token(&self, token: &str) -> Option<Session> {
        if token.is_empty() {
            return None;
        }
        self.sessions
            .read()
            .await
            .values()
            .find(|s| constant_time_eq(s.reconnect_token.as_bytes(), token.as_bytes()))
            .cloned()
    }

    pub async fn find_by_connection(&self, connection: &str) -> Option<Session> {
        self.sessions
            .read()
            .await
            .values()
            .find(|s| s.connection_id.as_deref() == Some(connection))
            .cloned()
    }

    /// Rebind a session to a new live connection
    pub async fn reconnect(&self, session_id: &str, connection: &str) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(session_id)?;
        session.connection_id = Some(connection.to_string());
        session.connected = true;
        session.disconnected_at = None;
        session.last_activity = Utc::now();
        Some(session.clone())
    }

    pub async fn disconnect(&self, session_id: &str) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(session_id)?;
        let now = Utc::now();
        session.connection_id = None;
        session.connected = false;
        session.disconnected_at = Some(now);
        session.last_activity = now;
        Some(session.clone())
    }

    /// Mark the session held by `connection` as disconnected
    pub async fn disconnect_connection(&self, connection: &str) -> Option<Session> {
        let session_id = self.find_by_connection(connection).await?.id;
        self.disconnect(&session_id).await
    }

    pub async fn touch(&self, connection: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions
            .values_mut()
            .find(|s| s.connection_id.as_deref() == Some(connection))
        {
            session.last_activity = Utc::now();
        }
    }

    pub async fn remove_for_match(&self, match_id: &str) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.match_id != match_id);
        before - sessions.len()
    }

    /// Drop sessions whose match is gone or finished (not in `live_matches`),
    /// sessions older than `max_age`, and sessions disconnected for longer
    /// than `grace`. Returns how many were removed.
    pub async fn sweep(
        &self,
        now: DateTime<Utc>,
        live_matches: &HashSet<MatchId>,
        max_age: Duration,
        grace: Duration,
    ) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| {
            if !live_matches.contains(&s.match_id) {
                return false;
            }
            if exceeds(s.created_at, now, max_age) {
                return false;
            }
            match s.disconnected_at {
                Some(at) if !s.connected => !exceeds(at, now, grace),
                _ => true,
            }
        });
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
