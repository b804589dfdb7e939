//! Connection hub: one outbound channel per socket, grouped into match rooms.
//!
//! Uses a std mutex that is never held across an await, so emitting is
//! synchronous and can run while the registry's write lock is held. That
//! keeps a room's messages in the order their updates were applied.

use crate::protocol::ServerMessage;
use crate::types::{ConnectionId, MatchId};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;

pub type ConnectionSender = mpsc::UnboundedSender<ServerMessage>;

#[derive(Default)]
struct HubInner {
    connections: HashMap<ConnectionId, ConnectionSender>,
    rooms: HashMap<MatchId, HashSet<ConnectionId>>,
}

#[derive(Default)]
pub struct ConnectionHub {
    inner: Mutex<HubInner>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        // A panic while holding the lock cannot leave the maps inconsistent
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a connection and get the receiving end of its outbound queue
    pub fn register(&self, connection: &str) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().connections.insert(connection.to_string(), tx);
        rx
    }

    /// Drop a connection and remove it from every room
    pub fn unregister(&self, connection: &str) {
        let mut inner = self.lock();
        inner.connections.remove(connection);
        inner.rooms.retain(|_, members| {
            members.remove(connection);
            !members.is_empty()
        });
    }

    pub fn join_room(&self, match_id: &str, connection: &str) {
        self.lock()
            .rooms
            .entry(match_id.to_string())
            .or_default()
            .insert(connection.to_string());
    }

    pub fn leave_room(&self, match_id: &str, connection: &str) {
        let mut inner = self.lock();
        if let Some(members) = inner.rooms.get_mut(match_id) {
            members.remove(connection);
            if members.is_empty() {
                inner.rooms.remove(match_id);
            }
        }
    }

    pub fn close_room(&self, match_id: &str) {
        self.lock().rooms.remove(match_id);
    }

    pub fn room_members(&self, match_id: &str) -> Vec<ConnectionId> {
        self.lock()
            .rooms
            .get(match_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_registered(&self, connection: &str) -> bool {
        self.lock().connections.contains_key(connection)
    }

    /// Send to a single connection. Returns false if it is gone.
    pub fn emit_to(&self, connection: &str, msg: ServerMessage) -> bool {
        match self.lock().connections.get(connection) {
            Some(tx) => tx.send(msg).is_ok(),
            None => false,
        }
    }

    pub fn emit_to_room(&self, match_id: &str, msg: &ServerMessage) {
        self.emit_filtered(match_id, None, msg);
    }

    pub fn emit_to_room_except(&self, match_id: &str, except: &str, msg: &ServerMessage) {
        self.emit_filtered(match_id, Some(except), msg);
    }

    fn emit_filtered(&self, match_id: &str, except: Option<&str>, msg: &ServerMessage) {
        let inner = self.lock();
        let Some(members) = inner.rooms.get(match_id) else {
            return;
        };
        for connection in members {
            if Some(connection.as_str()) == except {
                continue;
            }
            if let Some(tx) = inner.connections.get(connection) {
                // Closed receivers are cleaned up when their socket loop exits
                let _ = tx.send(msg.clone());
            }
        }
    }
}
