//! Session registry — active charge point connections keyed by identity

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info, warn};

use super::connection::{Connection, SessionError, SessionHandle};

/// Session displaced by a newer connection with the same identity.
#[derive(Debug, Clone, PartialEq)]
pub struct EvictedSession {
    pub charge_point_id: String,
    pub connection_id: u64,
    pub connected_at: DateTime<Utc>,
}

/// Thread-safe registry of active OCPP charge point sessions
pub struct SessionRegistry {
    sessions: DashMap<String, Connection>,
    next_id: AtomicU64,
}

/// Shared, reference-counted session registry
pub type SharedSessionRegistry = Arc<SessionRegistry>;

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Wrap in `Arc` for shared ownership
    pub fn shared() -> SharedSessionRegistry {
        Arc::new(Self::new())
    }

    /// Allocate a connection id; ids are never reused.
    pub fn next_connection_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a connection, replacing and closing any existing session
    /// for the same charge point.
    pub fn add(&self, connection: Connection) -> Option<EvictedSession> {
        let charge_point_id = connection.charge_point_id().to_string();
        let connection_id = connection.connection_id();

        let previous = self.sessions.insert(charge_point_id.clone(), connection);
        self.record_count();

        match previous {
            Some(old) => {
                warn!(
                    charge_point_id = charge_point_id.as_str(),
                    connection_id,
                    evicted_connection_id = old.connection_id(),
                    "Replacing existing charge point session"
                );
                old.handle().close();
                Some(EvictedSession {
                    charge_point_id,
                    connection_id: old.connection_id(),
                    connected_at: old.connected_at,
                })
            }
            None => {
                info!(
                    charge_point_id = charge_point_id.as_str(),
                    connection_id, "Registered charge point session"
                );
                None
            }
        }
    }

    /// Remove the session for `charge_point_id` if it is still the one
    /// identified by `connection_id`.
    pub fn remove(&self, charge_point_id: &str, connection_id: u64) -> bool {
        let removed = self
            .sessions
            .remove_if(charge_point_id, |_, conn| conn.connection_id() == connection_id)
            .is_some();

        if removed {
            self.record_count();
            info!(charge_point_id, connection_id, "Unregistered charge point session");
        } else {
            debug!(
                charge_point_id,
                connection_id, "Session already replaced or removed"
            );
        }
        removed
    }

    pub fn lookup(&self, charge_point_id: &str) -> Option<SessionHandle> {
        self.sessions
            .get(charge_point_id)
            .map(|conn| conn.handle().clone())
    }

    /// Send a message to a specific charge point
    pub fn send_to(&self, charge_point_id: &str, message: String) -> Result<(), SessionError> {
        match self.sessions.get(charge_point_id) {
            Some(conn) => conn.handle().send(message),
            None => Err(SessionError::NotConnected(charge_point_id.to_string())),
        }
    }

    /// Update last activity of the session identified by `connection_id`.
    pub fn touch(&self, charge_point_id: &str, connection_id: u64) -> bool {
        match self.sessions.get_mut(charge_point_id) {
            Some(mut conn) if conn.connection_id() == connection_id => {
                conn.touch();
                true
            }
            _ => false,
        }
    }

    /// Check if a charge point is currently connected
    pub fn is_connected(&self, charge_point_id: &str) -> bool {
        self.sessions.contains_key(charge_point_id)
    }

    /// Get all connected charge point IDs
    pub fn connected_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|r| r.key().clone()).collect()
    }

    /// Number of active sessions
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove every session and ask each connection task to close.
    ///
    /// Returns the number of sessions closed.
    pub fn close_all(&self) -> usize {
        let ids = self.connected_ids();
        let mut closed = 0;
        for id in ids {
            if let Some((_, conn)) = self.sessions.remove(&id) {
                conn.handle().close();
                closed += 1;
            }
        }
        self.record_count();
        if closed > 0 {
            info!(sessions = closed, "Closed all charge point sessions");
        }
        closed
    }

    fn record_count(&self) {
        metrics::gauge!("ocpp_connected_charge_points").set(self.sessions.len() as f64);
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
