//! Charge point connection abstraction

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, Notify};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Charge point {0} not connected")]
    NotConnected(String),
    #[error("Connection to charge point {0} is closed")]
    ChannelClosed(String),
}

/// Cheap, cloneable handle to a live session.
///
/// Frames queued through [`SessionHandle::send`] are written by the
/// connection task; [`SessionHandle::close`] asks that task to exit.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    connection_id: u64,
    charge_point_id: String,
    sender: mpsc::UnboundedSender<String>,
    closer: Arc<Notify>,
}

impl SessionHandle {
    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub fn charge_point_id(&self) -> &str {
        &self.charge_point_id
    }

    /// Queue a frame for the charge point
    pub fn send(&self, message: String) -> Result<(), SessionError> {
        self.sender
            .send(message)
            .map_err(|_| SessionError::ChannelClosed(self.charge_point_id.clone()))
    }

    /// Ask the connection task to shut the socket down.
    ///
    /// The request is remembered if the task is not currently waiting.
    pub fn close(&self) {
        self.closer.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Connection-task side of a session.
pub struct SessionReceiver {
    /// Server-initiated frames queued through a [`SessionHandle`].
    pub outbound: mpsc::UnboundedReceiver<String>,
    pub close: CloseSignal,
}

/// Close request raised through [`SessionHandle::close`].
pub struct CloseSignal {
    notify: Arc<Notify>,
}

impl CloseSignal {
    /// Resolves when the session has been closed through a handle.
    pub async fn closed(&self) {
        self.notify.notified().await
    }
}

/// An active WebSocket connection to a charge point
#[derive(Debug)]
pub struct Connection {
    handle: SessionHandle,
    pub remote_addr: Option<SocketAddr>,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Connection {
    pub fn new(
        charge_point_id: impl Into<String>,
        connection_id: u64,
        remote_addr: Option<SocketAddr>,
    ) -> (Self, SessionReceiver) {
        let (sender, outbound) = mpsc::unbounded_channel();
        let closer = Arc::new(Notify::new());
        let now = Utc::now();

        let connection = Self {
            handle: SessionHandle {
                connection_id,
                charge_point_id: charge_point_id.into(),
                sender,
                closer: closer.clone(),
            },
            remote_addr,
            connected_at: now,
            last_activity: now,
        };
        (
            connection,
            SessionReceiver {
                outbound,
                close: CloseSignal { notify: closer },
            },
        )
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn connection_id(&self) -> u64 {
        self.handle.connection_id
    }

    pub fn charge_point_id(&self) -> &str {
        &self.handle.charge_point_id
    }

    /// Update last activity timestamp
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}
