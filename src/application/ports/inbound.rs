//! Inbound ports — contracts for handling charge point CALLs
//!
//! Each supported OCPP action is implemented as an [`ActionHandler`] with its
//! own request and response types. The dispatcher owns the name → handler
//! table; handlers never see raw frames.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::domain::DomainError;
use crate::ocpp::{ErrorCode, FrameError, OcppFrame};

// ── CallContext ────────────────────────────────────────────────

/// Per-CALL context handed to action handlers.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub charge_point_id: String,
    pub unique_id: String,
    pub action: String,
    pub received_at: DateTime<Utc>,
}

impl CallContext {
    pub fn new(
        charge_point_id: impl Into<String>,
        unique_id: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            charge_point_id: charge_point_id.into(),
            unique_id: unique_id.into(),
            action: action.into(),
            received_at: Utc::now(),
        }
    }
}

// ── ActionHandler ──────────────────────────────────────────────

/// Handler for one charge-point-initiated OCPP action.
#[async_trait]
pub trait ActionHandler: Send + Sync + 'static {
    /// Wire name of the action, e.g. `"Heartbeat"`.
    const ACTION: &'static str;

    type Request: DeserializeOwned + Send + 'static;
    type Response: Serialize + Send + 'static;

    async fn handle(
        &self,
        ctx: &CallContext,
        request: Self::Request,
    ) -> Result<Self::Response, ActionError>;
}

// ── ActionError ────────────────────────────────────────────────

/// Failure of a CALL, reported to the device as a CallError.
#[derive(Debug, Error)]
pub enum ActionError {
    /// Frame or payload is malformed.
    #[error("{0}")]
    FormationViolation(String),
    /// Action or message type the gateway does not handle.
    #[error("{0}")]
    NotSupported(String),
    /// Downstream service failure.
    #[error("{0}")]
    Internal(String),
}

impl ActionError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::FormationViolation(_) => ErrorCode::FormationViolation,
            Self::NotSupported(_) => ErrorCode::NotSupported,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// CallError frame answering `unique_id`.
    pub fn into_frame(self, unique_id: impl Into<String>) -> OcppFrame {
        let code = self.error_code();
        OcppFrame::error(unique_id, code, self.to_string())
    }
}

impl From<FrameError> for ActionError {
    fn from(e: FrameError) -> Self {
        match e.error_code() {
            ErrorCode::NotSupported => Self::NotSupported(e.to_string()),
            _ => Self::FormationViolation(e.to_string()),
        }
    }
}

impl From<DomainError> for ActionError {
    fn from(e: DomainError) -> Self {
        Self::Internal(e.to_string())
    }
}
