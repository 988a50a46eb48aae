//! OCPP-J message framing
//!
//! The transport envelope shared by every OCPP-J action:
//!
//! - **Call**       `[2, "<uniqueId>", "<action>", {<payload>}]`
//! - **CallResult** `[3, "<uniqueId>", {<payload>}]`
//! - **CallError**  `[4, "<uniqueId>", "<errorCode>", "<errorDescription>", {<errorDetails>}]`
//!
//! Parsing and serialization are pure functions; nothing here touches I/O.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use super::ErrorCode;

// ── MessageTypeId ──────────────────────────────────────────────

/// The numeric role of a frame, first element of the array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTypeId {
    Call = 2,
    CallResult = 3,
    CallError = 4,
}

impl MessageTypeId {
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            2 => Some(Self::Call),
            3 => Some(Self::CallResult),
            4 => Some(Self::CallError),
            _ => None,
        }
    }

    pub fn as_u64(self) -> u64 {
        self as u64
    }
}

// ── OcppFrame ──────────────────────────────────────────────────

/// A parsed OCPP-J frame.
#[derive(Debug, Clone, PartialEq)]
pub enum OcppFrame {
    /// `[2, uniqueId, action, payload]`
    Call {
        unique_id: String,
        action: String,
        payload: Value,
    },
    /// `[3, uniqueId, payload]`
    CallResult { unique_id: String, payload: Value },
    /// `[4, uniqueId, errorCode, errorDescription, errorDetails]`
    CallError {
        unique_id: String,
        error_code: String,
        error_description: String,
        error_details: Value,
    },
}

impl OcppFrame {
    // ── Parsing ────────────────────────────────────────────

    /// Decode raw frame text.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| FrameError::InvalidJson(e.to_string()))?;
        let arr = match value {
            Value::Array(arr) => arr,
            _ => return Err(FrameError::NotAnArray),
        };

        let msg_type = arr
            .first()
            .ok_or(FrameError::EmptyArray)?
            .as_u64()
            .ok_or(FrameError::InvalidMessageType)?;

        match MessageTypeId::from_u64(msg_type) {
            Some(MessageTypeId::Call) => Self::parse_call(arr),
            Some(MessageTypeId::CallResult) => Self::parse_call_result(arr),
            Some(MessageTypeId::CallError) => Self::parse_call_error(arr),
            None => Err(FrameError::UnknownMessageType(msg_type)),
        }
    }

    fn parse_call(arr: Vec<Value>) -> Result<Self, FrameError> {
        let [_, unique_id, action, payload, ..] = expect_fields::<4>(arr)?;
        Ok(Self::Call {
            unique_id: into_string(unique_id, "uniqueId must be a string")?,
            action: into_string(action, "action must be a string")?,
            payload,
        })
    }

    fn parse_call_result(arr: Vec<Value>) -> Result<Self, FrameError> {
        let [_, unique_id, payload, ..] = expect_fields::<3>(arr)?;
        Ok(Self::CallResult {
            unique_id: into_string(unique_id, "uniqueId must be a string")?,
            payload,
        })
    }

    fn parse_call_error(arr: Vec<Value>) -> Result<Self, FrameError> {
        let mut fields = arr.into_iter().skip(1);
        let unique_id = into_string(
            fields.next().ok_or(FrameError::MissingFields { expected: 4, got: 1 })?,
            "uniqueId must be a string",
        )?;
        let error_code = match fields.next() {
            Some(Value::String(code)) => code,
            Some(_) => return Err(FrameError::FieldTypeMismatch("errorCode must be a string")),
            None => return Err(FrameError::MissingFields { expected: 4, got: 2 }),
        };
        let error_description = match fields.next() {
            Some(Value::String(description)) => description,
            _ => String::new(),
        };
        let error_details = fields.next().unwrap_or_else(empty_object);

        Ok(Self::CallError {
            unique_id,
            error_code,
            error_description,
            error_details,
        })
    }

    /// Best-effort unique id of a frame that may not parse.
    ///
    /// Used to keep error responses correlated; returns an empty string when
    /// nothing usable is found.
    pub fn recover_unique_id(text: &str) -> String {
        serde_json::from_str::<Value>(text)
            .ok()
            .and_then(|v| v.get(1).and_then(Value::as_str).map(String::from))
            .unwrap_or_default()
    }

    // ── Construction ───────────────────────────────────────

    /// Build a `CallResult` carrying a typed payload.
    ///
    /// A payload that cannot be represented as JSON turns into an
    /// `InternalError` frame for the same unique id.
    pub fn result<T: Serialize>(unique_id: impl Into<String>, payload: &T) -> Self {
        let unique_id = unique_id.into();
        match serde_json::to_value(payload) {
            Ok(payload) => Self::CallResult { unique_id, payload },
            Err(e) => Self::error(
                unique_id,
                ErrorCode::InternalError,
                format!("Failed to serialize response: {}", e),
            ),
        }
    }

    /// Build a `CallError` for a given unique id.
    pub fn error(
        unique_id: impl Into<String>,
        error_code: ErrorCode,
        error_description: impl Into<String>,
    ) -> Self {
        Self::CallError {
            unique_id: unique_id.into(),
            error_code: error_code.as_str().to_string(),
            error_description: error_description.into(),
            error_details: empty_object(),
        }
    }

    // ── Serialization ──────────────────────────────────────

    /// Serialize this frame to its wire text.
    pub fn serialize(&self) -> String {
        let arr = match self {
            Self::Call {
                unique_id,
                action,
                payload,
            } => vec![
                Value::from(MessageTypeId::Call.as_u64()),
                Value::String(unique_id.clone()),
                Value::String(action.clone()),
                payload.clone(),
            ],
            Self::CallResult { unique_id, payload } => vec![
                Value::from(MessageTypeId::CallResult.as_u64()),
                Value::String(unique_id.clone()),
                payload.clone(),
            ],
            Self::CallError {
                unique_id,
                error_code,
                error_description,
                error_details,
            } => vec![
                Value::from(MessageTypeId::CallError.as_u64()),
                Value::String(unique_id.clone()),
                Value::String(error_code.clone()),
                Value::String(error_description.clone()),
                error_details.clone(),
            ],
        };
        Value::Array(arr).to_string()
    }

    // ── Helpers ────────────────────────────────────────────

    pub fn message_type(&self) -> MessageTypeId {
        match self {
            Self::Call { .. } => MessageTypeId::Call,
            Self::CallResult { .. } => MessageTypeId::CallResult,
            Self::CallError { .. } => MessageTypeId::CallError,
        }
    }

    pub fn unique_id(&self) -> &str {
        match self {
            Self::Call { unique_id, .. }
            | Self::CallResult { unique_id, .. }
            | Self::CallError { unique_id, .. } => unique_id,
        }
    }

}

/// Decode an action payload into its typed shape.
pub fn decode_payload<T: DeserializeOwned>(payload: &Value) -> Result<T, FrameError> {
    T::deserialize(payload).map_err(|e| FrameError::InvalidPayload(e.to_string()))
}

fn expect_fields<const N: usize>(arr: Vec<Value>) -> Result<[Value; N], FrameError> {
    let got = arr.len();
    if got < N {
        return Err(FrameError::MissingFields { expected: N, got });
    }
    let mut fields = arr.into_iter();
    Ok(std::array::from_fn(|_| fields.next().unwrap_or(Value::Null)))
}

fn into_string(value: Value, what: &'static str) -> Result<String, FrameError> {
    match value {
        Value::String(s) => Ok(s),
        _ => Err(FrameError::FieldTypeMismatch(what)),
    }
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

// ── Errors ─────────────────────────────────────────────────────

/// Why a frame or payload could not be decoded.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
    #[error("OCPP message must be a JSON array")]
    NotAnArray,
    #[error("Empty OCPP message array")]
    EmptyArray,
    #[error("Message type is not a number")]
    InvalidMessageType,
    #[error("Unknown message type: {0}")]
    UnknownMessageType(u64),
    #[error("Expected at least {expected} fields, got {got}")]
    MissingFields { expected: usize, got: usize },
    #[error("Field type mismatch: {0}")]
    FieldTypeMismatch(&'static str),
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl FrameError {
    /// The CallError code reported back to the device.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::UnknownMessageType(_) => ErrorCode::NotSupported,
            _ => ErrorCode::FormationViolation,
        }
    }
}
