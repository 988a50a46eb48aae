//! OCPP-J wire layer: framing, error codes and payload shapes

pub mod error_code;
pub mod frame;
pub mod messages;

pub use error_code::ErrorCode;
pub use frame::{decode_payload, FrameError, MessageTypeId, OcppFrame};
pub use messages::{
    action, BootNotificationRequest, BootNotificationResponse, HeartbeatRequest,
    HeartbeatResponse, StatusNotificationRequest, StatusNotificationResponse,
};

/// WebSocket subprotocol negotiated with charge points.
pub const OCPP16_SUBPROTOCOL: &str = "ocpp1.6";
