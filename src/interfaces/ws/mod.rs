//! WebSocket interfaces
//!
//! - `ocpp_server`: OCPP 1.6 WebSocket server and per-connection loop
//! - `handshake`: upgrade validation and charge point identity extraction

pub mod handshake;
pub mod ocpp_server;

pub use ocpp_server::{GatewayError, OcppServer};
