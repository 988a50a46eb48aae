//! OCPP message handlers

pub mod ocpp;

pub use ocpp::{BootNotificationHandler, HeartbeatHandler, StatusNotificationHandler};
