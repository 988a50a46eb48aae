//! Gateway events
//!
//! Published on the [`EventBus`](super::EventBus) as devices connect, talk
//! and disconnect. Subscribers are optional; nothing here is persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event types emitted by the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// Charge point WebSocket upgrade succeeded
    ChargePointConnected(ChargePointConnectedEvent),
    /// Charge point connection task finished
    ChargePointDisconnected(ChargePointDisconnectedEvent),
    /// BootNotification accepted
    BootNotification(BootNotificationEvent),
    /// Heartbeat received
    HeartbeatReceived(HeartbeatEvent),
    /// StatusNotification accepted
    StatusChanged(StatusChangedEvent),
    /// A CALL was answered with a CallError
    CallRejected(CallRejectedEvent),
}

impl Event {
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::ChargePointConnected(_) => "charge_point_connected",
            Event::ChargePointDisconnected(_) => "charge_point_disconnected",
            Event::BootNotification(_) => "boot_notification",
            Event::HeartbeatReceived(_) => "heartbeat_received",
            Event::StatusChanged(_) => "status_changed",
            Event::CallRejected(_) => "call_rejected",
        }
    }

    pub fn charge_point_id(&self) -> &str {
        match self {
            Event::ChargePointConnected(e) => &e.charge_point_id,
            Event::ChargePointDisconnected(e) => &e.charge_point_id,
            Event::BootNotification(e) => &e.charge_point_id,
            Event::HeartbeatReceived(e) => &e.charge_point_id,
            Event::StatusChanged(e) => &e.charge_point_id,
            Event::CallRejected(e) => &e.charge_point_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargePointConnectedEvent {
    pub charge_point_id: String,
    pub connection_id: u64,
    pub remote_addr: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargePointDisconnectedEvent {
    pub charge_point_id: String,
    pub connection_id: u64,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootNotificationEvent {
    pub charge_point_id: String,
    pub vendor: String,
    pub model: String,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatEvent {
    pub charge_point_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChangedEvent {
    pub charge_point_id: String,
    pub connector_id: u32,
    pub status: String,
    pub error_code: String,
    pub info: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRejectedEvent {
    pub charge_point_id: String,
    pub unique_id: String,
    pub error_code: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// Event plus delivery metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: Event,
}

impl EventMessage {
    pub fn new(event: Event) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event,
        }
    }
}
