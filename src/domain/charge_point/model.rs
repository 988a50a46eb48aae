//! Charge Point domain entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OCPP 1.6 charge point / connector status as reported by StatusNotification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChargePointStatus {
    Available,
    Preparing,
    Charging,
    SuspendedEV,
    SuspendedEVSE,
    Finishing,
    Reserved,
    Unavailable,
    Faulted,
}

impl Default for ChargePointStatus {
    fn default() -> Self {
        Self::Available
    }
}

impl std::fmt::Display for ChargePointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Available => "Available",
            Self::Preparing => "Preparing",
            Self::Charging => "Charging",
            Self::SuspendedEV => "SuspendedEV",
            Self::SuspendedEVSE => "SuspendedEVSE",
            Self::Finishing => "Finishing",
            Self::Reserved => "Reserved",
            Self::Unavailable => "Unavailable",
            Self::Faulted => "Faulted",
        };
        f.write_str(s)
    }
}

/// Registration state granted by the central system on BootNotification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationStatus {
    Accepted,
    Pending,
    Rejected,
}

impl Default for RegistrationStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Charge Point entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargePoint {
    /// Identity the charge point connects with
    pub id: String,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
    pub status: ChargePointStatus,
    pub registration_status: RegistrationStatus,
    /// Last heartbeat (or boot) received
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// When the last accepted BootNotification arrived
    pub registered_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ChargePoint {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            vendor: None,
            model: None,
            serial_number: None,
            firmware_version: None,
            status: ChargePointStatus::default(),
            registration_status: RegistrationStatus::default(),
            last_heartbeat: None,
            registered_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Mark the record as accepted by a BootNotification.
    pub fn accept_registration(&mut self) {
        let now = Utc::now();
        self.registration_status = RegistrationStatus::Accepted;
        self.status = ChargePointStatus::Available;
        self.registered_at = Some(now);
        self.last_heartbeat = Some(now);
        self.updated_at = now;
    }

    pub fn set_status(&mut self, status: ChargePointStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn update_heartbeat(&mut self) {
        let now = Utc::now();
        self.last_heartbeat = Some(now);
        self.updated_at = now;
    }
}
