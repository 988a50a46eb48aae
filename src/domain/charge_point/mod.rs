//! Charge Point aggregate
//!
//! Contains the ChargePoint entity, its status value objects and the service port.

pub mod model;
pub mod service;

pub use model::{ChargePoint, ChargePointStatus, RegistrationStatus};
pub use service::ChargePointService;
