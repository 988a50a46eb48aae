pub mod charge_point;
pub mod error;

// Re-export commonly used types
pub use charge_point::{ChargePoint, ChargePointService, ChargePointStatus, RegistrationStatus};
pub use error::{DomainError, DomainResult};
