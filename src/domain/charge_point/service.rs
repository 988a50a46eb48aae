//! Charge point service port
//!
//! The gateway never owns charge point persistence. It calls into whatever
//! implements [`ChargePointService`]: a database-backed service in the full
//! management system, [`InMemoryChargePointService`] for standalone runs.
//!
//! [`InMemoryChargePointService`]: crate::infrastructure::storage::InMemoryChargePointService

use async_trait::async_trait;

use super::model::{ChargePoint, ChargePointStatus};
use crate::domain::DomainResult;

/// Charge point operations the gateway depends on.
///
/// Implementations must be safe to call concurrently from many connection
/// tasks and are expected to be idempotent under retry.
#[async_trait]
pub trait ChargePointService: Send + Sync {
    /// Register a charge point, creating or replacing its record.
    async fn register(&self, charge_point: ChargePoint) -> DomainResult<()>;

    /// Update the status of a charge point.
    async fn update_status(&self, charge_point_id: &str, status: ChargePointStatus)
        -> DomainResult<()>;

    /// Fetch a charge point by identity.
    async fn get(&self, charge_point_id: &str) -> DomainResult<Option<ChargePoint>>;
}
