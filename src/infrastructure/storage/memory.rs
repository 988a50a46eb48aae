//! In-memory charge point service

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::domain::{ChargePoint, ChargePointService, ChargePointStatus, DomainResult};

/// Charge point store for standalone runs and tests.
///
/// `update_status` for an identity that never booted creates a pending
/// record instead of failing, so devices may talk before BootNotification.
pub struct InMemoryChargePointService {
    charge_points: DashMap<String, ChargePoint>,
}

impl InMemoryChargePointService {
    pub fn new() -> Self {
        Self {
            charge_points: DashMap::new(),
        }
    }

    /// Number of known charge points
    pub fn len(&self) -> usize {
        self.charge_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charge_points.is_empty()
    }
}

impl Default for InMemoryChargePointService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChargePointService for InMemoryChargePointService {
    async fn register(&self, charge_point: ChargePoint) -> DomainResult<()> {
        info!(
            charge_point_id = charge_point.id.as_str(),
            vendor = charge_point.vendor.as_deref().unwrap_or(""),
            model = charge_point.model.as_deref().unwrap_or(""),
            "Charge point registered"
        );
        self.charge_points
            .insert(charge_point.id.clone(), charge_point);
        Ok(())
    }

    async fn update_status(
        &self,
        charge_point_id: &str,
        status: ChargePointStatus,
    ) -> DomainResult<()> {
        let mut entry = self
            .charge_points
            .entry(charge_point_id.to_string())
            .or_insert_with(|| ChargePoint::new(charge_point_id));
        entry.set_status(status);
        entry.update_heartbeat();
        debug!(charge_point_id, %status, "Charge point status updated");
        Ok(())
    }

    async fn get(&self, charge_point_id: &str) -> DomainResult<Option<ChargePoint>> {
        Ok(self.charge_points.get(charge_point_id).map(|cp| cp.clone()))
    }
}
