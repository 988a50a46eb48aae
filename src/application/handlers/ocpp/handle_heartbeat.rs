//! Heartbeat handler

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error};

use crate::application::events::{Event, HeartbeatEvent, SharedEventBus};
use crate::application::ports::{ActionError, ActionHandler, CallContext};
use crate::domain::{ChargePointService, ChargePointStatus};
use crate::ocpp::{action, HeartbeatRequest, HeartbeatResponse};

pub struct HeartbeatHandler {
    service: Arc<dyn ChargePointService>,
    event_bus: SharedEventBus,
}

impl HeartbeatHandler {
    pub fn new(service: Arc<dyn ChargePointService>, event_bus: SharedEventBus) -> Self {
        Self { service, event_bus }
    }
}

#[async_trait]
impl ActionHandler for HeartbeatHandler {
    const ACTION: &'static str = action::HEARTBEAT;

    type Request = HeartbeatRequest;
    type Response = HeartbeatResponse;

    async fn handle(
        &self,
        ctx: &CallContext,
        _payload: HeartbeatRequest,
    ) -> Result<HeartbeatResponse, ActionError> {
        debug!(charge_point_id = ctx.charge_point_id.as_str(), "Heartbeat");

        self.service
            .update_status(&ctx.charge_point_id, ChargePointStatus::Available)
            .await
            .map_err(|e| {
                error!(
                    charge_point_id = ctx.charge_point_id.as_str(),
                    error = %e,
                    "Failed to update heartbeat"
                );
                ActionError::from(e)
            })?;

        let now = Utc::now();
        self.event_bus.publish(Event::HeartbeatReceived(HeartbeatEvent {
            charge_point_id: ctx.charge_point_id.clone(),
            timestamp: now,
        }));

        Ok(HeartbeatResponse { current_time: now })
    }
}
