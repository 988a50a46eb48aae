//! StatusNotification handler

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info};

use crate::application::events::{Event, SharedEventBus, StatusChangedEvent};
use crate::application::ports::{ActionError, ActionHandler, CallContext};
use crate::domain::ChargePointService;
use crate::ocpp::{action, StatusNotificationRequest, StatusNotificationResponse};

pub struct StatusNotificationHandler {
    service: Arc<dyn ChargePointService>,
    event_bus: SharedEventBus,
}

impl StatusNotificationHandler {
    pub fn new(service: Arc<dyn ChargePointService>, event_bus: SharedEventBus) -> Self {
        Self { service, event_bus }
    }
}

#[async_trait]
impl ActionHandler for StatusNotificationHandler {
    const ACTION: &'static str = action::STATUS_NOTIFICATION;

    type Request = StatusNotificationRequest;
    type Response = StatusNotificationResponse;

    async fn handle(
        &self,
        ctx: &CallContext,
        payload: StatusNotificationRequest,
    ) -> Result<StatusNotificationResponse, ActionError> {
        info!(
            charge_point_id = ctx.charge_point_id.as_str(),
            connector_id = payload.connector_id,
            status = %payload.status,
            error_code = payload.error_code.as_str(),
            "StatusNotification"
        );

        if let Err(e) = self
            .service
            .update_status(&ctx.charge_point_id, payload.status)
            .await
        {
            error!(
                charge_point_id = ctx.charge_point_id.as_str(),
                error = %e,
                "Failed to update status"
            );
            return Err(e.into());
        }

        self.event_bus.publish(Event::StatusChanged(StatusChangedEvent {
            charge_point_id: ctx.charge_point_id.clone(),
            connector_id: payload.connector_id,
            status: payload.status.to_string(),
            error_code: payload.error_code,
            info: payload.info,
            timestamp: payload.timestamp.unwrap_or_else(Utc::now),
        }));

        Ok(StatusNotificationResponse {})
    }
}
