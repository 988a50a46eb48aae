//! BootNotification handler

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info};

use crate::application::events::{BootNotificationEvent, Event, SharedEventBus};
use crate::application::ports::{ActionError, ActionHandler, CallContext};
use crate::domain::{ChargePoint, ChargePointService, RegistrationStatus};
use crate::ocpp::{action, BootNotificationRequest, BootNotificationResponse};

pub struct BootNotificationHandler {
    service: Arc<dyn ChargePointService>,
    event_bus: SharedEventBus,
    heartbeat_interval: u32,
}

impl BootNotificationHandler {
    pub fn new(
        service: Arc<dyn ChargePointService>,
        event_bus: SharedEventBus,
        heartbeat_interval: u32,
    ) -> Self {
        Self {
            service,
            event_bus,
            heartbeat_interval,
        }
    }
}

#[async_trait]
impl ActionHandler for BootNotificationHandler {
    const ACTION: &'static str = action::BOOT_NOTIFICATION;

    type Request = BootNotificationRequest;
    type Response = BootNotificationResponse;

    async fn handle(
        &self,
        ctx: &CallContext,
        payload: BootNotificationRequest,
    ) -> Result<BootNotificationResponse, ActionError> {
        info!(
            charge_point_id = ctx.charge_point_id.as_str(),
            vendor = payload.charge_point_vendor.as_str(),
            model = payload.charge_point_model.as_str(),
            serial_number = payload.charge_point_serial_number.as_deref().unwrap_or(""),
            "BootNotification"
        );

        let mut charge_point = ChargePoint::new(ctx.charge_point_id.clone());
        charge_point.vendor = Some(payload.charge_point_vendor.clone());
        charge_point.model = Some(payload.charge_point_model.clone());
        charge_point.serial_number = payload.charge_point_serial_number.clone();
        charge_point.firmware_version = payload.firmware_version.clone();
        charge_point.accept_registration();

        if let Err(e) = self.service.register(charge_point).await {
            error!(
                charge_point_id = ctx.charge_point_id.as_str(),
                error = %e,
                "Failed to register charge point"
            );
            return Err(e.into());
        }

        self.event_bus.publish(Event::BootNotification(BootNotificationEvent {
            charge_point_id: ctx.charge_point_id.clone(),
            vendor: payload.charge_point_vendor,
            model: payload.charge_point_model,
            serial_number: payload.charge_point_serial_number,
            firmware_version: payload.firmware_version,
            timestamp: Utc::now(),
        }));

        Ok(BootNotificationResponse {
            status: RegistrationStatus::Accepted,
            current_time: Utc::now(),
            interval: self.heartbeat_interval,
        })
    }
}
