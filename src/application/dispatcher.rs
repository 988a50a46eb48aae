//! Action dispatcher
//!
//! Routes decoded CALL frames to the [`ActionHandler`] registered for their
//! action name and turns every outcome into a response frame carrying the
//! CALL's unique id. Handlers are registered once at startup; the table is
//! read-only afterwards, so one dispatcher is shared by all connections.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::application::events::{CallRejectedEvent, Event, SharedEventBus};
use crate::application::handlers::{
    BootNotificationHandler, HeartbeatHandler, StatusNotificationHandler,
};
use crate::application::ports::{ActionError, ActionHandler, CallContext};
use crate::domain::ChargePointService;
use crate::ocpp::{decode_payload, OcppFrame};

/// Default heartbeat interval handed out in BootNotification responses.
pub const DEFAULT_HEARTBEAT_INTERVAL: u32 = 60;

// ── Type erasure ───────────────────────────────────────────────

#[async_trait]
trait ErasedHandler: Send + Sync {
    async fn call(&self, ctx: &CallContext, payload: &Value) -> Result<OcppFrame, ActionError>;
}

struct Typed<H>(H);

#[async_trait]
impl<H: ActionHandler> ErasedHandler for Typed<H> {
    async fn call(&self, ctx: &CallContext, payload: &Value) -> Result<OcppFrame, ActionError> {
        let request: H::Request = decode_payload(payload)?;
        let response = self.0.handle(ctx, request).await?;
        Ok(OcppFrame::result(ctx.unique_id.clone(), &response))
    }
}

// ── ActionDispatcher ───────────────────────────────────────────

pub struct ActionDispatcher {
    handlers: HashMap<&'static str, Box<dyn ErasedHandler>>,
    event_bus: SharedEventBus,
}

pub type SharedActionDispatcher = Arc<ActionDispatcher>;

impl ActionDispatcher {
    /// Empty dispatcher; every action is answered with `NotSupported`.
    pub fn new(event_bus: SharedEventBus) -> Self {
        Self {
            handlers: HashMap::new(),
            event_bus,
        }
    }

    /// Dispatcher with the BootNotification, Heartbeat and StatusNotification handlers.
    pub fn with_default_handlers(
        service: Arc<dyn ChargePointService>,
        event_bus: SharedEventBus,
        heartbeat_interval: u32,
    ) -> Self {
        Self::new(event_bus.clone())
            .register(BootNotificationHandler::new(
                service.clone(),
                event_bus.clone(),
                heartbeat_interval,
            ))
            .register(HeartbeatHandler::new(service.clone(), event_bus.clone()))
            .register(StatusNotificationHandler::new(service, event_bus))
    }

    /// Register a handler under its action name, replacing any previous one.
    pub fn register<H: ActionHandler>(mut self, handler: H) -> Self {
        debug!(action = H::ACTION, "Registered action handler");
        self.handlers.insert(H::ACTION, Box::new(Typed(handler)));
        self
    }

    pub fn supports(&self, action: &str) -> bool {
        self.handlers.contains_key(action)
    }

    /// Registered action names, sorted.
    pub fn actions(&self) -> Vec<&'static str> {
        let mut actions: Vec<_> = self.handlers.keys().copied().collect();
        actions.sort_unstable();
        actions
    }

    /// Decode raw frame text, dispatch it and encode the response.
    pub async fn handle_text(&self, charge_point_id: &str, text: &str) -> String {
        let response = match OcppFrame::parse(text) {
            Ok(frame) => self.dispatch(charge_point_id, frame).await,
            Err(e) => {
                warn!(
                    charge_point_id,
                    error = %e,
                    raw = text,
                    "Failed to parse OCPP message"
                );
                let unique_id = OcppFrame::recover_unique_id(text);
                self.reject(charge_point_id, unique_id, Utc::now(), e.into())
            }
        };
        response.serialize()
    }

    /// Answer a decoded frame.
    pub async fn dispatch(&self, charge_point_id: &str, frame: OcppFrame) -> OcppFrame {
        let (unique_id, action, payload) = match frame {
            OcppFrame::Call {
                unique_id,
                action,
                payload,
            } => (unique_id, action, payload),
            other => {
                return self.reject(
                    charge_point_id,
                    other.unique_id().to_string(),
                    Utc::now(),
                    ActionError::NotSupported(
                        "only CALL messages are accepted from devices".to_string(),
                    ),
                );
            }
        };

        let Some(handler) = self.handlers.get(action.as_str()) else {
            metrics::counter!("ocpp_messages_total", "action" => "unsupported").increment(1);
            return self.reject(
                charge_point_id,
                unique_id,
                Utc::now(),
                ActionError::NotSupported(format!("Action {} not supported", action)),
            );
        };

        metrics::counter!("ocpp_messages_total", "action" => action.clone()).increment(1);
        let ctx = CallContext::new(charge_point_id, unique_id, action);

        match handler.call(&ctx, &payload).await {
            Ok(response) => response,
            Err(e) => self.reject(charge_point_id, ctx.unique_id, ctx.received_at, e),
        }
    }

    /// Build the CallError for a CALL received at `received_at`.
    fn reject(
        &self,
        charge_point_id: &str,
        unique_id: String,
        received_at: DateTime<Utc>,
        error: ActionError,
    ) -> OcppFrame {
        let code = error.error_code();
        let elapsed_ms = (Utc::now() - received_at).num_milliseconds();
        warn!(
            charge_point_id,
            unique_id = unique_id.as_str(),
            error_code = code.as_str(),
            elapsed_ms,
            error = %error,
            "Answering with CallError"
        );
        metrics::counter!("ocpp_call_errors_total", "code" => code.as_str()).increment(1);

        self.event_bus.publish(Event::CallRejected(CallRejectedEvent {
            charge_point_id: charge_point_id.to_string(),
            unique_id: unique_id.clone(),
            error_code: code.as_str().to_string(),
            description: error.to_string(),
            timestamp: received_at,
        }));

        error.into_frame(unique_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use serde_json::json;
    use std::time::Duration;

    use crate::application::events::create_event_bus;
    use crate::domain::{ChargePoint, ChargePointStatus, DomainError, DomainResult};
    use crate::ocpp::MessageTypeId;

    #[derive(Default)]
    struct FakeService {
        fail: AtomicBool,
        calls: AtomicUsize,
        registered: Mutex<Vec<ChargePoint>>,
        statuses: Mutex<Vec<(String, ChargePointStatus)>>,
    }

    impl FakeService {
        fn failing() -> Self {
            let svc = Self::default();
            svc.fail.store(true, Ordering::SeqCst);
            svc
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn outcome(&self) -> DomainResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                Err(DomainError::StorageError("database unavailable".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl ChargePointService for FakeService {
        async fn register(&self, charge_point: ChargePoint) -> DomainResult<()> {
            self.outcome()?;
            self.registered.lock().unwrap().push(charge_point);
            Ok(())
        }

        async fn update_status(
            &self,
            charge_point_id: &str,
            status: ChargePointStatus,
        ) -> DomainResult<()> {
            self.outcome()?;
            self.statuses
                .lock()
                .unwrap()
                .push((charge_point_id.to_string(), status));
            Ok(())
        }

        async fn get(&self, _charge_point_id: &str) -> DomainResult<Option<ChargePoint>> {
            Ok(None)
        }
    }

    fn dispatcher(service: Arc<FakeService>) -> ActionDispatcher {
        ActionDispatcher::with_default_handlers(
            service,
            create_event_bus(),
            DEFAULT_HEARTBEAT_INTERVAL,
        )
    }

    async fn send(dispatcher: &ActionDispatcher, text: &str) -> OcppFrame {
        OcppFrame::parse(&dispatcher.handle_text("CP-1", text).await).unwrap()
    }

    fn error_code(frame: &OcppFrame) -> &str {
        match frame {
            OcppFrame::CallError { error_code, .. } => error_code,
            other => panic!("Expected CallError, got {:?}", other),
        }
    }

    fn result_payload(frame: &OcppFrame) -> &Value {
        match frame {
            OcppFrame::CallResult { payload, .. } => payload,
            other => panic!("Expected CallResult, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn boot_notification_is_accepted_and_registers() {
        let service = Arc::new(FakeService::default());
        let d = dispatcher(service.clone());

        let frame = send(
            &d,
            r#"[2,"boot-1","BootNotification",{"chargePointVendor":"ABB","chargePointModel":"Terra","chargePointSerialNumber":"SN-77"}]"#,
        )
        .await;

        assert_eq!(frame.unique_id(), "boot-1");
        let payload = result_payload(&frame);
        assert_eq!(payload["status"], "Accepted");
        assert_eq!(payload["interval"], 60);

        let registered = service.registered.lock().unwrap();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].id, "CP-1");
        assert_eq!(registered[0].serial_number.as_deref(), Some("SN-77"));
        assert_eq!(registered[0].status, ChargePointStatus::Available);
    }

    #[tokio::test]
    async fn boot_notification_uses_configured_interval() {
        let service = Arc::new(FakeService::default());
        let d = ActionDispatcher::with_default_handlers(service, create_event_bus(), 300);
        let frame = send(
            &d,
            r#"[2,"b","BootNotification",{"chargePointVendor":"V","chargePointModel":"M"}]"#,
        )
        .await;
        assert_eq!(result_payload(&frame)["interval"], 300);
    }

    #[tokio::test]
    async fn heartbeat_echoes_id_and_returns_current_time() {
        let service = Arc::new(FakeService::default());
        let d = dispatcher(service.clone());

        let frame = send(&d, r#"[2,"42","Heartbeat",{}]"#).await;

        assert_eq!(frame.message_type(), MessageTypeId::CallResult);
        assert_eq!(frame.unique_id(), "42");
        let time = result_payload(&frame)["currentTime"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(time).is_ok());
        assert_eq!(
            service.statuses.lock().unwrap().as_slice(),
            &[("CP-1".to_string(), ChargePointStatus::Available)]
        );
    }

    #[tokio::test]
    async fn status_notification_updates_status() {
        let service = Arc::new(FakeService::default());
        let d = dispatcher(service.clone());

        let frame = send(
            &d,
            r#"[2,"s1","StatusNotification",{"connectorId":1,"status":"Charging","errorCode":"NoError","timestamp":"2024-05-01T10:00:00Z"}]"#,
        )
        .await;

        assert_eq!(result_payload(&frame), &json!({}));
        assert_eq!(
            service.statuses.lock().unwrap().as_slice(),
            &[("CP-1".to_string(), ChargePointStatus::Charging)]
        );
    }

    #[tokio::test]
    async fn non_call_frames_are_not_supported() {
        let service = Arc::new(FakeService::default());
        let d = dispatcher(service.clone());

        for text in [
            r#"[3,"r1",{"status":"Accepted"}]"#,
            r#"[4,"r2","GenericError","oops",{}]"#,
            r#"[3,"r3",null]"#,
        ] {
            let frame = send(&d, text).await;
            assert_eq!(error_code(&frame), "NotSupported");
        }
        assert_eq!(service.calls(), 0);
    }

    #[tokio::test]
    async fn non_call_reply_keeps_unique_id() {
        let d = dispatcher(Arc::new(FakeService::default()));
        let frame = send(&d, r#"[3,"r1",{}]"#).await;
        assert_eq!(frame.unique_id(), "r1");
    }

    #[tokio::test]
    async fn unknown_message_type_is_not_supported() {
        let d = dispatcher(Arc::new(FakeService::default()));
        let frame = send(&d, r#"[5,"x",{}]"#).await;
        assert_eq!(error_code(&frame), "NotSupported");
        assert_eq!(frame.unique_id(), "x");
    }

    #[tokio::test]
    async fn unknown_actions_never_reach_the_service() {
        let service = Arc::new(FakeService::default());
        let d = dispatcher(service.clone());

        for action in ["Authorize", "StartTransaction", "MeterValues", "heartbeat", ""] {
            let text = json!([2, "u1", action, {}]).to_string();
            let frame = send(&d, &text).await;
            assert_eq!(error_code(&frame), "NotSupported");
            assert_eq!(frame.unique_id(), "u1");
        }
        assert_eq!(service.calls(), 0);
    }

    #[tokio::test]
    async fn unknown_action_message_names_the_action() {
        let d = dispatcher(Arc::new(FakeService::default()));
        let frame = send(&d, r#"[2,"u2","Authorize",{"idTag":"X"}]"#).await;
        match frame {
            OcppFrame::CallError {
                error_description, ..
            } => assert!(error_description.contains("Authorize")),
            other => panic!("Expected CallError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn malformed_json_is_formation_violation() {
        let d = dispatcher(Arc::new(FakeService::default()));
        let frame = send(&d, "not json").await;
        assert_eq!(error_code(&frame), "FormationViolation");
        assert_eq!(frame.unique_id(), "");
    }

    #[tokio::test]
    async fn bad_payload_is_formation_violation_without_service_call() {
        let service = Arc::new(FakeService::default());
        let d = dispatcher(service.clone());

        let frame = send(&d, r#"[2,"p1","BootNotification",{"chargePointModel":"M"}]"#).await;
        assert_eq!(error_code(&frame), "FormationViolation");
        assert_eq!(frame.unique_id(), "p1");

        let frame = send(
            &d,
            r#"[2,"p2","StatusNotification",{"connectorId":"one","status":"Available","errorCode":"NoError"}]"#,
        )
        .await;
        assert_eq!(error_code(&frame), "FormationViolation");

        let frame = send(&d, r#"[2,"p3","Heartbeat",null]"#).await;
        assert_eq!(error_code(&frame), "FormationViolation");

        assert_eq!(service.calls(), 0);
    }

    #[tokio::test]
    async fn service_failure_is_internal_error() {
        let service = Arc::new(FakeService::failing());
        let d = dispatcher(service.clone());

        let frame = send(&d, r#"[2,"h1","Heartbeat",{}]"#).await;
        assert_eq!(error_code(&frame), "InternalError");
        match &frame {
            OcppFrame::CallError {
                error_description, ..
            } => assert!(error_description.contains("database unavailable")),
            _ => unreachable!(),
        }

        let frame = send(
            &d,
            r#"[2,"b1","BootNotification",{"chargePointVendor":"V","chargePointModel":"M"}]"#,
        )
        .await;
        assert_eq!(error_code(&frame), "InternalError");
        assert_eq!(frame.unique_id(), "b1");
    }

    #[tokio::test]
    async fn rejections_are_published() {
        let bus = create_event_bus();
        let mut subscriber = bus.subscribe();
        let d = ActionDispatcher::with_default_handlers(
            Arc::new(FakeService::default()),
            bus,
            DEFAULT_HEARTBEAT_INTERVAL,
        );

        d.handle_text("CP-9", r#"[2,"z","DataTransfer",{}]"#).await;

        let msg = subscriber.recv().await.unwrap();
        match msg.event {
            Event::CallRejected(e) => {
                assert_eq!(e.charge_point_id, "CP-9");
                assert_eq!(e.error_code, "NotSupported");
            }
            other => panic!("Unexpected event {:?}", other),
        }
    }

    struct SlowFailingHandler;

    #[async_trait]
    impl ActionHandler for SlowFailingHandler {
        const ACTION: &'static str = "DataTransfer";

        type Request = Value;
        type Response = Value;

        async fn handle(&self, _ctx: &CallContext, _request: Value) -> Result<Value, ActionError> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Err(ActionError::Internal("backend timed out".into()))
        }
    }

    #[tokio::test]
    async fn handler_failure_is_stamped_with_receive_time() {
        let bus = create_event_bus();
        let mut subscriber = bus.subscribe();
        let d = ActionDispatcher::new(bus).register(SlowFailingHandler);

        let before = Utc::now();
        let frame = send(&d, r#"[2,"d1","DataTransfer",{}]"#).await;
        let after = Utc::now();
        assert_eq!(error_code(&frame), "InternalError");

        let msg = subscriber.recv().await.unwrap();
        match msg.event {
            Event::CallRejected(e) => {
                assert_eq!(e.unique_id, "d1");
                assert!(e.timestamp >= before);
                assert!(after - e.timestamp >= chrono::Duration::milliseconds(100));
            }
            other => panic!("Unexpected event {:?}", other),
        }
    }

    #[test]
    fn default_handlers_are_registered() {
        let d = dispatcher(Arc::new(FakeService::default()));
        assert_eq!(
            d.actions(),
            vec!["BootNotification", "Heartbeat", "StatusNotification"]
        );
        assert!(d.supports("Heartbeat"));
        assert!(!d.supports("Authorize"));
    }
}
