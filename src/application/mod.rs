pub mod dispatcher;
pub mod events;
pub mod handlers;
pub mod ports;

// Re-export key types for convenience
pub use dispatcher::{ActionDispatcher, SharedActionDispatcher, DEFAULT_HEARTBEAT_INTERVAL};
pub use events::{create_event_bus, Event, EventBus, EventSubscriber, SharedEventBus};
pub use handlers::{BootNotificationHandler, HeartbeatHandler, StatusNotificationHandler};
pub use ports::{ActionError, ActionHandler, CallContext};
