//! OCPP 1.6 action handlers
//!
//! One module per charge-point-initiated action.

mod handle_boot_notification;
mod handle_heartbeat;
mod handle_status_notification;

pub use handle_boot_notification::BootNotificationHandler;
pub use handle_heartbeat::HeartbeatHandler;
pub use handle_status_notification::StatusNotificationHandler;
