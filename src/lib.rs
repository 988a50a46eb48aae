//! # OCPP Gateway
//!
//! OCPP 1.6-J gateway for EV charging stations. Charge points connect over
//! WebSocket, identify themselves with a query parameter and exchange
//! BootNotification, Heartbeat and StatusNotification messages.
//!
//! ## Architecture
//!
//! - **ocpp**: OCPP-J frame codec, message types and error codes
//! - **domain**: Charge point entity and the service contract
//! - **application**: Action dispatcher, handlers and gateway events
//! - **session**: Live connections and the session registry
//! - **interfaces**: WebSocket server
//! - **infrastructure**: In-memory charge point storage
//! - **server**: Startup, shutdown and tracing setup

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod ocpp;
pub mod server;
pub mod session;
pub mod support;

pub use application::{create_event_bus, ActionDispatcher, Event, EventBus, SharedEventBus};
pub use config::{default_config_path, AppConfig, ConfigError};
pub use infrastructure::InMemoryChargePointService;
pub use interfaces::{GatewayError, OcppServer};
pub use server::{init_tracing, ServerHandle, ServerOptions};
pub use session::{SessionRegistry, SharedSessionRegistry};
