pub mod ws;

pub use ws::{GatewayError, OcppServer};
