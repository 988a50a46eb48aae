//! Application ports (hexagonal architecture boundaries)
//!
//! The outbound port the gateway consumes, `ChargePointService`, is a domain
//! contract and lives in `domain::charge_point`.

pub mod inbound;

pub use inbound::{ActionError, ActionHandler, CallContext};
