//! Session management - charge point connections and the registry that tracks them

pub mod connection;
pub mod registry;

pub use connection::{CloseSignal, Connection, SessionError, SessionHandle, SessionReceiver};
pub use registry::{EvictedSession, SessionRegistry, SharedSessionRegistry};
