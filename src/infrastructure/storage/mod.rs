//! Charge point service implementations

mod memory;

pub use memory::InMemoryChargePointService;
