pub mod client;
pub mod extract;
pub mod breaker;

pub use client::{HttpCarrierClient, HttpCarrierConfig};
pub use extract::{CurrentStatusField, ExtractionChain, StatusExtractor, TimelineHead};
pub use breaker::{CallPermit, CircuitBreaker, CircuitState, GuardedCarrier};
