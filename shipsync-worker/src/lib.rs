pub mod cli;
pub mod metrics;
pub mod server;

pub use metrics::SyncMetrics;
pub use server::{app, OpsState};
