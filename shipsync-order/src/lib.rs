pub mod settlement;
pub mod reconciler;
pub mod scheduler;

pub use settlement::{SettlementLedger, SettlementOutcome};
pub use reconciler::{ReconcileOutcome, ReconcileReport, Reconciler};
pub use scheduler::{
    RunObserver, RunOptions, RunPhase, RunReport, SchedulerConfig, SchedulerError, SyncScheduler,
};
