//! Recurring sync run: select candidates, reconcile them, report.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use shipsync_core::{CandidateFilter, Order, OrderStore, StoreError};
use tokio::sync::watch;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::reconciler::{ReconcileOutcome, ReconcileReport, Reconciler};
use crate::settlement::{SettlementLedger, SettlementOutcome};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
    /// Orders reconciled at the same time.
    pub concurrency: usize,
    /// Upper bound for one order (carrier call plus writes).
    pub order_timeout: Duration,
    pub batch_limit: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(600),
            concurrency: 4,
            order_timeout: Duration::from_secs(30),
            batch_limit: None,
        }
    }
}

/// Operator overrides for a single run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Re-sync delivered orders too.
    pub force: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Selecting,
    Processing(usize),
    Reporting,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub forced: bool,
    pub candidates: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub skipped: usize,
    pub credited: usize,
    pub settlement_failures: usize,
    pub settlement_retries: usize,
    pub settlement_retry_failures: usize,
}

impl RunReport {
    fn new(run_id: Uuid, started_at: DateTime<Utc>, forced: bool, candidates: usize) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: started_at,
            forced,
            candidates,
            updated: 0,
            unchanged: 0,
            failed: 0,
            skipped: 0,
            credited: 0,
            settlement_failures: 0,
            settlement_retries: 0,
            settlement_retry_failures: 0,
        }
    }

    fn record(&mut self, result: &ReconcileReport) {
        match result.outcome {
            ReconcileOutcome::Updated => self.updated += 1,
            ReconcileOutcome::Unchanged => self.unchanged += 1,
            ReconcileOutcome::Failed => self.failed += 1,
            ReconcileOutcome::Skipped => self.skipped += 1,
        }
        match result.settlement {
            Some(SettlementOutcome::Credited { .. }) => self.credited += 1,
            Some(SettlementOutcome::Failed { .. }) => self.settlement_failures += 1,
            Some(SettlementOutcome::AlreadyCredited) | None => {}
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Candidate selection failed: {0}")]
    Selection(#[from] StoreError),
}

/// Hook for run-level observability (metrics).
pub trait RunObserver: Send + Sync {
    fn on_run_completed(&self, report: &RunReport);

    fn on_run_failed(&self, _error: &SchedulerError) {}
}

pub struct SyncScheduler {
    reconciler: Arc<Reconciler>,
    orders: Arc<dyn OrderStore>,
    ledger: SettlementLedger,
    config: SchedulerConfig,
    observer: Option<Arc<dyn RunObserver>>,
    phase: watch::Sender<RunPhase>,
}

impl SyncScheduler {
    pub fn new(
        reconciler: Arc<Reconciler>,
        orders: Arc<dyn OrderStore>,
        ledger: SettlementLedger,
        config: SchedulerConfig,
    ) -> Self {
        let (phase, _) = watch::channel(RunPhase::Idle);
        Self {
            reconciler,
            orders,
            ledger,
            config,
            observer: None,
            phase,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<RunPhase> {
        self.phase.subscribe()
    }

    fn set_phase(&self, phase: RunPhase) {
        debug!(?phase, "Scheduler phase");
        self.phase.send_replace(phase);
    }

    /// One complete run. Per-order failures are counted, never propagated.
    pub async fn run_once(&self, options: RunOptions) -> Result<RunReport, SchedulerError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let limit = options.limit.or(self.config.batch_limit);

        self.set_phase(RunPhase::Selecting);
        let candidates = match self
            .orders
            .select_candidates(CandidateFilter {
                include_delivered: options.force,
                limit,
            })
            .await
        {
            Ok(orders) => orders,
            Err(e) => {
                let err = SchedulerError::from(e);
                error!(run_id = %run_id, error = %err, "Sync run aborted before processing");
                if let Some(observer) = &self.observer {
                    observer.on_run_failed(&err);
                }
                self.set_phase(RunPhase::Idle);
                return Err(err);
            }
        };

        // The store pre-filters; the classifier has the final word on "delivered".
        let mut candidates: Vec<Order> = candidates
            .into_iter()
            .filter(|order| order.is_sync_candidate(options.force))
            .collect();
        if let Some(limit) = limit {
            candidates.truncate(limit);
        }

        self.set_phase(RunPhase::Processing(candidates.len()));
        info!(
            run_id = %run_id,
            candidates = candidates.len(),
            forced = options.force,
            "Sync run started"
        );

        let mut report = RunReport::new(run_id, started_at, options.force, candidates.len());
        let mut failed_settlements = HashSet::new();

        let order_timeout = self.config.order_timeout;
        let reconciler = &self.reconciler;
        let orders = &self.orders;
        let mut results = stream::iter(candidates.iter())
            .map(|order| async move {
                let result = match timeout(order_timeout, reconciler.reconcile(order)).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(
                            order_id = %order.id,
                            timeout_secs = order_timeout.as_secs_f64(),
                            "Reconciliation timed out"
                        );
                        ReconcileReport::failed(order.id)
                    }
                };
                // Every attempt counts, so a capped run moves on to other orders next time.
                if result.outcome != ReconcileOutcome::Skipped {
                    if let Err(e) = orders.mark_synced(order.id).await {
                        warn!(order_id = %order.id, error = %e, "Failed to record sync attempt");
                    }
                }
                result
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .boxed();

        while let Some(result) = results.next().await {
            if matches!(result.settlement, Some(SettlementOutcome::Failed { .. })) {
                failed_settlements.insert(result.order_id);
            }
            report.record(&result);
        }
        drop(results);

        self.retry_settlements(limit, &failed_settlements, &mut report).await;

        self.set_phase(RunPhase::Reporting);
        report.finished_at = Utc::now();
        info!(
            run_id = %report.run_id,
            candidates = report.candidates,
            updated = report.updated,
            unchanged = report.unchanged,
            failed = report.failed,
            skipped = report.skipped,
            credited = report.credited,
            settlement_failures = report.settlement_failures,
            settlement_retries = report.settlement_retries,
            settlement_retry_failures = report.settlement_retry_failures,
            duration_ms = (report.finished_at - report.started_at).num_milliseconds(),
            "Sync run finished"
        );
        if let Some(observer) = &self.observer {
            observer.on_run_completed(&report);
        }
        self.set_phase(RunPhase::Idle);

        Ok(report)
    }

    /// Delivered orders are no longer candidates, so sellers whose credit
    /// failed earlier are picked up here.
    async fn retry_settlements(
        &self,
        limit: Option<usize>,
        attempted: &HashSet<Uuid>,
        report: &mut RunReport,
    ) {
        let pending = match self.orders.delivered_unsettled(limit).await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "Could not list unsettled delivered orders");
                return;
            }
        };

        for order in pending.iter().filter(|o| !attempted.contains(&o.id) && o.is_delivered()) {
            let credit = self.ledger.credit_seller_on_delivery(order);
            let outcome = match timeout(self.config.order_timeout, credit).await {
                Ok(outcome) => outcome,
                Err(_) => SettlementOutcome::Failed {
                    reason: "settlement timed out".to_string(),
                },
            };
            match outcome {
                SettlementOutcome::Credited { .. } => {
                    report.settlement_retries += 1;
                    report.credited += 1;
                }
                SettlementOutcome::AlreadyCredited => {}
                SettlementOutcome::Failed { reason } => {
                    report.settlement_retries += 1;
                    report.settlement_retry_failures += 1;
                    warn!(order_id = %order.id, reason = %reason, "Settlement retry failed");
                }
            }
        }
    }

    /// Run on a fixed interval until `shutdown` turns true or its sender is dropped.
    pub async fn run_forever(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_secs = self.config.interval.as_secs(), "Sync scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once(RunOptions::default()).await {
                        error!(error = %e, "Scheduled sync run failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Sync scheduler stopping");
                        break;
                    }
                }
            }
        }
    }
}
