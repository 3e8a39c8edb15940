use std::sync::Arc;

use serde::Serialize;
use shipsync_core::classifier::{self, is_delivered, is_return_status};
use shipsync_core::{CarrierClient, Order, OrderStatusHistory, OrderStore, TrackingStatus};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::settlement::{SettlementLedger, SettlementOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconcileOutcome {
    Updated,
    Unchanged,
    Failed,
    Skipped,
}

/// What one reconciliation did to one order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub order_id: Uuid,
    pub outcome: ReconcileOutcome,
    pub observed_status: Option<String>,
    pub history_written: bool,
    pub settlement: Option<SettlementOutcome>,
}

impl ReconcileReport {
    fn new(order_id: Uuid, outcome: ReconcileOutcome) -> Self {
        Self {
            order_id,
            outcome,
            observed_status: None,
            history_written: false,
            settlement: None,
        }
    }

    pub fn failed(order_id: Uuid) -> Self {
        Self::new(order_id, ReconcileOutcome::Failed)
    }
}

/// Applies the carrier's latest status to one order.
pub struct Reconciler {
    carrier: Arc<dyn CarrierClient>,
    orders: Arc<dyn OrderStore>,
    ledger: SettlementLedger,
}

impl Reconciler {
    pub fn new(
        carrier: Arc<dyn CarrierClient>,
        orders: Arc<dyn OrderStore>,
        ledger: SettlementLedger,
    ) -> Self {
        Self { carrier, orders, ledger }
    }

    pub async fn reconcile(&self, order: &Order) -> ReconcileReport {
        let Some(tracking_number) = order.tracking_number() else {
            debug!(order_id = %order.id, "No tracking number, skipping");
            return ReconcileReport::new(order.id, ReconcileOutcome::Skipped);
        };

        let observed = match self.carrier.fetch_status(tracking_number).await {
            Ok(TrackingStatus::Latest(status)) => status,
            Ok(TrackingStatus::NoData) => {
                debug!(order_id = %order.id, tracking_number, "Carrier has no status yet");
                return ReconcileReport::new(order.id, ReconcileOutcome::Unchanged);
            }
            Err(e) => {
                warn!(order_id = %order.id, tracking_number, error = %e, "Tracking fetch failed");
                return ReconcileReport::failed(order.id);
            }
        };

        let mut report = ReconcileReport::new(order.id, ReconcileOutcome::Unchanged);
        report.observed_status = Some(observed.clone());

        let mut working = order.clone();
        let mut changed = false;

        if order.status() != Some(observed.as_str()) {
            if classifier::normalize(&observed).had_encoding_artifacts() {
                warn!(
                    order_id = %order.id,
                    status = %observed,
                    "Carrier status carries encoding artifacts, classified after repair"
                );
            }

            // History goes first so the audit trail exists even if settlement fails.
            let entry = OrderStatusHistory::new(
                order.id,
                order.status.clone(),
                observed.clone(),
                Some(format!("Carrier tracking {}", tracking_number)),
            );
            if let Err(e) = self.orders.append_history(&entry).await {
                error!(order_id = %order.id, error = %e, "Failed to record status history");
                report.outcome = ReconcileOutcome::Failed;
                return report;
            }
            report.history_written = true;

            working.apply_status(&observed);
            changed = true;
            info!(
                order_id = %order.id,
                old_status = order.status().unwrap_or("-"),
                new_status = %observed,
                class = classifier::StatusClass::of(&observed).as_str(),
                "Order status changed"
            );

            let was_delivered = order.status().is_some_and(is_delivered);
            if is_delivered(&observed) && !was_delivered {
                report.settlement = Some(self.ledger.credit_seller_on_delivery(&working).await);
            }
        }

        // Runs on unchanged statuses too, so an interrupted earlier write heals.
        if working.status().is_some_and(is_return_status) && working.block_reshipping() {
            info!(order_id = %order.id, "Return status, reshipping disabled");
            changed = true;
        }

        if !changed {
            return report;
        }

        match self.orders.save_tracking_state(&working).await {
            Ok(()) => report.outcome = ReconcileOutcome::Updated,
            Err(e) => {
                error!(order_id = %order.id, error = %e, "Failed to persist order tracking state");
                report.outcome = ReconcileOutcome::Failed;
            }
        }
        report
    }
}
