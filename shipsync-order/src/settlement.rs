use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use shipsync_core::{Order, SettlementClaim, SettlementStore};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementOutcome {
    Credited { amount: Decimal },
    AlreadyCredited,
    Failed { reason: String },
}

/// Credits a seller with the order total the first time delivery is seen.
///
/// The full `total_amount` goes to the seller's balance; fees and packaging
/// are deducted by the wallet side. Exactly-once is guaranteed by the
/// store's check-and-set on the settlement marker, not by this type.
#[derive(Clone)]
pub struct SettlementLedger {
    store: Arc<dyn SettlementStore>,
}

impl SettlementLedger {
    pub fn new(store: Arc<dyn SettlementStore>) -> Self {
        Self { store }
    }

    pub async fn credit_seller_on_delivery(&self, order: &Order) -> SettlementOutcome {
        // The marker is never cleared, so a set marker on a stale copy is still authoritative.
        if order.is_settled() {
            debug!(order_id = %order.id, "Order already settled");
            return SettlementOutcome::AlreadyCredited;
        }

        match self.store.claim_and_credit(order.id).await {
            Ok(SettlementClaim::Credited { seller_id, amount }) => {
                if amount != order.total_amount {
                    warn!(
                        order_id = %order.id,
                        stored = %amount,
                        in_memory = %order.total_amount,
                        "Credited amount differs from the loaded order total"
                    );
                }
                info!(
                    order_id = %order.id,
                    seller_id = %seller_id,
                    amount = %amount,
                    "Seller credited for delivered order"
                );
                SettlementOutcome::Credited { amount }
            }
            Ok(SettlementClaim::AlreadySettled) => {
                debug!(order_id = %order.id, "Settlement marker already set");
                SettlementOutcome::AlreadyCredited
            }
            Err(e) => {
                error!(
                    order_id = %order.id,
                    seller_id = %order.seller_id,
                    amount = %order.total_amount,
                    error = %e,
                    "Settlement failed, marker left unset for retry"
                );
                SettlementOutcome::Failed { reason: e.to_string() }
            }
        }
    }
}
