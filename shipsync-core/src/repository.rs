use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{Order, OrderStatusHistory};
use crate::StoreResult;

/// Which orders a sync run should look at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CandidateFilter {
    /// Also select orders already in a delivered state.
    pub include_delivered: bool,
    pub limit: Option<usize>,
}

/// Result of the atomic settle-once operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementClaim {
    /// The marker was set and the seller's balance incremented in the same unit.
    Credited { seller_id: Uuid, amount: Decimal },
    /// The marker was already set; nothing was touched.
    AlreadySettled,
}

/// Persistence for the fields the sync engine owns.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Orders with a tracking number, never-synced first, then least
    /// recently synced.
    async fn select_candidates(&self, filter: CandidateFilter) -> StoreResult<Vec<Order>>;

    /// Delivered orders whose seller was never credited.
    async fn delivered_unsettled(&self, limit: Option<usize>) -> StoreResult<Vec<Order>>;

    async fn append_history(&self, entry: &OrderStatusHistory) -> StoreResult<()>;

    async fn history_for(&self, order_id: Uuid) -> StoreResult<Vec<OrderStatusHistory>>;

    /// Single write of `status`, `shipping_status` and `allow_reshipping`.
    async fn save_tracking_state(&self, order: &Order) -> StoreResult<()>;

    /// Record that a run attempted this order, so capped runs rotate
    /// through the whole candidate set.
    async fn mark_synced(&self, order_id: Uuid) -> StoreResult<()>;
}

/// Check-and-set of the settlement marker together with the balance credit.
#[async_trait]
pub trait SettlementStore: Send + Sync {
    /// Credit the order's seller with `total_amount` unless the order is
    /// already marked settled. Must be atomic with respect to concurrent
    /// callers for the same order.
    async fn claim_and_credit(&self, order_id: Uuid) -> StoreResult<SettlementClaim>;
}
