use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use shipsync_core::{
    CandidateFilter, Order, OrderStatusHistory, OrderStore, Seller, SettlementClaim,
    SettlementStore, StoreError, StoreResult,
};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    orders: HashMap<Uuid, Order>,
    sellers: HashMap<Uuid, Seller>,
    history: Vec<OrderStatusHistory>,
}

/// Process-local store with the same semantics as the Postgres one.
/// Settlement check-and-set happens under a single lock.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_order(&self, order: Order) {
        self.inner.lock().await.orders.insert(order.id, order);
    }

    pub async fn insert_seller(&self, seller: Seller) {
        self.inner.lock().await.sellers.insert(seller.id, seller);
    }

    pub async fn order(&self, id: Uuid) -> Option<Order> {
        self.inner.lock().await.orders.get(&id).cloned()
    }

    pub async fn seller(&self, id: Uuid) -> Option<Seller> {
        self.inner.lock().await.sellers.get(&id).cloned()
    }

    pub async fn history_len(&self) -> usize {
        self.inner.lock().await.history.len()
    }

    /// Make `save_tracking_state` fail, to exercise write failures.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn select_candidates(&self, filter: CandidateFilter) -> StoreResult<Vec<Order>> {
        let inner = self.inner.lock().await;
        let mut candidates: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| o.is_sync_candidate(filter.include_delivered))
            .cloned()
            .collect();
        // None sorts first: never-synced orders go ahead of everything else.
        candidates.sort_by_key(|o| (o.last_synced_at, o.created_at, o.id));
        if let Some(limit) = filter.limit {
            candidates.truncate(limit);
        }
        Ok(candidates)
    }

    async fn delivered_unsettled(&self, limit: Option<usize>) -> StoreResult<Vec<Order>> {
        let inner = self.inner.lock().await;
        let mut pending: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| o.is_delivered() && !o.is_settled())
            .cloned()
            .collect();
        pending.sort_by_key(|o| (o.updated_at, o.id));
        if let Some(limit) = limit {
            pending.truncate(limit);
        }
        Ok(pending)
    }

    async fn append_history(&self, entry: &OrderStatusHistory) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if !inner.orders.contains_key(&entry.order_id) {
            return Err(StoreError::OrderNotFound(entry.order_id));
        }
        inner.history.push(entry.clone());
        Ok(())
    }

    async fn history_for(&self, order_id: Uuid) -> StoreResult<Vec<OrderStatusHistory>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .history
            .iter()
            .filter(|h| h.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn save_tracking_state(&self, order: &Order) -> StoreResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Database("simulated write failure".to_string()));
        }
        let mut inner = self.inner.lock().await;
        let stored = inner
            .orders
            .get_mut(&order.id)
            .ok_or(StoreError::OrderNotFound(order.id))?;
        // Only the engine-owned fields; the settlement marker is written by claim_and_credit alone.
        stored.status = order.status.clone();
        stored.shipping_status = order.shipping_status.clone();
        stored.allow_reshipping = order.allow_reshipping;
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_synced(&self, order_id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let stored = inner
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;
        stored.last_synced_at = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl SettlementStore for MemoryStore {
    async fn claim_and_credit(&self, order_id: Uuid) -> StoreResult<SettlementClaim> {
        let mut inner = self.inner.lock().await;
        let (seller_id, amount) = {
            let order = inner
                .orders
                .get(&order_id)
                .ok_or(StoreError::OrderNotFound(order_id))?;
            if order.is_settled() {
                return Ok(SettlementClaim::AlreadySettled);
            }
            (order.seller_id, order.total_amount)
        };

        let seller = inner
            .sellers
            .get_mut(&seller_id)
            .ok_or(StoreError::SellerNotFound { order_id, seller_id })?;
        seller.balance += amount;

        if let Some(order) = inner.orders.get_mut(&order_id) {
            order.settled_at = Some(Utc::now());
        }
        Ok(SettlementClaim::Credited { seller_id, amount })
    }
}
