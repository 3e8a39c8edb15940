#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use shipsync_core::{CarrierClient, Order, Seller, TrackingError, TrackingStatus};
use shipsync_order::{Reconciler, SchedulerConfig, SettlementLedger, SyncScheduler};
use shipsync_store::MemoryStore;
use uuid::Uuid;

#[derive(Clone)]
pub enum Reply {
    Status(&'static str),
    NoData,
    TimedOut,
    Hang,
}

/// Carrier double answering from a per-tracking-number script.
#[derive(Default)]
pub struct ScriptedCarrier {
    replies: Mutex<HashMap<String, Reply>>,
    calls: AtomicUsize,
}

impl ScriptedCarrier {
    pub fn set(&self, tracking_number: &str, reply: Reply) {
        self.replies.lock().unwrap().insert(tracking_number.to_string(), reply);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CarrierClient for ScriptedCarrier {
    async fn fetch_status(&self, tracking_number: &str) -> Result<TrackingStatus, TrackingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get(tracking_number)
            .cloned()
            .unwrap_or(Reply::NoData);
        match reply {
            Reply::Status(s) => Ok(TrackingStatus::Latest(s.to_string())),
            Reply::NoData => Ok(TrackingStatus::NoData),
            Reply::TimedOut => Err(TrackingError::Timeout("operation timed out".to_string())),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(TrackingStatus::NoData)
            }
        }
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub carrier: Arc<ScriptedCarrier>,
    pub reconciler: Arc<Reconciler>,
    pub ledger: SettlementLedger,
    pub seller_id: Uuid,
}

impl Harness {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let carrier = Arc::new(ScriptedCarrier::default());
        let seller = Seller::new("Atelier Casbah");
        let seller_id = seller.id;
        store.insert_seller(seller).await;

        let ledger = SettlementLedger::new(store.clone());
        let reconciler = Arc::new(Reconciler::new(carrier.clone(), store.clone(), ledger.clone()));

        Self {
            store,
            carrier,
            reconciler,
            ledger,
            seller_id,
        }
    }

    pub fn scheduler(&self, config: SchedulerConfig) -> SyncScheduler {
        SyncScheduler::new(self.reconciler.clone(), self.store.clone(), self.ledger.clone(), config)
    }

    /// Insert a tracked order with the given current status.
    pub async fn shipped_order(&self, tracking: &str, status: &str, total: Decimal) -> Order {
        let order = Order::new(self.seller_id, total)
            .with_tracking_number(tracking)
            .with_status(status);
        self.store.insert_order(order.clone()).await;
        order
    }

    pub async fn balance(&self) -> Decimal {
        self.store.seller(self.seller_id).await.unwrap().balance
    }

    pub async fn reload(&self, order: &Order) -> Order {
        self.store.order(order.id).await.unwrap()
    }
}

pub fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        interval: Duration::from_millis(50),
        concurrency: 4,
        order_timeout: Duration::from_millis(200),
        batch_limit: None,
    }
}
