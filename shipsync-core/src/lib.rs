pub mod models;
pub mod classifier;
pub mod repository;
pub mod carrier;

pub use models::{Order, OrderStatusHistory, Seller};
pub use carrier::{CarrierClient, TrackingError, TrackingStatus};
pub use repository::{CandidateFilter, OrderStore, SettlementClaim, SettlementStore};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Order not found: {0}")]
    OrderNotFound(uuid::Uuid),
    #[error("Seller {seller_id} not found for order {order_id}")]
    SellerNotFound {
        order_id: uuid::Uuid,
        seller_id: uuid::Uuid,
    },
    #[error("Database error: {0}")]
    Database(String),
    #[error("Store operation timed out: {0}")]
    Timeout(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
