use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A shipped (or about to be shipped) customer order.
///
/// Only the tracking fields are owned by the sync engine. Everything else is
/// written once by order placement and read here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub tracking_number: Option<String>,
    /// Carrier status string. `None` until the first sync.
    pub status: Option<String>,
    /// Mirror of `status` for the UI.
    pub shipping_status: Option<String>,
    pub allow_reshipping: bool,
    pub total_amount: Decimal,
    /// Settlement marker. Set once when the seller has been credited.
    pub settled_at: Option<DateTime<Utc>>,
    /// Last time a sync run looked at this order, whatever the outcome.
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(seller_id: Uuid, total_amount: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            seller_id,
            tracking_number: None,
            status: None,
            shipping_status: None,
            allow_reshipping: true,
            total_amount,
            settled_at: None,
            last_synced_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_tracking_number(mut self, tracking_number: impl Into<String>) -> Self {
        self.tracking_number = Some(tracking_number.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        let status = status.into();
        self.shipping_status = Some(status.clone());
        self.status = Some(status);
        self
    }

    /// Trimmed tracking number, if one is attached.
    pub fn tracking_number(&self) -> Option<&str> {
        self.tracking_number
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Apply a carrier status. `shipping_status` always follows `status`.
    pub fn apply_status(&mut self, observed: &str) {
        self.status = Some(observed.to_string());
        self.shipping_status = Some(observed.to_string());
        self.updated_at = Utc::now();
    }

    /// Returns true when the flag actually flipped.
    pub fn block_reshipping(&mut self) -> bool {
        if !self.allow_reshipping {
            return false;
        }
        self.allow_reshipping = false;
        self.updated_at = Utc::now();
        true
    }

    pub fn is_settled(&self) -> bool {
        self.settled_at.is_some()
    }

    pub fn is_delivered(&self) -> bool {
        self.status().is_some_and(crate::classifier::is_delivered)
    }

    /// Whether the default selection should pick this order up.
    pub fn is_sync_candidate(&self, include_delivered: bool) -> bool {
        self.tracking_number().is_some() && (include_delivered || !self.is_delivered())
    }
}

/// Append-only record of one observed status change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderStatusHistory {
    pub id: Uuid,
    pub order_id: Uuid,
    pub old_status: Option<String>,
    pub new_status: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OrderStatusHistory {
    pub fn new(
        order_id: Uuid,
        old_status: Option<String>,
        new_status: String,
        note: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            old_status,
            new_status,
            note,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Seller {
    pub id: Uuid,
    pub name: String,
    pub balance: Decimal,
}

impl Seller {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            balance: Decimal::ZERO,
        }
    }
}
