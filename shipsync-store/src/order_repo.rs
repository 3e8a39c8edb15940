use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shipsync_core::classifier::is_delivered;
use shipsync_core::{
    CandidateFilter, Order, OrderStatusHistory, OrderStore, SettlementClaim, SettlementStore,
    StoreError, StoreResult,
};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    seller_id: Uuid,
    tracking_number: Option<String>,
    status: Option<String>,
    shipping_status: Option<String>,
    allow_reshipping: bool,
    total_amount: Decimal,
    settled_at: Option<DateTime<Utc>>,
    last_synced_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Order {
            id: row.id,
            seller_id: row.seller_id,
            tracking_number: row.tracking_number,
            status: row.status,
            shipping_status: row.shipping_status,
            allow_reshipping: row.allow_reshipping,
            total_amount: row.total_amount,
            settled_at: row.settled_at,
            last_synced_at: row.last_synced_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: Uuid,
    order_id: Uuid,
    old_status: Option<String>,
    new_status: String,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<HistoryRow> for OrderStatusHistory {
    fn from(row: HistoryRow) -> Self {
        OrderStatusHistory {
            id: row.id,
            order_id: row.order_id,
            old_status: row.old_status,
            new_status: row.new_status,
            note: row.note,
            created_at: row.created_at,
        }
    }
}

const ORDER_COLUMNS: &str = "id, seller_id, tracking_number, status, shipping_status, \
     allow_reshipping, total_amount, settled_at, last_synced_at, created_at, updated_at";

fn db_err(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::PoolTimedOut => StoreError::Timeout("connection pool acquire".to_string()),
        other => StoreError::Database(other.to_string()),
    }
}

fn limit_param(limit: Option<usize>) -> Option<i64> {
    limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX))
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn select_candidates(&self, filter: CandidateFilter) -> StoreResult<Vec<Order>> {
        // LIMIT NULL means no limit
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE tracking_number IS NOT NULL AND btrim(tracking_number) <> '' \
               AND ($1 OR NOT is_delivered) \
             ORDER BY last_synced_at ASC NULLS FIRST, created_at, id \
             LIMIT $2"
        );
        let rows: Vec<OrderRow> = sqlx::query_as(&sql)
            .bind(filter.include_delivered)
            .bind(limit_param(filter.limit))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        debug!(count = rows.len(), "Selected sync candidates");
        Ok(rows.into_iter().map(Order::from).collect())
    }

    async fn delivered_unsettled(&self, limit: Option<usize>) -> StoreResult<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE is_delivered AND settled_at IS NULL \
             ORDER BY updated_at ASC, id \
             LIMIT $1"
        );
        let rows: Vec<OrderRow> = sqlx::query_as(&sql)
            .bind(limit_param(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(rows.into_iter().map(Order::from).collect())
    }

    async fn append_history(&self, entry: &OrderStatusHistory) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO order_status_history
                (id, order_id, old_status, new_status, note, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id)
        .bind(entry.order_id)
        .bind(entry.old_status.as_deref())
        .bind(&entry.new_status)
        .bind(entry.note.as_deref())
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn history_for(&self, order_id: Uuid) -> StoreResult<Vec<OrderStatusHistory>> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            "SELECT id, order_id, old_status, new_status, note, created_at \
             FROM order_status_history WHERE order_id = $1 ORDER BY created_at, id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(OrderStatusHistory::from).collect())
    }

    async fn save_tracking_state(&self, order: &Order) -> StoreResult<()> {
        let delivered = order.status().is_some_and(is_delivered);
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, shipping_status = $3, allow_reshipping = $4,
                is_delivered = $5, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(order.id)
        .bind(order.status.as_deref())
        .bind(order.shipping_status.as_deref())
        .bind(order.allow_reshipping)
        .bind(delivered)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound(order.id));
        }
        Ok(())
    }

    async fn mark_synced(&self, order_id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("UPDATE orders SET last_synced_at = NOW() WHERE id = $1")
            .bind(order_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound(order_id));
        }
        Ok(())
    }
}

#[async_trait]
impl SettlementStore for PgOrderStore {
    async fn claim_and_credit(&self, order_id: Uuid) -> StoreResult<SettlementClaim> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Conditional update is the check-and-set: a concurrent claim blocks on
        // the row lock and then sees settled_at already set.
        let claimed: Option<(Uuid, Decimal)> = sqlx::query_as(
            r#"
            UPDATE orders
            SET settled_at = NOW(), settled_amount = total_amount
            WHERE id = $1 AND settled_at IS NULL
            RETURNING seller_id, total_amount
            "#,
        )
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some((seller_id, amount)) = claimed else {
            let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM orders WHERE id = $1")
                .bind(order_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
            tx.rollback().await.map_err(db_err)?;
            return match exists {
                Some(_) => Ok(SettlementClaim::AlreadySettled),
                None => Err(StoreError::OrderNotFound(order_id)),
            };
        };

        let credited = sqlx::query(
            "UPDATE sellers SET balance = balance + $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(amount)
        .bind(seller_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if credited.rows_affected() == 0 {
            tx.rollback().await.map_err(db_err)?;
            return Err(StoreError::SellerNotFound { order_id, seller_id });
        }

        tx.commit().await.map_err(db_err)?;
        Ok(SettlementClaim::Credited { seller_id, amount })
    }
}
