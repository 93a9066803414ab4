use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{sqlite::SqliteRow, FromRow, QueryBuilder, Row, SqliteConnection};

use crate::{
    db::{
        sqlite::{audit_log, SqliteDatabaseError},
        traits::{ClaimResult, TransitionResult},
    },
    db_types::{
        DeliveryAddress,
        GeoPoint,
        NewAuditEntry,
        NewOrder,
        Order,
        OrderItem,
        OrderId,
        OrderQueryFilter,
        OrderStatusType,
        PriceRange,
    },
};

fn decode_err<E: std::error::Error + Send + Sync + 'static>(e: E) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(e))
}

/// The SQL list of status labels that count towards a shopper's workload, e.g. `('accepted','shopping')`.
pub(crate) fn active_statuses_sql() -> String {
    let labels = OrderStatusType::ALL.iter().filter(|s| s.is_active()).map(|s| format!("'{s}'")).collect::<Vec<_>>();
    format!("({})", labels.join(","))
}

impl<'r> FromRow<'r, SqliteRow> for Order {
    /// Decodes the order row. Items live in their own table and are attached separately.
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let mode: String = row.try_get("mode")?;
        let receipt_check: String = row.try_get("receipt_check")?;
        let location = GeoPoint::new(row.try_get("latitude")?, row.try_get("longitude")?);
        Ok(Self {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            status: status.parse().map_err(decode_err)?,
            mode: mode.parse().map_err(decode_err)?,
            receipt_check: receipt_check.parse().map_err(decode_err)?,
            estimate_amount: row.try_get("estimate_amount")?,
            deadline: row.try_get("deadline")?,
            priority: row.try_get("priority")?,
            address: DeliveryAddress {
                street: row.try_get("street")?,
                city: row.try_get("city")?,
                postcode: row.try_get("postcode")?,
                location,
            },
            items: Vec::new(),
            shopper_id: row.try_get("shopper_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for OrderItem {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            order_id: row.try_get("order_id")?,
            name: row.try_get("name")?,
            quantity: row.try_get("quantity")?,
            price: PriceRange { min: row.try_get("min_price")?, max: row.try_get("max_price")? },
            substitution_allowed: row.try_get("substitution_allowed")?,
            note: row.try_get("note")?,
            category: row.try_get("category")?,
        })
    }
}

/// Inserts a new order, its items and its creation audit entry using the given connection. This is not atomic. Embed
/// this call inside a transaction if you need atomicity, and pass `&mut *tx` as the connection argument.
pub(crate) async fn insert_order(
    order: NewOrder,
    audit: NewAuditEntry,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, SqliteDatabaseError> {
    let id = sqlx::query(
        r#"
            INSERT INTO orders (
                account_id,
                status,
                mode,
                receipt_check,
                estimate_amount,
                deadline,
                priority,
                street,
                city,
                postcode,
                latitude,
                longitude,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
        "#,
    )
    .bind(order.account_id)
    .bind(OrderStatusType::New.to_string())
    .bind(order.mode.to_string())
    .bind(order.receipt_check.to_string())
    .bind(order.estimate_amount)
    .bind(order.deadline)
    .bind(order.priority)
    .bind(&order.address.street)
    .bind(&order.address.city)
    .bind(&order.address.postcode)
    .bind(order.address.location.latitude)
    .bind(order.address.location.longitude)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();
    let order_id = OrderId(id);
    for (position, item) in order.items.iter().enumerate() {
        sqlx::query(
            r#"INSERT INTO order_items (order_id, position, name, quantity, min_price, max_price, substitution_allowed, note, category)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(order_id)
        .bind(position as i64)
        .bind(&item.name)
        .bind(item.quantity)
        .bind(item.price.min)
        .bind(item.price.max)
        .bind(item.substitution_allowed)
        .bind(&item.note)
        .bind(&item.category)
        .execute(&mut *conn)
        .await?;
    }
    audit_log::insert_entry(order_id, audit, now, conn).await?;
    debug!("🗃️ Order {order_id} with {} items has been saved", order.items.len());
    fetch_order(order_id, conn).await?.ok_or(SqliteDatabaseError::OrderNotFound(id))
}

pub async fn fetch_order(order_id: OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, SqliteDatabaseError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?;
    match order {
        Some(mut order) => {
            order.items = fetch_items(order_id, conn).await?;
            Ok(Some(order))
        },
        None => Ok(None),
    }
}

pub async fn fetch_items(order_id: OrderId, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, SqliteDatabaseError> {
    let items = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1 ORDER BY position")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(items)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are returned in the order they were placed.
pub async fn fetch_orders(
    query: OrderQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, SqliteDatabaseError> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(account_id) = query.account_id {
        where_clause.push("account_id = ");
        where_clause.push_bind_unseparated(account_id);
    }
    if let Some(shopper_id) = query.shopper_id {
        where_clause.push("shopper_id = ");
        where_clause.push_bind_unseparated(shopper_id);
    }
    if query.unassigned {
        where_clause.push("shopper_id IS NULL");
    }
    if !query.statuses.is_empty() {
        let statuses = query.statuses.iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(",");
        where_clause.push(format!("status IN ({statuses})"));
    }
    if query.priority_first {
        builder.push(" ORDER BY COALESCE(priority, 0) DESC, created_at ASC, id ASC");
    } else {
        builder.push(" ORDER BY id ASC");
    }
    if let Some(limit) = query.limit {
        builder.push(" LIMIT ");
        builder.push_bind(limit);
    }
    trace!("🗃️ Executing query: {}", builder.sql());
    let mut orders = builder.build_query_as::<Order>().fetch_all(&mut *conn).await?;
    for order in orders.iter_mut() {
        order.items = fetch_items(order.id, conn).await?;
    }
    trace!("🗃️ Result of fetch_orders: {}", orders.len());
    Ok(orders)
}

pub async fn count_active_orders(shopper_id: i64, conn: &mut SqliteConnection) -> Result<i64, SqliteDatabaseError> {
    let sql = format!("SELECT COUNT(*) FROM orders WHERE shopper_id = $1 AND status IN {}", active_statuses_sql());
    let count: i64 = sqlx::query_scalar(&sql).bind(shopper_id).fetch_one(conn).await?;
    Ok(count)
}

pub async fn oldest_active_order(
    shopper_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<DateTime<Utc>>, SqliteDatabaseError> {
    let sql = format!("SELECT created_at FROM orders WHERE shopper_id = $1 AND status IN {}", active_statuses_sql());
    let timestamps: Vec<DateTime<Utc>> = sqlx::query_scalar(&sql).bind(shopper_id).fetch_all(conn).await?;
    Ok(timestamps.into_iter().min())
}

async fn fetch_status(order_id: OrderId, conn: &mut SqliteConnection) -> Result<Option<OrderStatusType>, SqliteDatabaseError> {
    let status: Option<String> =
        sqlx::query_scalar("SELECT status FROM orders WHERE id = $1").bind(order_id).fetch_optional(conn).await?;
    Ok(status.map(|s| s.parse::<OrderStatusType>()).transpose()?)
}

/// Compare-and-swap on the order status. The `UPDATE` only matches if the stored status is still `expected`, so two
/// writers racing on the same order cannot both succeed. Must be called inside a transaction so that the audit entry
/// is written atomically with the status change.
pub(crate) async fn transition_order(
    order_id: OrderId,
    expected: OrderStatusType,
    target: OrderStatusType,
    audit: NewAuditEntry,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<TransitionResult, SqliteDatabaseError> {
    let rows = sqlx::query("UPDATE orders SET status = $1, updated_at = $2 WHERE id = $3 AND status = $4")
        .bind(target.to_string())
        .bind(now)
        .bind(order_id)
        .bind(expected.to_string())
        .execute(&mut *conn)
        .await?
        .rows_affected();
    if rows == 0 {
        let current = fetch_status(order_id, conn).await?.ok_or(SqliteDatabaseError::OrderNotFound(order_id.value()))?;
        debug!("🗃️ Order {order_id} is {current}, not {expected}. {expected} → {target} was not applied");
        return Ok(TransitionResult::StatusChanged(current));
    }
    audit_log::insert_entry(order_id, audit, now, conn).await?;
    let order = fetch_order(order_id, conn).await?.ok_or(SqliteDatabaseError::OrderNotFound(order_id.value()))?;
    debug!("🗃️ Order {order_id} moved from {expected} to {target}");
    Ok(TransitionResult::Applied(order))
}

/// Conditional assignment of an order to a shopper. A single `UPDATE` checks that the order is still new and
/// unassigned, and that the shopper is under their cap, so the capacity check cannot be raced either.
pub(crate) async fn claim_order(
    order_id: OrderId,
    shopper_id: i64,
    max_active: i64,
    audit: NewAuditEntry,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<ClaimResult, SqliteDatabaseError> {
    let sql = format!(
        r#"UPDATE orders SET status = $1, shopper_id = $2, updated_at = $3
        WHERE id = $4 AND status = $5 AND shopper_id IS NULL
        AND (SELECT COUNT(*) FROM orders WHERE shopper_id = $2 AND status IN {}) < $6"#,
        active_statuses_sql()
    );
    let rows = sqlx::query(&sql)
        .bind(OrderStatusType::Accepted.to_string())
        .bind(shopper_id)
        .bind(now)
        .bind(order_id)
        .bind(OrderStatusType::New.to_string())
        .bind(max_active)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    if rows == 0 {
        let order = fetch_order(order_id, conn).await?;
        return match order {
            Some(o) if o.status == OrderStatusType::New && o.shopper_id.is_none() => {
                let active = count_active_orders(shopper_id, conn).await?;
                debug!("🗃️ Shopper #{shopper_id} holds {active} active orders and cannot claim order {order_id}");
                Ok(ClaimResult::AtCapacity { active })
            },
            _ => {
                debug!("🗃️ Order {order_id} is no longer available to claim");
                Ok(ClaimResult::Unavailable)
            },
        };
    }
    audit_log::insert_entry(order_id, audit, now, conn).await?;
    let order = fetch_order(order_id, conn).await?.ok_or(SqliteDatabaseError::OrderNotFound(order_id.value()))?;
    debug!("🗃️ Order {order_id} claimed by shopper #{shopper_id}");
    Ok(ClaimResult::Claimed(order))
}
