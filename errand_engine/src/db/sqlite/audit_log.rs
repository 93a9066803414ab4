use chrono::{DateTime, Utc};
use log::trace;
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{NewAuditEntry, OrderAuditLogEntry, OrderId},
};

impl<'r> FromRow<'r, SqliteRow> for OrderAuditLogEntry {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let role: String = row.try_get("actor_role")?;
        let payload: String = row.try_get("payload")?;
        Ok(Self {
            id: row.try_get("id")?,
            order_id: row.try_get("order_id")?,
            actor_id: row.try_get("actor_id")?,
            actor_role: role.parse().map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            action: row.try_get("action")?,
            payload: serde_json::from_str(&payload).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Appends an entry to the order's audit trail. The audit log is append-only; there is no update or delete.
pub(crate) async fn insert_entry(
    order_id: OrderId,
    entry: NewAuditEntry,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<i64, SqliteDatabaseError> {
    let payload = serde_json::to_string(&entry.payload)?;
    let id = sqlx::query(
        r#"INSERT INTO order_audit_log (order_id, actor_id, actor_role, action, payload, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)"#,
    )
    .bind(order_id)
    .bind(entry.actor_id)
    .bind(entry.actor_role.to_string())
    .bind(&entry.action)
    .bind(payload)
    .bind(now)
    .execute(conn)
    .await?
    .last_insert_rowid();
    trace!("🗃️ Audit entry #{id} ({}) recorded for order {order_id}", entry.action);
    Ok(id)
}

pub async fn fetch_entries(
    order_id: OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderAuditLogEntry>, SqliteDatabaseError> {
    let entries = sqlx::query_as::<_, OrderAuditLogEntry>("SELECT * FROM order_audit_log WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(entries)
}
