use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};

use crate::{
    db::{sqlite::SqliteDatabaseError, traits::ConsumeResult},
    db_types::{Cents, ConsumeRequest, LedgerEvent, LedgerEventKind, NewCredit, OrderId, ServiceCredit},
};

impl<'r> FromRow<'r, SqliteRow> for ServiceCredit {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let reason: String = row.try_get("reason")?;
        Ok(Self {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            amount: row.try_get("amount")?,
            original_amount: row.try_get("original_amount")?,
            reason: reason.parse().map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            order_ref: row.try_get("order_ref")?,
            expires_at: row.try_get("expires_at")?,
            consumed_at: row.try_get("consumed_at")?,
            consumed_amount: row.try_get("consumed_amount")?,
            consumed_for_order: row.try_get("consumed_for_order")?,
            parent_id: row.try_get("parent_id")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for LedgerEvent {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let kind: String = row.try_get("kind")?;
        let credit_ids: String = row.try_get("credit_ids")?;
        let credit_ids = credit_ids
            .split(',')
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<i64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(Self {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            kind: kind.parse().map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            amount: row.try_get("amount")?,
            order_ref: row.try_get("order_ref")?,
            credit_ids,
            created_at: row.try_get("created_at")?,
        })
    }
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",")
}

/// Inserts a credit row. `parent_id` is set for remainders split off a partially consumed credit.
pub(crate) async fn insert_credit(
    credit: NewCredit,
    parent_id: Option<i64>,
    conn: &mut SqliteConnection,
) -> Result<ServiceCredit, SqliteDatabaseError> {
    let id = sqlx::query(
        r#"INSERT INTO service_credits (account_id, amount, original_amount, reason, order_ref, expires_at, parent_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
    )
    .bind(credit.account_id)
    .bind(credit.amount)
    .bind(credit.original_amount)
    .bind(credit.reason.to_string())
    .bind(credit.order_ref)
    .bind(credit.expires_at)
    .bind(parent_id)
    .bind(credit.created_at)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();
    trace!("🗃️ Credit #{id} of {} stored for account #{}", credit.amount, credit.account_id);
    fetch_credit(id, conn).await?.ok_or(SqliteDatabaseError::CreditNotFound(id))
}

pub async fn fetch_credit(id: i64, conn: &mut SqliteConnection) -> Result<Option<ServiceCredit>, SqliteDatabaseError> {
    let credit = sqlx::query_as::<_, ServiceCredit>("SELECT * FROM service_credits WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(credit)
}

pub async fn fetch_credits(account_id: i64, conn: &mut SqliteConnection) -> Result<Vec<ServiceCredit>, SqliteDatabaseError> {
    let credits = sqlx::query_as::<_, ServiceCredit>("SELECT * FROM service_credits WHERE account_id = $1 ORDER BY id")
        .bind(account_id)
        .fetch_all(conn)
        .await?;
    Ok(credits)
}

pub(crate) async fn insert_ledger_event(
    account_id: i64,
    kind: LedgerEventKind,
    amount: Cents,
    order_ref: Option<OrderId>,
    credit_ids: &[i64],
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<i64, SqliteDatabaseError> {
    let id = sqlx::query(
        "INSERT INTO ledger_events (account_id, kind, amount, order_ref, credit_ids, created_at) VALUES ($1, $2, $3, \
         $4, $5, $6)",
    )
    .bind(account_id)
    .bind(kind.to_string())
    .bind(amount)
    .bind(order_ref)
    .bind(join_ids(credit_ids))
    .bind(now)
    .execute(conn)
    .await?
    .last_insert_rowid();
    Ok(id)
}

async fn set_ledger_event_credits(
    event_id: i64,
    credit_ids: &[i64],
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    sqlx::query("UPDATE ledger_events SET credit_ids = $1 WHERE id = $2")
        .bind(join_ids(credit_ids))
        .bind(event_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn fetch_ledger_events(account_id: i64, conn: &mut SqliteConnection) -> Result<Vec<LedgerEvent>, SqliteDatabaseError> {
    let events = sqlx::query_as::<_, LedgerEvent>("SELECT * FROM ledger_events WHERE account_id = $1 ORDER BY id")
        .bind(account_id)
        .fetch_all(conn)
        .await?;
    Ok(events)
}

/// Marks a credit row as consumed. The face amount of the row is left untouched; `consumed_amount` records how much of
/// it was used.
async fn close_credit(
    id: i64,
    consumed: Cents,
    order_ref: OrderId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    let rows = sqlx::query(
        "UPDATE service_credits SET consumed_at = $1, consumed_amount = $2, consumed_for_order = $3 WHERE id = $4 AND \
         consumed_at IS NULL",
    )
    .bind(now)
    .bind(consumed)
    .bind(order_ref)
    .bind(id)
    .execute(conn)
    .await?
    .rows_affected();
    if rows != 1 {
        return Err(SqliteDatabaseError::QueryError(format!("Credit #{id} was already consumed")));
    }
    Ok(())
}

/// Debits `request.amount` from the account's available credits, earliest expiry first.
///
/// Fully used credits are closed. If the last credit is only partly needed, it is closed with the used part as its
/// `consumed_amount`, and a new row carrying the rest is written with `parent_id` pointing back at it.
///
/// This must run inside a transaction. The consumption event is written first so that the transaction holds the write
/// lock before the balance is read. On [`ConsumeResult::Insufficient`] the caller must roll the transaction back.
pub(crate) async fn consume_credits(
    request: ConsumeRequest,
    conn: &mut SqliteConnection,
) -> Result<ConsumeResult, SqliteDatabaseError> {
    let ConsumeRequest { account_id, amount, order_ref, now } = request;
    let event_id =
        insert_ledger_event(account_id, LedgerEventKind::Consume, amount, Some(order_ref), &[], now, conn).await?;
    let mut available =
        fetch_credits(account_id, conn).await?.into_iter().filter(|c| c.is_available(now)).collect::<Vec<_>>();
    available.sort_by(|a, b| a.expires_at.cmp(&b.expires_at).then(a.id.cmp(&b.id)));
    let balance = available.iter().map(|c| c.amount).sum::<Cents>();
    if balance < amount {
        debug!("🗃️ Account #{account_id} has {balance} in credits. Cannot consume {amount}");
        return Ok(ConsumeResult::Insufficient { available: balance });
    }
    let mut remaining = amount;
    let mut closed_ids = Vec::new();
    let mut remainder = None;
    for credit in available {
        if !remaining.is_positive() {
            break;
        }
        if credit.amount <= remaining {
            close_credit(credit.id, credit.amount, order_ref, now, conn).await?;
            remaining -= credit.amount;
        } else {
            close_credit(credit.id, remaining, order_ref, now, conn).await?;
            let rest = NewCredit {
                account_id,
                amount: credit.amount - remaining,
                original_amount: credit.original_amount,
                reason: credit.reason,
                order_ref: credit.order_ref,
                expires_at: credit.expires_at,
                created_at: now,
            };
            let row = insert_credit(rest, Some(credit.id), conn).await?;
            trace!("🗃️ Credit #{} split. {} remains on new credit #{}", credit.id, row.amount, row.id);
            remainder = Some(row);
            remaining = Cents::from(0);
        }
        closed_ids.push(credit.id);
    }
    let mut event_ids = closed_ids.clone();
    if let Some(r) = &remainder {
        event_ids.push(r.id);
    }
    set_ledger_event_credits(event_id, &event_ids, conn).await?;
    let mut closed = Vec::with_capacity(closed_ids.len());
    for id in closed_ids {
        closed.push(fetch_credit(id, conn).await?.ok_or(SqliteDatabaseError::CreditNotFound(id))?);
    }
    debug!("🗃️ {amount} consumed from {} credits of account #{account_id} for order {order_ref}", closed.len());
    Ok(ConsumeResult::Consumed { closed, remainder })
}
