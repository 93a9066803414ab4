use crate::db_types::{
    NewAuditEntry,
    NewOrder,
    Order,
    OrderAuditLogEntry,
    OrderId,
    OrderQueryFilter,
    OrderStatusType,
};
use chrono::{DateTime, Utc};

use super::{ClaimResult, TransitionResult};

/// The `OrderManagement` trait defines the behaviour for storing orders and mutating their status.
///
/// Implementations must make every mutating method atomic: either the order row, its items and its audit entry are
/// all written, or none of them are.
#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Stores a new order with `New` status, its items, and the creation audit entry.
    async fn insert_order(
        &self,
        order: NewOrder,
        audit: NewAuditEntry,
        now: DateTime<Utc>,
    ) -> Result<Order, Self::Error>;

    /// Fetches an order, including its items. Returns `None` if it does not exist.
    async fn fetch_order(&self, order_id: OrderId) -> Result<Option<Order>, Self::Error>;

    /// Fetches the orders matching the filter, oldest first.
    async fn fetch_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, Self::Error>;

    /// The audit trail of an order, in the order the entries were accepted.
    async fn fetch_audit_log(&self, order_id: OrderId) -> Result<Vec<OrderAuditLogEntry>, Self::Error>;

    /// The number of orders the shopper currently holds in an active status.
    async fn count_active_orders_for_shopper(&self, shopper_id: i64) -> Result<i64, Self::Error>;

    /// The creation time of the oldest order in the shopper's active queue, if they have one.
    async fn oldest_active_order_for_shopper(&self, shopper_id: i64) -> Result<Option<DateTime<Utc>>, Self::Error>;

    /// Changes the order status from `expected` to `target` and appends `audit`, in a single transaction.
    ///
    /// If the stored status is not `expected`, nothing is written and [`TransitionResult::StatusChanged`] is returned.
    async fn transition_order(
        &self,
        order_id: OrderId,
        expected: OrderStatusType,
        target: OrderStatusType,
        audit: NewAuditEntry,
        now: DateTime<Utc>,
    ) -> Result<TransitionResult, Self::Error>;

    /// Assigns the order to the shopper, moving it from `New` to `Accepted`, and appends `audit`, in a single
    /// transaction.
    ///
    /// The write only happens if the order is still `New` with no shopper, and the shopper holds fewer than
    /// `max_active` active orders at the time of the write.
    async fn claim_order(
        &self,
        order_id: OrderId,
        shopper_id: i64,
        max_active: i64,
        audit: NewAuditEntry,
        now: DateTime<Utc>,
    ) -> Result<ClaimResult, Self::Error>;
}
