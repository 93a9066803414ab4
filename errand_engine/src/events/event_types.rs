use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Cents, Order, OrderId, OrderStatusType, Role, ServiceCredit};

/// Published after an order status change has been committed, including claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTransitionedEvent {
    pub order: Order,
    pub from: OrderStatusType,
    pub to: OrderStatusType,
    pub actor_id: i64,
    pub role: Role,
}

impl OrderTransitionedEvent {
    pub fn new(order: Order, from: OrderStatusType, actor_id: i64, role: Role) -> Self {
        let to = order.status;
        Self { order, from, to, actor_id, role }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditGrantedEvent {
    pub credit: ServiceCredit,
}

impl CreditGrantedEvent {
    pub fn new(credit: ServiceCredit) -> Self {
        Self { credit }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditConsumedEvent {
    pub account_id: i64,
    pub order_ref: OrderId,
    pub amount: Cents,
    /// The credit rows closed by this consumption, in FIFO order.
    pub closed: Vec<i64>,
    /// The remainder row created by a split, if any.
    pub remainder: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

/// Published once per order the dispatcher tried to auto-assign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoAssignAttemptedEvent {
    pub order_id: OrderId,
    /// The shopper who got the order, if the assignment went through.
    pub shopper_id: Option<i64>,
    pub candidates: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventType {
    OrderTransitioned(OrderTransitionedEvent),
    CreditGranted(CreditGrantedEvent),
    CreditConsumed(CreditConsumedEvent),
    AutoAssignAttempted(AutoAssignAttemptedEvent),
}
