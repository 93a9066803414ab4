use thiserror::Error;

use crate::db_types::{Cents, OrderId, OrderStatusType, Role};

/// Every error the fulfillment APIs can return. Backend errors are flattened into [`FulfillmentError::DatabaseError`]
/// at the API boundary, so callers never need to know which backend is in use.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FulfillmentError {
    #[error("A {role} cannot move an order from {from} to {to}")]
    InvalidTransition { from: OrderStatusType, to: OrderStatusType, role: Role },
    #[error("Actor #{actor_id} ({role}) is not allowed to act on order {order_id}")]
    Unauthorized { order_id: OrderId, actor_id: i64, role: Role },
    #[error("Order {0} is no longer available to claim")]
    OrderUnavailable(OrderId),
    #[error("Shopper #{shopper_id} is not eligible: {reason}")]
    ShopperIneligible { shopper_id: i64, reason: String },
    #[error("Insufficient credit. Requested {requested}, but only {available} is available")]
    InsufficientCredit { requested: Cents, available: Cents },
    #[error("The credit would already be expired")]
    ExpiredCredit,
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl FulfillmentError {
    pub fn database<E: std::error::Error>(e: E) -> Self {
        Self::DatabaseError(e.to_string())
    }

    pub fn ineligible<S: Into<String>>(shopper_id: i64, reason: S) -> Self {
        Self::ShopperIneligible { shopper_id, reason: reason.into() }
    }
}
