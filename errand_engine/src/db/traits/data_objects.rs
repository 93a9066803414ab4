use crate::db_types::{Cents, Order, OrderStatusType, ServiceCredit};

/// The outcome of a compare-and-swap status change.
#[derive(Debug, Clone)]
pub enum TransitionResult {
    /// The status matched the expected value and was changed. Contains the updated order.
    Applied(Order),
    /// The status had already moved on. Nothing was written. Contains the status that was found.
    StatusChanged(OrderStatusType),
}

/// The outcome of a claim attempt.
#[derive(Debug, Clone)]
pub enum ClaimResult {
    /// The order was unassigned and `New`, and now belongs to the shopper.
    Claimed(Order),
    /// Somebody else got there first, or the order left the `New` state.
    Unavailable,
    /// The shopper already has `active` orders, which is at or above their cap.
    AtCapacity { active: i64 },
}

/// The outcome of a FIFO consumption.
#[derive(Debug, Clone)]
pub enum ConsumeResult {
    /// The full amount was debited. `closed` holds the rows that were closed by this debit, in FIFO order, and
    /// `remainder` holds the unconsumed row split off the last one, if it was only partially used.
    Consumed { closed: Vec<ServiceCredit>, remainder: Option<ServiceCredit> },
    /// The unexpired balance was too low. Nothing was written.
    Insufficient { available: Cents },
}
