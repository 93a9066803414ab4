//! The order transition table.
//!
//! Every legal status change is one [`TransitionRule`] row in [`TRANSITION_TABLE`]. Anything not in the table is
//! illegal. The claim (`New → Accepted` by a shopper) is in the table too, but is only reachable through
//! [`crate::ClaimApi`], which adds the eligibility and capacity checks.
use std::collections::BTreeSet;

use crate::db_types::{
    OrderStatusType::{self, *},
    ReceiptCheck,
    Role,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub from: OrderStatusType,
    pub role: Role,
    pub to: OrderStatusType,
    /// When set, the rule only applies to orders with this receipt policy.
    pub requires: Option<ReceiptCheck>,
}

const fn rule(from: OrderStatusType, role: Role, to: OrderStatusType) -> TransitionRule {
    TransitionRule { from, role, to, requires: None }
}

const fn guarded(from: OrderStatusType, role: Role, to: OrderStatusType, policy: ReceiptCheck) -> TransitionRule {
    TransitionRule { from, role, to, requires: Some(policy) }
}

pub const TRANSITION_TABLE: &[TransitionRule] = &[
    rule(New, Role::Customer, Cancelled),
    rule(New, Role::Shopper, Accepted),
    rule(New, Role::Admin, Cancelled),
    rule(Accepted, Role::Customer, Cancelled),
    rule(Accepted, Role::Shopper, Shopping),
    rule(Accepted, Role::Admin, Shopping),
    rule(Accepted, Role::Admin, Cancelled),
    guarded(Shopping, Role::Shopper, AwaitReceiptOk, ReceiptCheck::Required),
    guarded(Shopping, Role::Shopper, Enroute, ReceiptCheck::Auto),
    rule(Shopping, Role::Admin, AwaitReceiptOk),
    rule(Shopping, Role::Admin, Enroute),
    rule(Shopping, Role::Admin, Cancelled),
    rule(AwaitReceiptOk, Role::Customer, Enroute),
    rule(AwaitReceiptOk, Role::Customer, Shopping),
    rule(AwaitReceiptOk, Role::Admin, Enroute),
    rule(AwaitReceiptOk, Role::Admin, Shopping),
    rule(AwaitReceiptOk, Role::Admin, Cancelled),
    rule(Enroute, Role::Shopper, Delivered),
    rule(Enroute, Role::Admin, Delivered),
    rule(Enroute, Role::Admin, Cancelled),
    rule(Delivered, Role::Admin, Cancelled),
];

/// The statuses `role` may move an order to from `from`, given the order's receipt policy.
pub fn allowed_targets(from: OrderStatusType, role: Role, receipt_check: ReceiptCheck) -> BTreeSet<OrderStatusType> {
    TRANSITION_TABLE
        .iter()
        .filter(|r| r.from == from && r.role == role)
        .filter(|r| r.requires.map_or(true, |p| p == receipt_check))
        .map(|r| r.to)
        .collect()
}

pub fn is_allowed(from: OrderStatusType, to: OrderStatusType, role: Role, receipt_check: ReceiptCheck) -> bool {
    allowed_targets(from, role, receipt_check).contains(&to)
}

/// What the account holder decided about the receipt the shopper submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptDecision {
    Approve,
    Reject,
}

impl ReceiptDecision {
    pub fn target(&self) -> OrderStatusType {
        match self {
            Self::Approve => Enroute,
            Self::Reject => Shopping,
        }
    }
}
