//! #  Database management and control.
//!
//! This module provides the interfaces that define the interface contracts of the fulfillment engine database
//! *backends*.
//!
//! ## Orders
//! An order belongs to the account that placed it. Once a shopper claims it, the order also references that shopper.
//! Every accepted status change is written together with an audit entry in one atomic unit.
//!
//! ## Credits
//! Service credits are owned by an account. The ledger backend is the only writer of credit rows, and never edits the
//! face amount of a row in place: partial consumption closes the row and writes a remainder row.
//!
//! ## Traits
//!
//! * [`OrderManagement`] defines order storage, the compare-and-swap status transition and the claim.
//! * [`CreditLedger`] defines the credit store, including atomic FIFO consumption.
//! * [`ShopperDirectory`] defines the read-only view of shopper profiles and account subscription tiers.
mod credit_ledger;
mod data_objects;
mod order_management;
mod shopper_directory;

pub use credit_ledger::CreditLedger;
pub use data_objects::{ClaimResult, ConsumeResult, TransitionResult};
pub use order_management::OrderManagement;
pub use shopper_directory::ShopperDirectory;
