//! # Errand engine public API
//!
//! The `engine_api` module exposes the programmatic API of the fulfillment engine. Each API wraps a database backend
//! that implements the backend traits it needs, so that different parts can be composed as required.
//!
//! * [`order_flow_api`] is the order state machine: order creation, role-checked status transitions, receipt reviews,
//!   and order queries.
//! * [`claim_api`] arbitrates concurrent claims so that an order gets at most one shopper.
//! * [`matching_api`] ranks shoppers for an order using [`scoring`], and auto-assigns orders to the best candidate.
//! * [`ledger_api`] grants and consumes service credits.
//! * [`benefits`] maps subscription tiers to what they entitle an account to.
//!
//! # API usage
//!
//! ```rust,ignore
//! use errand_engine::{ClaimApi, OrderFlowApi, SqliteDatabase, events::EventProducers};
//! let db = SqliteDatabase::new_with_url("sqlite://data/errand.db", 25).await?;
//! db.migrate().await?;
//! let orders = OrderFlowApi::new(db, EventProducers::default());
//! let claims = ClaimApi::new(orders.clone());
//! let order = claims.claim(order_id, shopper_id, None).await?;
//! ```
pub mod benefits;
pub mod claim_api;
pub mod config;
pub mod errors;
pub mod ledger_api;
pub mod matching_api;
pub mod order_flow_api;
pub mod scoring;
pub mod transitions;

/// Log target for refused transitions, lost claims and declined debits. These never reach the audit log.
pub const REJECTIONS: &str = "errand::rejections";
