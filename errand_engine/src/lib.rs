//! Errand fulfillment engine
//!
//! The core of a personal-shopping delivery service: orders move through a role-checked state machine, shoppers
//! claim them (at most one per order, however many try at once), a matcher ranks shoppers for auto-assignment, and a
//! ledger keeps track of the service credits granted to customers.
//!
//! The library is divided into two main sections:
//! 1. Database management and control. SQLite is the supported backend, exposed as [`SqliteDatabase`]. You should
//!    never need to access the database directly. Use the public API instead. The data types used in the database are
//!    defined in [`db_types`] and are public.
//! 2. The engine public API ([`mod@engine_api`]): [`OrderFlowApi`], [`ClaimApi`], [`MatchingApi`], [`LedgerApi`] and
//!    [`BenefitsResolver`].
//!
//! The engine also emits events (order transitions, credit grants and debits, auto-assign attempts) that you can hook
//! into. See [`events`].
mod db;

pub mod db_types;
pub mod engine_api;
pub mod events;
pub mod helpers;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use db::sqlite::{SqliteDatabase, SqliteDatabaseError};
pub use db::traits::{ClaimResult, ConsumeResult, CreditLedger, OrderManagement, ShopperDirectory, TransitionResult};
pub use engine_api::{
    benefits::{BenefitsResolver, SubscriptionBenefits},
    claim_api::ClaimApi,
    config::{LedgerConfig, ScoringConfig},
    errors::FulfillmentError,
    ledger_api::{CreditConsumption, GrantRequest, LedgerApi},
    matching_api::{rank_candidates, AutoAssignOutcome, AutoAssignReport, MatchCriteria, MatchingApi},
    order_flow_api::OrderFlowApi,
    scoring::{CandidateScore, Disqualification, ScoreBreakdown, Scorer, ShopperCandidate},
    transitions::{allowed_targets, ReceiptDecision, TransitionRule, TRANSITION_TABLE},
};
