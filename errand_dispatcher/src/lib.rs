//! # Errand dispatcher
//! The dispatcher is the long-running half of the fulfillment core. It:
//! * opens (and migrates) the order database,
//! * wires up the event hooks, which log every committed transition and auto-assign attempt,
//! * periodically hands waiting orders to their best-scoring shopper, through the same claim path that shoppers use.
//!
//! ## Configuration
//! The dispatcher is configured via environment variables. See [config](config/index.html) for more information.

pub mod cli;
pub mod config;
pub mod dispatch_worker;
pub mod dispatcher;
pub mod errors;
