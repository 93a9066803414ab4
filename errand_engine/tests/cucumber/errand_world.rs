use std::{collections::HashMap, fmt::Debug};

use cucumber::World;
use errand_engine::{db_types::OrderId, FulfillmentError};

use crate::support::prepare_env::TestSystem;

#[derive(Default, World)]
pub struct ErrandWorld {
    pub system: Option<TestSystem>,
    /// Orders placed in the scenario, by the label the feature file gave them.
    pub orders: HashMap<String, OrderId>,
    pub last_error: Option<FulfillmentError>,
}

impl Debug for ErrandWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ErrandWorld ({} orders, last error: {:?})", self.orders.len(), self.last_error)
    }
}

impl ErrandWorld {
    pub fn system(&self) -> &TestSystem {
        self.system.as_ref().expect("System not initialised. Start the scenario with 'Given a fresh install'")
    }

    pub fn order_id(&self, label: &str) -> OrderId {
        *self.orders.get(label).unwrap_or_else(|| panic!("No order labelled {label}"))
    }

    /// Keeps the error of a failed request so that a later step can check it.
    pub fn record<T>(&mut self, result: Result<T, FulfillmentError>) -> Option<T> {
        match result {
            Ok(v) => {
                self.last_error = None;
                Some(v)
            },
            Err(e) => {
                self.last_error = Some(e);
                None
            },
        }
    }
}
