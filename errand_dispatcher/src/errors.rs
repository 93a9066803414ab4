use errand_engine::{FulfillmentError, SqliteDatabaseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Could not initialize the dispatcher. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend. {0}")]
    BackendError(#[from] FulfillmentError),
    #[error("Database error. {0}")]
    DatabaseError(#[from] SqliteDatabaseError),
    #[error("An I/O error happened in the dispatcher. {0}")]
    IOError(#[from] std::io::Error),
}
