use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqliteDatabaseError {
    #[error("Database connection error: {0}")]
    DriverError(#[from] sqlx::Error),
    #[error("Database migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
    #[error("Database query error: {0}")]
    QueryError(String),
    #[error("Stored data could not be decoded: {0}")]
    DecodeError(String),
    #[error("Order {0} not found")]
    OrderNotFound(i64),
    #[error("Service credit #{0} not found")]
    CreditNotFound(i64),
}

impl From<crate::db_types::ConversionError> for SqliteDatabaseError {
    fn from(e: crate::db_types::ConversionError) -> Self {
        Self::DecodeError(e.0)
    }
}

impl From<serde_json::Error> for SqliteDatabaseError {
    fn from(e: serde_json::Error) -> Self {
        Self::DecodeError(e.to_string())
    }
}
