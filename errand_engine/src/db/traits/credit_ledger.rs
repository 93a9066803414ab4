use crate::db_types::{ConsumeRequest, LedgerEvent, NewCredit, ServiceCredit};

use super::ConsumeResult;

/// The `CreditLedger` trait defines the store for service credits.
///
/// The ledger is append-mostly. The only in-place change a backend may make to an existing row is to close it
/// (setting `consumed_at`, `consumed_amount` and `consumed_for_order`). Each grant and each successful consumption
/// also appends a [`LedgerEvent`].
#[allow(async_fn_in_trait)]
pub trait CreditLedger {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Stores a new, unconsumed credit and its grant event.
    async fn insert_credit(&self, credit: NewCredit) -> Result<ServiceCredit, Self::Error>;

    /// Debits the requested amount from the account's available credits, earliest expiry first, splitting the last
    /// credit if it is only partly needed. The whole debit happens in a single transaction; if the available balance
    /// is too low, nothing is written.
    async fn consume_credits(&self, request: ConsumeRequest) -> Result<ConsumeResult, Self::Error>;

    /// All credit rows of the account, closed ones included, in id order.
    async fn fetch_credits(&self, account_id: i64) -> Result<Vec<ServiceCredit>, Self::Error>;

    async fn fetch_ledger_events(&self, account_id: i64) -> Result<Vec<LedgerEvent>, Self::Error>;
}
