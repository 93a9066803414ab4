use crate::db_types::{ShopperProfile, SubscriptionTier};

/// Read access to the account and shopper directory.
#[allow(async_fn_in_trait)]
pub trait ShopperDirectory {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn fetch_shopper(&self, shopper_id: i64) -> Result<Option<ShopperProfile>, Self::Error>;

    /// The subscription tier of the account, or `None` if the account has never subscribed.
    async fn fetch_account_tier(&self, account_id: i64) -> Result<Option<SubscriptionTier>, Self::Error>;

    /// Every shopper currently flagged as online. Eligibility is checked by the caller.
    async fn fetch_online_shoppers(&self) -> Result<Vec<ShopperProfile>, Self::Error>;
}
