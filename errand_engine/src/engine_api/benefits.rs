use std::fmt::Debug;

use log::*;
use serde::{Deserialize, Serialize};

use crate::{db::traits::ShopperDirectory, db_types::SubscriptionTier, engine_api::errors::FulfillmentError};

/// What a subscription tier entitles an account (or, for the concurrency cap, a shopper) to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionBenefits {
    pub tier: SubscriptionTier,
    /// Orders from this account get the subscription-alignment score from shoppers who take premium orders.
    pub priority_matching: bool,
    pub guaranteed_window_hours: u32,
    pub max_concurrent_orders: i64,
    /// Applied to every service credit granted to the account.
    pub credit_multiplier: f64,
    /// Whether a shopper on this tier may take orders flagged for premium handling.
    pub premium_shopper_eligible: bool,
}

impl SubscriptionBenefits {
    pub fn for_tier(tier: SubscriptionTier) -> Self {
        use SubscriptionTier::*;
        let (priority_matching, guaranteed_window_hours, max_concurrent_orders, credit_multiplier, premium) = match tier
        {
            Free => (false, 0, 1, 1.0, false),
            Plus => (false, 2, 3, 1.25, false),
            Premium => (true, 4, 5, 1.5, true),
        };
        Self {
            tier,
            priority_matching,
            guaranteed_window_hours,
            max_concurrent_orders,
            credit_multiplier,
            premium_shopper_eligible: premium,
        }
    }
}

impl Default for SubscriptionBenefits {
    fn default() -> Self {
        Self::for_tier(SubscriptionTier::Free)
    }
}

/// Looks up an account's tier in the directory and maps it to its benefits. Accounts that never subscribed get the
/// free tier.
pub struct BenefitsResolver<B> {
    db: B,
}

impl<B> Debug for BenefitsResolver<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BenefitsResolver")
    }
}

impl<B> BenefitsResolver<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> BenefitsResolver<B>
where B: ShopperDirectory
{
    pub async fn benefits(&self, account_id: i64) -> Result<SubscriptionBenefits, FulfillmentError> {
        let tier = self.db.fetch_account_tier(account_id).await.map_err(FulfillmentError::database)?;
        let tier = tier.unwrap_or_else(|| {
            trace!("🎟️ Account #{account_id} has no subscription. Using the free tier");
            SubscriptionTier::Free
        });
        Ok(SubscriptionBenefits::for_tier(tier))
    }
}
