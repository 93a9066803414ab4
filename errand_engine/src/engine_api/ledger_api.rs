use std::{fmt::Debug, sync::Arc};

use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    db::traits::{ConsumeResult, CreditLedger, ShopperDirectory},
    db_types::{Cents, ConsumeRequest, CreditReason, LedgerEvent, NewCredit, OrderId, ServiceCredit},
    engine_api::{benefits::BenefitsResolver, config::LedgerConfig, errors::FulfillmentError, REJECTIONS},
    events::{CreditConsumedEvent, CreditGrantedEvent, EventProducers},
    helpers::{Clock, KeyedLocks, SystemClock},
};

/// A request to grant a service credit. The amount is the pre-multiplier value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantRequest {
    pub account_id: i64,
    pub amount: Cents,
    pub reason: CreditReason,
    pub order_ref: Option<OrderId>,
    /// Overrides the configured expiry horizon.
    pub expires_at: Option<DateTime<Utc>>,
}

impl GrantRequest {
    pub fn new(account_id: i64, amount: Cents, reason: CreditReason) -> Self {
        Self { account_id, amount, reason, order_ref: None, expires_at: None }
    }

    pub fn for_order(mut self, order_id: OrderId) -> Self {
        self.order_ref = Some(order_id);
        self
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

/// The rows touched by a successful consumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditConsumption {
    pub closed: Vec<ServiceCredit>,
    pub remainder: Option<ServiceCredit>,
}

/// `LedgerApi` grants service credits and spends them, oldest expiry first.
///
/// Debits for one account are serialised through a per-account lock, and each debit is a single database
/// transaction, so two concurrent debits can never both spend the same credit.
pub struct LedgerApi<B> {
    db: B,
    benefits: BenefitsResolver<B>,
    producers: EventProducers,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
    locks: Arc<KeyedLocks<i64>>,
}

impl<B> Debug for LedgerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LedgerApi ({:?})", self.config)
    }
}

impl<B: Clone> Clone for LedgerApi<B> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            benefits: BenefitsResolver::new(self.db.clone()),
            producers: self.producers.clone(),
            clock: Arc::clone(&self.clock),
            config: self.config,
            locks: Arc::clone(&self.locks),
        }
    }
}

impl<B: Clone> LedgerApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        let benefits = BenefitsResolver::new(db.clone());
        Self {
            db,
            benefits,
            producers,
            clock: Arc::new(SystemClock),
            config: LedgerConfig::default(),
            locks: Arc::new(KeyedLocks::new("credit account")),
        }
    }
}

impl<B> LedgerApi<B> {
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: LedgerConfig) -> Self {
        self.config = config;
        self
    }
}

impl<B> LedgerApi<B>
where B: CreditLedger + ShopperDirectory
{
    /// Grants a credit. The stored amount is the requested amount times the account's tier multiplier; the requested
    /// amount is kept as `original_amount`.
    pub async fn grant(&self, request: GrantRequest) -> Result<ServiceCredit, FulfillmentError> {
        if !request.amount.is_positive() {
            return Err(FulfillmentError::InvalidInput(format!("Credit amount must be positive, not {}", request.amount)));
        }
        let now = self.clock.now();
        let expires_at = request.expires_at.unwrap_or(now + self.config.credit_expiry);
        if expires_at <= now {
            info!(target: REJECTIONS, "Credit for account #{} would expire at {expires_at}", request.account_id);
            return Err(FulfillmentError::ExpiredCredit);
        }
        let benefits = self.benefits.benefits(request.account_id).await?;
        let amount = request.amount.scale(benefits.credit_multiplier);
        let credit = NewCredit {
            account_id: request.account_id,
            amount,
            original_amount: request.amount,
            reason: request.reason,
            order_ref: request.order_ref,
            expires_at,
            created_at: now,
        };
        let credit = self.db.insert_credit(credit).await.map_err(FulfillmentError::database)?;
        info!(
            "💳️ Credit #{} of {amount} ({} x {}) granted to account #{} for {}",
            credit.id, request.amount, benefits.credit_multiplier, credit.account_id, credit.reason
        );
        self.producers.publish_credit_granted(CreditGrantedEvent::new(credit.clone())).await;
        Ok(credit)
    }

    /// Spends `amount` of the account's credits against an order. Either the whole amount is debited, or nothing
    /// changes and [`FulfillmentError::InsufficientCredit`] is returned.
    pub async fn consume(
        &self,
        account_id: i64,
        amount: Cents,
        order_ref: OrderId,
    ) -> Result<CreditConsumption, FulfillmentError> {
        if !amount.is_positive() {
            return Err(FulfillmentError::InvalidInput(format!("Cannot consume a non-positive amount ({amount})")));
        }
        let _guard = self.locks.lock(account_id).await;
        let now = self.clock.now();
        let request = ConsumeRequest { account_id, amount, order_ref, now };
        let result = self.db.consume_credits(request).await.map_err(FulfillmentError::database)?;
        match result {
            ConsumeResult::Consumed { closed, remainder } => {
                info!("💳️ {amount} consumed from account #{account_id} for order {order_ref}");
                let event = CreditConsumedEvent {
                    account_id,
                    order_ref,
                    amount,
                    closed: closed.iter().map(|c| c.id).collect(),
                    remainder: remainder.as_ref().map(|r| r.id),
                    timestamp: now,
                };
                self.producers.publish_credit_consumed(event).await;
                Ok(CreditConsumption { closed, remainder })
            },
            ConsumeResult::Insufficient { available } => {
                info!(target: REJECTIONS, "Account #{account_id} has {available} in credits. {amount} was requested");
                Err(FulfillmentError::InsufficientCredit { requested: amount, available })
            },
        }
    }

    /// The sum of the account's unconsumed, unexpired credits.
    pub async fn balance(&self, account_id: i64) -> Result<Cents, FulfillmentError> {
        let now = self.clock.now();
        let credits = self.credits(account_id).await?;
        Ok(credits.iter().filter(|c| c.is_available(now)).map(|c| c.amount).sum())
    }

    /// Every credit row of the account, closed and expired ones included.
    pub async fn credits(&self, account_id: i64) -> Result<Vec<ServiceCredit>, FulfillmentError> {
        self.db.fetch_credits(account_id).await.map_err(FulfillmentError::database)
    }

    pub async fn ledger_events(&self, account_id: i64) -> Result<Vec<LedgerEvent>, FulfillmentError> {
        self.db.fetch_ledger_events(account_id).await.map_err(FulfillmentError::database)
    }
}
