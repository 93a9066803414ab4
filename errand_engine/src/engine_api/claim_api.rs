use std::fmt::Debug;

use log::*;

use crate::{
    db::traits::{ClaimResult, OrderManagement, ShopperDirectory},
    db_types::{Order, OrderId, OrderStatusType},
    engine_api::{benefits::BenefitsResolver, errors::FulfillmentError, order_flow_api::OrderFlowApi, REJECTIONS},
};

/// `ClaimApi` makes sure that an order ends up with at most one shopper, however many try to accept it at once.
///
/// A claim holds the order's lock (the same one [`OrderFlowApi`] uses for transitions) while it re-checks the
/// shopper's eligibility, and then writes the assignment with a conditional update on `status = new` and no shopper.
/// Losers get [`FulfillmentError::OrderUnavailable`] straight away. There is no retry or queueing.
pub struct ClaimApi<B> {
    flow: OrderFlowApi<B>,
    benefits: BenefitsResolver<B>,
}

impl<B> Debug for ClaimApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ClaimApi ({:?})", self.flow)
    }
}

impl<B: Clone> Clone for ClaimApi<B> {
    fn clone(&self) -> Self {
        Self::new(self.flow.clone())
    }
}

impl<B: Clone> ClaimApi<B> {
    pub fn new(flow: OrderFlowApi<B>) -> Self {
        let benefits = BenefitsResolver::new(flow.db().clone());
        Self { flow, benefits }
    }
}

impl<B> ClaimApi<B> {
    pub fn order_flow(&self) -> &OrderFlowApi<B> {
        &self.flow
    }
}

impl<B> ClaimApi<B>
where B: OrderManagement + ShopperDirectory
{
    /// Assigns the order to the shopper and moves it to `Accepted`.
    ///
    /// Fails with
    /// * [`FulfillmentError::OrderNotFound`] if there is no such order,
    /// * [`FulfillmentError::OrderUnavailable`] if the order is no longer new, or already has a shopper,
    /// * [`FulfillmentError::ShopperIneligible`] if the shopper is unknown, suspended, not KYC approved, or already
    ///   holds as many active orders as their tier allows.
    pub async fn claim(&self, order_id: OrderId, shopper_id: i64, note: Option<String>) -> Result<Order, FulfillmentError> {
        let _guard = self.flow.locks().lock(order_id).await;
        let order = self.flow.fetch_order(order_id).await?;
        if order.status != OrderStatusType::New || order.is_claimed() {
            info!(target: REJECTIONS, "Order {order_id} is {} and cannot be claimed by shopper #{shopper_id}", order.status);
            return Err(FulfillmentError::OrderUnavailable(order_id));
        }
        let max_active = self.check_eligibility(shopper_id).await?;
        match self.flow.apply_claim(&order, shopper_id, max_active, note).await? {
            ClaimResult::Claimed(order) => {
                info!("🔄️🙋️ Order {order_id} claimed by shopper #{shopper_id}");
                Ok(order)
            },
            ClaimResult::Unavailable => {
                info!(target: REJECTIONS, "Shopper #{shopper_id} lost the claim on order {order_id}");
                Err(FulfillmentError::OrderUnavailable(order_id))
            },
            ClaimResult::AtCapacity { active } => {
                info!(target: REJECTIONS, "Shopper #{shopper_id} reached {active} active orders before claiming {order_id}");
                Err(FulfillmentError::ineligible(shopper_id, format!("already holds {active} active orders")))
            },
        }
    }

    /// Returns the shopper's concurrent-order cap if they may take on another order right now.
    async fn check_eligibility(&self, shopper_id: i64) -> Result<i64, FulfillmentError> {
        let db = self.flow.db();
        let shopper = ShopperDirectory::fetch_shopper(db, shopper_id).await.map_err(FulfillmentError::database)?;
        let reason = match shopper {
            None => Some("unknown shopper".to_string()),
            Some(s) if !s.is_approved() => Some(format!("account is {} with KYC {}", s.status, s.kyc_status)),
            Some(_) => None,
        };
        if let Some(reason) = reason {
            info!(target: REJECTIONS, "Shopper #{shopper_id} cannot claim orders: {reason}");
            return Err(FulfillmentError::ineligible(shopper_id, reason));
        }
        let cap = self.benefits.benefits(shopper_id).await?.max_concurrent_orders;
        let active = db.count_active_orders_for_shopper(shopper_id).await.map_err(FulfillmentError::database)?;
        if active >= cap {
            info!(target: REJECTIONS, "Shopper #{shopper_id} is at capacity ({active}/{cap})");
            return Err(FulfillmentError::ineligible(shopper_id, format!("at capacity ({active}/{cap})")));
        }
        Ok(cap)
    }
}
