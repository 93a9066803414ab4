use std::{collections::BTreeSet, fmt::Debug, sync::Arc};

use log::*;
use serde_json::{json, Value};

use crate::{
    db::traits::{ClaimResult, OrderManagement, TransitionResult},
    db_types::{
        NewAuditEntry,
        NewOrder,
        Order,
        OrderAuditLogEntry,
        OrderId,
        OrderQueryFilter,
        OrderStatusType,
        Role,
    },
    engine_api::{
        errors::FulfillmentError,
        transitions::{allowed_targets, ReceiptDecision},
        REJECTIONS,
    },
    events::{EventProducers, OrderTransitionedEvent},
    helpers::{Clock, KeyedLocks, SystemClock},
};

/// `OrderFlowApi` is the order state machine. It creates orders, applies status changes according to the
/// transition table, and keeps the audit log in step with every accepted change.
///
/// All mutations of a given order are serialised through a per-order lock that is shared with every clone of the API
/// (and with the [`crate::ClaimApi`] built on top of it). Orders with different ids never wait on each other.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
    clock: Arc<dyn Clock>,
    locks: Arc<KeyedLocks<OrderId>>,
}

impl<B: Clone> Clone for OrderFlowApi<B> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            producers: self.producers.clone(),
            clock: Arc::clone(&self.clock),
            locks: Arc::clone(&self.locks),
        }
    }
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi ({:?})", self.locks)
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers, clock: Arc::new(SystemClock), locks: Arc::new(KeyedLocks::new("order")) }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub(crate) fn producers(&self) -> &EventProducers {
        &self.producers
    }

    pub(crate) fn locks(&self) -> &KeyedLocks<OrderId> {
        &self.locks
    }
}

impl<B> OrderFlowApi<B>
where B: OrderManagement
{
    /// Validates and stores a new order. The order starts out `New` with no shopper, and the creation is recorded as
    /// the first audit entry.
    pub async fn create_order(&self, order: NewOrder) -> Result<Order, FulfillmentError> {
        order.validate().map_err(FulfillmentError::InvalidInput)?;
        let payload = json!({
            "estimate_amount": order.estimate_amount,
            "items": order.items.len(),
            "mode": order.mode.to_string(),
            "receipt_check": order.receipt_check.to_string(),
        });
        let audit = NewAuditEntry::new(order.account_id, Role::Customer, "created", payload);
        let order = self.db.insert_order(order, audit, self.clock.now()).await.map_err(FulfillmentError::database)?;
        info!("🔄️📦️ Order {} created for account #{}", order.id, order.account_id);
        Ok(order)
    }

    pub async fn fetch_order(&self, order_id: OrderId) -> Result<Order, FulfillmentError> {
        self.db
            .fetch_order(order_id)
            .await
            .map_err(FulfillmentError::database)?
            .ok_or(FulfillmentError::OrderNotFound(order_id))
    }

    /// The audit trail of the order, in the order the changes were accepted.
    pub async fn audit_log(&self, order_id: OrderId) -> Result<Vec<OrderAuditLogEntry>, FulfillmentError> {
        self.fetch_order(order_id).await?;
        self.db.fetch_audit_log(order_id).await.map_err(FulfillmentError::database)
    }

    /// Orders waiting for a shopper, oldest first.
    pub async fn available_orders(&self, limit: Option<i64>) -> Result<Vec<Order>, FulfillmentError> {
        let mut query = OrderQueryFilter::default().with_status(OrderStatusType::New).unassigned();
        if let Some(limit) = limit {
            query = query.with_limit(limit);
        }
        self.db.fetch_orders(query).await.map_err(FulfillmentError::database)
    }

    /// Up to `limit` orders waiting for a shopper, highest priority first, then oldest first.
    pub async fn dispatch_queue(&self, limit: i64) -> Result<Vec<Order>, FulfillmentError> {
        let query =
            OrderQueryFilter::default().with_status(OrderStatusType::New).unassigned().priority_first().with_limit(limit);
        self.db.fetch_orders(query).await.map_err(FulfillmentError::database)
    }

    pub async fn orders_for_shopper(&self, shopper_id: i64) -> Result<Vec<Order>, FulfillmentError> {
        let query = OrderQueryFilter::default().with_shopper_id(shopper_id);
        self.db.fetch_orders(query).await.map_err(FulfillmentError::database)
    }

    pub async fn orders_for_account(&self, account_id: i64) -> Result<Vec<Order>, FulfillmentError> {
        let query = OrderQueryFilter::default().with_account_id(account_id);
        self.db.fetch_orders(query).await.map_err(FulfillmentError::database)
    }

    /// The statuses `role` could move the order to right now, before authorization is considered.
    pub async fn allowed_targets(
        &self,
        order_id: OrderId,
        role: Role,
    ) -> Result<BTreeSet<OrderStatusType>, FulfillmentError> {
        let order = self.fetch_order(order_id).await?;
        Ok(allowed_targets(order.status, role, order.receipt_check))
    }

    /// Moves the order to `target` on behalf of the actor.
    ///
    /// The actor's relationship to the order is checked first: the account holder must own it and a shopper must be
    /// the one assigned to it. Admins may act on any order. The target is then checked against the transition table.
    /// The status change and its audit entry are written together, or not at all.
    ///
    /// Claims (`New → Accepted`) are not handled here. Use [`crate::ClaimApi`].
    pub async fn request_transition(
        &self,
        order_id: OrderId,
        actor_id: i64,
        role: Role,
        target: OrderStatusType,
        payload: Option<Value>,
    ) -> Result<Order, FulfillmentError> {
        let payload = json!({ "payload": payload.unwrap_or(Value::Null) });
        self.transition_with(order_id, actor_id, role, target, None, "transition", payload).await
    }

    /// Records the account holder's verdict on the shopper's receipt. Approval sends the shopper on their way;
    /// rejection sends them back to shopping.
    pub async fn review_receipt(
        &self,
        order_id: OrderId,
        actor_id: i64,
        role: Role,
        decision: ReceiptDecision,
        note: Option<String>,
    ) -> Result<Order, FulfillmentError> {
        let payload = json!({ "decision": decision, "note": note });
        let expected = Some(OrderStatusType::AwaitReceiptOk);
        self.transition_with(order_id, actor_id, role, decision.target(), expected, "receipt_review", payload).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn transition_with(
        &self,
        order_id: OrderId,
        actor_id: i64,
        role: Role,
        target: OrderStatusType,
        expected: Option<OrderStatusType>,
        action: &str,
        mut payload: Value,
    ) -> Result<Order, FulfillmentError> {
        let _guard = self.locks.lock(order_id).await;
        let order = self.fetch_order(order_id).await?;
        let from = order.status;
        let invalid = FulfillmentError::InvalidTransition { from, to: target, role };
        if expected.is_some_and(|s| s != from) {
            info!(target: REJECTIONS, "Order {order_id}: {action} by {role} #{actor_id} needs {expected:?}, but it is {from}");
            return Err(invalid);
        }
        authorize(&order, actor_id, role)?;
        if !allowed_targets(from, role, order.receipt_check).contains(&target) {
            info!(target: REJECTIONS, "Order {order_id}: {role} #{actor_id} may not move it from {from} to {target}");
            return Err(invalid);
        }
        payload["from"] = json!(from);
        payload["to"] = json!(target);
        let audit = NewAuditEntry::new(actor_id, role, action, payload);
        let now = self.clock.now();
        let result =
            self.db.transition_order(order_id, from, target, audit, now).await.map_err(FulfillmentError::database)?;
        match result {
            TransitionResult::Applied(order) => {
                debug!("🔄️ Order {order_id} moved from {from} to {target} by {role} #{actor_id}");
                let event = OrderTransitionedEvent::new(order.clone(), from, actor_id, role);
                self.producers.publish_order_transitioned(event).await;
                Ok(order)
            },
            TransitionResult::StatusChanged(current) => {
                info!(target: REJECTIONS, "Order {order_id} changed to {current} underneath {role} #{actor_id}");
                Err(FulfillmentError::InvalidTransition { from: current, to: target, role })
            },
        }
    }

    /// Writes the `New → Accepted` claim for an order the caller has already locked and vetted.
    pub(crate) async fn apply_claim(
        &self,
        order: &Order,
        shopper_id: i64,
        max_active: i64,
        note: Option<String>,
    ) -> Result<ClaimResult, FulfillmentError> {
        let payload = json!({ "from": OrderStatusType::New, "to": OrderStatusType::Accepted, "note": note });
        let audit = NewAuditEntry::new(shopper_id, Role::Shopper, "claimed", payload);
        let now = self.clock.now();
        let result =
            self.db.claim_order(order.id, shopper_id, max_active, audit, now).await.map_err(FulfillmentError::database)?;
        if let ClaimResult::Claimed(order) = &result {
            let event = OrderTransitionedEvent::new(order.clone(), OrderStatusType::New, shopper_id, Role::Shopper);
            self.producers.publish_order_transitioned(event).await;
        }
        Ok(result)
    }
}

fn authorize(order: &Order, actor_id: i64, role: Role) -> Result<(), FulfillmentError> {
    let allowed = match role {
        Role::Admin => true,
        Role::Customer => order.account_id == actor_id,
        Role::Shopper => order.shopper_id == Some(actor_id),
    };
    if allowed {
        Ok(())
    } else {
        info!(target: REJECTIONS, "Order {}: {role} #{actor_id} is not a party to this order", order.id);
        Err(FulfillmentError::Unauthorized { order_id: order.id, actor_id, role })
    }
}
