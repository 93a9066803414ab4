use std::{future::Future, pin::Pin, sync::Arc};

use log::*;

use crate::events::{
    AutoAssignAttemptedEvent,
    CreditConsumedEvent,
    CreditGrantedEvent,
    EventHandler,
    EventProducer,
    Handler,
    OrderTransitionedEvent,
};

/// The publishing side of the registered hooks. Each API holds a clone and publishes to every producer in the
/// relevant list. Lists are empty when no hook was registered for that event.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_transitioned_producer: Vec<EventProducer<OrderTransitionedEvent>>,
    pub credit_granted_producer: Vec<EventProducer<CreditGrantedEvent>>,
    pub credit_consumed_producer: Vec<EventProducer<CreditConsumedEvent>>,
    pub auto_assign_producer: Vec<EventProducer<AutoAssignAttemptedEvent>>,
}

impl EventProducers {
    pub async fn publish_order_transitioned(&self, event: OrderTransitionedEvent) {
        for p in &self.order_transitioned_producer {
            p.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_credit_granted(&self, event: CreditGrantedEvent) {
        for p in &self.credit_granted_producer {
            p.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_credit_consumed(&self, event: CreditConsumedEvent) {
        for p in &self.credit_consumed_producer {
            p.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_auto_assign(&self, event: AutoAssignAttemptedEvent) {
        for p in &self.auto_assign_producer {
            p.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_order_transitioned: Option<EventHandler<OrderTransitionedEvent>>,
    pub on_credit_granted: Option<EventHandler<CreditGrantedEvent>>,
    pub on_credit_consumed: Option<EventHandler<CreditConsumedEvent>>,
    pub on_auto_assign: Option<EventHandler<AutoAssignAttemptedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        Self {
            on_order_transitioned: hooks.on_order_transitioned.map(|f| EventHandler::new(buffer_size, f)),
            on_credit_granted: hooks.on_credit_granted.map(|f| EventHandler::new(buffer_size, f)),
            on_credit_consumed: hooks.on_credit_consumed.map(|f| EventHandler::new(buffer_size, f)),
            on_auto_assign: hooks.on_auto_assign.map(|f| EventHandler::new(buffer_size, f)),
        }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_transitioned {
            result.order_transitioned_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_credit_granted {
            result.credit_granted_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_credit_consumed {
            result.credit_consumed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_auto_assign {
            result.auto_assign_producer.push(handler.subscribe());
        }
        result
    }

    /// Spawns a task per registered handler. Each task ends once all of its producers have been dropped.
    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_transitioned {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_credit_granted {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_credit_consumed {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_auto_assign {
            tokio::spawn(handler.start_handler());
        }
        debug!("📬️ Event handlers started");
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_transitioned: Option<Handler<OrderTransitionedEvent>>,
    pub on_credit_granted: Option<Handler<CreditGrantedEvent>>,
    pub on_credit_consumed: Option<Handler<CreditConsumedEvent>>,
    pub on_auto_assign: Option<Handler<AutoAssignAttemptedEvent>>,
}

impl EventHooks {
    pub fn on_order_transitioned<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderTransitionedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_transitioned = Some(Arc::new(f));
        self
    }

    pub fn on_credit_granted<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(CreditGrantedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_credit_granted = Some(Arc::new(f));
        self
    }

    pub fn on_credit_consumed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(CreditConsumedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_credit_consumed = Some(Arc::new(f));
        self
    }

    pub fn on_auto_assign<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(AutoAssignAttemptedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_auto_assign = Some(Arc::new(f));
        self
    }
}
