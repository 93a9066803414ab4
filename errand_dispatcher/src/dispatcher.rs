use std::{future::Future, pin::Pin};

use errand_engine::{
    events::{EventHandlers, EventHooks},
    ClaimApi,
    MatchingApi,
    OrderFlowApi,
    Scorer,
    SqliteDatabase,
};
use log::*;

use crate::{config::DispatcherConfig, dispatch_worker::start_dispatch_worker, errors::DispatchError};

/// Opens the database, starts the event hooks and the dispatch worker, and runs until Ctrl-C is received.
pub async fn run_dispatcher(config: DispatcherConfig) -> Result<(), DispatchError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, config.max_connections)
        .await
        .map_err(|e| DispatchError::InitializeError(e.to_string()))?;
    db.migrate().await?;
    info!("🚀️ Database at {} is up to date", db.url());

    let handlers = EventHandlers::new(config.event_buffer_size, logging_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let orders = OrderFlowApi::new(db.clone(), producers);
    let matcher = MatchingApi::new(ClaimApi::new(orders), Scorer::new(config.scoring));
    let worker = if config.auto_assign {
        Some(start_dispatch_worker(matcher, config.dispatch_interval, config.batch_size))
    } else {
        None
    };

    tokio::signal::ctrl_c().await?;
    info!("🚀️ Shutting down");
    if let Some(worker) = worker {
        worker.abort();
    }
    db.close().await;
    Ok(())
}

/// Hooks that write every committed transition and auto-assign attempt to the log.
fn logging_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks
        .on_order_transitioned(|ev| {
            Box::pin(async move {
                info!(
                    "📬️ Order {} moved from {} to {} by {} #{}",
                    ev.order.id, ev.from, ev.to, ev.role, ev.actor_id
                );
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        })
        .on_auto_assign(|ev| {
            Box::pin(async move {
                match ev.shopper_id {
                    Some(id) => debug!("📬️ Order {} auto-assigned to shopper #{id}", ev.order_id),
                    None => debug!("📬️ Order {} not assigned. {} candidates", ev.order_id, ev.candidates),
                }
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
    hooks
}
