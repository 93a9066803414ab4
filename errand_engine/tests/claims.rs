use errand_engine::{
    db_types::{KycStatus, OrderStatusType, ShopperProfile, ShopperStatus, SubscriptionTier},
    events::EventProducers,
    ClaimApi,
    FulfillmentError,
    OrderFlowApi,
};
use futures_util::future::join_all;
use log::*;

use crate::support::{
    fixtures::{add_shopper, km_north},
    prepare_env::TestSystem,
};

mod support;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn only_one_of_many_concurrent_claims_wins() {
    let sys = TestSystem::new().await;
    for id in 1..=12 {
        add_shopper(&sys.db, id, 1.0, 4.5).await;
    }
    let order = sys.place_order(500).await;
    let attempts = (1..=12).map(|shopper_id| {
        let claims = sys.claims.clone();
        let order_id = order.id;
        tokio::spawn(async move { (shopper_id, claims.claim(order_id, shopper_id, None).await) })
    });
    let results = join_all(attempts).await.into_iter().map(|r| r.expect("claim task panicked")).collect::<Vec<_>>();
    let winners = results.iter().filter(|(_, r)| r.is_ok()).map(|(id, _)| *id).collect::<Vec<_>>();
    assert_eq!(winners.len(), 1, "exactly one claim must succeed");
    for (_, result) in results.iter().filter(|(_, r)| r.is_err()) {
        assert_eq!(result.as_ref().unwrap_err(), &FulfillmentError::OrderUnavailable(order.id));
    }
    let stored = sys.orders.fetch_order(order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatusType::Accepted);
    assert_eq!(stored.shopper_id, Some(winners[0]));
    let log = sys.orders.audit_log(order.id).await.unwrap();
    assert_eq!(log.iter().map(|e| e.action.as_str()).collect::<Vec<_>>(), vec!["created", "claimed"]);
    assert_eq!(log[1].actor_id, winners[0]);
    info!("🚀️ Shopper #{} won the race", winners[0]);
    sys.tear_down().await;
}

/// Two independent API stacks share nothing but the database, so only the conditional update can pick the winner.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn the_database_settles_races_between_separate_processes() {
    let sys = TestSystem::new().await;
    for id in 1..=8 {
        add_shopper(&sys.db, id, 1.0, 4.5).await;
    }
    let order = sys.place_order(500).await;
    let stacks = (0..2)
        .map(|_| ClaimApi::new(OrderFlowApi::new(sys.db.clone(), EventProducers::default())))
        .collect::<Vec<_>>();
    let attempts = (1..=8).map(|shopper_id| {
        let claims = stacks[shopper_id as usize % 2].clone();
        let order_id = order.id;
        tokio::spawn(async move { claims.claim(order_id, shopper_id, None).await })
    });
    let results = join_all(attempts).await.into_iter().map(|r| r.expect("claim task panicked")).collect::<Vec<_>>();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, FulfillmentError::OrderUnavailable(_))));
    let log = sys.orders.audit_log(order.id).await.unwrap();
    assert_eq!(log.len(), 2, "the losers must not leave audit entries");
    sys.tear_down().await;
}

#[tokio::test]
async fn ineligible_shoppers_cannot_claim() {
    let sys = TestSystem::new().await;
    let order = sys.place_order(500).await;

    let err = sys.claims.claim(order.id, 77, None).await.unwrap_err();
    assert!(matches!(err, FulfillmentError::ShopperIneligible { shopper_id: 77, .. }), "unknown shopper: {err}");

    let suspended = ShopperProfile::new(2, km_north(1.0)).with_status(ShopperStatus::Suspended);
    sys.db.upsert_shopper(&suspended).await.unwrap();
    let err = sys.claims.claim(order.id, 2, None).await.unwrap_err();
    assert!(matches!(err, FulfillmentError::ShopperIneligible { shopper_id: 2, .. }));

    let unverified = ShopperProfile::new(3, km_north(1.0)).with_kyc_status(KycStatus::Pending);
    sys.db.upsert_shopper(&unverified).await.unwrap();
    let err = sys.claims.claim(order.id, 3, None).await.unwrap_err();
    assert!(matches!(err, FulfillmentError::ShopperIneligible { shopper_id: 3, .. }));

    let stored = sys.orders.fetch_order(order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatusType::New);
    assert_eq!(stored.shopper_id, None);
    assert_eq!(sys.orders.audit_log(order.id).await.unwrap().len(), 1);
    sys.tear_down().await;
}

#[tokio::test]
async fn the_tier_caps_concurrent_orders() {
    let sys = TestSystem::new().await;
    let shopper = ShopperProfile::new(5, km_north(1.0));
    sys.db.upsert_shopper(&shopper).await.unwrap();
    // No tier on record means the free tier, which allows one order at a time
    let first = sys.place_order(500).await;
    let second = sys.place_order(501).await;
    sys.claims.claim(first.id, 5, Some("on my way".into())).await.expect("first claim should succeed");
    let err = sys.claims.claim(second.id, 5, None).await.unwrap_err();
    assert!(matches!(err, FulfillmentError::ShopperIneligible { shopper_id: 5, .. }));

    sys.db.set_account_tier(5, SubscriptionTier::Plus).await.unwrap();
    let order = sys.claims.claim(second.id, 5, None).await.expect("plus tier allows three orders");
    assert_eq!(order.shopper_id, Some(5));
    sys.tear_down().await;
}

#[tokio::test]
async fn claimed_and_cancelled_orders_are_unavailable() {
    let sys = TestSystem::new().await;
    add_shopper(&sys.db, 1, 1.0, 4.0).await;
    add_shopper(&sys.db, 2, 1.0, 4.0).await;
    let order = sys.place_order(500).await;
    sys.claims.claim(order.id, 1, None).await.unwrap();
    assert_eq!(sys.claims.claim(order.id, 2, None).await.unwrap_err(), FulfillmentError::OrderUnavailable(order.id));
    // Claiming twice is not idempotent either
    assert_eq!(sys.claims.claim(order.id, 1, None).await.unwrap_err(), FulfillmentError::OrderUnavailable(order.id));

    let cancelled = sys.order_in_status(500, 1, OrderStatusType::Cancelled).await;
    assert_eq!(cancelled.shopper_id, None);
    assert_eq!(
        sys.claims.claim(cancelled.id, 2, None).await.unwrap_err(),
        FulfillmentError::OrderUnavailable(cancelled.id)
    );
    let missing = errand_engine::db_types::OrderId(9999);
    assert_eq!(sys.claims.claim(missing, 2, None).await.unwrap_err(), FulfillmentError::OrderNotFound(missing));
    sys.tear_down().await;
}
