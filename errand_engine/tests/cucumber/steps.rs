use cucumber::{then, when};
use errand_engine::{
    db_types::{Cents, CreditReason, OrderStatusType, ReceiptCheck, Role},
    AutoAssignOutcome,
    GrantRequest,
    MatchCriteria,
    ReceiptDecision,
};

use crate::{cucumber::ErrandWorld, support::fixtures::new_order};

fn parse_role(role: &str) -> Role {
    role.parse().unwrap_or_else(|_| panic!("Not a role: {role}"))
}

fn parse_status(status: &str) -> OrderStatusType {
    status.parse().unwrap_or_else(|_| panic!("Not an order status: {status}"))
}

#[when(expr = "customer {int} places order {word} worth {int} cents")]
async fn place_order(world: &mut ErrandWorld, account_id: i64, label: String, estimate: i64) {
    let order = world.system().orders.create_order(new_order(account_id, estimate)).await.expect("Error creating order");
    world.orders.insert(label, order.id);
}

#[when(expr = "customer {int} places order {word} worth {int} cents with automatic receipts")]
async fn place_auto_receipt_order(world: &mut ErrandWorld, account_id: i64, label: String, estimate: i64) {
    let order = new_order(account_id, estimate).with_receipt_check(ReceiptCheck::Auto);
    let order = world.system().orders.create_order(order).await.expect("Error creating order");
    world.orders.insert(label, order.id);
}

#[when(expr = "shopper {int} claims order {word}")]
async fn claim_order(world: &mut ErrandWorld, shopper_id: i64, label: String) {
    let order_id = world.order_id(&label);
    let result = world.system().claims.claim(order_id, shopper_id, None).await;
    world.record(result);
}

#[when(expr = "the {word} with id {int} moves order {word} to {word}")]
async fn move_order(world: &mut ErrandWorld, role: String, actor_id: i64, label: String, status: String) {
    let order_id = world.order_id(&label);
    let (role, target) = (parse_role(&role), parse_status(&status));
    let result = world.system().orders.request_transition(order_id, actor_id, role, target, None).await;
    world.record(result);
}

#[when(expr = "customer {int} {word} the receipt for order {word}")]
async fn review_receipt(world: &mut ErrandWorld, account_id: i64, verdict: String, label: String) {
    let decision = match verdict.as_str() {
        "approves" => ReceiptDecision::Approve,
        "rejects" => ReceiptDecision::Reject,
        other => panic!("Unknown receipt verdict: {other}"),
    };
    let order_id = world.order_id(&label);
    let result = world.system().orders.review_receipt(order_id, account_id, Role::Customer, decision, None).await;
    world.record(result);
}

#[when(expr = "account {int} is granted {int} cents of goodwill credit")]
async fn grant_credit(world: &mut ErrandWorld, account_id: i64, amount: i64) {
    let request = GrantRequest::new(account_id, Cents::from(amount), CreditReason::Goodwill);
    let result = world.system().ledger.grant(request).await;
    world.record(result);
}

#[when(expr = "account {int} spends {int} cents of credit on order {word}")]
async fn spend_credit(world: &mut ErrandWorld, account_id: i64, amount: i64, label: String) {
    let order_id = world.order_id(&label);
    let result = world.system().ledger.consume(account_id, Cents::from(amount), order_id).await;
    world.record(result);
}

#[when(expr = "the dispatcher auto-assigns order {word}")]
async fn auto_assign(world: &mut ErrandWorld, label: String) {
    let order_id = world.order_id(&label);
    let result = world.system().matcher.auto_assign(order_id).await;
    if let Some(outcome) = world.record(result) {
        assert!(matches!(outcome, AutoAssignOutcome::Assigned { .. }), "Auto-assign did not assign: {outcome:?}");
    }
}

#[then(expr = "order {word} is {word}")]
async fn check_status(world: &mut ErrandWorld, label: String, status: String) {
    let order = world.system().orders.fetch_order(world.order_id(&label)).await.expect("Error fetching order");
    assert_eq!(order.status, parse_status(&status));
}

#[then(expr = "order {word} belongs to shopper {int}")]
async fn check_shopper(world: &mut ErrandWorld, label: String, shopper_id: i64) {
    let order = world.system().orders.fetch_order(world.order_id(&label)).await.expect("Error fetching order");
    assert_eq!(order.shopper_id, Some(shopper_id));
}

#[then(expr = "the request is refused with {word}")]
async fn check_refusal(world: &mut ErrandWorld, kind: String) {
    let err = world.last_error.as_ref().expect("The last request succeeded");
    let debug = format!("{err:?}");
    assert!(debug.starts_with(&kind), "Expected {kind}, got {debug}");
}

#[then(expr = "the request succeeds")]
async fn check_success(world: &mut ErrandWorld) {
    assert!(world.last_error.is_none(), "The last request failed: {:?}", world.last_error);
}

#[then(expr = "the audit log of order {word} has {int} entries")]
async fn check_audit_log(world: &mut ErrandWorld, label: String, count: usize) {
    let log = world.system().orders.audit_log(world.order_id(&label)).await.expect("Error fetching audit log");
    assert_eq!(log.len(), count);
}

#[then(expr = "account {int} has a credit balance of {int} cents")]
async fn check_balance(world: &mut ErrandWorld, account_id: i64, balance: i64) {
    let actual = world.system().ledger.balance(account_id).await.expect("Error fetching balance");
    assert_eq!(actual, Cents::from(balance));
}

#[then(expr = "shopper {int} is the best candidate for order {word}")]
async fn check_best_candidate(world: &mut ErrandWorld, shopper_id: i64, label: String) {
    let ranked = world
        .system()
        .matcher
        .find_candidates(world.order_id(&label), MatchCriteria::default())
        .await
        .expect("Error ranking candidates");
    assert_eq!(ranked.first().map(|c| c.shopper_id), Some(shopper_id));
}
