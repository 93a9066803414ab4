use cucumber::given;
use errand_engine::db_types::SubscriptionTier;

use crate::{
    cucumber::ErrandWorld,
    support::{fixtures::add_shopper, prepare_env::TestSystem},
};

#[given("a fresh install")]
async fn fresh_database(world: &mut ErrandWorld) {
    let system = TestSystem::new().await;
    world.system = Some(system);
}

#[given(expr = "shopper {int} is online {float} km from the depot with a rating of {float}")]
async fn online_shopper(world: &mut ErrandWorld, id: i64, km: f64, rating: f64) {
    add_shopper(&world.system().db, id, km, rating).await;
}

#[given(expr = "account {int} is on the {word} tier")]
async fn account_tier(world: &mut ErrandWorld, account_id: i64, tier: String) {
    let tier = tier.parse::<SubscriptionTier>().expect("Unknown tier");
    world.system().db.set_account_tier(account_id, tier).await.expect("Error setting tier");
}
