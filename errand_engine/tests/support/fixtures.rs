use errand_engine::{
    db_types::{Cents, DeliveryAddress, GeoPoint, NewOrder, NewOrderItem, Order, OrderStatusType, ReceiptCheck, Role, ShopperProfile, SubscriptionTier},
    SqliteDatabase,
};

use super::prepare_env::TestSystem;

/// Roughly the centre of the delivery area. Shopper positions are given as km north of here.
pub const DEPOT: GeoPoint = GeoPoint { latitude: 52.0, longitude: 4.0 };
const KM_PER_DEGREE: f64 = 111.194_926_644_558_73;

pub fn km_north(km: f64) -> GeoPoint {
    GeoPoint::new(DEPOT.latitude + km / KM_PER_DEGREE, DEPOT.longitude)
}

pub fn new_order(account_id: i64, estimate: i64) -> NewOrder {
    let address = DeliveryAddress::new("12 Canal Street", "Leiden", "2311", DEPOT);
    NewOrder::new(account_id, Cents::from(estimate), address)
        .with_item(NewOrderItem::new("Whole milk", 2, Cents::from(120), Cents::from(180)).with_category("dairy"))
        .with_item(NewOrderItem::new("Sourdough", 1, Cents::from(350), Cents::from(450)).with_category("bakery"))
}

/// An approved, online shopper at `km` from the depot, on the premium tier so that they may hold five orders.
pub async fn add_shopper(db: &SqliteDatabase, id: i64, km: f64, rating: f64) -> ShopperProfile {
    let profile = ShopperProfile::new(id, km_north(km)).with_rating(rating, 40);
    db.upsert_shopper(&profile).await.expect("Error saving shopper");
    db.set_account_tier(id, SubscriptionTier::Premium).await.expect("Error setting tier");
    profile
}

impl TestSystem {
    pub async fn place_order(&self, account_id: i64) -> Order {
        self.orders.create_order(new_order(account_id, 2000)).await.expect("Error creating order")
    }

    /// Drives a fresh order to `status` using the legitimate actors for each step.
    pub async fn order_in_status(&self, account_id: i64, shopper_id: i64, status: OrderStatusType) -> Order {
        use OrderStatusType::*;
        let mut order = self
            .orders
            .create_order(new_order(account_id, 2000).with_receipt_check(ReceiptCheck::Required))
            .await
            .expect("Error creating order");
        let path: &[(OrderStatusType, Role, i64)] = match status {
            New => &[],
            Accepted => &[(Accepted, Role::Shopper, shopper_id)],
            Shopping => &[(Accepted, Role::Shopper, shopper_id), (Shopping, Role::Shopper, shopper_id)],
            AwaitReceiptOk => &[
                (Accepted, Role::Shopper, shopper_id),
                (Shopping, Role::Shopper, shopper_id),
                (AwaitReceiptOk, Role::Shopper, shopper_id),
            ],
            Enroute => &[
                (Accepted, Role::Shopper, shopper_id),
                (Shopping, Role::Shopper, shopper_id),
                (AwaitReceiptOk, Role::Shopper, shopper_id),
                (Enroute, Role::Customer, account_id),
            ],
            Delivered => &[
                (Accepted, Role::Shopper, shopper_id),
                (Shopping, Role::Shopper, shopper_id),
                (AwaitReceiptOk, Role::Shopper, shopper_id),
                (Enroute, Role::Customer, account_id),
                (Delivered, Role::Shopper, shopper_id),
            ],
            Cancelled => &[(Cancelled, Role::Customer, account_id)],
        };
        for (target, role, actor) in path {
            order = if *target == Accepted {
                self.claims.claim(order.id, *actor, None).await.expect("Error claiming order")
            } else {
                self.orders.request_transition(order.id, *actor, *role, *target, None).await.expect("Error moving order")
            };
        }
        assert_eq!(order.status, status);
        order
    }
}
