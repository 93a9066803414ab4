use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::{audit_log, credits, db_url, new_pool, orders, run_migrations, shoppers, SqliteDatabaseError};
use crate::{
    db::traits::{ClaimResult, ConsumeResult, CreditLedger, OrderManagement, ShopperDirectory, TransitionResult},
    db_types::{
        ConsumeRequest,
        LedgerEvent,
        LedgerEventKind,
        NewAuditEntry,
        NewCredit,
        NewOrder,
        Order,
        OrderAuditLogEntry,
        OrderId,
        OrderQueryFilter,
        OrderStatusType,
        ServiceCredit,
        ShopperProfile,
        SubscriptionTier,
    },
};

const DEFAULT_MAX_CONNECTIONS: u32 = 25;

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SqliteDatabase ({})", self.url)
    }
}

impl OrderManagement for SqliteDatabase {
    type Error = SqliteDatabaseError;

    async fn insert_order(
        &self,
        order: NewOrder,
        audit: NewAuditEntry,
        now: DateTime<Utc>,
    ) -> Result<Order, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, audit, now, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn fetch_order(&self, order_id: OrderId) -> Result<Option<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order(order_id, &mut conn).await
    }

    async fn fetch_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_orders(query, &mut conn).await
    }

    async fn fetch_audit_log(&self, order_id: OrderId) -> Result<Vec<OrderAuditLogEntry>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        audit_log::fetch_entries(order_id, &mut conn).await
    }

    async fn count_active_orders_for_shopper(&self, shopper_id: i64) -> Result<i64, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::count_active_orders(shopper_id, &mut conn).await
    }

    async fn oldest_active_order_for_shopper(&self, shopper_id: i64) -> Result<Option<DateTime<Utc>>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::oldest_active_order(shopper_id, &mut conn).await
    }

    /// The status update is the first statement of the transaction, so the transaction takes the write lock straight
    /// away and the audit insert cannot be interleaved with another writer.
    async fn transition_order(
        &self,
        order_id: OrderId,
        expected: OrderStatusType,
        target: OrderStatusType,
        audit: NewAuditEntry,
        now: DateTime<Utc>,
    ) -> Result<TransitionResult, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let result = orders::transition_order(order_id, expected, target, audit, now, &mut tx).await?;
        match result {
            TransitionResult::Applied(_) => tx.commit().await?,
            TransitionResult::StatusChanged(_) => tx.rollback().await?,
        }
        Ok(result)
    }

    async fn claim_order(
        &self,
        order_id: OrderId,
        shopper_id: i64,
        max_active: i64,
        audit: NewAuditEntry,
        now: DateTime<Utc>,
    ) -> Result<ClaimResult, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let result = orders::claim_order(order_id, shopper_id, max_active, audit, now, &mut tx).await?;
        match result {
            ClaimResult::Claimed(_) => tx.commit().await?,
            _ => tx.rollback().await?,
        }
        Ok(result)
    }
}

impl CreditLedger for SqliteDatabase {
    type Error = SqliteDatabaseError;

    async fn insert_credit(&self, credit: NewCredit) -> Result<ServiceCredit, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let (account_id, amount, order_ref, now) = (credit.account_id, credit.amount, credit.order_ref, credit.created_at);
        let credit = credits::insert_credit(credit, None, &mut tx).await?;
        credits::insert_ledger_event(account_id, LedgerEventKind::Grant, amount, order_ref, &[credit.id], now, &mut tx)
            .await?;
        tx.commit().await?;
        debug!("🗃️ Credit #{} of {amount} granted to account #{account_id}", credit.id);
        Ok(credit)
    }

    async fn consume_credits(&self, request: ConsumeRequest) -> Result<ConsumeResult, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let result = credits::consume_credits(request, &mut tx).await?;
        match result {
            ConsumeResult::Consumed { .. } => tx.commit().await?,
            ConsumeResult::Insufficient { .. } => tx.rollback().await?,
        }
        Ok(result)
    }

    async fn fetch_credits(&self, account_id: i64) -> Result<Vec<ServiceCredit>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        credits::fetch_credits(account_id, &mut conn).await
    }

    async fn fetch_ledger_events(&self, account_id: i64) -> Result<Vec<LedgerEvent>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        credits::fetch_ledger_events(account_id, &mut conn).await
    }
}

impl ShopperDirectory for SqliteDatabase {
    type Error = SqliteDatabaseError;

    async fn fetch_shopper(&self, shopper_id: i64) -> Result<Option<ShopperProfile>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        shoppers::fetch_shopper(shopper_id, &mut conn).await
    }

    async fn fetch_account_tier(&self, account_id: i64) -> Result<Option<SubscriptionTier>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        shoppers::fetch_account_tier(account_id, &mut conn).await
    }

    async fn fetch_online_shoppers(&self) -> Result<Vec<ShopperProfile>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        shoppers::fetch_online_shoppers(&mut conn).await
    }
}

impl SqliteDatabase {
    /// Creates a new database API object, using `ERRAND_DATABASE_URL` to locate the database.
    pub async fn new() -> Result<Self, SqliteDatabaseError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), DEFAULT_MAX_CONNECTIONS).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), SqliteDatabaseError> {
        run_migrations(&self.pool).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Adds or refreshes a shopper profile in the directory.
    pub async fn upsert_shopper(&self, profile: &ShopperProfile) -> Result<(), SqliteDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        shoppers::upsert_shopper(profile, &mut conn).await
    }

    pub async fn set_account_tier(&self, account_id: i64, tier: SubscriptionTier) -> Result<(), SqliteDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        shoppers::set_account_tier(account_id, tier, &mut conn).await
    }
}

#[cfg(test)]
mod test {
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use sqlx::{migrate::MigrateDatabase, Sqlite};

    use super::*;
    use crate::{
        db_types::{Cents, CreditReason, DeliveryAddress, GeoPoint, NewOrderItem, Role},
        test_utils::prepare_env::{prepare_test_env, random_db_path},
    };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()
    }

    fn order() -> NewOrder {
        let address = DeliveryAddress::new("1 Main St", "Utrecht", "3511", GeoPoint::new(52.09, 5.12));
        NewOrder::new(42, Cents::from(1500), address)
            .with_item(NewOrderItem::new("Eggs", 1, Cents::from(250), Cents::from(320)))
    }

    fn created() -> NewAuditEntry {
        NewAuditEntry::new(42, Role::Customer, "created", json!({}))
    }

    async fn tear_down(db: SqliteDatabase) {
        let url = db.url().to_string();
        db.close().await;
        let _ = Sqlite::drop_database(&url).await;
    }

    #[tokio::test]
    async fn the_audit_log_is_append_only() {
        let db = prepare_test_env(&random_db_path()).await;
        let order = db.insert_order(order(), created(), now()).await.unwrap();
        let log = db.fetch_audit_log(order.id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, "created");
        let update = sqlx::query("UPDATE order_audit_log SET action = 'edited' WHERE id = $1").bind(log[0].id);
        assert!(update.execute(db.pool()).await.is_err());
        let delete = sqlx::query("DELETE FROM order_audit_log WHERE id = $1").bind(log[0].id);
        assert!(delete.execute(db.pool()).await.is_err());
        assert_eq!(db.fetch_audit_log(order.id).await.unwrap(), log);
        tear_down(db).await;
    }

    #[tokio::test]
    async fn stale_transitions_write_nothing() {
        let db = prepare_test_env(&random_db_path()).await;
        let order = db.insert_order(order(), created(), now()).await.unwrap();
        assert_eq!(order.items.len(), 1);
        let audit = NewAuditEntry::new(42, Role::Customer, "transition", json!({}));
        let later = now() + Duration::minutes(3);
        let result =
            db.transition_order(order.id, OrderStatusType::Accepted, OrderStatusType::Shopping, audit, later).await.unwrap();
        assert!(matches!(result, TransitionResult::StatusChanged(OrderStatusType::New)));
        assert_eq!(db.fetch_audit_log(order.id).await.unwrap().len(), 1);

        let audit = NewAuditEntry::new(42, Role::Customer, "transition", json!({}));
        let result =
            db.transition_order(order.id, OrderStatusType::New, OrderStatusType::Cancelled, audit, later).await.unwrap();
        match result {
            TransitionResult::Applied(o) => {
                assert_eq!(o.status, OrderStatusType::Cancelled);
                assert_eq!(o.updated_at, later);
                assert_eq!(o.shopper_id, None);
            },
            other => panic!("Expected the transition to apply, got {other:?}"),
        }
        tear_down(db).await;
    }

    #[tokio::test]
    async fn the_dispatch_queue_is_sorted_and_limited_in_the_database() {
        let db = prepare_test_env(&random_db_path()).await;
        let oldest = db.insert_order(order(), created(), now()).await.unwrap();
        let urgent = db.insert_order(order().with_priority(8), created(), now() + Duration::minutes(1)).await.unwrap();
        let low = db.insert_order(order().with_priority(2), created(), now() + Duration::minutes(2)).await.unwrap();
        let also_urgent = db.insert_order(order().with_priority(8), created(), now() + Duration::minutes(3)).await.unwrap();
        let queue = |limit| {
            OrderQueryFilter::default().with_status(OrderStatusType::New).unassigned().priority_first().with_limit(limit)
        };

        let ids = db.fetch_orders(queue(10)).await.unwrap().into_iter().map(|o| o.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![urgent.id, also_urgent.id, low.id, oldest.id]);
        let ids = db.fetch_orders(queue(2)).await.unwrap().into_iter().map(|o| o.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![urgent.id, also_urgent.id]);
        let by_id = db.fetch_orders(OrderQueryFilter::default().unassigned()).await.unwrap();
        assert_eq!(by_id.first().map(|o| o.id), Some(oldest.id));
        tear_down(db).await;
    }

    #[tokio::test]
    async fn claims_respect_the_capacity_limit() {
        let db = prepare_test_env(&random_db_path()).await;
        let first = db.insert_order(order(), created(), now()).await.unwrap();
        let second = db.insert_order(order(), created(), now()).await.unwrap();
        let claim = || NewAuditEntry::new(7, Role::Shopper, "claimed", json!({}));

        let result = db.claim_order(first.id, 7, 1, claim(), now()).await.unwrap();
        assert!(matches!(result, ClaimResult::Claimed(ref o) if o.shopper_id == Some(7)));
        assert_eq!(db.count_active_orders_for_shopper(7).await.unwrap(), 1);
        assert_eq!(db.oldest_active_order_for_shopper(7).await.unwrap(), Some(now()));

        let result = db.claim_order(second.id, 7, 1, claim(), now()).await.unwrap();
        assert!(matches!(result, ClaimResult::AtCapacity { active: 1 }));
        let result = db.claim_order(first.id, 8, 3, claim(), now()).await.unwrap();
        assert!(matches!(result, ClaimResult::Unavailable));
        let stored = db.fetch_order(second.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatusType::New);
        assert_eq!(db.fetch_audit_log(second.id).await.unwrap().len(), 1);
        tear_down(db).await;
    }

    #[tokio::test]
    async fn credit_amounts_are_immutable() {
        let db = prepare_test_env(&random_db_path()).await;
        let credit = NewCredit {
            account_id: 42,
            amount: Cents::from(600),
            original_amount: Cents::from(400),
            reason: CreditReason::QualityIssue,
            order_ref: None,
            expires_at: now() + Duration::days(30),
            created_at: now(),
        };
        let credit = db.insert_credit(credit).await.unwrap();
        let update = sqlx::query("UPDATE service_credits SET amount = 10 WHERE id = $1").bind(credit.id);
        assert!(update.execute(db.pool()).await.is_err());
        let credits = db.fetch_credits(42).await.unwrap();
        assert_eq!(credits, vec![credit.clone()]);
        let events = db.fetch_ledger_events(42).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, LedgerEventKind::Grant);
        assert_eq!(events[0].credit_ids, vec![credit.id]);
        tear_down(db).await;
    }

    #[tokio::test]
    async fn account_tiers_can_be_changed() {
        let db = prepare_test_env(&random_db_path()).await;
        assert_eq!(db.fetch_account_tier(9).await.unwrap(), None);
        db.set_account_tier(9, SubscriptionTier::Plus).await.unwrap();
        db.set_account_tier(9, SubscriptionTier::Premium).await.unwrap();
        assert_eq!(db.fetch_account_tier(9).await.unwrap(), Some(SubscriptionTier::Premium));
        tear_down(db).await;
    }
}
