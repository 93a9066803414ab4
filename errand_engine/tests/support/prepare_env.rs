use std::sync::Arc;

use chrono::{TimeZone, Utc};
use errand_engine::{
    events::EventProducers,
    helpers::{Clock, ManualClock},
    ClaimApi,
    LedgerApi,
    MatchingApi,
    OrderFlowApi,
    Scorer,
    SqliteDatabase,
};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub fn random_db_path() -> String {
    format!("sqlite://{}/errand_it_{}.db", std::env::temp_dir().display(), rand::random::<u64>())
}

/// Creates a fresh database at `url` and brings its schema up to date.
pub async fn prepare_test_env(url: &str) -> SqliteDatabase {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    if let Err(e) = Sqlite::drop_database(url).await {
        trace!("🚀️ Nothing to drop at {url}: {e}");
    }
    Sqlite::create_database(url).await.expect("Error creating database");
    let db = SqliteDatabase::new_with_url(url, 25).await.expect("Error creating connection to database");
    db.migrate().await.expect("Error running DB migrations");
    debug!("🚀️ Test database ready at {url}");
    db
}

/// Every API wired to one database and one manual clock.
pub struct TestSystem {
    pub db: SqliteDatabase,
    pub clock: ManualClock,
    pub orders: OrderFlowApi<SqliteDatabase>,
    pub claims: ClaimApi<SqliteDatabase>,
    pub matcher: MatchingApi<SqliteDatabase>,
    pub ledger: LedgerApi<SqliteDatabase>,
}

impl TestSystem {
    pub async fn new() -> Self {
        Self::with_producers(EventProducers::default()).await
    }

    pub async fn with_producers(producers: EventProducers) -> Self {
        let url = random_db_path();
        let db = prepare_test_env(&url).await;
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap());
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let orders = OrderFlowApi::new(db.clone(), producers.clone()).with_clock(Arc::clone(&shared));
        let claims = ClaimApi::new(orders.clone());
        let matcher = MatchingApi::new(claims.clone(), Scorer::default());
        let ledger = LedgerApi::new(db.clone(), producers).with_clock(shared);
        Self { db, clock, orders, claims, matcher, ledger }
    }

    pub async fn tear_down(self) {
        let url = self.db.url().to_string();
        self.db.close().await;
        if let Err(e) = Sqlite::drop_database(&url).await {
            warn!("🚀️ Could not remove test database {url}: {e}");
        }
    }
}
