use std::collections::BTreeSet;

use log::debug;
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};

use crate::{
    db::sqlite::{orders::active_statuses_sql, SqliteDatabaseError},
    db_types::{GeoPoint, ShopperPreferences, ShopperProfile, SubscriptionTier, WorkingHours},
};

fn split_categories(s: &str) -> BTreeSet<String> {
    s.split(',').filter(|c| !c.is_empty()).map(String::from).collect()
}

fn join_categories(set: &BTreeSet<String>) -> String {
    set.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

impl<'r> FromRow<'r, SqliteRow> for ShopperProfile {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let kyc_status: String = row.try_get("kyc_status")?;
        let excluded: String = row.try_get("excluded_categories")?;
        let preferred: String = row.try_get("preferred_categories")?;
        let start: Option<i64> = row.try_get("work_start_hour")?;
        let end: Option<i64> = row.try_get("work_end_hour")?;
        let working_hours = match (start, end) {
            (Some(s), Some(e)) => Some(WorkingHours::new(s.rem_euclid(24) as u32, e.rem_euclid(24) as u32)),
            _ => None,
        };
        Ok(Self {
            id: row.try_get("id")?,
            status: status.parse().map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            kyc_status: kyc_status.parse().map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            rating_avg: row.try_get("rating_avg")?,
            rating_count: row.try_get("rating_count")?,
            location: GeoPoint::new(row.try_get("latitude")?, row.try_get("longitude")?),
            active_order_count: row.try_get("active_order_count")?,
            completed_orders: row.try_get("completed_orders")?,
            online: row.try_get("online")?,
            accepts_premium_orders: row.try_get("accepts_premium_orders")?,
            preferences: ShopperPreferences {
                excluded_categories: split_categories(&excluded),
                preferred_categories: split_categories(&preferred),
                min_order_value: row.try_get("min_order_value")?,
                working_hours,
            },
        })
    }
}

/// Profile columns plus the live count of the shopper's active orders.
fn select_shoppers_sql() -> String {
    format!(
        "SELECT s.*, (SELECT COUNT(*) FROM orders o WHERE o.shopper_id = s.id AND o.status IN {}) AS \
         active_order_count FROM shoppers s",
        active_statuses_sql()
    )
}

/// Creates or replaces a shopper profile. The active order count is derived from the orders table and is ignored.
pub async fn upsert_shopper(profile: &ShopperProfile, conn: &mut SqliteConnection) -> Result<(), SqliteDatabaseError> {
    let prefs = &profile.preferences;
    sqlx::query(
        r#"
        INSERT INTO shoppers (
            id, status, kyc_status, rating_avg, rating_count, latitude, longitude, completed_orders, online,
            accepts_premium_orders, excluded_categories, preferred_categories, min_order_value, work_start_hour,
            work_end_hour
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        ON CONFLICT (id) DO UPDATE SET
            status = excluded.status,
            kyc_status = excluded.kyc_status,
            rating_avg = excluded.rating_avg,
            rating_count = excluded.rating_count,
            latitude = excluded.latitude,
            longitude = excluded.longitude,
            completed_orders = excluded.completed_orders,
            online = excluded.online,
            accepts_premium_orders = excluded.accepts_premium_orders,
            excluded_categories = excluded.excluded_categories,
            preferred_categories = excluded.preferred_categories,
            min_order_value = excluded.min_order_value,
            work_start_hour = excluded.work_start_hour,
            work_end_hour = excluded.work_end_hour
        "#,
    )
    .bind(profile.id)
    .bind(profile.status.to_string())
    .bind(profile.kyc_status.to_string())
    .bind(profile.rating_avg)
    .bind(profile.rating_count)
    .bind(profile.location.latitude)
    .bind(profile.location.longitude)
    .bind(profile.completed_orders)
    .bind(profile.online)
    .bind(profile.accepts_premium_orders)
    .bind(join_categories(&prefs.excluded_categories))
    .bind(join_categories(&prefs.preferred_categories))
    .bind(prefs.min_order_value)
    .bind(prefs.working_hours.map(|h| h.start_hour as i64))
    .bind(prefs.working_hours.map(|h| h.end_hour as i64))
    .execute(conn)
    .await?;
    debug!("🗃️ Shopper #{} profile saved", profile.id);
    Ok(())
}

pub async fn fetch_shopper(shopper_id: i64, conn: &mut SqliteConnection) -> Result<Option<ShopperProfile>, SqliteDatabaseError> {
    let sql = format!("{} WHERE s.id = $1", select_shoppers_sql());
    let shopper = sqlx::query_as::<_, ShopperProfile>(&sql).bind(shopper_id).fetch_optional(conn).await?;
    Ok(shopper)
}

pub async fn fetch_online_shoppers(conn: &mut SqliteConnection) -> Result<Vec<ShopperProfile>, SqliteDatabaseError> {
    let sql = format!("{} WHERE s.online = 1 ORDER BY s.id", select_shoppers_sql());
    let shoppers = sqlx::query_as::<_, ShopperProfile>(&sql).fetch_all(conn).await?;
    Ok(shoppers)
}

pub async fn set_account_tier(
    account_id: i64,
    tier: SubscriptionTier,
    conn: &mut SqliteConnection,
) -> Result<(), SqliteDatabaseError> {
    sqlx::query("INSERT INTO account_tiers (account_id, tier) VALUES ($1, $2) ON CONFLICT (account_id) DO UPDATE SET tier = excluded.tier")
        .bind(account_id)
        .bind(tier.to_string())
        .execute(conn)
        .await?;
    debug!("🗃️ Account #{account_id} is now on the {tier} tier");
    Ok(())
}

pub async fn fetch_account_tier(
    account_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<SubscriptionTier>, SqliteDatabaseError> {
    let tier: Option<String> = sqlx::query_scalar("SELECT tier FROM account_tiers WHERE account_id = $1")
        .bind(account_id)
        .fetch_optional(conn)
        .await?;
    Ok(tier.map(|t| t.parse::<SubscriptionTier>()).transpose()?)
}
