use std::{env, fmt::Display, str::FromStr};

use chrono::Duration;
use errand_common::helpers::parse_or_default;
use log::*;

const DEFAULT_MAX_RADIUS_KM: f64 = 10.0;
const DEFAULT_MIN_RATED_ORDERS: i64 = 5;
const DEFAULT_NEW_SHOPPER_RATING_FLOOR: f64 = 20.0;
const DEFAULT_EXPERIENCE_SCALE: f64 = 25.0;
const DEFAULT_CREDIT_EXPIRY_DAYS: i64 = 90;

/// Reads `key` from the environment, logging when the default is used instead.
fn env_or_default<T: FromStr + Display + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(s) => {
            let value = parse_or_default(Some(s.clone()), default);
            if s.trim().parse::<T>().is_err() {
                warn!("🪛️ {s} is not a valid value for {key}. Using the default, {default}, instead.");
            }
            value
        },
        Err(_) => {
            info!("🪛️ {key} is not set. Using the default, {default}.");
            default
        },
    }
}

/// Tunable constants for the compatibility score. The component weights themselves are fixed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringConfig {
    /// Candidates further than this from the delivery address are disqualified.
    pub max_radius_km: f64,
    /// Shoppers with fewer rated orders than this get at least `new_shopper_rating_floor` for their rating.
    pub min_rated_orders: i64,
    /// Rating points (out of 25) granted to shoppers who do not have enough ratings yet.
    pub new_shopper_rating_floor: f64,
    /// Completed-order count at which the experience score reaches ~63% of its weight.
    pub experience_scale: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            max_radius_km: DEFAULT_MAX_RADIUS_KM,
            min_rated_orders: DEFAULT_MIN_RATED_ORDERS,
            new_shopper_rating_floor: DEFAULT_NEW_SHOPPER_RATING_FLOOR,
            experience_scale: DEFAULT_EXPERIENCE_SCALE,
        }
    }
}

impl ScoringConfig {
    /// Loads `ERRAND_MAX_RADIUS_KM` and `ERRAND_MIN_RATED_ORDERS`, falling back to the defaults.
    pub fn from_env_or_default() -> Self {
        let mut max_radius_km = env_or_default("ERRAND_MAX_RADIUS_KM", DEFAULT_MAX_RADIUS_KM);
        if max_radius_km <= 0.0 {
            warn!("🪛️ ERRAND_MAX_RADIUS_KM must be positive. Using the default, {DEFAULT_MAX_RADIUS_KM} km, instead.");
            max_radius_km = DEFAULT_MAX_RADIUS_KM;
        }
        let min_rated_orders = env_or_default("ERRAND_MIN_RATED_ORDERS", DEFAULT_MIN_RATED_ORDERS).max(0);
        Self { max_radius_km, min_rated_orders, ..Default::default() }
    }

    pub fn with_max_radius_km(mut self, max_radius_km: f64) -> Self {
        self.max_radius_km = max_radius_km;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    /// How long a newly granted credit remains usable.
    pub credit_expiry: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { credit_expiry: Duration::days(DEFAULT_CREDIT_EXPIRY_DAYS) }
    }
}

impl LedgerConfig {
    /// Loads `ERRAND_CREDIT_EXPIRY_DAYS`, falling back to 90 days.
    pub fn from_env_or_default() -> Self {
        let mut days = env_or_default("ERRAND_CREDIT_EXPIRY_DAYS", DEFAULT_CREDIT_EXPIRY_DAYS);
        if days < 1 {
            warn!("🪛️ ERRAND_CREDIT_EXPIRY_DAYS must be at least 1. Using {DEFAULT_CREDIT_EXPIRY_DAYS} days instead.");
            days = DEFAULT_CREDIT_EXPIRY_DAYS;
        }
        Self { credit_expiry: Duration::days(days) }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn env_overrides_and_fallbacks() {
        env::set_var("ERRAND_MAX_RADIUS_KM", "12.5");
        env::set_var("ERRAND_MIN_RATED_ORDERS", "lots");
        let config = ScoringConfig::from_env_or_default();
        assert_eq!(config.max_radius_km, 12.5);
        assert_eq!(config.min_rated_orders, DEFAULT_MIN_RATED_ORDERS);
        env::set_var("ERRAND_MAX_RADIUS_KM", "-3");
        assert_eq!(ScoringConfig::from_env_or_default().max_radius_km, DEFAULT_MAX_RADIUS_KM);
        env::remove_var("ERRAND_MAX_RADIUS_KM");
        env::remove_var("ERRAND_MIN_RATED_ORDERS");

        env::set_var("ERRAND_CREDIT_EXPIRY_DAYS", "30");
        assert_eq!(LedgerConfig::from_env_or_default().credit_expiry, Duration::days(30));
        env::set_var("ERRAND_CREDIT_EXPIRY_DAYS", "0");
        assert_eq!(LedgerConfig::from_env_or_default().credit_expiry, Duration::days(90));
        env::remove_var("ERRAND_CREDIT_EXPIRY_DAYS");
    }
}
