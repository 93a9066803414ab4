use std::{env, time::Duration};

use errand_common::helpers::parse_boolean_flag;
use errand_engine::ScoringConfig;
use log::*;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/errand.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 25;
const DEFAULT_DISPATCH_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_BATCH_SIZE: usize = 50;
const DEFAULT_EVENT_BUFFER_SIZE: usize = 64;

#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// The time between two dispatch rounds.
    pub dispatch_interval: Duration,
    /// The most orders a single round will try to assign.
    pub batch_size: usize,
    /// When false, the dispatcher only migrates the database and runs the event hooks.
    pub auto_assign: bool,
    /// Channel capacity of each event hook.
    pub event_buffer_size: usize,
    pub scoring: ScoringConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            dispatch_interval: DEFAULT_DISPATCH_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
            auto_assign: true,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            scoring: ScoringConfig::default(),
        }
    }
}

impl DispatcherConfig {
    pub fn new(database_url: &str) -> Self {
        Self { database_url: database_url.to_string(), ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let mut config = Self::from_lookup(|key| env::var(key).ok());
        config.scoring = ScoringConfig::from_env_or_default();
        config
    }

    /// Builds the dispatcher settings from `lookup`, which maps an environment variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Self
    where F: Fn(&str) -> Option<String> {
        let database_url = lookup("ERRAND_DATABASE_URL").unwrap_or_else(|| {
            warn!("🪛️ ERRAND_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let max_connections = lookup("ERRAND_DB_MAX_CONNECTIONS")
            .map(|s| {
                s.parse::<u32>().ok().filter(|n| *n > 0).unwrap_or_else(|| {
                    error!(
                        "🪛️ {s} is not a valid value for ERRAND_DB_MAX_CONNECTIONS. Using the default, \
                         {DEFAULT_MAX_CONNECTIONS}, instead."
                    );
                    DEFAULT_MAX_CONNECTIONS
                })
            })
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);
        let dispatch_interval = lookup("ERRAND_DISPATCH_INTERVAL_SECS")
            .map(|s| match s.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    error!(
                        "🪛️ {s} is not a valid value for ERRAND_DISPATCH_INTERVAL_SECS. Using the default, {}s, instead.",
                        DEFAULT_DISPATCH_INTERVAL.as_secs()
                    );
                    DEFAULT_DISPATCH_INTERVAL
                },
            })
            .unwrap_or(DEFAULT_DISPATCH_INTERVAL);
        let batch_size = lookup("ERRAND_DISPATCH_BATCH_SIZE")
            .map(|s| {
                s.parse::<usize>().ok().filter(|n| *n > 0).unwrap_or_else(|| {
                    error!(
                        "🪛️ {s} is not a valid value for ERRAND_DISPATCH_BATCH_SIZE. Using the default, \
                         {DEFAULT_BATCH_SIZE}, instead."
                    );
                    DEFAULT_BATCH_SIZE
                })
            })
            .unwrap_or(DEFAULT_BATCH_SIZE);
        let auto_assign = parse_boolean_flag(lookup("ERRAND_AUTO_ASSIGN"), true);
        if !auto_assign {
            info!("🪛️ Auto-assignment is disabled. Orders will only be assigned by shoppers claiming them.");
        }
        Self { database_url, max_connections, dispatch_interval, batch_size, auto_assign, ..Default::default() }
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> DispatcherConfig {
        let vars = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<HashMap<_, _>>();
        DispatcherConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config_from(&[]);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.max_connections, 25);
        assert_eq!(config.dispatch_interval, Duration::from_secs(30));
        assert_eq!(config.batch_size, 50);
        assert!(config.auto_assign);
        assert_eq!(config.scoring, ScoringConfig::default());
    }

    #[test]
    fn values_from_the_environment() {
        let config = config_from(&[
            ("ERRAND_DATABASE_URL", "sqlite://tmp/x.db"),
            ("ERRAND_DB_MAX_CONNECTIONS", "4"),
            ("ERRAND_DISPATCH_INTERVAL_SECS", "5"),
            ("ERRAND_DISPATCH_BATCH_SIZE", "10"),
            ("ERRAND_AUTO_ASSIGN", "off"),
        ]);
        assert_eq!(config.database_url, "sqlite://tmp/x.db");
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.dispatch_interval, Duration::from_secs(5));
        assert_eq!(config.batch_size, 10);
        assert!(!config.auto_assign);
    }

    #[test]
    fn bad_values_fall_back_to_defaults() {
        let config = config_from(&[
            ("ERRAND_DB_MAX_CONNECTIONS", "0"),
            ("ERRAND_DISPATCH_INTERVAL_SECS", "soon"),
            ("ERRAND_DISPATCH_BATCH_SIZE", "-3"),
            ("ERRAND_AUTO_ASSIGN", "perhaps"),
        ]);
        assert_eq!(config.max_connections, 25);
        assert_eq!(config.dispatch_interval, Duration::from_secs(30));
        assert_eq!(config.batch_size, 50);
        assert!(config.auto_assign);
    }
}
