//! Configuration loading and representation.
//!
//! Read once from the environment at startup. Invalid values are reported
//! with a warning and replaced by their defaults, so a typo never prevents
//! the service from starting.

use std::str::FromStr;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use tracing::warn;

use partsmarket_orders::{MarketplaceSettings, OrderSla};

use crate::expiry::DEFAULT_SWEEP_INTERVAL;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
// Fixed offset with no DST rules: cutoffs drift by an hour in summer
// unless MARKET_UTC_OFFSET_MINUTES is set to 120.
const DEFAULT_UTC_OFFSET_MINUTES: i32 = 60;
const DEFAULT_MAX_DB_CONNECTIONS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketplaceConfig {
    pub bind_addr: String,
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub max_db_connections: u32,
    pub sweep_interval: Duration,
    pub sla: OrderSla,
    /// Offset of the marketplace's local time (delivery cutoffs) from UTC.
    pub utc_offset_minutes: i32,
    pub settings: MarketplaceSettings,
    /// Token required on `/admin` routes; `None` disables them.
    pub admin_token: Option<String>,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            use_persistent_stores: false,
            database_url: None,
            max_db_connections: DEFAULT_MAX_DB_CONNECTIONS,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            sla: OrderSla::default(),
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
            settings: MarketplaceSettings::default(),
            admin_token: None,
        }
    }
}

impl MarketplaceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut settings = MarketplaceSettings {
            buyer_fee: parse_or(&text, "BUYER_FEE_CREDITS", defaults.settings.buyer_fee),
            supplier_fee: parse_or(&text, "SUPPLIER_FEE_CREDITS", defaults.settings.supplier_fee),
            min_credits: parse_or(&text, "MIN_CREDITS", defaults.settings.min_credits),
        };
        if let Err(err) = settings.validate() {
            warn!(error = %err, "invalid marketplace fee settings, using defaults");
            settings = defaults.settings;
        }

        let sla = OrderSla {
            sent_window_minutes: positive_or(&text, "ORDER_SENT_SLA_MINUTES", defaults.sla.sent_window_minutes),
            offer_window_minutes: positive_or(&text, "ORDER_OFFER_SLA_MINUTES", defaults.sla.offer_window_minutes),
        };

        let sweep_secs = positive_or(&text, "EXPIRY_SWEEP_INTERVAL_SECS", defaults.sweep_interval.as_secs());

        let mut utc_offset_minutes = parse_or(&text, "MARKET_UTC_OFFSET_MINUTES", defaults.utc_offset_minutes);
        if !(-14 * 60..=14 * 60).contains(&utc_offset_minutes) {
            warn!(value = utc_offset_minutes, "MARKET_UTC_OFFSET_MINUTES out of range, using default");
            utc_offset_minutes = defaults.utc_offset_minutes;
        }

        Self {
            bind_addr: text("BIND_ADDR").unwrap_or(defaults.bind_addr),
            use_persistent_stores: parse_or(&text, "USE_PERSISTENT_STORES", false),
            database_url: text("DATABASE_URL"),
            max_db_connections: positive_or(&text, "DATABASE_MAX_CONNECTIONS", defaults.max_db_connections),
            sweep_interval: Duration::from_secs(sweep_secs),
            sla,
            utc_offset_minutes,
            settings,
            admin_token: text("ADMIN_TOKEN"),
        }
    }

    pub fn local_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or(Utc.fix())
    }
}

fn parse_or<T, F>(text: &F, key: &str, default: T) -> T
where
    T: FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    match text(key) {
        None => default,
        Some(raw) => match raw.parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, "invalid configuration value, using default");
                default
            }
        },
    }
}

fn positive_or<T, F>(text: &F, key: &str, default: T) -> T
where
    T: FromStr + Copy + PartialOrd + Default,
    F: Fn(&str) -> Option<String>,
{
    let value = parse_or(text, key, default);
    if value > T::default() {
        value
    } else {
        warn!(key, "configuration value must be positive, using default");
        default
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> MarketplaceConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MarketplaceConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        assert_eq!(config(&[]), MarketplaceConfig::default());
        assert_eq!(config(&[]).local_offset().local_minus_utc(), 3600);
    }

    #[test]
    fn values_are_read_and_trimmed() {
        let cfg = config(&[
            ("BIND_ADDR", " 127.0.0.1:9000 "),
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://localhost/market"),
            ("ORDER_SENT_SLA_MINUTES", "30"),
            ("EXPIRY_SWEEP_INTERVAL_SECS", "5"),
            ("BUYER_FEE_CREDITS", "1.25"),
            ("ADMIN_TOKEN", "s3cret"),
        ]);
        assert_eq!(cfg.bind_addr, "127.0.0.1:9000");
        assert!(cfg.use_persistent_stores);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/market"));
        assert_eq!(cfg.sla.sent_window_minutes, 30);
        assert_eq!(cfg.sla.offer_window_minutes, 240);
        assert_eq!(cfg.sweep_interval, Duration::from_secs(5));
        assert_eq!(cfg.settings.buyer_fee, Decimal::new(125, 2));
        assert_eq!(cfg.admin_token.as_deref(), Some("s3cret"));
    }

    #[test]
    fn summer_offset_is_an_explicit_override() {
        let cfg = config(&[("MARKET_UTC_OFFSET_MINUTES", "120")]);
        assert_eq!(cfg.local_offset().local_minus_utc(), 7200);
        assert_eq!(MarketplaceConfig::default().local_offset().local_minus_utc(), 3600);
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let cfg = config(&[
            ("USE_PERSISTENT_STORES", "yes please"),
            ("ORDER_OFFER_SLA_MINUTES", "-5"),
            ("EXPIRY_SWEEP_INTERVAL_SECS", "0"),
            ("MIN_CREDITS", "-1"),
            ("MARKET_UTC_OFFSET_MINUTES", "100000"),
        ]);
        assert!(!cfg.use_persistent_stores);
        assert_eq!(cfg.sla.offer_window_minutes, 240);
        assert_eq!(cfg.sweep_interval, DEFAULT_SWEEP_INTERVAL);
        assert_eq!(cfg.settings, MarketplaceSettings::default());
        assert_eq!(cfg.utc_offset_minutes, 60);
    }
}
