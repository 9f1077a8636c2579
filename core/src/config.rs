//! Engine configuration: detection thresholds plus the timing knobs
//! for the ticker, escalation and retention.
//!
//! Files are JSON. Every field has a default, so a config file only
//! needs the values it overrides. Durations are written in seconds.

use crate::error::{AlertError, AlertResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

/// Upper bound on the velocity window; the activity tracker keeps
/// per-originator timestamps for at least this long.
pub const MAX_VELOCITY_WINDOW: Duration = Duration::from_secs(30 * 24 * 3600);

/// Upper bound on history retention.
pub const MAX_RETENTION: Duration = Duration::from_secs(365 * 24 * 3600);

// ── Detection thresholds ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Global large-amount threshold (strictly greater fires).
    pub transaction_amount: Decimal,
    /// 0..=100; strictly greater fires the high-risk rule.
    pub risk_score: f64,
    /// Max events per originator per 24h before a breach.
    pub daily_transaction_count: u32,
    /// Max events per originator within `velocity_window`.
    pub velocity_threshold: u32,
    #[serde(with = "duration_secs")]
    pub velocity_window: Duration,
    pub round_amount_detection: bool,
    pub rapid_succession_detection: bool,
    pub unusual_timing_detection: bool,
    /// Overrides `transaction_amount` for the listed currencies.
    pub per_currency_thresholds: HashMap<String, Decimal>,
    /// Screening lists. Addresses match case-insensitively.
    pub sanctioned_addresses: BTreeSet<String>,
    pub pep_addresses: BTreeSet<String>,
    pub restricted_networks: BTreeSet<String>,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            transaction_amount:         Decimal::from(10_000),
            risk_score:                 70.0,
            daily_transaction_count:    100,
            velocity_threshold:         10,
            velocity_window:            Duration::from_secs(3600),
            round_amount_detection:     true,
            rapid_succession_detection: true,
            unusual_timing_detection:   false,
            per_currency_thresholds:    HashMap::new(),
            sanctioned_addresses:       BTreeSet::new(),
            pep_addresses:              BTreeSet::new(),
            restricted_networks:        BTreeSet::new(),
        }
    }
}

impl ThresholdConfig {
    /// The large-amount threshold that applies to `currency`.
    pub fn amount_threshold_for(&self, currency: &str) -> Decimal {
        self.per_currency_thresholds
            .get(currency)
            .copied()
            .unwrap_or(self.transaction_amount)
    }

    pub fn validate(&self) -> AlertResult<()> {
        if self.transaction_amount < Decimal::ZERO {
            return Err(invalid("transaction_amount", "must be >= 0"));
        }
        if !self.risk_score.is_finite() || !(0.0..=100.0).contains(&self.risk_score) {
            return Err(invalid("risk_score", "must be within 0..=100"));
        }
        if self.velocity_window > MAX_VELOCITY_WINDOW {
            return Err(invalid("velocity_window", "must be at most 30 days"));
        }
        if let Some((currency, _)) = self
            .per_currency_thresholds
            .iter()
            .find(|(_, v)| **v < Decimal::ZERO)
        {
            return Err(AlertError::InvalidConfig {
                field:  "per_currency_thresholds",
                reason: format!("threshold for {currency} must be >= 0"),
            });
        }
        Ok(())
    }

    /// Apply a partial update to a copy of this config.
    /// The copy is validated; `self` is never touched.
    pub fn merged(&self, update: ThresholdUpdate) -> AlertResult<Self> {
        let mut next = self.clone();

        if let Some(v) = update.transaction_amount {
            next.transaction_amount = v;
        }
        if let Some(v) = update.risk_score {
            next.risk_score = v;
        }
        if let Some(v) = update.daily_transaction_count {
            next.daily_transaction_count = non_negative_count("daily_transaction_count", v)?;
        }
        if let Some(v) = update.velocity_threshold {
            next.velocity_threshold = non_negative_count("velocity_threshold", v)?;
        }
        if let Some(secs) = update.velocity_window_secs {
            next.velocity_window = Duration::try_from_secs_f64(secs)
                .map_err(|_| invalid("velocity_window_secs", "must be a non-negative number"))?;
        }
        if let Some(v) = update.round_amount_detection {
            next.round_amount_detection = v;
        }
        if let Some(v) = update.rapid_succession_detection {
            next.rapid_succession_detection = v;
        }
        if let Some(v) = update.unusual_timing_detection {
            next.unusual_timing_detection = v;
        }
        if let Some(per_currency) = update.per_currency_thresholds {
            next.per_currency_thresholds.extend(per_currency);
        }
        if let Some(list) = update.sanctioned_addresses {
            next.sanctioned_addresses = list;
        }
        if let Some(list) = update.pep_addresses {
            next.pep_addresses = list;
        }
        if let Some(list) = update.restricted_networks {
            next.restricted_networks = list;
        }

        next.validate()?;
        Ok(next)
    }
}

/// A partial threshold change. Absent fields keep their current value.
///
/// Counts are signed so a negative value from a caller is reported
/// as `InvalidConfig` instead of failing to deserialize.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdUpdate {
    pub transaction_amount:         Option<Decimal>,
    pub risk_score:                 Option<f64>,
    pub daily_transaction_count:    Option<i64>,
    pub velocity_threshold:         Option<i64>,
    pub velocity_window_secs:       Option<f64>,
    pub round_amount_detection:     Option<bool>,
    pub rapid_succession_detection: Option<bool>,
    pub unusual_timing_detection:   Option<bool>,
    /// Merged key by key into the current map.
    pub per_currency_thresholds:    Option<HashMap<String, Decimal>>,
    /// Screening lists replace the current list wholesale.
    pub sanctioned_addresses:       Option<BTreeSet<String>>,
    pub pep_addresses:              Option<BTreeSet<String>>,
    pub restricted_networks:        Option<BTreeSet<String>>,
}

fn non_negative_count(field: &'static str, value: i64) -> AlertResult<u32> {
    u32::try_from(value).map_err(|_| AlertError::InvalidConfig {
        field,
        reason: format!("must be within 0..={}, got {value}", u32::MAX),
    })
}

fn invalid(field: &'static str, reason: &str) -> AlertError {
    AlertError::InvalidConfig { field, reason: reason.to_string() }
}

// ── Engine config ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Period of the monitoring ticker.
    #[serde(with = "duration_secs")]
    pub tick_interval: Duration,
    /// How long a critical alert may stay unacknowledged.
    #[serde(with = "duration_secs")]
    pub escalation_delay: Duration,
    /// History entries older than this are pruned.
    #[serde(with = "duration_secs")]
    pub retention: Duration,
    /// Hard cap on history length; oldest entries are evicted first.
    pub history_capacity: usize,
    pub thresholds: ThresholdConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval:    Duration::from_secs(1),
            escalation_delay: Duration::from_secs(5 * 60),
            retention:        Duration::from_secs(7 * 24 * 3600),
            history_capacity: 10_000,
            thresholds:       ThresholdConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &str) -> AlertResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| AlertError::ConfigFile {
            path: path.to_string(),
            source,
        })?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        log::info!("Loaded engine config from {path}");
        Ok(config)
    }

    /// Short tick and a small history, for tests.
    pub fn default_test() -> Self {
        Self {
            tick_interval:    Duration::from_millis(100),
            history_capacity: 1_000,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> AlertResult<()> {
        if self.tick_interval.is_zero() {
            return Err(invalid("tick_interval", "must be greater than zero"));
        }
        if self.retention > MAX_RETENTION {
            return Err(invalid("retention", "must be at most 365 days"));
        }
        if self.history_capacity == 0 {
            return Err(invalid("history_capacity", "must be greater than zero"));
        }
        self.thresholds.validate()
    }
}

/// `Duration` as fractional seconds.
mod duration_secs {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|_| D::Error::custom(format!("invalid duration: {secs} seconds")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_takes_defaults() {
        let config: EngineConfig = serde_json::from_str(
            r#"{ "escalation_delay": 60, "thresholds": { "risk_score": 80 } }"#,
        )
        .unwrap();

        assert_eq!(config.escalation_delay, Duration::from_secs(60));
        assert_eq!(config.thresholds.risk_score, 80.0);
        assert_eq!(config.thresholds.transaction_amount, Decimal::from(10_000));
        assert_eq!(config.retention, Duration::from_secs(7 * 24 * 3600));
    }

    #[test]
    fn merged_rejects_negative_and_keeps_current() {
        let config = ThresholdConfig::default();
        let err = config
            .merged(ThresholdUpdate {
                transaction_amount: Some(Decimal::from(-5)),
                ..Default::default()
            })
            .unwrap_err();

        assert!(matches!(err, AlertError::InvalidConfig { field: "transaction_amount", .. }));
        assert_eq!(config, ThresholdConfig::default());
    }

    #[test]
    fn negative_window_seconds_rejected() {
        let err = ThresholdConfig::default()
            .merged(ThresholdUpdate {
                velocity_window_secs: Some(-1.0),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, AlertError::InvalidConfig { field: "velocity_window_secs", .. }));
    }

    #[test]
    fn zero_tick_interval_rejected() {
        let config = EngineConfig {
            tick_interval: Duration::ZERO,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = EngineConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"), "{err}");
    }
}
