//! Alert statistics, recomputed from a history snapshot on every call.

use crate::{
    alert::{Alert, AlertCategory, Severity},
    types::Timestamp,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertStats {
    pub total:         usize,
    /// Active or acknowledged.
    pub active:        usize,
    pub last_24_hours: usize,
    pub last_7_days:   usize,
    /// Every severity is present, zero-filled.
    pub by_severity:   BTreeMap<Severity, usize>,
    /// Every category is present, zero-filled.
    pub by_category:   BTreeMap<AlertCategory, usize>,
}

/// Windows count alerts with `timestamp >= now - window`, whatever
/// their status.
pub fn compute_stats(history: &[Alert], now: Timestamp) -> AlertStats {
    let day_ago = now - Duration::hours(24);
    let week_ago = now - Duration::days(7);

    let mut by_severity: BTreeMap<Severity, usize> =
        Severity::ALL.iter().map(|s| (*s, 0)).collect();
    let mut by_category: BTreeMap<AlertCategory, usize> =
        AlertCategory::ALL.iter().map(|c| (*c, 0)).collect();
    let mut active = 0;
    let mut last_24_hours = 0;
    let mut last_7_days = 0;

    for alert in history {
        *by_severity.entry(alert.severity).or_insert(0) += 1;
        *by_category.entry(alert.category).or_insert(0) += 1;
        if alert.is_open() {
            active += 1;
        }
        if alert.timestamp >= day_ago {
            last_24_hours += 1;
        }
        if alert.timestamp >= week_ago {
            last_7_days += 1;
        }
    }

    AlertStats {
        total: history.len(),
        active,
        last_24_hours,
        last_7_days,
        by_severity,
        by_category,
    }
}
