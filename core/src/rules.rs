//! Detection rules: turns one inbound event into zero or more drafts.
//!
//! RULE ORDER (fixed, never reordered):
//!   1. Compliance: sanctions, PEP, restricted network
//!   2. High risk score
//!   3. Thresholds and patterns: large amount, round amount,
//!      velocity, daily count, rapid succession, unusual timing
//!
//! Every rule fires independently; the order only decides the order
//! of the returned drafts, so consumers see a deterministic sequence
//! for a given input.
//!
//! The only state consulted is the per-originator activity window
//! backing the frequency rules. Windows are measured on event
//! timestamps, never on wall time.

use crate::{
    alert::{AlertCategory, AlertDraft, AlertType, Severity},
    config::ThresholdConfig,
    error::AlertResult,
    transaction::TransactionEvent,
    types::Timestamp,
};
use chrono::{Duration, Timelike};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::{HashMap, VecDeque};

// ── Constants ────────────────────────────────────────────────────────────────

/// Canonical round amounts checked by the structuring heuristic.
pub const ROUND_AMOUNTS: [i64; 6] = [1_000, 5_000, 10_000, 25_000, 50_000, 100_000];

/// Amounts this far below a round figure count as "just under" it.
pub const ROUND_AMOUNT_EPSILON: i64 = 10;

/// Two events from one originator closer than this are rapid succession.
pub const RAPID_SUCCESSION_SECS: i64 = 60;

/// Events in [start, end) UTC hours are unusual timing.
pub const QUIET_HOURS_UTC: (u32, u32) = (0, 5);

const DAY_SECS: i64 = 24 * 3600;

/// Idle originators are swept at most once per this much event time.
pub const ACTIVITY_SWEEP_SECS: i64 = 3600;

// ── Rule engine ──────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct RuleEngine {
    /// originator → timestamps of its recent events, oldest first.
    activity:   HashMap<String, VecDeque<Timestamp>>,
    /// Event time of the last self-sweep.
    last_sweep: Option<Timestamp>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate one event. Records the event in the activity window
    /// whether or not anything fires.
    pub fn evaluate(
        &mut self,
        event: &TransactionEvent,
        config: &ThresholdConfig,
    ) -> AlertResult<Vec<AlertDraft>> {
        let velocity_window = Duration::from_std(config.velocity_window)
            .map_err(anyhow::Error::from)?;
        self.sweep_if_due(event.timestamp, velocity_window);
        let activity = self.record(event, velocity_window);

        let mut drafts = Vec::new();
        drafts.extend(check_sanctions(event, config)?);
        drafts.extend(check_pep(event, config)?);
        drafts.extend(check_restricted_network(event, config)?);
        drafts.extend(check_high_risk(event, config)?);
        drafts.extend(check_large_amount(event, config)?);
        if config.round_amount_detection {
            drafts.extend(check_round_amount(event)?);
        }
        drafts.extend(check_velocity(event, config, &activity)?);
        drafts.extend(check_daily_count(event, config, &activity)?);
        if config.rapid_succession_detection {
            drafts.extend(check_rapid_succession(event, &activity)?);
        }
        if config.unusual_timing_detection {
            drafts.extend(check_unusual_timing(event)?);
        }

        for draft in &drafts {
            log::debug!(
                "Rule fired: {} ({}) on transaction {}",
                draft.alert_type,
                draft.severity,
                event.id
            );
        }
        Ok(drafts)
    }

    /// Drop originators with no activity inside `horizon` of `now`.
    pub fn sweep(&mut self, now: Timestamp, horizon: Duration) {
        let cutoff = now - horizon;
        self.activity.retain(|_, times| {
            while times.front().is_some_and(|t| *t < cutoff) {
                times.pop_front();
            }
            !times.is_empty()
        });
    }

    /// Events that arrive only through `evaluate` still age out idle
    /// originators, measured on event time.
    fn sweep_if_due(&mut self, event_time: Timestamp, velocity_window: Duration) {
        let due = self
            .last_sweep
            .map_or(true, |last| event_time - last >= Duration::seconds(ACTIVITY_SWEEP_SECS));
        if !due {
            return;
        }
        let before = self.activity.len();
        self.sweep(event_time, activity_horizon(velocity_window));
        self.last_sweep = Some(event_time);
        let dropped = before - self.activity.len();
        if dropped > 0 {
            log::debug!("activity sweep dropped {dropped} idle originators");
        }
    }

    /// Number of originators currently tracked.
    pub fn tracked_originators(&self) -> usize {
        self.activity.len()
    }

    fn record(&mut self, event: &TransactionEvent, velocity_window: Duration) -> Activity {
        let cutoff = event.timestamp - activity_horizon(velocity_window);
        let times = self
            .activity
            .entry(event.originator_address.clone())
            .or_default();

        while times.front().is_some_and(|t| *t < cutoff) {
            times.pop_front();
        }

        let previous = times
            .iter()
            .filter(|t| **t <= event.timestamp)
            .max()
            .copied();
        times.push_back(event.timestamp);

        let count_within = |window: Duration| {
            let from = event.timestamp - window;
            times
                .iter()
                .filter(|t| **t >= from && **t <= event.timestamp)
                .count()
        };

        Activity {
            previous,
            in_velocity_window: count_within(velocity_window),
            in_last_day:        count_within(Duration::seconds(DAY_SECS)),
            velocity_window,
        }
    }
}

/// How long an originator's timestamps are kept: the velocity window
/// or a day, whichever is longer.
pub fn activity_horizon(velocity_window: Duration) -> Duration {
    velocity_window.max(Duration::seconds(DAY_SECS))
}

/// What the activity window says about the originator of one event.
/// Counts include the event itself.
struct Activity {
    previous:           Option<Timestamp>,
    in_velocity_window: usize,
    in_last_day:        usize,
    velocity_window:    Duration,
}

// ── Compliance ───────────────────────────────────────────────────────────────

fn screened_party<'a>(
    event: &'a TransactionEvent,
    list: &std::collections::BTreeSet<String>,
) -> Option<&'a str> {
    [&event.originator_address, &event.counterparty_address]
        .into_iter()
        .find(|addr| list.iter().any(|l| l.eq_ignore_ascii_case(addr)))
        .map(String::as_str)
}

fn check_sanctions(
    event: &TransactionEvent,
    config: &ThresholdConfig,
) -> AlertResult<Option<AlertDraft>> {
    let Some(address) = screened_party(event, &config.sanctioned_addresses) else {
        return Ok(None);
    };
    Ok(Some(AlertDraft {
        alert_type: AlertType::ComplianceViolation,
        category:   AlertCategory::ComplianceBreach,
        severity:   Severity::Critical,
        title:      "Sanctions screening match".into(),
        message:    format!(
            "Address {address} on transaction {} matches the sanctions list",
            event.id
        ),
        data: json!({ "check": "sanctions", "matched_address": address, "event": event }),
    }))
}

fn check_pep(event: &TransactionEvent, config: &ThresholdConfig) -> AlertResult<Option<AlertDraft>> {
    let Some(address) = screened_party(event, &config.pep_addresses) else {
        return Ok(None);
    };
    Ok(Some(AlertDraft {
        alert_type: AlertType::ComplianceViolation,
        category:   AlertCategory::ComplianceBreach,
        severity:   Severity::High,
        title:      "Politically exposed person".into(),
        message:    format!(
            "Address {address} on transaction {} belongs to a politically exposed person",
            event.id
        ),
        data: json!({ "check": "pep", "matched_address": address, "event": event }),
    }))
}

fn check_restricted_network(
    event: &TransactionEvent,
    config: &ThresholdConfig,
) -> AlertResult<Option<AlertDraft>> {
    let restricted = config
        .restricted_networks
        .iter()
        .any(|n| n.eq_ignore_ascii_case(&event.network));
    if !restricted {
        return Ok(None);
    }
    Ok(Some(AlertDraft {
        alert_type: AlertType::ComplianceViolation,
        category:   AlertCategory::ComplianceBreach,
        severity:   Severity::Medium,
        title:      "Restricted network".into(),
        message:    format!(
            "Transaction {} settled on restricted network {}",
            event.id, event.network
        ),
        data: json!({ "check": "restricted_network", "event": event }),
    }))
}

// ── Risk ─────────────────────────────────────────────────────────────────────

fn check_high_risk(
    event: &TransactionEvent,
    config: &ThresholdConfig,
) -> AlertResult<Option<AlertDraft>> {
    if event.risk_score <= config.risk_score {
        return Ok(None);
    }
    Ok(Some(AlertDraft {
        alert_type: AlertType::HighRiskTransaction,
        category:   AlertCategory::SuspiciousActivity,
        severity:   Severity::High,
        title:      "High risk transaction detected".into(),
        message:    format!(
            "Transaction {} has risk score {:.1} (threshold {:.1})",
            event.id, event.risk_score, config.risk_score
        ),
        data: serde_json::to_value(event)?,
    }))
}

// ── Thresholds and patterns ──────────────────────────────────────────────────

fn check_large_amount(
    event: &TransactionEvent,
    config: &ThresholdConfig,
) -> AlertResult<Option<AlertDraft>> {
    let threshold = config.amount_threshold_for(&event.currency);
    if event.amount <= threshold {
        return Ok(None);
    }
    Ok(Some(AlertDraft {
        alert_type: AlertType::LargeAmount,
        category:   AlertCategory::ThresholdBreach,
        severity:   Severity::Medium,
        title:      "Large transaction amount".into(),
        message:    format!(
            "Transaction {} of {} {} exceeds the {} {} threshold",
            event.id, event.amount, event.currency, threshold, event.currency
        ),
        data: serde_json::to_value(event)?,
    }))
}

/// The round figure `amount` is a multiple of, or sits just under.
pub fn matching_round_amount(amount: Decimal) -> Option<Decimal> {
    if amount <= Decimal::ZERO {
        return None;
    }
    let epsilon = Decimal::from(ROUND_AMOUNT_EPSILON);
    ROUND_AMOUNTS.iter().map(|k| Decimal::from(*k)).find(|k| {
        let below = *k - amount;
        (amount % *k).is_zero() || (below > Decimal::ZERO && below < epsilon)
    })
}

fn check_round_amount(event: &TransactionEvent) -> AlertResult<Option<AlertDraft>> {
    let Some(round) = matching_round_amount(event.amount) else {
        return Ok(None);
    };
    Ok(Some(AlertDraft {
        alert_type: AlertType::RoundAmountPattern,
        category:   AlertCategory::SuspiciousPattern,
        severity:   Severity::Medium,
        title:      "Round amount pattern".into(),
        message:    format!(
            "Transaction {} of {} {} matches round figure {round}",
            event.id, event.amount, event.currency
        ),
        data: json!({ "round_amount": round, "event": event }),
    }))
}

fn check_velocity(
    event: &TransactionEvent,
    config: &ThresholdConfig,
    activity: &Activity,
) -> AlertResult<Option<AlertDraft>> {
    if activity.in_velocity_window <= config.velocity_threshold as usize {
        return Ok(None);
    }
    let window_secs = activity.velocity_window.num_seconds();
    Ok(Some(AlertDraft {
        alert_type: AlertType::ThresholdBreach,
        category:   AlertCategory::ThresholdBreach,
        severity:   Severity::High,
        title:      "Transaction velocity exceeded".into(),
        message:    format!(
            "{} sent {} transactions in {}s (threshold {})",
            event.originator_address,
            activity.in_velocity_window,
            window_secs,
            config.velocity_threshold
        ),
        data: json!({
            "rule": "velocity",
            "originator": event.originator_address,
            "count": activity.in_velocity_window,
            "window_secs": window_secs,
            "event": event,
        }),
    }))
}

fn check_daily_count(
    event: &TransactionEvent,
    config: &ThresholdConfig,
    activity: &Activity,
) -> AlertResult<Option<AlertDraft>> {
    if activity.in_last_day <= config.daily_transaction_count as usize {
        return Ok(None);
    }
    Ok(Some(AlertDraft {
        alert_type: AlertType::ThresholdBreach,
        category:   AlertCategory::ThresholdBreach,
        severity:   Severity::Medium,
        title:      "Daily transaction count exceeded".into(),
        message:    format!(
            "{} sent {} transactions in 24h (limit {})",
            event.originator_address, activity.in_last_day, config.daily_transaction_count
        ),
        data: json!({
            "rule": "daily_count",
            "originator": event.originator_address,
            "count": activity.in_last_day,
            "event": event,
        }),
    }))
}

fn check_rapid_succession(
    event: &TransactionEvent,
    activity: &Activity,
) -> AlertResult<Option<AlertDraft>> {
    let Some(previous) = activity.previous else {
        return Ok(None);
    };
    let gap = event.timestamp - previous;
    if gap >= Duration::seconds(RAPID_SUCCESSION_SECS) {
        return Ok(None);
    }
    Ok(Some(AlertDraft {
        alert_type: AlertType::SuspiciousPattern,
        category:   AlertCategory::SuspiciousPattern,
        severity:   Severity::Medium,
        title:      "Rapid succession transactions".into(),
        message:    format!(
            "{} sent transaction {} {}s after its previous one",
            event.originator_address,
            event.id,
            gap.num_seconds()
        ),
        data: json!({ "rule": "rapid_succession", "gap_secs": gap.num_seconds(), "event": event }),
    }))
}

fn check_unusual_timing(event: &TransactionEvent) -> AlertResult<Option<AlertDraft>> {
    let hour = event.timestamp.hour();
    let (start, end) = QUIET_HOURS_UTC;
    if !(start..end).contains(&hour) {
        return Ok(None);
    }
    Ok(Some(AlertDraft {
        alert_type: AlertType::SuspiciousPattern,
        category:   AlertCategory::SuspiciousPattern,
        severity:   Severity::Low,
        title:      "Unusual transaction timing".into(),
        message:    format!(
            "Transaction {} at {:02}:{:02} UTC falls in quiet hours",
            event.id,
            hour,
            event.timestamp.minute()
        ),
        data: json!({ "rule": "unusual_timing", "event": event }),
    }))
}

// ── System ───────────────────────────────────────────────────────────────────

/// Raised by the monitoring loop when the event source stops answering.
pub fn connection_issue_draft(source_name: &str, reason: &str) -> AlertDraft {
    AlertDraft {
        alert_type: AlertType::WalletConnectionIssue,
        category:   AlertCategory::SystemAlert,
        severity:   Severity::High,
        title:      "Wallet connection issue".into(),
        message:    format!("Event source {source_name} is unreachable: {reason}"),
        data:       json!({ "source": source_name, "reason": reason }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn round_amount_exact_multiple() {
        assert_eq!(matching_round_amount(dec!(50000.00)), Some(dec!(1000)));
        assert_eq!(matching_round_amount(dec!(3000)), Some(dec!(1000)));
    }

    #[test]
    fn round_amount_just_under() {
        assert_eq!(matching_round_amount(dec!(9995.50)), Some(dec!(10000)));
        assert_eq!(matching_round_amount(dec!(990.01)), Some(dec!(1000)));
    }

    #[test]
    fn round_amount_misses() {
        assert_eq!(matching_round_amount(dec!(50001.00)), None);
        assert_eq!(matching_round_amount(dec!(990.00)), None);
        assert_eq!(matching_round_amount(dec!(125000.50)), None);
        assert_eq!(matching_round_amount(Decimal::ZERO), None);
        assert_eq!(matching_round_amount(dec!(-1000)), None);
    }

    #[test]
    fn sweep_drops_idle_originators() {
        let mut engine = RuleEngine::new();
        let t0 = chrono::Utc::now();
        let event = TransactionEvent::new("tx-1", dec!(10), 1.0, t0);
        engine.evaluate(&event, &ThresholdConfig::default()).unwrap();
        assert_eq!(engine.tracked_originators(), 1);

        engine.sweep(t0 + Duration::hours(25), Duration::hours(24));
        assert_eq!(engine.tracked_originators(), 0);
    }
}
