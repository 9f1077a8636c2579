//! Alert lifecycle tests: forward-only transitions, actor bookkeeping,
//! retention and the two store views.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use treasury_alerts_core::{
    alert::AlertFactory,
    error::AlertError,
    stats::compute_stats,
    store::AlertStore,
    Alert, AlertCategory, AlertDraft, AlertStatus, AlertType, Severity,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap()
}

fn alert_at(severity: Severity, category: AlertCategory, at: DateTime<Utc>) -> Alert {
    AlertFactory::build(
        AlertDraft {
            alert_type: AlertType::LargeAmount,
            category,
            severity,
            title: "Large transaction amount".into(),
            message: "over threshold".into(),
            data: json!({ "amount": "12000" }),
        },
        at,
    )
}

fn admit(store: &mut AlertStore, at: DateTime<Utc>) -> String {
    let alert = alert_at(Severity::Medium, AlertCategory::ThresholdBreach, at);
    let id = alert.id.clone();
    store.admit(alert);
    id
}

/// A fresh alert is active, unescalated, with no actors.
#[test]
fn new_alert_defaults() {
    let alert = alert_at(Severity::Critical, AlertCategory::ComplianceBreach, t0());
    assert_eq!(alert.status, AlertStatus::Active);
    assert!(alert.action_required, "critical alerts require action");
    assert!(!alert.escalated);
    assert!(alert.acknowledged_by.is_none() && alert.resolved_by.is_none());
    assert_eq!(alert.timestamp, t0());

    let low = alert_at(Severity::Low, AlertCategory::SuspiciousPattern, t0());
    assert!(!low.action_required, "low alerts are informational");
    assert_ne!(alert.id, low.id, "ids are unique");
}

/// Acknowledge then resolve by different actors keeps both actors.
#[test]
fn acknowledge_then_resolve_keeps_both_actors() {
    let mut store = AlertStore::default();
    let id = admit(&mut store, t0());

    let acked = store
        .acknowledge(&id, "alice", t0() + Duration::minutes(1))
        .expect("acknowledge");
    assert_eq!(acked.status, AlertStatus::Acknowledged);
    assert_eq!(store.active_len(), 1, "acknowledged alerts stay in the active queue");

    let resolved = store
        .resolve(&id, "bob", t0() + Duration::minutes(2))
        .expect("resolve");
    assert_eq!(resolved.status, AlertStatus::Resolved);
    assert_eq!(resolved.acknowledged_by.as_deref(), Some("alice"));
    assert_eq!(resolved.resolved_by.as_deref(), Some("bob"));
    assert_eq!(resolved.acknowledged_at, Some(t0() + Duration::minutes(1)));
    assert_eq!(resolved.resolved_at, Some(t0() + Duration::minutes(2)));

    assert_eq!(store.active_len(), 0, "resolved alerts leave the active queue");
    assert_eq!(store.len(), 1, "resolved alerts stay in history");
}

/// Resolving straight from active is allowed.
#[test]
fn resolve_directly_from_active() {
    let mut store = AlertStore::default();
    let id = admit(&mut store, t0());
    let resolved = store.resolve(&id, "carol", t0()).unwrap();
    assert_eq!(resolved.status, AlertStatus::Resolved);
    assert!(resolved.acknowledged_by.is_none());
}

/// A second resolve fails and leaves the alert untouched.
#[test]
fn resolve_twice_is_rejected() {
    let mut store = AlertStore::default();
    let id = admit(&mut store, t0());
    store.resolve(&id, "alice", t0()).unwrap();
    let before = store.get(&id).cloned().unwrap();

    let err = store
        .resolve(&id, "mallory", t0() + Duration::hours(1))
        .unwrap_err();
    assert!(
        matches!(err, AlertError::InvalidTransition { from: AlertStatus::Resolved, .. }),
        "got {err:?}"
    );
    assert_eq!(store.get(&id), Some(&before), "failed transition mutated the alert");
}

/// Acknowledging a resolved alert is rejected.
#[test]
fn acknowledge_after_resolve_is_rejected() {
    let mut store = AlertStore::default();
    let id = admit(&mut store, t0());
    store.resolve(&id, "alice", t0()).unwrap();

    let err = store.acknowledge(&id, "bob", t0()).unwrap_err();
    assert!(matches!(err, AlertError::InvalidTransition { action: "acknowledge", .. }));
    assert!(store.get(&id).unwrap().acknowledged_by.is_none());
}

/// An alert has exactly one acknowledging actor.
#[test]
fn acknowledge_twice_is_rejected() {
    let mut store = AlertStore::default();
    let id = admit(&mut store, t0());
    store.acknowledge(&id, "alice", t0()).unwrap();

    assert!(store.acknowledge(&id, "bob", t0()).is_err());
    assert_eq!(store.get(&id).unwrap().acknowledged_by.as_deref(), Some("alice"));
}

/// Unknown ids surface as NotFound.
#[test]
fn unknown_id_is_not_found() {
    let mut store = AlertStore::default();
    assert!(matches!(
        store.acknowledge("nope", "alice", t0()),
        Err(AlertError::NotFound { .. })
    ));
    assert!(matches!(
        store.resolve("nope", "alice", t0()),
        Err(AlertError::NotFound { .. })
    ));
    assert!(store.escalate("nope", t0()).is_none());
}

/// Escalation only applies once, and only to active alerts.
#[test]
fn escalation_is_one_shot() {
    let mut store = AlertStore::default();
    let id = admit(&mut store, t0());

    let escalated = store.escalate(&id, t0() + Duration::minutes(5)).expect("escalate");
    assert!(escalated.escalated);
    assert_eq!(escalated.status, AlertStatus::Active, "escalation keeps the status");
    assert!(store.escalate(&id, t0() + Duration::minutes(10)).is_none());

    let other = admit(&mut store, t0());
    store.acknowledge(&other, "alice", t0()).unwrap();
    assert!(store.escalate(&other, t0()).is_none(), "acknowledged alerts never escalate");
}

/// Pruning removes exactly the entries older than the retention window,
/// and a second prune at the same instant removes nothing.
#[test]
fn prune_is_idempotent() {
    let mut store = AlertStore::new(Duration::days(7), 1000);
    let old = admit(&mut store, t0());
    let edge = admit(&mut store, t0() + Duration::days(1));
    let fresh = admit(&mut store, t0() + Duration::days(6));

    let now = t0() + Duration::days(8);
    assert_eq!(store.prune_history(now), 1);
    assert_eq!(store.prune_history(now), 0);

    assert!(store.get(&old).is_none());
    assert!(store.get(&edge).is_some(), "exactly at the cutoff is retained");
    assert!(store.get(&fresh).is_some());
    assert_eq!(store.active_len(), 2, "pruned alerts leave the active queue");
}

/// Admission prunes against the new alert's timestamp.
#[test]
fn admission_prunes_expired_history() {
    let mut store = AlertStore::new(Duration::days(7), 1000);
    admit(&mut store, t0());
    admit(&mut store, t0() + Duration::days(10));
    assert_eq!(store.len(), 1);
}

/// The history never grows past its capacity; the oldest go first.
#[test]
fn history_capacity_evicts_oldest() {
    let mut store = AlertStore::new(Duration::days(7), 3);
    let ids: Vec<_> = (0..5)
        .map(|i| admit(&mut store, t0() + Duration::seconds(i)))
        .collect();

    assert_eq!(store.len(), 3);
    assert!(store.get(&ids[0]).is_none());
    assert!(store.get(&ids[1]).is_none());
    let newest: Vec<_> = store.history(10).into_iter().map(|a| a.id).collect();
    assert_eq!(newest, vec![ids[4].clone(), ids[3].clone(), ids[2].clone()]);
}

/// Views: active oldest first, latest newest first, both bounded.
#[test]
fn store_views_are_ordered() {
    let mut store = AlertStore::default();
    let ids: Vec<_> = (0..4)
        .map(|i| admit(&mut store, t0() + Duration::seconds(i)))
        .collect();
    store.resolve(&ids[1], "alice", t0() + Duration::seconds(10)).unwrap();

    let active: Vec<_> = store.active_alerts().into_iter().map(|a| a.id).collect();
    assert_eq!(active, vec![ids[0].clone(), ids[2].clone(), ids[3].clone()]);

    let latest: Vec<_> = store.latest_active(2).into_iter().map(|a| a.id).collect();
    assert_eq!(latest, vec![ids[3].clone(), ids[2].clone()]);

    assert_eq!(store.history(2).len(), 2);
    assert_eq!(store.snapshot().len(), 4);
}

/// Severity and category breakdowns each sum to the total; windows
/// are measured from the supplied instant.
#[test]
fn stats_breakdowns_and_windows() {
    let now = t0() + Duration::days(3);
    let history = vec![
        alert_at(Severity::Critical, AlertCategory::ComplianceBreach, now - Duration::hours(1)),
        alert_at(Severity::High, AlertCategory::SuspiciousActivity, now - Duration::hours(30)),
        alert_at(Severity::Medium, AlertCategory::ThresholdBreach, now - Duration::days(2)),
        alert_at(Severity::Medium, AlertCategory::ThresholdBreach, now - Duration::days(8)),
    ];
    let mut resolved = history[1].clone();
    resolved.status = AlertStatus::Resolved;
    let history = vec![history[0].clone(), resolved, history[2].clone(), history[3].clone()];

    let stats = compute_stats(&history, now);
    assert_eq!(stats.total, 4);
    assert_eq!(stats.active, 3);
    assert_eq!(stats.last_24_hours, 1);
    assert_eq!(stats.last_7_days, 3);
    assert_eq!(stats.by_severity.values().sum::<usize>(), stats.total);
    assert_eq!(stats.by_category.values().sum::<usize>(), stats.total);
    assert_eq!(stats.by_severity[&Severity::Medium], 2);
    assert_eq!(stats.by_severity[&Severity::Low], 0, "severities are zero-filled");
    assert_eq!(stats.by_category[&AlertCategory::SystemAlert], 0);
}

/// Stats over an empty history are all zero.
#[test]
fn stats_on_empty_history() {
    let stats = compute_stats(&[], t0());
    assert_eq!(stats.total, 0);
    assert_eq!(stats.by_severity.len(), 4);
    assert_eq!(stats.by_category.len(), 5);
    assert!(stats.by_severity.values().all(|n| *n == 0));
}

/// Window edges are inclusive: an alert exactly 24h (or 7d) old still
/// counts, one second older does not.
#[test]
fn stats_window_edges_are_inclusive() {
    let now = t0() + Duration::days(10);
    let history = vec![
        alert_at(Severity::High, AlertCategory::SuspiciousActivity, now - Duration::hours(24)),
        alert_at(
            Severity::High,
            AlertCategory::SuspiciousActivity,
            now - Duration::hours(24) - Duration::seconds(1),
        ),
        alert_at(Severity::Low, AlertCategory::SuspiciousPattern, now - Duration::days(7)),
        alert_at(
            Severity::Low,
            AlertCategory::SuspiciousPattern,
            now - Duration::days(7) - Duration::seconds(1),
        ),
    ];

    let stats = compute_stats(&history, now);
    assert_eq!(stats.last_24_hours, 1, "exactly 24h old is inside the day window");
    assert_eq!(stats.last_7_days, 3, "exactly 7d old is inside the week window");
}
