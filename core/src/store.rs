//! In-memory alert store: the authoritative collection of alerts.
//!
//! RULES:
//!   - Only the store mutates alert lifecycle fields.
//!   - The store publishes nothing; callers notify after a mutation
//!     succeeds.
//!   - History is kept in admission order, oldest first. Admission
//!     order follows the engine clock, so the front of the history is
//!     always the oldest entry and pruning only ever pops the front.
//!
//! Two views over one set of entities:
//!   active queue:  status ∈ {active, acknowledged}
//!   history:       every alert admitted and not yet pruned

use crate::{
    alert::{Alert, AlertStatus},
    error::{AlertError, AlertResult},
    types::{AlertId, Timestamp},
};
use chrono::Duration;
use std::collections::{HashMap, VecDeque};

pub const DEFAULT_RETENTION_DAYS: i64 = 7;
pub const DEFAULT_HISTORY_CAPACITY: usize = 10_000;

pub struct AlertStore {
    alerts:    HashMap<AlertId, Alert>,
    history:   VecDeque<AlertId>,
    active:    Vec<AlertId>,
    retention: Duration,
    capacity:  usize,
}

impl Default for AlertStore {
    fn default() -> Self {
        Self::new(Duration::days(DEFAULT_RETENTION_DAYS), DEFAULT_HISTORY_CAPACITY)
    }
}

impl AlertStore {
    pub fn new(retention: Duration, capacity: usize) -> Self {
        Self {
            alerts:  HashMap::new(),
            history: VecDeque::new(),
            active:  Vec::new(),
            retention,
            capacity: capacity.max(1),
        }
    }

    // ── Admission ──────────────────────────────────────────────

    /// Append to the active queue and the history, then prune
    /// against the alert's own timestamp and enforce the cap.
    pub fn admit(&mut self, alert: Alert) {
        let now = alert.timestamp;
        let id = alert.id.clone();
        if alert.is_open() {
            self.active.push(id.clone());
        }
        self.history.push_back(id.clone());
        self.alerts.insert(id, alert);

        self.prune_history(now);
        while self.history.len() > self.capacity {
            if let Some(oldest) = self.history.pop_front() {
                log::debug!("history over capacity, evicting {oldest}");
                self.forget(&oldest);
            }
        }
    }

    // ── Lifecycle ──────────────────────────────────────────────

    /// active → acknowledged. Anything else is an invalid transition:
    /// an alert has exactly one acknowledging actor.
    pub fn acknowledge(&mut self, id: &str, actor: &str, now: Timestamp) -> AlertResult<Alert> {
        let alert = self.get_mut(id)?;
        if alert.status != AlertStatus::Active {
            return Err(AlertError::InvalidTransition {
                id:     id.to_string(),
                from:   alert.status,
                action: "acknowledge",
            });
        }
        alert.status = AlertStatus::Acknowledged;
        alert.acknowledged_by = Some(actor.to_string());
        alert.acknowledged_at = Some(now);
        Ok(alert.clone())
    }

    /// active | acknowledged → resolved. The alert leaves the active
    /// queue but stays in history.
    pub fn resolve(&mut self, id: &str, actor: &str, now: Timestamp) -> AlertResult<Alert> {
        let alert = self.get_mut(id)?;
        if alert.status == AlertStatus::Resolved {
            return Err(AlertError::InvalidTransition {
                id:     id.to_string(),
                from:   alert.status,
                action: "resolve",
            });
        }
        alert.status = AlertStatus::Resolved;
        alert.resolved_by = Some(actor.to_string());
        alert.resolved_at = Some(now);
        let resolved = alert.clone();
        self.active.retain(|a| a != id);
        Ok(resolved)
    }

    /// Mark an alert escalated if it is still active and has not been
    /// escalated before. `None` means there was nothing to do,
    /// including when the alert has been pruned.
    pub fn escalate(&mut self, id: &str, now: Timestamp) -> Option<Alert> {
        let alert = self.alerts.get_mut(id)?;
        if alert.status != AlertStatus::Active || alert.escalated {
            return None;
        }
        alert.escalated = true;
        alert.escalated_at = Some(now);
        Some(alert.clone())
    }

    // ── Retention ──────────────────────────────────────────────

    /// Drop history entries with `timestamp < now - retention`.
    /// Returns how many were removed.
    pub fn prune_history(&mut self, now: Timestamp) -> usize {
        let cutoff = now - self.retention;
        let mut pruned = 0;
        while self
            .history
            .front()
            .and_then(|id| self.alerts.get(id))
            .is_some_and(|a| a.timestamp < cutoff)
        {
            if let Some(id) = self.history.pop_front() {
                self.forget(&id);
                pruned += 1;
            }
        }
        if pruned > 0 {
            log::debug!("pruned {pruned} alerts older than {cutoff}");
        }
        pruned
    }

    fn forget(&mut self, id: &str) {
        if self.alerts.remove(id).is_some_and(|a| a.is_open()) {
            self.active.retain(|a| a != id);
        }
    }

    // ── Queries ────────────────────────────────────────────────

    pub fn get(&self, id: &str) -> Option<&Alert> {
        self.alerts.get(id)
    }

    fn get_mut(&mut self, id: &str) -> AlertResult<&mut Alert> {
        self.alerts
            .get_mut(id)
            .ok_or_else(|| AlertError::NotFound { id: id.to_string() })
    }

    /// Open alerts, oldest first.
    pub fn active_alerts(&self) -> Vec<Alert> {
        self.active
            .iter()
            .filter_map(|id| self.alerts.get(id))
            .cloned()
            .collect()
    }

    /// The `limit` most recent open alerts, newest first.
    pub fn latest_active(&self, limit: usize) -> Vec<Alert> {
        self.active
            .iter()
            .rev()
            .take(limit)
            .filter_map(|id| self.alerts.get(id))
            .cloned()
            .collect()
    }

    /// The `limit` most recent alerts of any status, newest first.
    pub fn history(&self, limit: usize) -> Vec<Alert> {
        self.history
            .iter()
            .rev()
            .take(limit)
            .filter_map(|id| self.alerts.get(id))
            .cloned()
            .collect()
    }

    /// The full history, oldest first.
    pub fn snapshot(&self) -> Vec<Alert> {
        self.history
            .iter()
            .filter_map(|id| self.alerts.get(id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }
}
