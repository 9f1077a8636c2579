//! Notifications carried by the Notifier.
//!
//! RULE: observers learn about the engine ONLY through these.
//! Variants are appended, never removed or reordered.

use crate::{alert::Alert, config::ThresholdConfig, types::Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The named channels a subscriber can listen on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    NewAlert,
    AlertAcknowledged,
    AlertResolved,
    AlertEscalated,
    ThresholdsUpdated,
    MonitoringStarted,
    MonitoringStopped,
}

impl Topic {
    pub const ALL: [Topic; 7] = [
        Self::NewAlert,
        Self::AlertAcknowledged,
        Self::AlertResolved,
        Self::AlertEscalated,
        Self::ThresholdsUpdated,
        Self::MonitoringStarted,
        Self::MonitoringStopped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewAlert          => "new_alert",
            Self::AlertAcknowledged => "alert_acknowledged",
            Self::AlertResolved     => "alert_resolved",
            Self::AlertEscalated    => "alert_escalated",
            Self::ThresholdsUpdated => "thresholds_updated",
            Self::MonitoringStarted => "monitoring_started",
            Self::MonitoringStopped => "monitoring_stopped",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    // ── Alert lifecycle ────────────────────────────
    NewAlert {
        alert: Alert,
    },
    AlertAcknowledged {
        alert: Alert,
    },
    AlertResolved {
        alert: Alert,
    },
    AlertEscalated {
        alert: Alert,
    },

    // ── Configuration ──────────────────────────────
    ThresholdsUpdated {
        thresholds: ThresholdConfig,
    },

    // ── Monitoring loop ────────────────────────────
    MonitoringStarted {
        at: Timestamp,
    },
    MonitoringStopped {
        at: Timestamp,
    },
}

impl Notification {
    pub fn topic(&self) -> Topic {
        match self {
            Self::NewAlert { .. }          => Topic::NewAlert,
            Self::AlertAcknowledged { .. } => Topic::AlertAcknowledged,
            Self::AlertResolved { .. }     => Topic::AlertResolved,
            Self::AlertEscalated { .. }    => Topic::AlertEscalated,
            Self::ThresholdsUpdated { .. } => Topic::ThresholdsUpdated,
            Self::MonitoringStarted { .. } => Topic::MonitoringStarted,
            Self::MonitoringStopped { .. } => Topic::MonitoringStopped,
        }
    }

    /// The alert this notification is about, if any.
    pub fn alert(&self) -> Option<&Alert> {
        match self {
            Self::NewAlert { alert }
            | Self::AlertAcknowledged { alert }
            | Self::AlertResolved { alert }
            | Self::AlertEscalated { alert } => Some(alert),
            _ => None,
        }
    }
}
