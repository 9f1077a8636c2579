//! The Alert entity, its classification enums, and the factory that
//! turns a rule match (AlertDraft) into a fully-formed Alert.
//!
//! LIFECYCLE:
//!   active ──► acknowledged ──► resolved
//!      └──────────────────────────┘
//!
//! `resolved` is terminal. Only the AlertStore mutates lifecycle fields.

use crate::types::{ActorId, AlertId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ── Classification ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    HighRiskTransaction,
    LargeAmount,
    RoundAmountPattern,
    WalletConnectionIssue,
    ComplianceViolation,
    ThresholdBreach,
    SuspiciousPattern,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighRiskTransaction   => "high_risk_transaction",
            Self::LargeAmount           => "large_amount",
            Self::RoundAmountPattern    => "round_amount_pattern",
            Self::WalletConnectionIssue => "wallet_connection_issue",
            Self::ComplianceViolation   => "compliance_violation",
            Self::ThresholdBreach       => "threshold_breach",
            Self::SuspiciousPattern     => "suspicious_pattern",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    SuspiciousActivity,
    ComplianceBreach,
    ThresholdBreach,
    SuspiciousPattern,
    SystemAlert,
}

impl AlertCategory {
    pub const ALL: [AlertCategory; 5] = [
        Self::SuspiciousActivity,
        Self::ComplianceBreach,
        Self::ThresholdBreach,
        Self::SuspiciousPattern,
        Self::SystemAlert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuspiciousActivity => "suspicious_activity",
            Self::ComplianceBreach   => "compliance_breach",
            Self::ThresholdBreach    => "threshold_breach",
            Self::SuspiciousPattern  => "suspicious_pattern",
            Self::SystemAlert        => "system_alert",
        }
    }
}

/// Ordered: Low < Medium < High < Critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low      => "low",
            Self::Medium   => "medium",
            Self::High     => "high",
            Self::Critical => "critical",
        }
    }

    /// High and critical alerts need a human.
    pub fn requires_action(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active       => "active",
            Self::Acknowledged => "acknowledged",
            Self::Resolved     => "resolved",
        }
    }

    /// Active and acknowledged alerts sit in the active queue.
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Resolved)
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Entities ─────────────────────────────────────────────────────────────────

/// An unmaterialised rule match: no identity, no timestamps yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDraft {
    pub alert_type: AlertType,
    pub category:   AlertCategory,
    pub severity:   Severity,
    pub title:      String,
    pub message:    String,
    pub data:       serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id:              AlertId,
    pub timestamp:       Timestamp,
    pub alert_type:      AlertType,
    pub category:        AlertCategory,
    pub severity:        Severity,
    pub title:           String,
    pub message:         String,
    pub data:            serde_json::Value,
    pub status:          AlertStatus,
    pub action_required: bool,
    pub acknowledged_by: Option<ActorId>,
    pub acknowledged_at: Option<Timestamp>,
    pub resolved_by:     Option<ActorId>,
    pub resolved_at:     Option<Timestamp>,
    pub escalated:       bool,
    pub escalated_at:    Option<Timestamp>,
}

impl Alert {
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }
}

// ── Factory ──────────────────────────────────────────────────────────────────

pub struct AlertFactory;

impl AlertFactory {
    /// Materialise a draft: fresh id, creation stamp, default lifecycle.
    pub fn build(draft: AlertDraft, now: Timestamp) -> Alert {
        Alert {
            id:              Uuid::new_v4().to_string(),
            timestamp:       now,
            alert_type:      draft.alert_type,
            category:        draft.category,
            action_required: draft.severity.requires_action(),
            severity:        draft.severity,
            title:           draft.title,
            message:         draft.message,
            data:            draft.data,
            status:          AlertStatus::Active,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_by:     None,
            resolved_at:     None,
            escalated:       false,
            escalated_at:    None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn draft(severity: Severity) -> AlertDraft {
        AlertDraft {
            alert_type: AlertType::LargeAmount,
            category:   AlertCategory::ThresholdBreach,
            severity,
            title:      "Large transaction".into(),
            message:    "over threshold".into(),
            data:       serde_json::json!({ "amount": "12000" }),
        }
    }

    #[test]
    fn build_assigns_identity_and_defaults() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let alert = AlertFactory::build(draft(Severity::Medium), now);

        assert!(!alert.id.is_empty());
        assert_eq!(alert.timestamp, now);
        assert_eq!(alert.status, AlertStatus::Active);
        assert!(!alert.action_required, "medium severity should not require action");
        assert!(!alert.escalated);
        assert!(alert.acknowledged_by.is_none() && alert.resolved_by.is_none());
        assert_eq!(alert.data["amount"], "12000");
    }

    #[test]
    fn action_required_for_high_and_critical_only() {
        let now = Utc::now();
        for (severity, expected) in [
            (Severity::Low, false),
            (Severity::Medium, false),
            (Severity::High, true),
            (Severity::Critical, true),
        ] {
            let alert = AlertFactory::build(draft(severity), now);
            assert_eq!(alert.action_required, expected, "severity {severity}");
        }
    }

    #[test]
    fn ids_are_unique() {
        let now = Utc::now();
        let a = AlertFactory::build(draft(Severity::Low), now);
        let b = AlertFactory::build(draft(Severity::Low), now);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
    }
}
