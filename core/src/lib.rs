//! Treasury alert engine.
//!
//! Ingests transaction-like events, evaluates them against detection
//! rules, keeps alerts through their lifecycle, escalates critical
//! alerts nobody picked up, and fans every change out to subscribers.
//!
//! Entry point: [`engine::AlertEngine`].

pub mod alert;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod event;
pub mod feed;
pub mod notifier;
pub mod rng;
pub mod rules;
pub mod stats;
pub mod store;
pub mod transaction;
pub mod types;

pub use alert::{Alert, AlertCategory, AlertDraft, AlertStatus, AlertType, Severity};
pub use engine::{AlertEngine, MonitoringState};
pub use error::{AlertError, AlertResult};
pub use event::{Notification, Topic};
