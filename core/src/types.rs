//! Shared primitive types used across the alert engine.

use chrono::{DateTime, Utc};

/// A stable, unique identifier for an alert.
pub type AlertId = String;

/// Whoever acknowledges or resolves an alert (analyst id, service name).
pub type ActorId = String;

/// Every timestamp in the engine is UTC.
pub type Timestamp = DateTime<Utc>;
