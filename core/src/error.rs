use crate::{alert::AlertStatus, types::AlertId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Alert '{id}' not found")]
    NotFound { id: AlertId },

    #[error("Cannot {action} alert '{id}': it is already {from}")]
    InvalidTransition {
        id:     AlertId,
        from:   AlertStatus,
        action: &'static str,
    },

    #[error("Invalid config: {field} {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cannot read config {path}: {source}")]
    ConfigFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Event source '{source_name}' failed: {reason}")]
    Feed { source_name: String, reason: String },

    #[error("No tokio runtime available; build the engine inside a runtime")]
    RuntimeUnavailable,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type AlertResult<T> = Result<T, AlertError>;
