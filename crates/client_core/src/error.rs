use std::fmt;

use shared::domain::{FilePath, TypeKey};
use thiserror::Error;

/// Failure taxonomy of the session core. Every variant is recoverable without
/// restarting the session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("required fields missing: {}", missing.join(", "))]
    Validation { missing: Vec<String> },
    #[error("backend request failed: {0}")]
    Network(String),
    #[error("{0}")]
    Backend(String),
    #[error("confirmation declined")]
    Declined,
    #[error("no entry type selected")]
    NoTypeSelected,
    #[error("unknown entry type: {0}")]
    UnknownEntryType(TypeKey),
    #[error("no file is open in the editor")]
    NoOpenFile,
    #[error("another operation is still running for {path}")]
    OperationInFlight { path: FilePath },
}

impl SessionError {
    pub fn network(err: impl fmt::Display) -> Self {
        Self::Network(err.to_string())
    }

    pub fn is_declined(&self) -> bool {
        matches!(self, Self::Declined)
    }
}
