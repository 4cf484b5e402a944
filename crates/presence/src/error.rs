// Presence Error Types

use thiserror::Error;

/// Failure of the backing key-value store.
///
/// Every variant means the store could not be reached or did not answer in
/// time; the store layer never retries.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable during {operation}: {reason}")]
    Unavailable {
        operation: &'static str,
        reason: String,
    },

    #[error("store {operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },
}

impl StoreError {
    pub fn unavailable(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            operation,
            reason: reason.into(),
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Self::Unavailable { operation, .. } | Self::Timeout { operation, .. } => operation,
        }
    }
}

/// Errors returned by registry operations
#[derive(Debug, Error)]
pub enum PresenceError {
    /// Rejected before any store access
    #[error("invalid {field}: {reason}")]
    InvalidIdentifier { field: &'static str, reason: String },

    /// A store call failed; carries enough context for the caller to retry
    #[error("presence {operation} failed for tenant '{tenant}': {source}")]
    Store {
        tenant: String,
        player: Option<String>,
        operation: &'static str,
        source: StoreError,
    },
}

impl PresenceError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            field,
            reason: reason.into(),
        }
    }

    /// Whether repeating the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store { .. })
    }
}

/// Broadcast publish failure. Logged by the notifier, never returned to
/// registry callers.
#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("publish of '{event}' failed: {reason}")]
    PublishFailed { event: String, reason: String },

    #[error("publish of '{event}' timed out after {timeout_ms}ms")]
    Timeout { event: String, timeout_ms: u64 },
}
