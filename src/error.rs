//! Error types.

use thiserror::Error;

/// Session setup failures. Nothing in per-frame processing returns these.
#[derive(Debug, Error)]
pub enum CoachError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Vision client setup failed: {0}")]
    ClientSetup(#[from] reqwest::Error),
}

pub type EscalationResult<T> = Result<T, EscalationError>;

/// Failures of the remote analysis call. All of them are recoverable.
#[derive(Debug, Error)]
pub enum EscalationError {
    /// Elapsed budget in milliseconds
    #[error("Analysis timed out after {0} ms")]
    Timeout(u64),

    #[error("Analysis request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid analysis response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EscalationError {
    /// Transient failures worth trying again after the cooldown
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Network(_)) || self.is_server_error()
    }

    fn is_server_error(&self) -> bool {
        matches!(self, Self::RequestFailed(msg) if msg.starts_with('5'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(EscalationError::Timeout(15_000).is_transient());
        assert!(EscalationError::RequestFailed("503 Service Unavailable".into()).is_transient());
        assert!(!EscalationError::RequestFailed("400 Bad Request".into()).is_transient());
        assert!(!EscalationError::InvalidResponse("no advice".into()).is_transient());
    }

    #[test]
    fn test_timeout_message_keeps_sub_second_budget() {
        assert_eq!(EscalationError::Timeout(250).to_string(), "Analysis timed out after 250 ms");
    }
}
