//! # Backend Errors
//!
//! Errors reported by a realtime database or authentication backend.

use thiserror::Error;

/// Result type for backend calls
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors surfaced across the backend boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    // ==================
    // Database Errors
    // ==================
    /// Write rejected by the backend (rules, quota, offline)
    #[error("Write rejected at {path}: {reason}")]
    WriteRejected { path: String, reason: String },

    /// Listener could not be established
    #[error("Listener cancelled at {path}: {reason}")]
    ListenerCancelled { path: String, reason: String },

    // ==================
    // Auth Errors
    // ==================
    /// Sign-in flow failed or was aborted by the user
    #[error("Sign-in failed: {0}")]
    SignInFailed(String),

    /// Sign-out failed
    #[error("Sign-out failed: {0}")]
    SignOutFailed(String),

    /// Auth state listener reported an error
    #[error("Auth state error: {0}")]
    AuthState(String),

    /// Legacy session migration failed
    #[error("Legacy auth migration failed: {0}")]
    MigrationFailed(String),
}

impl BackendError {
    /// Short machine-readable reason used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::WriteRejected { .. } => "write_rejected",
            BackendError::ListenerCancelled { .. } => "listener_cancelled",
            BackendError::SignInFailed(_) => "sign_in_failed",
            BackendError::SignOutFailed(_) => "sign_out_failed",
            BackendError::AuthState(_) => "auth_state",
            BackendError::MigrationFailed(_) => "migration_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_path() {
        let err = BackendError::WriteRejected {
            path: "/queue/tasks".to_string(),
            reason: "permission denied".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Write rejected at /queue/tasks: permission denied"
        );
        assert_eq!(err.kind(), "write_rejected");
    }
}
