//! # Driver Errors
//!
//! Error types shared by the stream primitive and the drivers.

use thiserror::Error;

use crate::backend::BackendError;

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

/// Driver errors
///
/// Errors travel through multicast streams, so every variant is `Clone`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DriverError {
    // ==================
    // Backend Errors
    // ==================
    /// Error reported by the wrapped backend
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    // ==================
    // Action Errors
    // ==================
    /// Auth action carried a `type` outside popup/redirect/logout
    #[error("Unknown auth action type: {0}")]
    UnknownActionType(String),

    /// Provider identifier outside the supported set
    #[error("Unknown auth provider: {0}")]
    UnknownProvider(String),

    /// Malformed auth action or query argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ==================
    // Stream Errors
    // ==================
    /// Error forwarded from an application sink stream
    #[error("Sink stream failed: {0}")]
    SinkFailed(String),

    // ==================
    // Configuration Errors
    // ==================
    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DriverError {
    /// Stable error code for logs
    pub fn code(&self) -> &'static str {
        match self {
            DriverError::Backend(_) => "RTDB_BACKEND_ERROR",
            DriverError::UnknownActionType(_) => "RTDB_UNKNOWN_ACTION",
            DriverError::UnknownProvider(_) => "RTDB_UNKNOWN_PROVIDER",
            DriverError::InvalidArgument(_) => "RTDB_INVALID_ARGUMENT",
            DriverError::SinkFailed(_) => "RTDB_SINK_FAILED",
            DriverError::Config(_) => "RTDB_CONFIG_ERROR",
        }
    }
}
