//! Observable driver events
//!
//! Events are explicit and typed; each carries the severity it is logged at.

use std::fmt;

use super::logger::Severity;

/// Observable events in the driver layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    // Configuration
    /// Driver configuration loaded
    ConfigLoaded,

    // Backend listeners
    /// Backend event listener registered
    BackendListenerAttached,
    /// Backend event listener removed
    BackendListenerDetached,

    // Auth
    /// Auth state listener registered
    AuthListenerAttached,
    /// Auth state listener removed
    AuthListenerDetached,
    /// Backend reported a new auth state
    AuthStateChanged,
    /// Auth state listener failed; the auth source terminates
    AuthStateError,
    /// Auth action handed to the client
    AuthActionDispatched,
    /// Auth client rejected an action
    AuthActionFailed,
    /// Auth input stream failed; the auth source terminates
    AuthSinkFailed,
    /// Legacy session migrated
    LegacyAuthMigrated,
    /// Legacy session migration failed
    LegacyAuthMigrationFailed,
    /// Legacy session cleared after sign-in
    LegacyAuthCleared,

    // Database
    /// Query served from the cache
    QueryCacheHit,
    /// Query built and cached
    QueryCacheMiss,

    // Queue
    /// Payload received on the queue sink
    QueueInput,
    /// Job pushed to the destination
    QueueJobPushed,
    /// Job push failed
    QueuePushFailed,
    /// Response removed after delivery
    QueueResponseRemoved,
    /// Response removal failed
    QueueRemoveFailed,
}

impl Event {
    /// Returns the event name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::BackendListenerAttached => "BACKEND_LISTENER_ATTACHED",
            Event::BackendListenerDetached => "BACKEND_LISTENER_DETACHED",
            Event::AuthListenerAttached => "AUTH_LISTENER_ATTACHED",
            Event::AuthListenerDetached => "AUTH_LISTENER_DETACHED",
            Event::AuthStateChanged => "AUTH_STATE_CHANGED",
            Event::AuthStateError => "AUTH_STATE_ERROR",
            Event::AuthActionDispatched => "AUTH_ACTION_DISPATCHED",
            Event::AuthActionFailed => "AUTH_ACTION_FAILED",
            Event::AuthSinkFailed => "AUTH_SINK_FAILED",
            Event::LegacyAuthMigrated => "LEGACY_AUTH_MIGRATED",
            Event::LegacyAuthMigrationFailed => "LEGACY_AUTH_MIGRATION_FAILED",
            Event::LegacyAuthCleared => "LEGACY_AUTH_CLEARED",
            Event::QueryCacheHit => "QUERY_CACHE_HIT",
            Event::QueryCacheMiss => "QUERY_CACHE_MISS",
            Event::QueueInput => "QUEUE_INPUT",
            Event::QueueJobPushed => "QUEUE_JOB_PUSHED",
            Event::QueuePushFailed => "QUEUE_PUSH_FAILED",
            Event::QueueResponseRemoved => "QUEUE_RESPONSE_REMOVED",
            Event::QueueRemoveFailed => "QUEUE_REMOVE_FAILED",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::QueueInput | Event::QueryCacheHit | Event::QueueResponseRemoved => Severity::Trace,
            Event::AuthActionFailed
            | Event::LegacyAuthMigrationFailed
            | Event::QueuePushFailed
            | Event::QueueRemoveFailed => Severity::Warn,
            Event::AuthStateError | Event::AuthSinkFailed => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
