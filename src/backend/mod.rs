//! # Backend Boundary
//!
//! Traits for the realtime database and authentication clients the drivers
//! wrap, plus an in-memory implementation of both.

pub mod auth;
pub mod errors;
pub mod memory;
pub mod reference;

pub use auth::{
    AuthClient, AuthErrorCallback, AuthProvider, AuthState, AuthStateCallback, AuthUnsubscribe,
    LegacyAuthMigrator, ProviderId, User,
};
pub use errors::{BackendError, BackendResult};
pub use reference::{EventKind, RefHandle, Reference, Snapshot, SnapshotCallback};
