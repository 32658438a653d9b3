//! # Database References
//!
//! The capabilities the drivers consume from a realtime database client.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::BackendResult;

/// Shared handle to a backend location or query
pub type RefHandle = Arc<dyn Reference>;

/// Callback registered for a database event
pub type SnapshotCallback = Arc<dyn Fn(Snapshot) + Send + Sync>;

/// Database event names a reference can be subscribed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Full value of the location, on registration and on every change
    Value,
    /// One event per child, existing ones first, then every new one
    ChildAdded,
}

impl EventKind {
    /// Wire name of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Value => "value",
            EventKind::ChildAdded => "child_added",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Point-in-time observation of a location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Last path segment of the location, `None` at the root
    pub key: Option<String>,
    /// Value at the location; `Null` when nothing is stored
    pub value: Value,
}

impl Snapshot {
    /// Create a snapshot
    pub fn new(key: Option<String>, value: Value) -> Self {
        Self { key, value }
    }
}

/// A location (optionally refined into a query) in a hierarchical store.
///
/// Navigation and refinement return new handles and never touch the
/// backend. `on`/`off` manage event callbacks; `off` removes every callback
/// registered for that event on this exact location and query.
pub trait Reference: Send + Sync {
    /// Last path segment, `None` at the root
    fn key(&self) -> Option<String>;

    /// Slash-separated absolute path, used in logs
    fn path(&self) -> String;

    /// Descend into a child location
    fn child(&self, segment: &str) -> RefHandle;

    /// Order children by the value of one of their fields
    fn order_by_child(&self, field: &str) -> RefHandle;

    /// Order children by key
    fn order_by_key(&self) -> RefHandle;

    /// Keep children whose ordering value equals `value`
    fn equal_to(&self, value: &Value) -> RefHandle;

    /// Keep the first `limit` children in order
    fn limit_to_first(&self, limit: u32) -> RefHandle;

    /// Keep the last `limit` children in order
    fn limit_to_last(&self, limit: u32) -> RefHandle;

    /// Register `callback` for `event`
    fn on(&self, event: EventKind, callback: SnapshotCallback);

    /// Remove every callback registered for `event`
    fn off(&self, event: EventKind);

    /// Append `value` under a backend-generated key and return its location
    fn push(&self, value: Value) -> BackendResult<RefHandle>;

    /// Delete the location
    fn remove(&self) -> BackendResult<()>;
}

impl fmt::Debug for dyn Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference").field("path", &self.path()).finish()
    }
}
