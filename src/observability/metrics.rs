//! Metrics registry for the drivers
//!
//! - Counters only
//! - Monotonic increase
//! - Thread-safe but lock-free

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters for one driver
///
/// All counters use Relaxed ordering; readers only need eventual values.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Backend event listeners registered
    listeners_attached: AtomicU64,
    /// Backend event listeners removed
    listeners_detached: AtomicU64,
    /// Auth actions handed to the client
    auth_actions: AtomicU64,
    /// Auth actions the client rejected
    auth_failures: AtomicU64,
    /// Queries served from the cache
    cache_hits: AtomicU64,
    /// Queries built on first request
    cache_misses: AtomicU64,
    /// Jobs pushed to the queue destination
    queue_pushes: AtomicU64,
    /// Job pushes that failed
    queue_push_failures: AtomicU64,
    /// Responses removed after delivery
    queue_removals: AtomicU64,
    /// Response removals that failed
    queue_remove_failures: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    // Backend listener metrics

    pub fn increment_listeners_attached(&self) {
        self.listeners_attached.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_listeners_detached(&self) {
        self.listeners_detached.fetch_add(1, Ordering::Relaxed);
    }

    /// Listeners currently registered through this driver
    pub fn active_listeners(&self) -> u64 {
        let attached = self.listeners_attached.load(Ordering::Relaxed);
        let detached = self.listeners_detached.load(Ordering::Relaxed);
        attached.saturating_sub(detached)
    }

    // Auth metrics

    pub fn increment_auth_actions(&self) {
        self.auth_actions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_auth_failures(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Query cache metrics

    pub fn increment_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    // Queue metrics

    pub fn increment_queue_pushes(&self) {
        self.queue_pushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_queue_push_failures(&self) {
        self.queue_push_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_queue_removals(&self) {
        self.queue_removals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_queue_remove_failures(&self) {
        self.queue_remove_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Current values as a JSON object
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            listeners_attached: self.listeners_attached.load(Ordering::Relaxed),
            listeners_detached: self.listeners_detached.load(Ordering::Relaxed),
            auth_actions: self.auth_actions.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            queue_pushes: self.queue_pushes.load(Ordering::Relaxed),
            queue_push_failures: self.queue_push_failures.load(Ordering::Relaxed),
            queue_removals: self.queue_removals.load(Ordering::Relaxed),
            queue_remove_failures: self.queue_remove_failures.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub listeners_attached: u64,
    pub listeners_detached: u64,
    pub auth_actions: u64,
    pub auth_failures: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub queue_pushes: u64,
    pub queue_push_failures: u64,
    pub queue_removals: u64,
    pub queue_remove_failures: u64,
}
