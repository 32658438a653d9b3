//! Observability for the drivers
//!
//! - Structured logging (JSON lines)
//! - Per-driver counters
//! - Typed lifecycle events
//!
//! Observability is read-only: nothing here changes what a driver emits.
//!
//! ```ignore
//! use rtdb_drivers::observability::{log_event, Event, MetricsRegistry};
//!
//! log_event(Event::QueryCacheMiss, &[("key", "[\"rooms\"]")]);
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_cache_misses();
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

#[cfg(test)]
pub(crate) use logger::capture_log;

/// Log `event` at its own severity
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
