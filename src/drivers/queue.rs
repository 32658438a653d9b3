//! # Queue Driver
//!
//! Relays jobs to a task location and hands out consume-once response
//! streams. Push and removal failures never reach the sink; they are
//! logged and published on [`QueueDriver::failures`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::bridge::{child_added_stream, ChangeRecord};
use super::Driver;
use crate::backend::RefHandle;
use crate::config::{DriverConfig, QueueConfig};
use crate::observability::{log_event, Event, Logger, MetricsRegistry, Severity};
use crate::stream::{Stream, Subject, Subscription};

/// A queue write the backend rejected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueueFailure {
    /// Job could not be pushed
    Push {
        destination: String,
        payload: Value,
        reason: String,
    },
    /// Delivered response could not be removed
    Remove { path: String, reason: String },
}

/// Driver for a task/response job queue under one root
pub struct QueueDriver {
    root: RefHandle,
    source: String,
    destination: String,
    metrics: Arc<MetricsRegistry>,
    failures: Subject<QueueFailure>,
}

impl QueueDriver {
    /// Queue using the default `responses` / `tasks` locations
    pub fn new(root: RefHandle) -> Self {
        Self::from_queue_config(root, &QueueConfig::default())
    }

    /// Queue with explicit source and destination location names
    pub fn with_paths(root: RefHandle, source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            root,
            source: source.into(),
            destination: destination.into(),
            metrics: Arc::new(MetricsRegistry::new()),
            failures: Subject::new(),
        }
    }

    /// Queue using the locations named in `config`
    pub fn from_config(root: RefHandle, config: &DriverConfig) -> Self {
        Self::from_queue_config(root, &config.queue)
    }

    fn from_queue_config(root: RefHandle, config: &QueueConfig) -> Self {
        Self::with_paths(root, config.source.clone(), config.destination.clone())
    }

    /// Rejected pushes and removals. Nothing is buffered: only failures
    /// after subscribing are seen.
    pub fn failures(&self) -> Stream<QueueFailure> {
        self.failures.stream()
    }

    /// Counters for this driver
    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }
}

impl Driver for QueueDriver {
    type Sink = Value;
    type Source = QueueSource;

    fn run(&self, sink: Stream<Value>) -> QueueSource {
        let destination = self.root.child(&self.destination);
        let metrics = Arc::clone(&self.metrics);
        let failures = self.failures.clone();

        let input = sink.subscribe(move |payload: &Value| {
            let path = destination.path();
            if Logger::enabled(Severity::Trace) {
                let body = payload.to_string();
                log_event(Event::QueueInput, &[("path", path.as_str()), ("payload", body.as_str())]);
            }

            match destination.push(payload.clone()) {
                Ok(job) => {
                    metrics.increment_queue_pushes();
                    let key = job.key().unwrap_or_default();
                    log_event(Event::QueueJobPushed, &[("path", path.as_str()), ("key", key.as_str())]);
                }
                Err(error) => {
                    metrics.increment_queue_push_failures();
                    let reason = error.to_string();
                    log_event(
                        Event::QueuePushFailed,
                        &[("path", path.as_str()), ("kind", error.kind()), ("reason", reason.as_str())],
                    );
                    failures.next(QueueFailure::Push {
                        destination: path,
                        payload: payload.clone(),
                        reason,
                    });
                }
            }
        });

        QueueSource {
            responses: self.root.child(&self.source),
            metrics: Arc::clone(&self.metrics),
            failures: self.failures.clone(),
            _input: Arc::new(input),
        }
    }
}

impl std::fmt::Debug for QueueDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueDriver")
            .field("root", &self.root.path())
            .field("source", &self.source)
            .field("destination", &self.destination)
            .finish()
    }
}

/// Response streams for a running queue driver.
///
/// The sink stays attached while any clone of the source is alive.
#[derive(Clone)]
pub struct QueueSource {
    responses: RefHandle,
    metrics: Arc<MetricsRegistry>,
    failures: Subject<QueueFailure>,
    _input: Arc<Subscription>,
}

impl QueueSource {
    /// Responses appended under `<source>/<key>`. Each response is removed
    /// from the backend once every listener has received it. Every call
    /// builds a new stream.
    pub fn listen(&self, key: &str) -> Stream<ChangeRecord> {
        let listener = self.responses.child(key);
        let metrics = Arc::clone(&self.metrics);
        let failures = self.failures.clone();
        let responses = Arc::clone(&listener);

        child_added_stream(listener, Arc::clone(&self.metrics)).after_each(move |record: &ChangeRecord| {
            let Some(response_key) = record.key.as_deref() else {
                return;
            };
            let target = responses.child(response_key);
            let path = target.path();

            match target.remove() {
                Ok(()) => {
                    metrics.increment_queue_removals();
                    log_event(Event::QueueResponseRemoved, &[("path", path.as_str())]);
                }
                Err(error) => {
                    metrics.increment_queue_remove_failures();
                    let reason = error.to_string();
                    log_event(
                        Event::QueueRemoveFailed,
                        &[("path", path.as_str()), ("kind", error.kind()), ("reason", reason.as_str())],
                    );
                    failures.next(QueueFailure::Remove { path, reason });
                }
            }
        })
    }
}

impl std::fmt::Debug for QueueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueSource")
            .field("responses", &self.responses.path())
            .finish()
    }
}
