//! # Event-to-Stream Bridge
//!
//! Turns a reference's event registration into a stream. The backend
//! listener exists exactly while the stream has listeners: it is registered
//! on the first subscription and removed when the last one detaches.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::{EventKind, RefHandle, Snapshot};
use crate::observability::{log_event, Event, MetricsRegistry};
use crate::stream::{Emitter, Producer, Stream};

/// `{key, val}` pair derived from a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub key: Option<String>,
    pub val: Value,
}

impl From<Snapshot> for ChangeRecord {
    fn from(snapshot: Snapshot) -> Self {
        Self {
            key: snapshot.key,
            val: snapshot.value,
        }
    }
}

/// Producer owning one backend event registration
struct BackendEvents {
    reference: RefHandle,
    event: EventKind,
    metrics: Arc<MetricsRegistry>,
}

impl BackendEvents {
    fn log(&self, event: Event) {
        let path = self.reference.path();
        log_event(
            event,
            &[("path", path.as_str()), ("event", self.event.as_str())],
        );
    }
}

impl Producer<Snapshot> for BackendEvents {
    fn start(&self, emitter: Emitter<Snapshot>) {
        self.metrics.increment_listeners_attached();
        self.log(Event::BackendListenerAttached);
        self.reference
            .on(self.event, Arc::new(move |snapshot: Snapshot| emitter.next(snapshot)));
    }

    fn stop(&self) {
        self.reference.off(self.event);
        self.metrics.increment_listeners_detached();
        self.log(Event::BackendListenerDetached);
    }
}

/// Deduplicated change records for `event` on `reference`.
///
/// Consecutive structurally equal records are collapsed. The stream never
/// completes on its own.
pub fn backend_stream(
    reference: RefHandle,
    event: EventKind,
    metrics: Arc<MetricsRegistry>,
) -> Stream<ChangeRecord> {
    Stream::create(BackendEvents {
        reference,
        event,
        metrics,
    })
    .map(|snapshot: &Snapshot| ChangeRecord::from(snapshot.clone()))
    .drop_repeats()
}

/// Current value of `reference`, replayed to late subscribers
pub fn value_stream(reference: RefHandle, metrics: Arc<MetricsRegistry>) -> Stream<Value> {
    backend_stream(reference, EventKind::Value, metrics)
        .map(|record: &ChangeRecord| record.val.clone())
        .remember()
}

/// Children appended under `reference`
pub fn child_added_stream(reference: RefHandle, metrics: Arc<MetricsRegistry>) -> Stream<ChangeRecord> {
    backend_stream(reference, EventKind::ChildAdded, metrics)
}
