//! # Stream Primitive
//!
//! Reference-counted, push-based multicast stream.
//!
//! A stream owns a [`Producer`]. The producer is started when the first
//! listener attaches and stopped when the last one detaches, so whatever
//! resource it wraps (a backend listener, an upstream subscription) is held
//! exactly while someone is listening.
//!
//! Listeners are snapshotted before each delivery and no lock is held while
//! they run. A listener may subscribe, unsubscribe or emit re-entrantly.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::errors::DriverError;

/// Identifier of one attached listener
pub type ListenerId = u64;

/// Lock a mutex, recovering the data if a listener panicked while holding it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Receives the events of a stream.
///
/// Any `Fn(&T)` closure is a listener that only cares about values.
pub trait Listener<T>: Send + Sync {
    /// Called for every value
    fn next(&self, value: &T);

    /// Called once when the stream terminates with an error
    fn error(&self, _error: &DriverError) {}

    /// Called once when the stream completes
    fn complete(&self) {}
}

impl<T, F> Listener<T> for F
where
    F: Fn(&T) + Send + Sync,
{
    fn next(&self, value: &T) {
        self(value)
    }
}

/// Listener assembled from closures
pub struct Callbacks<T> {
    next: Box<dyn Fn(&T) + Send + Sync>,
    error: Box<dyn Fn(&DriverError) + Send + Sync>,
    complete: Box<dyn Fn() + Send + Sync>,
}

impl<T> Callbacks<T> {
    /// Listener with a value callback; errors and completion are ignored
    pub fn new(next: impl Fn(&T) + Send + Sync + 'static) -> Self {
        Self {
            next: Box::new(next),
            error: Box::new(|_| {}),
            complete: Box::new(|| {}),
        }
    }

    /// Set the error callback
    pub fn on_error(mut self, error: impl Fn(&DriverError) + Send + Sync + 'static) -> Self {
        self.error = Box::new(error);
        self
    }

    /// Set the completion callback
    pub fn on_complete(mut self, complete: impl Fn() + Send + Sync + 'static) -> Self {
        self.complete = Box::new(complete);
        self
    }
}

impl<T> Listener<T> for Callbacks<T> {
    fn next(&self, value: &T) {
        (self.next)(value)
    }

    fn error(&self, error: &DriverError) {
        (self.error)(error)
    }

    fn complete(&self) {
        (self.complete)()
    }
}

/// Source of a stream's events.
///
/// `start` runs when the listener count goes from zero to one, `stop` when it
/// drops back to zero or the stream terminates.
pub trait Producer<T>: Send + Sync {
    /// Begin producing into `emitter`
    fn start(&self, emitter: Emitter<T>);

    /// Release whatever `start` acquired
    fn stop(&self);
}

enum Phase<R> {
    Idle,
    Starting,
    /// `stop` ran while `start` was still acquiring
    Cancelled,
    Running(R),
}

/// Resource a producer acquires in `start` and releases in `stop`.
///
/// A synchronous error raised while `start` is still registering terminates
/// the stream and runs `stop` before anything has been stored. The slot
/// remembers that, and hands the resource back from [`Held::store`] so
/// `start` can release it at once.
pub(crate) struct Held<R> {
    phase: Mutex<Phase<R>>,
}

impl<R> Held<R> {
    pub(crate) fn new() -> Self {
        Self {
            phase: Mutex::new(Phase::Idle),
        }
    }

    /// Mark an activation as in progress
    pub(crate) fn begin(&self) {
        *lock(&self.phase) = Phase::Starting;
    }

    /// Whether the activation in progress was already stopped; resets the slot if so
    pub(crate) fn stopped_early(&self) -> bool {
        let mut phase = lock(&self.phase);
        if matches!(*phase, Phase::Cancelled) {
            *phase = Phase::Idle;
            true
        } else {
            false
        }
    }

    /// Keep `resource` for the running activation. Returns it back when the
    /// activation was stopped before it could be stored.
    pub(crate) fn store(&self, resource: R) -> Option<R> {
        let mut phase = lock(&self.phase);
        match std::mem::replace(&mut *phase, Phase::Idle) {
            Phase::Cancelled => Some(resource),
            _ => {
                *phase = Phase::Running(resource);
                None
            }
        }
    }

    /// Take the running activation's resource, or cancel one still starting
    pub(crate) fn release(&self) -> Option<R> {
        let mut phase = lock(&self.phase);
        match std::mem::replace(&mut *phase, Phase::Idle) {
            Phase::Running(resource) => Some(resource),
            Phase::Starting | Phase::Cancelled => {
                *phase = Phase::Cancelled;
                None
            }
            Phase::Idle => None,
        }
    }
}

/// Producer built from a pair of closures
pub struct FnProducer<T> {
    start: Box<dyn Fn(Emitter<T>) + Send + Sync>,
    stop: Box<dyn Fn() + Send + Sync>,
}

impl<T> FnProducer<T> {
    /// Create a producer from start/stop closures
    pub fn new(
        start: impl Fn(Emitter<T>) + Send + Sync + 'static,
        stop: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            start: Box::new(start),
            stop: Box::new(stop),
        }
    }
}

impl<T> Producer<T> for FnProducer<T> {
    fn start(&self, emitter: Emitter<T>) {
        (self.start)(emitter)
    }

    fn stop(&self) {
        (self.stop)()
    }
}

/// Producer that never emits
struct Idle;

impl<T> Producer<T> for Idle {
    fn start(&self, _emitter: Emitter<T>) {}

    fn stop(&self) {}
}

struct State<T> {
    listeners: Vec<(ListenerId, Arc<dyn Listener<T>>)>,
    memory: Option<T>,
    /// Producer has been started and not yet stopped
    active: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    producer: Box<dyn Producer<T>>,
    remember: bool,
    next_id: AtomicU64,
}

enum Termination {
    Error(DriverError),
    Complete,
}

impl<T: Clone + Send + Sync + 'static> Shared<T> {
    fn deliver(&self, value: T) {
        let listeners: Vec<Arc<dyn Listener<T>>> = {
            let mut state = lock(&self.state);
            if !state.active {
                return;
            }
            if self.remember {
                state.memory = Some(value.clone());
            }
            state.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
        };

        for listener in listeners {
            listener.next(&value);
        }
    }

    fn terminate(&self, termination: Termination) {
        let (listeners, was_active) = {
            let mut state = lock(&self.state);
            state.memory = None;
            let was_active = std::mem::replace(&mut state.active, false);
            (std::mem::take(&mut state.listeners), was_active)
        };

        for (_, listener) in &listeners {
            match &termination {
                Termination::Error(error) => listener.error(error),
                Termination::Complete => listener.complete(),
            }
        }

        if was_active {
            self.producer.stop();
        }
    }
}

/// Type-erased detach used by [`Subscription`]
trait Detach: Send + Sync {
    fn detach(&self, id: ListenerId);
}

impl<T: Clone + Send + Sync + 'static> Detach for Shared<T> {
    fn detach(&self, id: ListenerId) {
        let stop = {
            let mut state = lock(&self.state);
            let before = state.listeners.len();
            state.listeners.retain(|(lid, _)| *lid != id);

            if state.listeners.len() == before || !state.listeners.is_empty() || !state.active {
                false
            } else {
                state.active = false;
                state.memory = None;
                true
            }
        };

        if stop {
            self.producer.stop();
        }
    }
}

/// Handle that pushes events into a stream.
///
/// Holds only a weak reference: emitting into a stream nobody holds any
/// more is a no-op.
pub struct Emitter<T> {
    shared: Weak<Shared<T>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Emitter<T> {
    /// Deliver a value to every current listener
    pub fn next(&self, value: T) {
        if let Some(shared) = self.shared.upgrade() {
            shared.deliver(value);
        }
    }

    /// Terminate the stream with an error
    pub fn error(&self, error: DriverError) {
        if let Some(shared) = self.shared.upgrade() {
            shared.terminate(Termination::Error(error));
        }
    }

    /// Terminate the stream normally
    pub fn complete(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.terminate(Termination::Complete);
        }
    }
}

/// Attached listener. Dropping it detaches the listener.
#[must_use = "dropping a subscription detaches the listener"]
pub struct Subscription {
    target: Option<Arc<dyn Detach>>,
    id: ListenerId,
}

impl Subscription {
    /// Detach the listener now
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(target) = self.target.take() {
            target.detach(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("attached", &self.target.is_some())
            .finish()
    }
}

/// Shared, hot, multicast stream.
///
/// Cloning yields another handle to the same stream; use [`Stream::ptr_eq`]
/// to compare identity.
pub struct Stream<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Stream<T> {
    fn build(producer: Box<dyn Producer<T>>, remember: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    listeners: Vec::new(),
                    memory: None,
                    active: false,
                }),
                producer,
                remember,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Stream driven by `producer`
    pub fn create(producer: impl Producer<T> + 'static) -> Self {
        Self::build(Box::new(producer), false)
    }

    /// Stream driven by `producer` that replays its latest value to new listeners
    pub fn create_with_memory(producer: impl Producer<T> + 'static) -> Self {
        Self::build(Box::new(producer), true)
    }

    /// Stream driven by start/stop closures
    pub fn from_fn(
        start: impl Fn(Emitter<T>) + Send + Sync + 'static,
        stop: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self::create(FnProducer::new(start, stop))
    }

    /// Stream that never emits
    pub fn never() -> Self {
        Self::create(Idle)
    }

    pub(crate) fn never_with_memory() -> Self {
        Self::create_with_memory(Idle)
    }

    pub(crate) fn emitter(&self) -> Emitter<T> {
        Emitter {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Attach a listener.
    ///
    /// A remembered value is replayed to the new listener before the
    /// producer is started.
    pub fn subscribe(&self, listener: impl Listener<T> + 'static) -> Subscription {
        let listener: Arc<dyn Listener<T>> = Arc::new(listener);
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);

        let (replay, start) = {
            let mut state = lock(&self.shared.state);
            state.listeners.push((id, Arc::clone(&listener)));
            let start = !state.active;
            state.active = true;
            let replay = if self.shared.remember {
                state.memory.clone()
            } else {
                None
            };
            (replay, start)
        };

        if let Some(value) = replay {
            listener.next(&value);
        }
        if start {
            self.shared.producer.start(self.emitter());
        }

        let target: Arc<dyn Detach> = Arc::clone(&self.shared) as Arc<dyn Detach>;
        Subscription {
            target: Some(target),
            id,
        }
    }

    /// Number of attached listeners
    pub fn listener_count(&self) -> usize {
        lock(&self.shared.state).listeners.len()
    }

    /// Whether the producer is currently running
    pub fn is_active(&self) -> bool {
        lock(&self.shared.state).active
    }

    /// Whether this stream replays its latest value
    pub fn remembers(&self) -> bool {
        self.shared.remember
    }

    /// Whether two handles refer to the same stream
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.shared, &b.shared)
    }
}

impl<T> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.shared.state);
        f.debug_struct("Stream")
            .field("listeners", &state.listeners.len())
            .field("active", &state.active)
            .field("remember", &self.shared.remember)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_stream() -> (Stream<u32>, Arc<AtomicUsize>, Arc<AtomicUsize>, Arc<Mutex<Option<Emitter<u32>>>>) {
        let starts = Arc::new(AtomicUsize::new(0));
        let stops = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Emitter<u32>>>> = Arc::new(Mutex::new(None));

        let (s, t, e) = (Arc::clone(&starts), Arc::clone(&stops), Arc::clone(&slot));
        let stream = Stream::from_fn(
            move |emitter| {
                s.fetch_add(1, Ordering::SeqCst);
                *lock(&e) = Some(emitter);
            },
            move || {
                t.fetch_add(1, Ordering::SeqCst);
            },
        );
        (stream, starts, stops, slot)
    }

    fn emit(slot: &Arc<Mutex<Option<Emitter<u32>>>>, value: u32) {
        let emitter = lock(slot).clone().unwrap();
        emitter.next(value);
    }

    #[test]
    fn test_producer_follows_listener_count() {
        let (stream, starts, stops, _slot) = counting_stream();

        let a = stream.subscribe(|_: &u32| {});
        let b = stream.subscribe(|_: &u32| {});
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert!(stream.is_active());

        a.unsubscribe();
        assert_eq!(stops.load(Ordering::SeqCst), 0);

        drop(b);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert!(!stream.is_active());

        let _c = stream.subscribe(|_: &u32| {});
        assert_eq!(starts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_values_reach_every_listener() {
        let (stream, _, _, slot) = counting_stream();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let (x, y) = (Arc::clone(&seen), Arc::clone(&seen));
        let _a = stream.subscribe(move |v: &u32| lock(&x).push(("a", *v)));
        let _b = stream.subscribe(move |v: &u32| lock(&y).push(("b", *v)));

        emit(&slot, 7);
        assert_eq!(*lock(&seen), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn test_memory_replays_to_late_listener() {
        let slot: Arc<Mutex<Option<Emitter<u32>>>> = Arc::new(Mutex::new(None));
        let e = Arc::clone(&slot);
        let stream = Stream::create_with_memory(FnProducer::new(
            move |emitter| *lock(&e) = Some(emitter),
            || {},
        ));

        let _first = stream.subscribe(|_: &u32| {});
        emit(&slot, 3);

        let late = Arc::new(Mutex::new(Vec::new()));
        let l = Arc::clone(&late);
        let _second = stream.subscribe(move |v: &u32| lock(&l).push(*v));
        assert_eq!(*lock(&late), vec![3]);
    }

    #[test]
    fn test_memory_cleared_when_producer_stops() {
        let slot: Arc<Mutex<Option<Emitter<u32>>>> = Arc::new(Mutex::new(None));
        let e = Arc::clone(&slot);
        let stream = Stream::create_with_memory(FnProducer::new(
            move |emitter| *lock(&e) = Some(emitter),
            || {},
        ));

        let first = stream.subscribe(|_: &u32| {});
        emit(&slot, 3);
        drop(first);

        let late = Arc::new(Mutex::new(Vec::new()));
        let l = Arc::clone(&late);
        let _second = stream.subscribe(move |v: &u32| lock(&l).push(*v));
        assert!(lock(&late).is_empty());
    }

    #[test]
    fn test_error_terminates_and_stops_producer() {
        let (stream, _, stops, slot) = counting_stream();
        let values = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));

        let (v, e) = (Arc::clone(&values), Arc::clone(&errors));
        let _sub = stream.subscribe(
            Callbacks::new(move |x: &u32| lock(&v).push(*x))
                .on_error(move |err| lock(&e).push(err.clone())),
        );

        emit(&slot, 1);
        let emitter = lock(&slot).clone().unwrap();
        emitter.error(DriverError::SinkFailed("boom".into()));
        emitter.next(2);

        assert_eq!(*lock(&values), vec![1]);
        assert_eq!(lock(&errors).len(), 1);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(stream.listener_count(), 0);
    }

    #[test]
    fn test_late_subscription_drop_after_error_is_noop() {
        let (stream, _, stops, slot) = counting_stream();
        let sub = stream.subscribe(|_: &u32| {});
        lock(&slot).clone().unwrap().complete();
        drop(sub);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_may_unsubscribe_reentrantly() {
        let (stream, _, stops, slot) = counting_stream();
        let holder: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let h = Arc::clone(&holder);

        let sub = stream.subscribe(move |_: &u32| {
            let taken = lock(&h).take();
            drop(taken);
        });
        *lock(&holder) = Some(sub);

        emit(&slot, 1);
        assert_eq!(stream.listener_count(), 0);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_held_stores_and_releases() {
        let held = Held::new();
        held.begin();
        assert!(!held.stopped_early());
        assert_eq!(held.store(1), None);
        assert_eq!(held.release(), Some(1));
        assert_eq!(held.release(), None);
    }

    #[test]
    fn test_held_hands_back_when_stopped_during_start() {
        let held = Held::new();
        held.begin();
        assert_eq!(held.release(), None);
        assert_eq!(held.store(2), Some(2));

        held.begin();
        held.release();
        assert!(held.stopped_early());
        assert_eq!(held.store(3), None);
        assert_eq!(held.release(), Some(3));
    }

    #[test]
    fn test_ptr_eq() {
        let a: Stream<u32> = Stream::never();
        let b = a.clone();
        let c: Stream<u32> = Stream::never();
        assert!(Stream::ptr_eq(&a, &b));
        assert!(!Stream::ptr_eq(&a, &c));
    }
}
