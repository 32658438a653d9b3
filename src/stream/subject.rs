//! # Subject
//!
//! Imperative entry point into a stream. Applications feed driver sinks
//! through a subject; drivers use one for side channels.

use super::primitive::Stream;
use crate::errors::DriverError;

/// Stream whose events are pushed by hand.
///
/// Events pushed while nobody listens are dropped.
#[derive(Debug)]
pub struct Subject<T> {
    stream: Stream<T>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            stream: self.stream.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> Subject<T> {
    /// Create a subject without memory
    pub fn new() -> Self {
        Self {
            stream: Stream::never(),
        }
    }

    /// Create a subject that replays its latest value to new listeners
    pub fn with_memory() -> Self {
        Self {
            stream: Stream::never_with_memory(),
        }
    }

    /// Push a value
    pub fn next(&self, value: T) {
        self.stream.emitter().next(value);
    }

    /// Terminate with an error
    pub fn error(&self, error: DriverError) {
        self.stream.emitter().error(error);
    }

    /// Terminate normally
    pub fn complete(&self) {
        self.stream.emitter().complete();
    }

    /// The stream this subject feeds
    pub fn stream(&self) -> Stream<T> {
        self.stream.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::primitive::{lock, Callbacks};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_values_without_listeners_are_dropped() {
        let subject = Subject::with_memory();
        subject.next(1u32);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _sub = subject.stream().subscribe(move |v: &u32| lock(&s).push(*v));
        assert!(lock(&seen).is_empty());

        subject.next(2);
        assert_eq!(*lock(&seen), vec![2]);
    }

    #[test]
    fn test_complete_notifies_listener() {
        let subject: Subject<u32> = Subject::new();
        let done = Arc::new(Mutex::new(false));
        let d = Arc::clone(&done);

        let _sub = subject
            .stream()
            .subscribe(Callbacks::new(|_: &u32| {}).on_complete(move || *lock(&d) = true));
        subject.complete();

        assert!(*lock(&done));
    }
}
