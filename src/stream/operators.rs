//! # Stream Operators
//!
//! Derived streams. Each operator is a producer that subscribes to its
//! upstream while it has listeners of its own, so listener reference
//! counting propagates all the way to the source.

use std::sync::{Arc, Mutex};

use super::primitive::{lock, Callbacks, Emitter, Held, Producer, Stream, Subscription};
use crate::errors::DriverResult;

type Step<I, O> = dyn Fn(&I, &Emitter<O>) + Send + Sync;

struct Operator<I, O> {
    upstream: Stream<I>,
    step: Arc<Step<I, O>>,
    reset: Option<Box<dyn Fn() + Send + Sync>>,
    subscription: Held<Subscription>,
}

impl<I, O> Operator<I, O> {
    fn new(upstream: Stream<I>, step: impl Fn(&I, &Emitter<O>) + Send + Sync + 'static) -> Self {
        Self {
            upstream,
            step: Arc::new(step),
            reset: None,
            subscription: Held::new(),
        }
    }

    /// Clear per-activation state when the operator stops
    fn with_reset(mut self, reset: impl Fn() + Send + Sync + 'static) -> Self {
        self.reset = Some(Box::new(reset));
        self
    }
}

impl<I, O> Producer<O> for Operator<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    fn start(&self, emitter: Emitter<O>) {
        let step = Arc::clone(&self.step);
        let on_next = emitter.clone();
        let on_error = emitter.clone();

        self.subscription.begin();
        let listener = Callbacks::new(move |value: &I| step(value, &on_next))
            .on_error(move |error| on_error.error(error.clone()))
            .on_complete(move || emitter.complete());

        let subscription = self.upstream.subscribe(listener);
        if let Some(stale) = self.subscription.store(subscription) {
            stale.unsubscribe();
        }
    }

    fn stop(&self) {
        if let Some(subscription) = self.subscription.release() {
            subscription.unsubscribe();
        }
        if let Some(reset) = &self.reset {
            reset();
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Stream<T> {
    /// Transform every value
    pub fn map<U, F>(&self, f: F) -> Stream<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        Stream::create(Operator::new(self.clone(), move |value: &T, out: &Emitter<U>| {
            out.next(f(value))
        }))
    }

    /// Transform every value; the first failure terminates the stream
    pub fn try_map<U, F>(&self, f: F) -> Stream<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&T) -> DriverResult<U> + Send + Sync + 'static,
    {
        Stream::create(Operator::new(self.clone(), move |value: &T, out: &Emitter<U>| {
            match f(value) {
                Ok(mapped) => out.next(mapped),
                Err(error) => out.error(error),
            }
        }))
    }

    /// Suppress values equal to the one emitted just before
    pub fn drop_repeats(&self) -> Stream<T>
    where
        T: PartialEq,
    {
        let last: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
        let seen = Arc::clone(&last);

        let operator = Operator::new(self.clone(), move |value: &T, out: &Emitter<T>| {
            let repeat = {
                let mut last = lock(&seen);
                if last.as_ref() == Some(value) {
                    true
                } else {
                    *last = Some(value.clone());
                    false
                }
            };
            if !repeat {
                out.next(value.clone());
            }
        })
        .with_reset(move || *lock(&last) = None);

        Stream::create(operator)
    }

    /// Same values, replaying the latest one to each new listener
    pub fn remember(&self) -> Stream<T> {
        Stream::create_with_memory(Operator::new(
            self.clone(),
            |value: &T, out: &Emitter<T>| out.next(value.clone()),
        ))
    }

    /// Run a side effect on each value after listeners have received it
    pub fn after_each<F>(&self, f: F) -> Stream<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        Stream::create(Operator::new(self.clone(), move |value: &T, out: &Emitter<T>| {
            out.next(value.clone());
            f(value);
        }))
    }
}
