//! # Async Adapter
//!
//! Exposes a push stream as a `futures_util::Stream` so async consumers can
//! `await` driver output. Values are queued in an unbounded channel fed by a
//! registered listener; dropping the adapter detaches the listener.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::sync::mpsc;

use super::primitive::{lock, Callbacks, Stream, Subscription};
use crate::errors::DriverResult;

/// Async view of a [`Stream`].
///
/// Yields `Ok` for every value, a single `Err` if the stream fails, and ends
/// when the stream terminates.
#[derive(Debug)]
pub struct Updates<T> {
    receiver: mpsc::UnboundedReceiver<DriverResult<T>>,
    _subscription: Subscription,
}

impl<T: Clone + Send + Sync + 'static> Stream<T> {
    /// Subscribe and receive values asynchronously
    pub fn updates(&self) -> Updates<T> {
        let (tx, receiver) = mpsc::unbounded_channel();
        let sender = Arc::new(Mutex::new(Some(tx)));
        let on_next = Arc::clone(&sender);
        let on_error = Arc::clone(&sender);

        let listener = Callbacks::new(move |value: &T| {
            if let Some(tx) = lock(&on_next).as_ref() {
                let _ = tx.send(Ok(value.clone()));
            }
        })
        .on_error(move |error| {
            if let Some(tx) = lock(&on_error).take() {
                let _ = tx.send(Err(error.clone()));
            }
        })
        .on_complete(move || {
            lock(&sender).take();
        });

        Updates {
            receiver,
            _subscription: self.subscribe(listener),
        }
    }
}

impl<T> futures_util::Stream for Updates<T> {
    type Item = DriverResult<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
