//! # Stream Module
//!
//! Push-based streams with reference-counted producers.
//!
//! ## Architecture
//!
//! - **Core**: `Stream`, `Producer`, `Emitter`, `Listener`, `Subscription`
//! - **Operators**: `map`, `try_map`, `drop_repeats`, `remember`, `after_each`
//! - **Subject**: hand-fed streams for sinks and side channels
//! - **Updates**: async adapter over a tokio channel

mod primitive;
pub mod operators;
pub mod subject;
pub mod updates;

pub use self::primitive::{Callbacks, Emitter, FnProducer, Listener, ListenerId, Producer, Stream, Subscription};
pub use subject::Subject;
pub use updates::Updates;

pub(crate) use self::primitive::{lock, Held};
