//! # Drivers
//!
//! Adapters exposing the backend as stream sources and sinks.
//!
//! ## Architecture
//!
//! - **Bridge**: backend event registration as a reference-counted stream
//! - **Auth**: sign-in actions in, auth state out
//! - **Database**: memoized value streams per query
//! - **Queue**: jobs in, consume-once responses out

pub mod auth;
pub mod bridge;
pub mod database;
pub mod queue;

pub use auth::{AuthAction, AuthDriver, ProviderArg};
pub use bridge::{backend_stream, child_added_stream, value_stream, ChangeRecord};
pub use database::{DatabaseDriver, DatabaseSource, QueryArg, Refinement};
pub use queue::{QueueDriver, QueueFailure, QueueSource};

use crate::stream::Stream;

/// A driver consumes a sink stream from the application and hands back
/// its source.
pub trait Driver {
    /// Values the application sends to the driver
    type Sink;

    /// What the application reads from the driver
    type Source;

    /// Attach `sink` and build the source
    fn run(&self, sink: Stream<Self::Sink>) -> Self::Source;
}
