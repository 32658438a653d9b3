//! rtdb-drivers - Stream drivers for a realtime database and auth backend
//!
//! Backend callbacks become reference-counted streams; application streams
//! become backend calls.

pub mod backend;
pub mod config;
pub mod drivers;
pub mod errors;
pub mod observability;
pub mod stream;

pub use config::DriverConfig;
pub use drivers::{AuthDriver, DatabaseDriver, Driver, QueueDriver};
pub use errors::{DriverError, DriverResult};
pub use stream::{Stream, Subject};
