//! # In-Memory Backend
//!
//! Offline implementations of the database and auth boundaries.
//!
//! - **Database**: JSON tree, value/child_added events, queries, push keys
//! - **Auth**: session store with provider sign-in
//!
//! Both record every call they receive so tests can assert exact backend
//! traffic.

pub mod auth;
pub mod database;
pub mod push_id;
pub mod query;

pub use auth::{AuthCall, MemoryAuth};
pub use database::{MemoryDatabase, Operation};
pub use push_id::PushIdGenerator;
