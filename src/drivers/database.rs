//! # Database Driver
//!
//! Source-only driver. The source builds value streams from a list of path
//! segments and query refinements, memoized by the serialized argument
//! list: identical lists always get the identical stream.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::bridge::value_stream;
use super::Driver;
use crate::backend::RefHandle;
use crate::errors::{DriverError, DriverResult};
use crate::observability::{log_event, Event, MetricsRegistry};
use crate::stream::{lock, Stream};

/// Query refinement; fields are applied in declaration order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Refinement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by_child: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub order_by_key: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equal_to: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_to_first: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_to_last: Option<u32>,
}

impl Refinement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_by_child(mut self, field: impl Into<String>) -> Self {
        self.order_by_child = Some(field.into());
        self
    }

    pub fn order_by_key(mut self) -> Self {
        self.order_by_key = true;
        self
    }

    pub fn equal_to(mut self, value: impl Into<Value>) -> Self {
        self.equal_to = Some(value.into());
        self
    }

    pub fn limit_to_first(mut self, limit: u32) -> Self {
        self.limit_to_first = Some(limit);
        self
    }

    pub fn limit_to_last(mut self, limit: u32) -> Self {
        self.limit_to_last = Some(limit);
        self
    }

    fn apply(&self, mut reference: RefHandle) -> RefHandle {
        if let Some(field) = &self.order_by_child {
            reference = reference.order_by_child(field);
        }
        if self.order_by_key {
            reference = reference.order_by_key();
        }
        if let Some(value) = &self.equal_to {
            reference = reference.equal_to(value);
        }
        if let Some(limit) = self.limit_to_first {
            reference = reference.limit_to_first(limit);
        }
        if let Some(limit) = self.limit_to_last {
            reference = reference.limit_to_last(limit);
        }
        reference
    }
}

/// One step from the root reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryArg {
    Refine(Refinement),
    Child(String),
}

impl QueryArg {
    fn apply(&self, reference: RefHandle) -> RefHandle {
        match self {
            QueryArg::Refine(refinement) => refinement.apply(reference),
            QueryArg::Child(segment) => reference.child(segment),
        }
    }
}

impl From<&str> for QueryArg {
    fn from(segment: &str) -> Self {
        QueryArg::Child(segment.to_string())
    }
}

impl From<String> for QueryArg {
    fn from(segment: String) -> Self {
        QueryArg::Child(segment)
    }
}

impl From<Refinement> for QueryArg {
    fn from(refinement: Refinement) -> Self {
        QueryArg::Refine(refinement)
    }
}

impl TryFrom<Value> for QueryArg {
    type Error = DriverError;

    /// Objects are refinements; every other scalar is a path segment
    fn try_from(value: Value) -> DriverResult<Self> {
        match value {
            Value::Object(_) => serde_json::from_value(value)
                .map(QueryArg::Refine)
                .map_err(|e| DriverError::InvalidArgument(format!("query refinement: {}", e))),
            Value::String(segment) => Ok(QueryArg::Child(segment)),
            Value::Number(n) => Ok(QueryArg::Child(n.to_string())),
            Value::Bool(b) => Ok(QueryArg::Child(b.to_string())),
            other => Err(DriverError::InvalidArgument(format!(
                "query argument must be a segment or a refinement, got {}",
                other
            ))),
        }
    }
}

type QueryCache = Arc<Mutex<HashMap<String, Stream<Value>>>>;

/// Memoizing query builder handed to the application
#[derive(Clone)]
pub struct DatabaseSource {
    root: RefHandle,
    cache: QueryCache,
    metrics: Arc<MetricsRegistry>,
}

impl DatabaseSource {
    /// Value stream for `args` applied left to right from the root.
    ///
    /// Argument lists that serialize identically share one stream.
    pub fn query(&self, args: &[QueryArg]) -> Stream<Value> {
        let key = canonical_key(args);
        let mut cache = lock(&self.cache);

        if let Some(stream) = cache.get(&key) {
            self.metrics.increment_cache_hits();
            log_event(Event::QueryCacheHit, &[("key", key.as_str())]);
            return stream.clone();
        }

        self.metrics.increment_cache_misses();
        log_event(Event::QueryCacheMiss, &[("key", key.as_str())]);

        let reference = args
            .iter()
            .fold(Arc::clone(&self.root), |reference, arg| arg.apply(reference));
        let stream = value_stream(reference, Arc::clone(&self.metrics));
        cache.insert(key, stream.clone());
        stream
    }

    /// [`query`](Self::query) over wire-shaped arguments
    pub fn query_json(&self, args: &[Value]) -> DriverResult<Stream<Value>> {
        let args = args
            .iter()
            .cloned()
            .map(QueryArg::try_from)
            .collect::<DriverResult<Vec<_>>>()?;
        Ok(self.query(&args))
    }

    /// Number of distinct queries built so far
    pub fn cache_len(&self) -> usize {
        lock(&self.cache).len()
    }
}

impl std::fmt::Debug for DatabaseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSource")
            .field("root", &self.root.path())
            .field("cached", &self.cache_len())
            .finish()
    }
}

/// Serialized argument list, e.g. `["rooms",{"orderByChild":"active","equalTo":true}]`
///
/// Built from the parsed arguments, so wire spellings of the same query
/// (key order inside a refinement, `5` vs `"5"`) share one key.
fn canonical_key(args: &[QueryArg]) -> String {
    // Strings, numbers and JSON values always serialize
    serde_json::to_string(args).unwrap_or_else(|_| format!("{:?}", args))
}

/// Source-only driver over a root reference
pub struct DatabaseDriver {
    root: RefHandle,
    cache: QueryCache,
    metrics: Arc<MetricsRegistry>,
}

impl DatabaseDriver {
    pub fn new(root: RefHandle) -> Self {
        Self {
            root,
            cache: Arc::new(Mutex::new(HashMap::new())),
            metrics: Arc::new(MetricsRegistry::new()),
        }
    }

    /// Source without a sink; equivalent to `run(Stream::never())`
    pub fn source(&self) -> DatabaseSource {
        DatabaseSource {
            root: Arc::clone(&self.root),
            cache: Arc::clone(&self.cache),
            metrics: Arc::clone(&self.metrics),
        }
    }

    /// Counters for this driver
    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }
}

impl Driver for DatabaseDriver {
    type Sink = Infallible;
    type Source = DatabaseSource;

    fn run(&self, _sink: Stream<Infallible>) -> DatabaseSource {
        self.source()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryDatabase, Operation};
    use crate::backend::EventKind;
    use serde_json::json;

    fn rooms_query() -> Vec<QueryArg> {
        vec![
            "rooms".into(),
            Refinement::new().order_by_child("active").equal_to(true).into(),
        ]
    }

    #[test]
    fn test_canonical_key_matches_wire_shape() {
        assert_eq!(
            canonical_key(&rooms_query()),
            r#"["rooms",{"orderByChild":"active","equalTo":true}]"#
        );
    }

    #[test]
    fn test_identical_queries_share_stream() {
        let db = MemoryDatabase::new();
        let source = DatabaseDriver::new(db.reference()).source();

        let a = source.query(&rooms_query());
        let b = source.query(&rooms_query());
        let c = source.query(&["rooms".into()]);

        assert!(Stream::ptr_eq(&a, &b));
        assert!(!Stream::ptr_eq(&a, &c));
        assert_eq!(source.cache_len(), 2);
    }

    #[test]
    fn test_cache_shared_across_runs() {
        let db = MemoryDatabase::new();
        let driver = DatabaseDriver::new(db.reference());
        let first = driver.run(Stream::never());
        let second = driver.run(Stream::never());

        assert!(Stream::ptr_eq(&first.query(&["a".into()]), &second.query(&["a".into()])));
        let snapshot = driver.metrics().snapshot();
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(snapshot.cache_hits, 1);
    }

    #[test]
    fn test_argument_order_matters() {
        let db = MemoryDatabase::new();
        let source = DatabaseDriver::new(db.reference()).source();
        let a = source.query(&["a".into(), "b".into()]);
        let b = source.query(&["b".into(), "a".into()]);
        assert!(!Stream::ptr_eq(&a, &b));
    }

    #[test]
    fn test_query_filters_values() {
        let db = MemoryDatabase::new();
        db.set("rooms/lobby", json!({"active": true})).unwrap();
        db.set("rooms/attic", json!({"active": false})).unwrap();
        let source = DatabaseDriver::new(db.reference()).source();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _sub = source
            .query(&rooms_query())
            .subscribe(move |v: &Value| s.lock().unwrap().push(v.clone()));

        db.set("rooms/attic/active", json!(true)).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], json!({"lobby": {"active": true}}));
        assert_eq!(
            seen[1],
            json!({"lobby": {"active": true}, "attic": {"active": true}})
        );
    }

    #[test]
    fn test_shared_stream_registers_one_backend_listener() {
        let db = MemoryDatabase::new();
        let source = DatabaseDriver::new(db.reference()).source();

        let _a = source.query(&["chat".into()]).subscribe(|_: &Value| {});
        let _b = source.query(&["chat".into()]).subscribe(|_: &Value| {});

        let registrations = db
            .operations()
            .into_iter()
            .filter(|op| matches!(op, Operation::On { event: EventKind::Value, .. }))
            .count();
        assert_eq!(registrations, 1);
    }

    #[test]
    fn test_query_json() {
        let db = MemoryDatabase::new();
        let source = DatabaseDriver::new(db.reference()).source();

        let from_json = source
            .query_json(&[json!("rooms"), json!({"orderByChild": "active", "equalTo": true})])
            .unwrap();
        assert!(Stream::ptr_eq(&from_json, &source.query(&rooms_query())));

        assert!(matches!(
            source.query_json(&[json!({"startAt": 3})]),
            Err(DriverError::InvalidArgument(_))
        ));
        assert!(source.query_json(&[json!(null)]).is_err());
    }

    #[test]
    fn test_wire_spellings_of_one_query_share_stream() {
        let db = MemoryDatabase::new();
        let source = DatabaseDriver::new(db.reference()).source();

        let reordered = source
            .query_json(&[json!("rooms"), json!({"equalTo": true, "orderByChild": "active"})])
            .unwrap();
        assert!(Stream::ptr_eq(&reordered, &source.query(&rooms_query())));

        let number = source.query_json(&[json!("rooms"), json!(5)]).unwrap();
        let string = source.query_json(&[json!("rooms"), json!("5")]).unwrap();
        assert!(Stream::ptr_eq(&number, &string));
        assert_eq!(source.cache_len(), 2);
    }

    #[test]
    fn test_limits_and_key_order() {
        let db = MemoryDatabase::new();
        db.set("scores", json!({"a": 1, "b": 2, "c": 3})).unwrap();
        let source = DatabaseDriver::new(db.reference()).source();

        let seen = Arc::new(Mutex::new(None));
        let s = Arc::clone(&seen);
        let _sub = source
            .query(&["scores".into(), Refinement::new().order_by_key().limit_to_last(2).into()])
            .subscribe(move |v: &Value| *s.lock().unwrap() = Some(v.clone()));

        assert_eq!(*seen.lock().unwrap(), Some(json!({"b": 2, "c": 3})));
    }
}
