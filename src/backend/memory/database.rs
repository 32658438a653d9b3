//! # In-Memory Database
//!
//! A hierarchical JSON store implementing [`Reference`]. Every call made
//! through a reference is recorded in an operation journal so callers can
//! assert exactly what reached the backend.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::{Map, Value};

use super::push_id::PushIdGenerator;
use super::query::{QueryLimit, QueryOrder, QueryParams};
use crate::backend::errors::{BackendError, BackendResult};
use crate::backend::reference::{EventKind, RefHandle, Reference, Snapshot, SnapshotCallback};
use crate::stream::lock;

/// A call that reached the in-memory backend
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    On { path: String, event: EventKind },
    Off { path: String, event: EventKind },
    Set { path: String, value: Value },
    Push { path: String, key: String, value: Value },
    Remove { path: String },
}

struct Registration {
    path: Vec<String>,
    query: QueryParams,
    event: EventKind,
    callback: SnapshotCallback,
    last_value: Value,
    known_children: HashSet<String>,
}

#[derive(Default)]
struct DbState {
    root: Value,
    registrations: Vec<Registration>,
    journal: Vec<Operation>,
    write_failure: Option<String>,
    push_ids: PushIdGenerator,
}

struct DbInner {
    state: Mutex<DbState>,
}

type Delivery = (SnapshotCallback, Snapshot);

fn deliver(batch: Vec<Delivery>) {
    for (callback, snapshot) in batch {
        callback(snapshot);
    }
}

fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn format_path(path: &[String]) -> String {
    format!("/{}", path.join("/"))
}

static NULL: Value = Value::Null;

fn get_at<'a>(root: &'a Value, path: &[String]) -> &'a Value {
    let mut node = root;
    for segment in path {
        match node.get(segment) {
            Some(child) => node = child,
            None => return &NULL,
        }
    }
    node
}

/// Write `value` at `path`; `Null` deletes and prunes emptied parents
fn set_at(node: &mut Value, path: &[String], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        *node = value;
        return;
    };

    if value.is_null() {
        if let Some(object) = node.as_object_mut() {
            if let Some(child) = object.get_mut(head) {
                set_at(child, rest, Value::Null);
                if child.is_null() || child.as_object().is_some_and(Map::is_empty) {
                    object.remove(head);
                }
            }
            if object.is_empty() {
                *node = Value::Null;
            }
        }
        return;
    }

    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Some(object) = node.as_object_mut() {
        let child = object.entry(head.clone()).or_insert(Value::Null);
        set_at(child, rest, value);
    }
}

impl DbInner {
    fn initial_deliveries(registration: &mut Registration, root: &Value) -> Vec<Delivery> {
        let current = get_at(root, &registration.path);
        match registration.event {
            EventKind::Value => {
                let view = registration.query.view(current);
                registration.last_value = view.clone();
                vec![(
                    Arc::clone(&registration.callback),
                    Snapshot::new(registration.path.last().cloned(), view),
                )]
            }
            EventKind::ChildAdded => registration
                .query
                .children(current)
                .into_iter()
                .map(|(key, value)| {
                    registration.known_children.insert(key.clone());
                    (Arc::clone(&registration.callback), Snapshot::new(Some(key), value))
                })
                .collect(),
        }
    }

    fn change_deliveries(state: &mut DbState) -> Vec<Delivery> {
        let DbState {
            root,
            registrations,
            ..
        } = state;

        let mut batch = Vec::new();
        for registration in registrations.iter_mut() {
            let current = get_at(root, &registration.path);
            match registration.event {
                EventKind::Value => {
                    let view = registration.query.view(current);
                    if view != registration.last_value {
                        registration.last_value = view.clone();
                        batch.push((
                            Arc::clone(&registration.callback),
                            Snapshot::new(registration.path.last().cloned(), view),
                        ));
                    }
                }
                EventKind::ChildAdded => {
                    let children = registration.query.children(current);
                    let present: HashSet<String> = children.iter().map(|(k, _)| k.clone()).collect();
                    for (key, value) in children {
                        if !registration.known_children.contains(&key) {
                            batch.push((
                                Arc::clone(&registration.callback),
                                Snapshot::new(Some(key), value),
                            ));
                        }
                    }
                    registration.known_children = present;
                }
            }
        }
        batch
    }

    fn write(&self, path: &[String], value: Value, operation: Operation) -> BackendResult<()> {
        let batch = {
            let mut state = lock(&self.state);
            state.journal.push(operation);

            if let Some(reason) = state.write_failure.clone() {
                return Err(BackendError::WriteRejected {
                    path: format_path(path),
                    reason,
                });
            }

            set_at(&mut state.root, path, value);
            Self::change_deliveries(&mut state)
        };

        deliver(batch);
        Ok(())
    }
}

/// In-memory realtime database
#[derive(Clone)]
pub struct MemoryDatabase {
    inner: Arc<DbInner>,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatabase {
    /// Create an empty database
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DbInner {
                state: Mutex::new(DbState::default()),
            }),
        }
    }

    /// Reference to the root location
    pub fn reference(&self) -> RefHandle {
        self.reference_at("")
    }

    /// Reference to a slash-separated path
    pub fn reference_at(&self, path: &str) -> RefHandle {
        Arc::new(MemoryReference {
            db: Arc::clone(&self.inner),
            path: split_path(path),
            query: QueryParams::default(),
        })
    }

    /// Overwrite the value at `path`; `Null` deletes
    pub fn set(&self, path: &str, value: Value) -> BackendResult<()> {
        let segments = split_path(path);
        let operation = Operation::Set {
            path: format_path(&segments),
            value: value.clone(),
        };
        self.inner.write(&segments, value, operation)
    }

    /// Current value at `path`
    pub fn get(&self, path: &str) -> Value {
        let state = lock(&self.inner.state);
        get_at(&state.root, &split_path(path)).clone()
    }

    /// Every operation recorded so far
    pub fn operations(&self) -> Vec<Operation> {
        lock(&self.inner.state).journal.clone()
    }

    /// Forget recorded operations
    pub fn clear_operations(&self) {
        lock(&self.inner.state).journal.clear();
    }

    /// Reject subsequent writes with `reason`, or accept them again with `None`
    pub fn fail_writes(&self, reason: Option<&str>) {
        lock(&self.inner.state).write_failure = reason.map(str::to_string);
    }

    /// Number of registered callbacks
    pub fn listener_count(&self) -> usize {
        lock(&self.inner.state).registrations.len()
    }
}

/// Location or query inside a [`MemoryDatabase`]
#[derive(Clone)]
struct MemoryReference {
    db: Arc<DbInner>,
    path: Vec<String>,
    query: QueryParams,
}

impl MemoryReference {
    fn refined(&self, refine: impl FnOnce(&mut QueryParams)) -> RefHandle {
        let mut next = self.clone();
        refine(&mut next.query);
        Arc::new(next)
    }
}

impl Reference for MemoryReference {
    fn key(&self) -> Option<String> {
        self.path.last().cloned()
    }

    fn path(&self) -> String {
        format_path(&self.path)
    }

    fn child(&self, segment: &str) -> RefHandle {
        let mut path = self.path.clone();
        path.extend(split_path(segment));
        Arc::new(MemoryReference {
            db: Arc::clone(&self.db),
            path,
            query: QueryParams::default(),
        })
    }

    fn order_by_child(&self, field: &str) -> RefHandle {
        self.refined(|q| q.order = QueryOrder::Child(field.to_string()))
    }

    fn order_by_key(&self) -> RefHandle {
        self.refined(|q| q.order = QueryOrder::Key)
    }

    fn equal_to(&self, value: &Value) -> RefHandle {
        self.refined(|q| q.equal_to = Some(value.clone()))
    }

    fn limit_to_first(&self, limit: u32) -> RefHandle {
        self.refined(|q| q.limit = Some(QueryLimit::First(limit)))
    }

    fn limit_to_last(&self, limit: u32) -> RefHandle {
        self.refined(|q| q.limit = Some(QueryLimit::Last(limit)))
    }

    fn on(&self, event: EventKind, callback: SnapshotCallback) {
        let batch = {
            let mut state = lock(&self.db.state);
            state.journal.push(Operation::On {
                path: self.path(),
                event,
            });

            let mut registration = Registration {
                path: self.path.clone(),
                query: self.query.clone(),
                event,
                callback,
                last_value: Value::Null,
                known_children: HashSet::new(),
            };
            let batch = DbInner::initial_deliveries(&mut registration, &state.root);
            state.registrations.push(registration);
            batch
        };

        deliver(batch);
    }

    fn off(&self, event: EventKind) {
        let mut state = lock(&self.db.state);
        state.journal.push(Operation::Off {
            path: self.path(),
            event,
        });
        state
            .registrations
            .retain(|r| !(r.event == event && r.path == self.path && r.query == self.query));
    }

    fn push(&self, value: Value) -> BackendResult<RefHandle> {
        let key = lock(&self.db.state).push_ids.next_id();
        let mut path = self.path.clone();
        path.push(key.clone());

        let operation = Operation::Push {
            path: self.path(),
            key,
            value: value.clone(),
        };
        self.db.write(&path, value, operation)?;

        Ok(Arc::new(MemoryReference {
            db: Arc::clone(&self.db),
            path,
            query: QueryParams::default(),
        }))
    }

    fn remove(&self) -> BackendResult<()> {
        let operation = Operation::Remove { path: self.path() };
        self.db.write(&self.path, Value::Null, operation)
    }
}

impl std::fmt::Debug for MemoryDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("MemoryDatabase")
            .field("registrations", &state.registrations.len())
            .field("operations", &state.journal.len())
            .finish()
    }
}
