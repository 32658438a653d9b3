//! Driver Contract Tests
//!
//! End-to-end behavior of the bridge and the three drivers against the
//! in-memory backend and a scripted reference:
//! - consecutive identical change records are emitted once
//! - value streams replay the current value
//! - identical queries share one stream
//! - auth actions reach the client exactly once
//! - queue jobs are pushed once and responses are removed once
//! - auth listener errors terminate the auth source

use std::sync::{Arc, Mutex};

use rtdb_drivers::backend::memory::{AuthCall, MemoryAuth, MemoryDatabase, Operation};
use rtdb_drivers::backend::{
    AuthState, BackendError, BackendResult, EventKind, ProviderId, RefHandle, Reference, Snapshot,
    SnapshotCallback,
};
use rtdb_drivers::drivers::{
    backend_stream, AuthAction, ChangeRecord, QueryArg, Refinement,
};
use rtdb_drivers::observability::MetricsRegistry;
use rtdb_drivers::stream::{Callbacks, Subscription};
use rtdb_drivers::{AuthDriver, DatabaseDriver, Driver, DriverError, QueueDriver, Stream, Subject};
use serde_json::{json, Value};

// =============================================================================
// Test Utilities
// =============================================================================

/// Reference whose events are fired by the test
#[derive(Default)]
struct ScriptedReference {
    callbacks: Mutex<Vec<(EventKind, SnapshotCallback)>>,
    offs: Mutex<Vec<EventKind>>,
}

impl ScriptedReference {
    fn fire(&self, event: EventKind, key: &str, value: Value) {
        let callbacks: Vec<SnapshotCallback> = self
            .callbacks
            .lock()
            .unwrap()
            .iter()
            .filter(|(kind, _)| *kind == event)
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(Snapshot::new(Some(key.to_string()), value.clone()));
        }
    }

    fn registered(&self) -> usize {
        self.callbacks.lock().unwrap().len()
    }
}

impl Reference for ScriptedReference {
    fn key(&self) -> Option<String> {
        Some("scripted".into())
    }

    fn path(&self) -> String {
        "/scripted".into()
    }

    fn child(&self, _segment: &str) -> RefHandle {
        Arc::new(ScriptedReference::default())
    }

    fn order_by_child(&self, _field: &str) -> RefHandle {
        Arc::new(ScriptedReference::default())
    }

    fn order_by_key(&self) -> RefHandle {
        Arc::new(ScriptedReference::default())
    }

    fn equal_to(&self, _value: &Value) -> RefHandle {
        Arc::new(ScriptedReference::default())
    }

    fn limit_to_first(&self, _limit: u32) -> RefHandle {
        Arc::new(ScriptedReference::default())
    }

    fn limit_to_last(&self, _limit: u32) -> RefHandle {
        Arc::new(ScriptedReference::default())
    }

    fn on(&self, event: EventKind, callback: SnapshotCallback) {
        self.callbacks.lock().unwrap().push((event, callback));
    }

    fn off(&self, event: EventKind) {
        self.offs.lock().unwrap().push(event);
        self.callbacks.lock().unwrap().retain(|(kind, _)| *kind != event);
    }

    fn push(&self, _value: Value) -> BackendResult<RefHandle> {
        Ok(Arc::new(ScriptedReference::default()))
    }

    fn remove(&self) -> BackendResult<()> {
        Ok(())
    }
}

fn collect<T: Clone + Send + Sync + 'static>(stream: &Stream<T>) -> (Arc<Mutex<Vec<T>>>, Subscription) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    let sub = stream.subscribe(move |v: &T| s.lock().unwrap().push(v.clone()));
    (seen, sub)
}

fn metrics() -> Arc<MetricsRegistry> {
    Arc::new(MetricsRegistry::new())
}

// =============================================================================
// Bridge
// =============================================================================

#[test]
fn bridge_emits_each_distinct_record_once() {
    let reference = Arc::new(ScriptedReference::default());
    let stream = backend_stream(reference.clone(), EventKind::Value, metrics());
    let (seen, _sub) = collect(&stream);

    for repeat in 1..=4 {
        for _ in 0..repeat {
            reference.fire(EventKind::Value, "k", json!(repeat));
        }
    }

    let vals: Vec<Value> = seen.lock().unwrap().iter().map(|r| r.val.clone()).collect();
    assert_eq!(vals, vec![json!(1), json!(2), json!(3), json!(4)]);
}

#[test]
fn bridge_distinguishes_keys() {
    let reference = Arc::new(ScriptedReference::default());
    let stream = backend_stream(reference.clone(), EventKind::ChildAdded, metrics());
    let (seen, _sub) = collect(&stream);

    reference.fire(EventKind::ChildAdded, "a", json!(1));
    reference.fire(EventKind::ChildAdded, "b", json!(1));
    reference.fire(EventKind::ChildAdded, "b", json!(1));

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ChangeRecord { key: Some("a".into()), val: json!(1) },
            ChangeRecord { key: Some("b".into()), val: json!(1) },
        ]
    );
}

#[test]
fn bridge_registers_and_unregisters_once_per_activation() {
    let reference = Arc::new(ScriptedReference::default());
    let stream = backend_stream(reference.clone(), EventKind::Value, metrics());

    let (_a, first) = collect(&stream);
    let (_b, second) = collect(&stream);
    assert_eq!(reference.registered(), 1);

    drop(first);
    assert_eq!(reference.registered(), 1);
    drop(second);
    assert_eq!(reference.registered(), 0);
    assert_eq!(*reference.offs.lock().unwrap(), vec![EventKind::Value]);

    let (_c, _third) = collect(&stream);
    assert_eq!(reference.registered(), 1);
}

// =============================================================================
// Database Driver
// =============================================================================

#[test]
fn value_stream_replays_current_value() {
    let db = MemoryDatabase::new();
    db.set("rooms/lobby", json!({"active": true})).unwrap();
    let source = DatabaseDriver::new(db.reference()).run(Stream::never());
    let rooms = source.query(&["rooms".into()]);

    let (_first, _a) = collect(&rooms);
    db.set("rooms/attic", json!({"active": false})).unwrap();
    let ops_before = db.operations().len();

    let (late, _b) = collect(&rooms);
    assert_eq!(
        *late.lock().unwrap(),
        vec![json!({"lobby": {"active": true}, "attic": {"active": false}})]
    );
    assert_eq!(db.operations().len(), ops_before);
}

#[test]
fn identical_queries_return_identical_stream() {
    let db = MemoryDatabase::new();
    let source = DatabaseDriver::new(db.reference()).run(Stream::never());
    let args = || -> Vec<QueryArg> {
        vec![
            "rooms".into(),
            Refinement::new().order_by_child("active").equal_to(true).into(),
        ]
    };

    let first = source.query(&args());
    let second = source.query(&args());
    let other = source.query(&["rooms".into(), Refinement::new().order_by_child("active").into()]);

    assert!(Stream::ptr_eq(&first, &second));
    assert!(!Stream::ptr_eq(&first, &other));
}

// =============================================================================
// Auth Driver
// =============================================================================

#[test]
fn popup_constructs_provider_once_then_signs_in_once() {
    let auth = MemoryAuth::new();
    let driver = AuthDriver::new(Arc::new(auth.clone()));
    let wire = Subject::new();
    let source = driver.run(AuthAction::parse_stream(&wire.stream()));
    let _sub = source.subscribe(|_: &AuthState| {});

    wire.next(json!({"type": "popup", "provider": "google"}));

    let calls: Vec<AuthCall> = auth
        .calls()
        .into_iter()
        .filter(|c| !matches!(c, AuthCall::Subscribe))
        .collect();
    assert_eq!(
        calls,
        vec![
            AuthCall::ConstructProvider(ProviderId::Google),
            AuthCall::SignInWithPopup(Some(ProviderId::Google)),
        ]
    );
}

#[test]
fn logout_signs_out_without_provider_resolution() {
    let auth = MemoryAuth::new();
    let driver = AuthDriver::new(Arc::new(auth.clone()));
    let actions = Subject::new();
    let _sub = driver.run(actions.stream()).subscribe(|_: &AuthState| {});

    actions.next(AuthAction::Logout);

    assert_eq!(auth.calls(), vec![AuthCall::Subscribe, AuthCall::SignOut]);
}

#[test]
fn unknown_action_type_fails_loudly() {
    let auth = MemoryAuth::new();
    let driver = AuthDriver::new(Arc::new(auth.clone()));
    let wire = Subject::new();
    let source = driver.run(AuthAction::parse_stream(&wire.stream()));

    let failure = Arc::new(Mutex::new(None));
    let f = Arc::clone(&failure);
    let _sub = source.subscribe(
        Callbacks::new(|_: &AuthState| {}).on_error(move |e| *f.lock().unwrap() = Some(e.clone())),
    );

    wire.next(json!({"type": "login", "provider": "google"}));

    assert_eq!(
        *failure.lock().unwrap(),
        Some(DriverError::UnknownActionType("login".into()))
    );
    assert!(!auth.calls().iter().any(|c| matches!(c, AuthCall::ConstructProvider(_))));
}

#[test]
fn auth_listener_error_terminates_source() {
    let auth = MemoryAuth::new();
    let driver = AuthDriver::new(Arc::new(auth.clone()));
    let source = driver.run(Stream::never());

    let states = Arc::new(Mutex::new(Vec::new()));
    let failure = Arc::new(Mutex::new(None));
    let (s, f) = (Arc::clone(&states), Arc::clone(&failure));
    let _sub = source.subscribe(
        Callbacks::new(move |state: &AuthState| s.lock().unwrap().push(state.clone()))
            .on_error(move |e| *f.lock().unwrap() = Some(e.clone())),
    );
    assert_eq!(states.lock().unwrap().len(), 1);

    let error = BackendError::AuthState("token revoked".into());
    auth.fail_listeners(error.clone());
    auth.set_user(Some(rtdb_drivers::backend::User::new("late")));

    assert_eq!(*failure.lock().unwrap(), Some(DriverError::Backend(error)));
    assert_eq!(states.lock().unwrap().len(), 1);
    assert_eq!(auth.listener_count(), 0);
}

// =============================================================================
// Queue Driver
// =============================================================================

#[test]
fn queue_pushes_job_then_consumes_response_once() {
    let db = MemoryDatabase::new();
    let driver = QueueDriver::new(db.reference());
    let jobs = Subject::new();
    let source = driver.run(jobs.stream());

    let (seen, _sub) = collect(&source.listen("client"));

    jobs.next(json!({"job": 1}));
    db.set("responses/client/r1", json!({"result": "ok"})).unwrap();

    let ops = db.operations();
    let pushes: Vec<&Operation> = ops.iter().filter(|op| matches!(op, Operation::Push { .. })).collect();
    assert_eq!(pushes.len(), 1);
    assert!(matches!(
        pushes[0],
        Operation::Push { path, value, .. } if path == "/tasks" && *value == json!({"job": 1})
    ));

    assert_eq!(
        *seen.lock().unwrap(),
        vec![ChangeRecord { key: Some("r1".into()), val: json!({"result": "ok"}) }]
    );
    let removes: Vec<&Operation> = ops.iter().filter(|op| matches!(op, Operation::Remove { .. })).collect();
    assert_eq!(
        removes,
        vec![&Operation::Remove { path: "/responses/client/r1".into() }]
    );
}
