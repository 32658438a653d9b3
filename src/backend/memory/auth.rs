//! # In-Memory Auth
//!
//! Session store implementing [`AuthClient`]. Sign-in succeeds immediately
//! with a fresh user for the requested provider; every call is recorded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::backend::auth::{
    AuthClient, AuthErrorCallback, AuthProvider, AuthState, AuthStateCallback, AuthUnsubscribe,
    ProviderId, User,
};
use crate::backend::errors::{BackendError, BackendResult};
use crate::stream::lock;

/// A call that reached the in-memory auth client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthCall {
    ConstructProvider(ProviderId),
    SignInWithPopup(Option<ProviderId>),
    SignInWithRedirect(Option<ProviderId>),
    SignOut,
    Subscribe,
    Unsubscribe,
}

#[derive(Default)]
struct AuthStore {
    user: AuthState,
    listeners: Vec<(u64, AuthStateCallback, AuthErrorCallback)>,
    calls: Vec<AuthCall>,
    sign_in_failure: Option<String>,
}

#[derive(Default)]
struct AuthInner {
    store: Mutex<AuthStore>,
    next_listener: AtomicU64,
}

impl AuthInner {
    /// Replace the session and notify listeners when it changed
    fn replace_user(&self, user: AuthState) {
        let listeners: Vec<AuthStateCallback> = {
            let mut store = lock(&self.store);
            if store.user == user {
                return;
            }
            store.user = user.clone();
            store.listeners.iter().map(|(_, next, _)| Arc::clone(next)).collect()
        };

        for next in listeners {
            next(user.clone());
        }
    }

    fn sign_in(&self, call: AuthCall, provider: Option<AuthProvider>) -> BackendResult<()> {
        {
            let mut store = lock(&self.store);
            store.calls.push(call);
            if let Some(reason) = store.sign_in_failure.clone() {
                return Err(BackendError::SignInFailed(reason));
            }
        }

        let provider = provider.ok_or_else(|| BackendError::SignInFailed("no provider given".into()))?;
        let mut user = User::new(Uuid::new_v4().to_string());
        user.provider_id = Some(provider.provider_id);
        self.replace_user(Some(user));
        Ok(())
    }
}

/// In-memory authentication client
#[derive(Clone, Default)]
pub struct MemoryAuth {
    inner: Arc<AuthInner>,
}

impl MemoryAuth {
    /// Signed-out client
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session
    pub fn current_user(&self) -> AuthState {
        lock(&self.inner.store).user.clone()
    }

    /// Force the session, notifying listeners on change
    pub fn set_user(&self, user: AuthState) {
        self.inner.replace_user(user);
    }

    /// Report `error` to every auth state listener
    pub fn fail_listeners(&self, error: BackendError) {
        let callbacks: Vec<AuthErrorCallback> = lock(&self.inner.store)
            .listeners
            .iter()
            .map(|(_, _, on_error)| Arc::clone(on_error))
            .collect();

        for callback in callbacks {
            callback(error.clone());
        }
    }

    /// Make subsequent sign-in attempts fail with `reason`, or succeed with `None`
    pub fn fail_sign_in(&self, reason: Option<&str>) {
        lock(&self.inner.store).sign_in_failure = reason.map(str::to_string);
    }

    /// Every call recorded so far
    pub fn calls(&self) -> Vec<AuthCall> {
        lock(&self.inner.store).calls.clone()
    }

    /// Number of registered auth state listeners
    pub fn listener_count(&self) -> usize {
        lock(&self.inner.store).listeners.len()
    }
}

impl AuthClient for MemoryAuth {
    fn auth_provider(&self, id: ProviderId) -> AuthProvider {
        lock(&self.inner.store).calls.push(AuthCall::ConstructProvider(id));
        AuthProvider::new(id)
    }

    fn sign_in_with_popup(&self, provider: Option<AuthProvider>) -> BackendResult<()> {
        let call = AuthCall::SignInWithPopup(provider.as_ref().map(|p| p.provider_id));
        self.inner.sign_in(call, provider)
    }

    fn sign_in_with_redirect(&self, provider: Option<AuthProvider>) -> BackendResult<()> {
        let call = AuthCall::SignInWithRedirect(provider.as_ref().map(|p| p.provider_id));
        self.inner.sign_in(call, provider)
    }

    fn sign_out(&self) -> BackendResult<()> {
        lock(&self.inner.store).calls.push(AuthCall::SignOut);
        self.inner.replace_user(None);
        Ok(())
    }

    fn on_auth_state_changed(&self, next: AuthStateCallback, error: AuthErrorCallback) -> AuthUnsubscribe {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        let current = {
            let mut store = lock(&self.inner.store);
            store.calls.push(AuthCall::Subscribe);
            store.listeners.push((id, Arc::clone(&next), error));
            store.user.clone()
        };
        next(current);

        let inner = Arc::clone(&self.inner);
        Box::new(move || {
            let mut store = lock(&inner.store);
            store.calls.push(AuthCall::Unsubscribe);
            store.listeners.retain(|(lid, _, _)| *lid != id);
        })
    }
}

impl std::fmt::Debug for MemoryAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let store = lock(&self.inner.store);
        f.debug_struct("MemoryAuth")
            .field("signed_in", &store.user.is_some())
            .field("listeners", &store.listeners.len())
            .finish()
    }
}
