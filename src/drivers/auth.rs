//! # Auth Driver
//!
//! Sink: sign-in and sign-out actions. Source: the backend's auth state,
//! replayed to late subscribers.
//!
//! The auth state listener and the action subscription live exactly as long
//! as the source has listeners.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use super::Driver;
use crate::backend::{
    AuthClient, AuthProvider, AuthState, AuthUnsubscribe, BackendError, LegacyAuthMigrator, ProviderId,
};
use crate::errors::{DriverError, DriverResult};
use crate::observability::{log_event, Event, MetricsRegistry};
use crate::stream::{lock, Callbacks, Emitter, Held, Producer, Stream, Subscription};

/// Provider named in an auth action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderArg {
    /// Constructed through the client when the action is dispatched
    Named(ProviderId),
    /// Already constructed by the application
    Built(AuthProvider),
}

impl Serialize for ProviderArg {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ProviderArg::Named(id) => serializer.serialize_str(id.name()),
            ProviderArg::Built(provider) => provider.serialize(serializer),
        }
    }
}

impl From<ProviderId> for ProviderArg {
    fn from(id: ProviderId) -> Self {
        ProviderArg::Named(id)
    }
}

impl From<AuthProvider> for ProviderArg {
    fn from(provider: AuthProvider) -> Self {
        ProviderArg::Built(provider)
    }
}

/// Auth request sent into the driver.
///
/// Wire shape: `{"type": "popup" | "redirect" | "logout", "provider"?: name | object}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", try_from = "Value")]
pub enum AuthAction {
    Popup {
        #[serde(skip_serializing_if = "Option::is_none")]
        provider: Option<ProviderArg>,
    },
    Redirect {
        #[serde(skip_serializing_if = "Option::is_none")]
        provider: Option<ProviderArg>,
    },
    Logout,
}

impl AuthAction {
    /// Popup sign-in with `provider`
    pub fn popup(provider: impl Into<ProviderArg>) -> Self {
        AuthAction::Popup {
            provider: Some(provider.into()),
        }
    }

    /// Redirect sign-in with `provider`
    pub fn redirect(provider: impl Into<ProviderArg>) -> Self {
        AuthAction::Redirect {
            provider: Some(provider.into()),
        }
    }

    /// Wire name of the action type
    pub fn kind(&self) -> &'static str {
        match self {
            AuthAction::Popup { .. } => "popup",
            AuthAction::Redirect { .. } => "redirect",
            AuthAction::Logout => "logout",
        }
    }

    fn provider_name(&self) -> Option<&'static str> {
        match self {
            AuthAction::Popup { provider } | AuthAction::Redirect { provider } => {
                provider.as_ref().map(|p| match p {
                    ProviderArg::Named(id) => id.name(),
                    ProviderArg::Built(built) => built.provider_id.name(),
                })
            }
            AuthAction::Logout => None,
        }
    }

    /// Parse a stream of wire-shaped actions; the first malformed one
    /// terminates the result with its parse error
    pub fn parse_stream(input: &Stream<Value>) -> Stream<AuthAction> {
        input.try_map(|value: &Value| AuthAction::try_from(value.clone()))
    }
}

fn parse_provider(value: Option<Value>) -> DriverResult<Option<ProviderArg>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(name)) => Ok(Some(ProviderArg::Named(name.parse()?))),
        Some(built @ Value::Object(_)) => serde_json::from_value(built)
            .map(|provider| Some(ProviderArg::Built(provider)))
            .map_err(|e| DriverError::InvalidArgument(format!("provider object: {}", e))),
        Some(other) => Err(DriverError::InvalidArgument(format!(
            "provider must be a name or an object, got {}",
            other
        ))),
    }
}

impl TryFrom<Value> for AuthAction {
    type Error = DriverError;

    fn try_from(value: Value) -> DriverResult<Self> {
        let Value::Object(mut fields) = value else {
            return Err(DriverError::InvalidArgument(format!(
                "auth action must be an object, got {}",
                value
            )));
        };

        let kind = match fields.remove("type") {
            Some(Value::String(kind)) => kind,
            Some(other) => {
                return Err(DriverError::InvalidArgument(format!(
                    "auth action type must be a string, got {}",
                    other
                )))
            }
            None => return Err(DriverError::InvalidArgument("auth action has no type".into())),
        };

        match kind.as_str() {
            "popup" => Ok(AuthAction::Popup {
                provider: parse_provider(fields.remove("provider"))?,
            }),
            "redirect" => Ok(AuthAction::Redirect {
                provider: parse_provider(fields.remove("provider"))?,
            }),
            "logout" => Ok(AuthAction::Logout),
            _ => Err(DriverError::UnknownActionType(kind)),
        }
    }
}

/// Everything one activation of the auth source holds
struct Activation {
    unsubscribe: AuthUnsubscribe,
    actions: Subscription,
}

impl Activation {
    fn close(self) {
        (self.unsubscribe)();
        self.actions.unsubscribe();
        log_event(Event::AuthListenerDetached, &[]);
    }
}

/// Uid logged for a state; empty when signed out
fn state_uid(state: &AuthState) -> &str {
    state.as_ref().map(|user| user.uid.as_str()).unwrap_or("")
}

fn log_state(state: &AuthState) {
    log_event(Event::AuthStateChanged, &[("uid", state_uid(state))]);
}

struct AuthSource {
    client: Arc<dyn AuthClient>,
    input: Stream<AuthAction>,
    metrics: Arc<MetricsRegistry>,
    activation: Held<Activation>,
}

impl AuthSource {
    fn resolve(client: &dyn AuthClient, provider: Option<ProviderArg>) -> Option<AuthProvider> {
        provider.map(|arg| match arg {
            ProviderArg::Named(id) => client.auth_provider(id),
            ProviderArg::Built(provider) => provider,
        })
    }

    fn dispatch(client: &dyn AuthClient, metrics: &MetricsRegistry, action: &AuthAction) {
        let provider = action.provider_name().unwrap_or("none");
        metrics.increment_auth_actions();
        log_event(
            Event::AuthActionDispatched,
            &[("type", action.kind()), ("provider", provider)],
        );

        let outcome = match action.clone() {
            AuthAction::Popup { provider } => client.sign_in_with_popup(Self::resolve(client, provider)),
            AuthAction::Redirect { provider } => client.sign_in_with_redirect(Self::resolve(client, provider)),
            AuthAction::Logout => client.sign_out(),
        };

        if let Err(error) = outcome {
            metrics.increment_auth_failures();
            let reason = error.to_string();
            log_event(
                Event::AuthActionFailed,
                &[
                    ("type", action.kind()),
                    ("provider", provider),
                    ("kind", error.kind()),
                    ("reason", reason.as_str()),
                ],
            );
        }
    }
}

impl Producer<AuthState> for AuthSource {
    fn start(&self, emitter: Emitter<AuthState>) {
        let on_state = emitter.clone();
        let on_error = emitter.clone();
        self.activation.begin();
        log_event(Event::AuthListenerAttached, &[]);
        let unsubscribe = self.client.on_auth_state_changed(
            Arc::new(move |state: AuthState| {
                log_state(&state);
                on_state.next(state);
            }),
            Arc::new(move |error: BackendError| {
                let reason = error.to_string();
                log_event(Event::AuthStateError, &[("reason", reason.as_str())]);
                on_error.error(DriverError::Backend(error));
            }),
        );

        // The client may have failed the registration synchronously
        if self.activation.stopped_early() {
            unsubscribe();
            log_event(Event::AuthListenerDetached, &[]);
            return;
        }

        let client = Arc::clone(&self.client);
        let metrics = Arc::clone(&self.metrics);
        let listener = Callbacks::new(move |action: &AuthAction| {
            AuthSource::dispatch(client.as_ref(), &metrics, action)
        })
        .on_error(move |error| {
            log_event(
                Event::AuthSinkFailed,
                &[("code", error.code()), ("reason", error.to_string().as_str())],
            );
            emitter.error(error.clone());
        });
        let actions = self.input.subscribe(listener);

        if let Some(stale) = self.activation.store(Activation { unsubscribe, actions }) {
            stale.close();
        }
    }

    fn stop(&self) {
        if let Some(activation) = self.activation.release() {
            activation.close();
        }
    }
}

/// Auth driver over an [`AuthClient`]
pub struct AuthDriver {
    client: Arc<dyn AuthClient>,
    metrics: Arc<MetricsRegistry>,
    legacy_listener: Mutex<Option<AuthUnsubscribe>>,
}

impl AuthDriver {
    /// Driver over `client`
    pub fn new(client: Arc<dyn AuthClient>) -> Self {
        Self {
            client,
            metrics: Arc::new(MetricsRegistry::new()),
            legacy_listener: Mutex::new(None),
        }
    }

    /// Driver that first migrates a legacy session, then logs every auth
    /// state change and clears the legacy session whenever a user is signed in
    pub fn with_migrator(client: Arc<dyn AuthClient>, migrator: Arc<dyn LegacyAuthMigrator>) -> Self {
        match migrator.migrate() {
            Ok(Some(user)) => log_event(Event::LegacyAuthMigrated, &[("uid", user.uid.as_str())]),
            Ok(None) => {}
            Err(error) => {
                let reason = error.to_string();
                log_event(Event::LegacyAuthMigrationFailed, &[("reason", reason.as_str())]);
            }
        }

        let unsubscribe = client.on_auth_state_changed(
            Arc::new(move |state: AuthState| {
                log_state(&state);
                if let Some(user) = state {
                    migrator.clear_legacy_auth();
                    log_event(Event::LegacyAuthCleared, &[("uid", user.uid.as_str())]);
                }
            }),
            Arc::new(|error: BackendError| {
                let reason = error.to_string();
                log_event(Event::AuthStateError, &[("reason", reason.as_str())]);
            }),
        );

        let driver = Self::new(client);
        *lock(&driver.legacy_listener) = Some(unsubscribe);
        driver
    }

    /// Counters for this driver
    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }
}

impl Driver for AuthDriver {
    type Sink = AuthAction;
    type Source = Stream<AuthState>;

    fn run(&self, sink: Stream<AuthAction>) -> Stream<AuthState> {
        Stream::create_with_memory(AuthSource {
            client: Arc::clone(&self.client),
            input: sink,
            metrics: Arc::clone(&self.metrics),
            activation: Held::new(),
        })
    }
}

impl Drop for AuthDriver {
    fn drop(&mut self) {
        if let Some(unsubscribe) = lock(&self.legacy_listener).take() {
            unsubscribe();
        }
    }
}

impl std::fmt::Debug for AuthDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthDriver")
            .field("migrating", &lock(&self.legacy_listener).is_some())
            .finish()
    }
}
