//! # Authentication Client
//!
//! The capabilities the auth driver consumes from an authentication client,
//! and the provider/user types crossing that boundary.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::errors::{BackendError, BackendResult};
use crate::errors::DriverError;

/// Identity providers a sign-in flow can use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderId {
    #[serde(rename = "google.com")]
    Google,
    #[serde(rename = "facebook.com")]
    Facebook,
    #[serde(rename = "twitter.com")]
    Twitter,
    #[serde(rename = "github.com")]
    Github,
}

impl ProviderId {
    /// Every supported provider
    pub const ALL: [ProviderId; 4] = [
        ProviderId::Google,
        ProviderId::Facebook,
        ProviderId::Twitter,
        ProviderId::Github,
    ];

    /// Short name used in auth actions ("google")
    pub fn name(&self) -> &'static str {
        match self {
            ProviderId::Google => "google",
            ProviderId::Facebook => "facebook",
            ProviderId::Twitter => "twitter",
            ProviderId::Github => "github",
        }
    }
}

impl FromStr for ProviderId {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderId::ALL
            .into_iter()
            .find(|id| id.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| DriverError::UnknownProvider(s.to_string()))
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A constructed provider, possibly customised by the application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthProvider {
    /// Which provider this is
    pub provider_id: ProviderId,

    /// OAuth scopes to request
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,

    /// Extra OAuth parameters
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_parameters: BTreeMap<String, String>,
}

impl AuthProvider {
    /// Provider with no scopes or parameters
    pub fn new(provider_id: ProviderId) -> Self {
        Self {
            provider_id,
            scopes: Vec::new(),
            custom_parameters: BTreeMap::new(),
        }
    }

    /// Request an additional scope
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    /// Add a custom OAuth parameter
    pub fn with_custom_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_parameters.insert(key.into(), value.into());
        self
    }
}

/// Signed-in user as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Stable user id
    pub uid: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Provider used for the current session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<ProviderId>,
}

impl User {
    /// User with only an id
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: None,
            email: None,
            provider_id: None,
        }
    }
}

/// Current session: `None` when signed out
pub type AuthState = Option<User>;

/// Callback for auth state changes
pub type AuthStateCallback = Arc<dyn Fn(AuthState) + Send + Sync>;

/// Callback for auth listener errors
pub type AuthErrorCallback = Arc<dyn Fn(BackendError) + Send + Sync>;

/// Detaches an auth state listener
pub type AuthUnsubscribe = Box<dyn FnOnce() + Send>;

/// Authentication client.
///
/// The backend is the only writer of auth state; drivers observe it through
/// `on_auth_state_changed` and request changes through the sign-in methods.
pub trait AuthClient: Send + Sync {
    /// Construct the provider object for `id`
    fn auth_provider(&self, id: ProviderId) -> AuthProvider;

    /// Start a popup sign-in flow
    fn sign_in_with_popup(&self, provider: Option<AuthProvider>) -> BackendResult<()>;

    /// Start a redirect sign-in flow
    fn sign_in_with_redirect(&self, provider: Option<AuthProvider>) -> BackendResult<()>;

    /// End the current session
    fn sign_out(&self) -> BackendResult<()>;

    /// Observe auth state. `next` receives the current state and every
    /// change; `error` receives listener failures.
    fn on_auth_state_changed(&self, next: AuthStateCallback, error: AuthErrorCallback) -> AuthUnsubscribe;
}

/// Moves sessions persisted by an older client version into the current one
pub trait LegacyAuthMigrator: Send + Sync {
    /// Migrate a legacy session, returning the user it signed in
    fn migrate(&self) -> BackendResult<AuthState>;

    /// Forget the legacy session once a current one exists
    fn clear_legacy_auth(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_provider_parse() {
        assert_eq!("google".parse::<ProviderId>().unwrap(), ProviderId::Google);
        assert_eq!("Github".parse::<ProviderId>().unwrap(), ProviderId::Github);
        assert!(matches!(
            "myspace".parse::<ProviderId>(),
            Err(DriverError::UnknownProvider(name)) if name == "myspace"
        ));
    }

    #[test]
    fn test_provider_serde_shape() {
        let provider = AuthProvider::new(ProviderId::Google).with_scope("email");
        let value = serde_json::to_value(&provider).unwrap();
        assert_eq!(value, json!({"providerId": "google.com", "scopes": ["email"]}));

        let parsed: AuthProvider = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, provider);
    }
}
