//! Authentication capability
//!
//! Sessions come from the Identity Toolkit REST API (custom-token and
//! anonymous sign-in), are resumed from an id token the browser already
//! holds, or are refreshed through the secure token service once that id
//! token has expired. Id tokens are JWTs; only the payload is read here,
//! Firestore verifies the signature on every request.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use url::{Url, form_urlencoded};

use crate::backend::handle_response;
use crate::config::ConnectionConfig;
use crate::error::{DashboardError, Result};
use crate::listener::{ListenerRegistry, Subscription};

const IDENTITY_TOOLKIT_API: &str = "https://identitytoolkit.googleapis.com/v1";
const SECURE_TOKEN_API: &str = "https://securetoken.googleapis.com/v1/token";

/// How a session was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionProvider {
    CustomToken,
    Anonymous,
    Resumed,
    Refreshed,
}

/// A signed-in session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub provider: SessionProvider,
}

/// JWT claims we care about
#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
}

impl Session {
    /// Rebuild a session from an id token the caller already holds
    pub fn from_id_token(token: &str, now: DateTime<Utc>) -> Result<Self> {
        let payload = token
            .split('.')
            .nth(1)
            .ok_or_else(|| DashboardError::Auth("id token is not a JWT".into()))?;
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| DashboardError::Auth(format!("id token payload is not base64url: {e}")))?;
        let claims: IdTokenClaims = serde_json::from_slice(&bytes)?;

        let user_id = claims
            .user_id
            .or(claims.sub)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| DashboardError::Auth("id token has no subject".into()))?;
        let expires_at = claims.exp.and_then(|exp| Utc.timestamp_opt(exp, 0).single());
        if expires_at.is_some_and(|exp| exp <= now) {
            return Err(DashboardError::Auth("id token expired".into()));
        }

        Ok(Self {
            user_id,
            id_token: Some(token.to_string()),
            refresh_token: None,
            expires_at,
            provider: SessionProvider::Resumed,
        })
    }
}

/// Shared slot holding the current session; the store adapter reads the id
/// token from it
pub type SessionCell = Rc<RefCell<Option<Session>>>;

/// Called with the current session on registration and on every change
pub type AuthListener = dyn Fn(Option<&Session>);

/// Authentication handle bound to the remote service
#[async_trait(?Send)]
pub trait AuthHandle {
    fn current_session(&self) -> Option<Session>;

    /// Adopt a session persisted by the client
    fn restore_session(&self, session: Session);

    async fn sign_in_with_custom_token(&self, token: &str) -> Result<Session>;

    async fn sign_in_anonymously(&self) -> Result<Session>;

    /// Trade a refresh token for a new id token of the same user
    async fn refresh_session(&self, refresh_token: &str) -> Result<Session>;

    fn sign_out(&self);

    fn on_auth_state_changed(&self, listener: Rc<AuthListener>) -> Subscription;
}

/// Session slot plus its listeners, shared by both adapters
struct AuthState {
    session: SessionCell,
    listeners: ListenerRegistry<AuthListener>,
}

impl AuthState {
    fn new(session: SessionCell) -> Self {
        Self {
            session,
            listeners: ListenerRegistry::new(),
        }
    }

    fn current(&self) -> Option<Session> {
        self.session.borrow().clone()
    }

    fn set(&self, session: Option<Session>) {
        *self.session.borrow_mut() = session.clone();
        for listener in self.listeners.snapshot() {
            listener(session.as_ref());
        }
    }

    fn subscribe(&self, listener: Rc<AuthListener>) -> Subscription {
        let current = self.current();
        listener(current.as_ref());
        self.listeners.register(listener)
    }
}

/// Sign-in response from Identity Toolkit
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<String>,
    #[serde(default)]
    local_id: Option<String>,
}

/// Token response from the secure token service
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
    user_id: String,
}

fn expiry(expires_in: Option<&str>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    expires_in
        .and_then(|secs| secs.parse::<i64>().ok())
        .and_then(Duration::try_seconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
}

/// Identity Toolkit REST adapter
pub struct IdentityToolkitAuth {
    http: reqwest::Client,
    api_key: String,
    state: AuthState,
}

impl IdentityToolkitAuth {
    pub fn new(http: reqwest::Client, config: &ConnectionConfig, session: SessionCell) -> Self {
        Self {
            http,
            api_key: config.api_key().to_string(),
            state: AuthState::new(session),
        }
    }

    fn endpoint(&self, base: &str) -> Result<Url> {
        Url::parse_with_params(base, [("key", self.api_key.as_str())])
            .map_err(|e| DashboardError::Auth(format!("invalid endpoint {base}: {e}")))
    }

    async fn sign_in(
        &self,
        endpoint: &str,
        body: serde_json::Value,
        provider: SessionProvider,
    ) -> Result<Session> {
        let url = self.endpoint(&format!("{IDENTITY_TOOLKIT_API}/accounts:{endpoint}"))?;
        let response = self
            .http
            .post(url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;
        let signed_in: SignInResponse = handle_response(response)
            .await
            .map_err(|e| DashboardError::Auth(format!("{endpoint} failed: {e}")))?;

        let session = Self::session_from(signed_in, provider, Utc::now())?;
        self.state.set(Some(session.clone()));
        Ok(session)
    }

    fn session_from(response: SignInResponse, provider: SessionProvider, now: DateTime<Utc>) -> Result<Session> {
        let user_id = match response.local_id {
            Some(id) if !id.is_empty() => id,
            // signInWithCustomToken does not echo localId
            _ => Session::from_id_token(&response.id_token, now)?.user_id,
        };
        Ok(Session {
            user_id,
            id_token: Some(response.id_token),
            refresh_token: response.refresh_token,
            expires_at: expiry(response.expires_in.as_deref(), now),
            provider,
        })
    }

    fn session_from_refresh(response: RefreshResponse, now: DateTime<Utc>) -> Session {
        Session {
            expires_at: expiry(response.expires_in.as_deref(), now),
            user_id: response.user_id,
            id_token: Some(response.id_token),
            refresh_token: Some(response.refresh_token),
            provider: SessionProvider::Refreshed,
        }
    }
}

#[async_trait(?Send)]
impl AuthHandle for IdentityToolkitAuth {
    fn current_session(&self) -> Option<Session> {
        self.state.current()
    }

    fn restore_session(&self, session: Session) {
        self.state.set(Some(session));
    }

    async fn sign_in_with_custom_token(&self, token: &str) -> Result<Session> {
        self.sign_in(
            "signInWithCustomToken",
            serde_json::json!({ "token": token, "returnSecureToken": true }),
            SessionProvider::CustomToken,
        )
        .await
    }

    async fn sign_in_anonymously(&self) -> Result<Session> {
        self.sign_in(
            "signUp",
            serde_json::json!({ "returnSecureToken": true }),
            SessionProvider::Anonymous,
        )
        .await
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session> {
        let url = self.endpoint(SECURE_TOKEN_API)?;
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "refresh_token")
            .append_pair("refresh_token", refresh_token)
            .finish();
        let response = self
            .http
            .post(url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;
        let refreshed: RefreshResponse = handle_response(response)
            .await
            .map_err(|e| DashboardError::Auth(format!("token refresh failed: {e}")))?;

        let session = Self::session_from_refresh(refreshed, Utc::now());
        self.state.set(Some(session.clone()));
        Ok(session)
    }

    fn sign_out(&self) {
        self.state.set(None);
    }

    fn on_auth_state_changed(&self, listener: Rc<AuthListener>) -> Subscription {
        self.state.subscribe(listener)
    }
}

/// Scripted sign-in outcome for [`MemoryAuth`]
#[derive(Debug, Clone)]
pub enum SignInOutcome {
    /// Succeed with this user id
    Succeed(String),
    /// Succeed with a fresh random user id
    SucceedRandom,
    /// Fail with this message
    Fail(String),
}

/// In-process auth handle with scripted outcomes
pub struct MemoryAuth {
    state: AuthState,
    custom_token: RefCell<SignInOutcome>,
    anonymous: RefCell<SignInOutcome>,
    refresh: RefCell<SignInOutcome>,
    attempts: Cell<u32>,
}

impl Default for MemoryAuth {
    fn default() -> Self {
        Self {
            state: AuthState::new(SessionCell::default()),
            custom_token: RefCell::new(SignInOutcome::Fail("custom tokens are not accepted".into())),
            anonymous: RefCell::new(SignInOutcome::SucceedRandom),
            refresh: RefCell::new(SignInOutcome::Fail("refresh tokens are not accepted".into())),
            attempts: Cell::new(0),
        }
    }
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_custom_token(self, outcome: SignInOutcome) -> Self {
        *self.custom_token.borrow_mut() = outcome;
        self
    }

    #[must_use]
    pub fn with_anonymous(self, outcome: SignInOutcome) -> Self {
        *self.anonymous.borrow_mut() = outcome;
        self
    }

    #[must_use]
    pub fn with_refresh(self, outcome: SignInOutcome) -> Self {
        *self.refresh.borrow_mut() = outcome;
        self
    }

    /// Sign-in and refresh attempts made so far
    pub fn attempts(&self) -> u32 {
        self.attempts.get()
    }

    fn play(&self, outcome: &RefCell<SignInOutcome>, provider: SessionProvider) -> Result<Session> {
        self.attempts.set(self.attempts.get() + 1);
        let user_id = match &*outcome.borrow() {
            SignInOutcome::Succeed(id) => id.clone(),
            SignInOutcome::SucceedRandom => uuid::Uuid::new_v4().simple().to_string(),
            SignInOutcome::Fail(message) => return Err(DashboardError::Auth(message.clone())),
        };
        let session = Session {
            user_id,
            id_token: None,
            refresh_token: None,
            expires_at: None,
            provider,
        };
        self.state.set(Some(session.clone()));
        Ok(session)
    }
}

#[async_trait(?Send)]
impl AuthHandle for MemoryAuth {
    fn current_session(&self) -> Option<Session> {
        self.state.current()
    }

    fn restore_session(&self, session: Session) {
        self.state.set(Some(session));
    }

    async fn sign_in_with_custom_token(&self, _token: &str) -> Result<Session> {
        self.play(&self.custom_token, SessionProvider::CustomToken)
    }

    async fn sign_in_anonymously(&self) -> Result<Session> {
        self.play(&self.anonymous, SessionProvider::Anonymous)
    }

    async fn refresh_session(&self, _refresh_token: &str) -> Result<Session> {
        self.play(&self.refresh, SessionProvider::Refreshed)
    }

    fn sign_out(&self) {
        self.state.set(None);
    }

    fn on_auth_state_changed(&self, listener: Rc<AuthListener>) -> Subscription {
        self.state.subscribe(listener)
    }
}

#[cfg(test)]
pub(crate) fn fake_id_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.signature")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resume_from_id_token() {
        let now = Utc::now();
        let token = fake_id_token(&json!({"user_id": "abc123", "exp": now.timestamp() + 600}));
        let session = Session::from_id_token(&token, now).unwrap();
        assert_eq!(session.user_id, "abc123");
        assert_eq!(session.provider, SessionProvider::Resumed);
        assert_eq!(session.id_token.as_deref(), Some(token.as_str()));
    }

    #[test]
    fn test_expired_or_garbage_token_rejected() {
        let now = Utc::now();
        let expired = fake_id_token(&json!({"sub": "abc123", "exp": now.timestamp() - 1}));
        assert!(matches!(Session::from_id_token(&expired, now), Err(DashboardError::Auth(_))));
        assert!(Session::from_id_token("not-a-jwt", now).is_err());
        let anonymous = fake_id_token(&json!({"exp": now.timestamp() + 60}));
        assert!(Session::from_id_token(&anonymous, now).is_err());
    }

    #[test]
    fn test_custom_token_response_uses_token_subject() {
        let now = Utc::now();
        let id_token = fake_id_token(&json!({"sub": "trader-7", "exp": now.timestamp() + 3600}));
        let response = SignInResponse {
            id_token,
            refresh_token: Some("r".into()),
            expires_in: Some("3600".into()),
            local_id: None,
        };
        let session =
            IdentityToolkitAuth::session_from(response, SessionProvider::CustomToken, now).unwrap();
        assert_eq!(session.user_id, "trader-7");
        assert_eq!(session.expires_at, Some(now + Duration::seconds(3600)));
    }

    #[test]
    fn test_refresh_response_keeps_user() {
        let now = Utc::now();
        let response: RefreshResponse = serde_json::from_value(json!({
            "id_token": "new-id-token",
            "refresh_token": "rotated",
            "expires_in": "3600",
            "token_type": "Bearer",
            "user_id": "trader-7",
            "project_id": "aura",
        }))
        .unwrap();

        let session = IdentityToolkitAuth::session_from_refresh(response, now);
        assert_eq!(session.user_id, "trader-7");
        assert_eq!(session.refresh_token.as_deref(), Some("rotated"));
        assert_eq!(session.provider, SessionProvider::Refreshed);
        assert_eq!(session.expires_at, Some(now + Duration::seconds(3600)));
    }

    #[test]
    fn test_endpoint_encodes_api_key() {
        let config = ConnectionConfig {
            api_key: Some("a&b c".into()),
            ..ConnectionConfig::default()
        };
        let auth = IdentityToolkitAuth::new(reqwest::Client::new(), &config, SessionCell::default());
        let url = auth.endpoint(SECURE_TOKEN_API).unwrap();
        assert_eq!(url.path(), "/v1/token");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs, vec![("key".to_string(), "a&b c".to_string())]);
    }

    #[tokio::test]
    async fn test_memory_auth_notifies_listeners() {
        let auth = MemoryAuth::new().with_anonymous(SignInOutcome::Succeed("anon-1".into()));
        let seen: Rc<RefCell<Vec<Option<String>>>> = Rc::default();
        let sink = Rc::clone(&seen);
        let _sub = auth.on_auth_state_changed(Rc::new(move |s: Option<&Session>| {
            sink.borrow_mut().push(s.map(|s| s.user_id.clone()));
        }));

        assert!(auth.sign_in_with_custom_token("t").await.is_err());
        auth.sign_in_anonymously().await.unwrap();
        auth.sign_out();

        assert_eq!(*seen.borrow(), vec![None, Some("anon-1".into()), None]);
        assert_eq!(auth.attempts(), 2);
    }
}
