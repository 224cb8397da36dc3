//! Identity resolution
//!
//! `UNRESOLVED -> RESOLVING -> RESOLVED`, where RESOLVED is terminal:
//! - an active session when first observed resolves straight away
//! - otherwise each strategy is tried in order (custom token, anonymous)
//! - if all fail, a local random id is used so the UI never stays loading
//!
//! Auth events after resolution are logged and counted; they never change
//! the resolved user id.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::Serialize;

use crate::auth::{AuthHandle, Session};
use crate::error::Result;
use crate::listener::Subscription;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityPhase {
    Unresolved,
    Resolving,
    Resolved,
}

/// Where the resolved user id came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    ExistingSession,
    CustomToken,
    Anonymous,
    /// Generated locally, not backed by any session
    LocalRandom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityState {
    pub user_id: Option<String>,
    pub is_auth_ready: bool,
    pub phase: IdentityPhase,
    pub source: Option<IdentitySource>,
}

impl Default for IdentityState {
    fn default() -> Self {
        Self {
            user_id: None,
            is_auth_ready: false,
            phase: IdentityPhase::Unresolved,
            source: None,
        }
    }
}

impl IdentityState {
    /// Move to RESOLVED. Returns false if already resolved.
    fn resolve(&mut self, user_id: String, source: IdentitySource) -> bool {
        if self.phase == IdentityPhase::Resolved {
            return false;
        }
        self.user_id = Some(user_id);
        self.is_auth_ready = true;
        self.phase = IdentityPhase::Resolved;
        self.source = Some(source);
        true
    }
}

/// One way of obtaining a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityStrategy {
    CustomToken(String),
    Anonymous,
}

impl IdentityStrategy {
    /// Strategies in the order they are tried
    pub fn chain(bootstrap_token: Option<&str>) -> Vec<Self> {
        let mut chain = Vec::with_capacity(2);
        if let Some(token) = bootstrap_token.filter(|t| !t.trim().is_empty()) {
            chain.push(IdentityStrategy::CustomToken(token.to_string()));
        }
        chain.push(IdentityStrategy::Anonymous);
        chain
    }

    pub fn source(&self) -> IdentitySource {
        match self {
            IdentityStrategy::CustomToken(_) => IdentitySource::CustomToken,
            IdentityStrategy::Anonymous => IdentitySource::Anonymous,
        }
    }

    async fn attempt(&self, auth: &dyn AuthHandle) -> Result<Session> {
        match self {
            IdentityStrategy::CustomToken(token) => auth.sign_in_with_custom_token(token).await,
            IdentityStrategy::Anonymous => auth.sign_in_anonymously().await,
        }
    }
}

/// Drives the state machine against an auth handle
pub struct IdentityResolver {
    strategies: Vec<IdentityStrategy>,
    state: Rc<RefCell<IdentityState>>,
    late_events: Rc<Cell<u32>>,
}

impl IdentityResolver {
    pub fn new(bootstrap_token: Option<&str>) -> Self {
        Self {
            strategies: IdentityStrategy::chain(bootstrap_token),
            state: Rc::default(),
            late_events: Rc::default(),
        }
    }

    /// Resolver that never signs in; only an existing session resolves to a
    /// real user, anything else ends on a local id
    pub fn resume_only() -> Self {
        Self {
            strategies: Vec::new(),
            state: Rc::default(),
            late_events: Rc::default(),
        }
    }

    pub fn state(&self) -> IdentityState {
        self.state.borrow().clone()
    }

    /// Shared view of the state for the context
    pub fn state_cell(&self) -> Rc<RefCell<IdentityState>> {
        Rc::clone(&self.state)
    }

    /// Auth events seen after resolution
    pub fn late_events(&self) -> u32 {
        self.late_events.get()
    }

    /// Register the auth-state listener. It resolves directly when it sees a
    /// session before resolution has started; sign-ins made by `resolve`
    /// itself are recorded there with their own source.
    pub fn watch(&self, auth: &dyn AuthHandle) -> Subscription {
        let state = Rc::clone(&self.state);
        let late_events = Rc::clone(&self.late_events);

        auth.on_auth_state_changed(Rc::new(move |session: Option<&Session>| {
            let mut state = state.borrow_mut();
            match (state.phase, session) {
                (IdentityPhase::Unresolved, Some(session)) => {
                    state.resolve(session.user_id.clone(), IdentitySource::ExistingSession);
                    tracing::info!(user_id = %session.user_id, "resumed existing session");
                }
                (IdentityPhase::Unresolved | IdentityPhase::Resolving, _) => {}
                (IdentityPhase::Resolved, session) => {
                    late_events.set(late_events.get() + 1);
                    tracing::info!(
                        session_user = session.map(|s| s.user_id.as_str()),
                        resolved_user = state.user_id.as_deref(),
                        "auth state changed after resolution; identity unchanged"
                    );
                }
            }
        }))
    }

    /// Run the resolution cycle. Always ends RESOLVED.
    pub async fn resolve(&self, auth: &dyn AuthHandle) -> IdentityState {
        if self.state.borrow().phase == IdentityPhase::Resolved {
            return self.state();
        }

        if let Some(session) = auth.current_session() {
            self.finish(session.user_id, IdentitySource::ExistingSession);
            return self.state();
        }

        self.state.borrow_mut().phase = IdentityPhase::Resolving;

        for strategy in &self.strategies {
            match strategy.attempt(auth).await {
                Ok(session) => {
                    self.finish(session.user_id, strategy.source());
                    return self.state();
                }
                Err(e) => {
                    tracing::warn!(strategy = ?strategy.source(), error = %e, "sign-in strategy failed");
                }
            }
        }

        let local_id = uuid::Uuid::new_v4().to_string();
        tracing::warn!(user_id = %local_id, "all sign-in strategies failed; using a local identity");
        self.finish(local_id, IdentitySource::LocalRandom);
        self.state()
    }

    fn finish(&self, user_id: String, source: IdentitySource) {
        if self.state.borrow_mut().resolve(user_id.clone(), source) {
            tracing::info!(user_id = %user_id, source = ?source, "identity resolved");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MemoryAuth, SessionProvider, SignInOutcome};

    fn is_uuid_like(id: &str) -> bool {
        uuid::Uuid::parse_str(id).is_ok() && id.len() == 36
    }

    #[test]
    fn test_strategy_chain_order() {
        assert_eq!(
            IdentityStrategy::chain(Some("tok")),
            vec![IdentityStrategy::CustomToken("tok".into()), IdentityStrategy::Anonymous]
        );
        assert_eq!(IdentityStrategy::chain(Some("  ")), vec![IdentityStrategy::Anonymous]);
        assert_eq!(IdentityStrategy::chain(None), vec![IdentityStrategy::Anonymous]);
    }

    #[tokio::test]
    async fn test_resume_only_never_signs_in() {
        let auth = MemoryAuth::new().with_anonymous(SignInOutcome::Succeed("fresh".into()));
        let resolver = IdentityResolver::resume_only();

        let state = resolver.resolve(&auth).await;
        assert_eq!(state.source, Some(IdentitySource::LocalRandom));
        assert_eq!(auth.attempts(), 0);
    }

    #[tokio::test]
    async fn test_token_fails_anonymous_succeeds() {
        let auth = MemoryAuth::new()
            .with_custom_token(SignInOutcome::Fail("invalid token".into()))
            .with_anonymous(SignInOutcome::Succeed("abc123".into()));
        let resolver = IdentityResolver::new(Some("bootstrap"));
        let _watch = resolver.watch(&auth);

        let state = resolver.resolve(&auth).await;
        assert_eq!(state.user_id.as_deref(), Some("abc123"));
        assert!(state.is_auth_ready);
        assert_eq!(state.source, Some(IdentitySource::Anonymous));
        assert_eq!(auth.attempts(), 2);
    }

    #[tokio::test]
    async fn test_all_strategies_fail_uses_local_uuid() {
        let auth = MemoryAuth::new()
            .with_custom_token(SignInOutcome::Fail("bad".into()))
            .with_anonymous(SignInOutcome::Fail("provider disabled".into()));
        let resolver = IdentityResolver::new(Some("bootstrap"));

        let state = resolver.resolve(&auth).await;
        let user_id = state.user_id.expect("never left without an id");
        assert!(is_uuid_like(&user_id));
        assert!(state.is_auth_ready);
        assert_eq!(state.phase, IdentityPhase::Resolved);
        assert_eq!(state.source, Some(IdentitySource::LocalRandom));
    }

    #[tokio::test]
    async fn test_resumed_session_resolves_without_sign_in() {
        let auth = MemoryAuth::new();
        auth.restore_session(Session {
            user_id: "resumed-1".into(),
            id_token: None,
            refresh_token: None,
            expires_at: None,
            provider: SessionProvider::Resumed,
        });
        let resolver = IdentityResolver::new(None);
        let _watch = resolver.watch(&auth);
        assert_eq!(resolver.state().phase, IdentityPhase::Resolved);

        let state = resolver.resolve(&auth).await;
        assert_eq!(state.user_id.as_deref(), Some("resumed-1"));
        assert_eq!(state.source, Some(IdentitySource::ExistingSession));
        assert_eq!(auth.attempts(), 0);
    }

    #[tokio::test]
    async fn test_resolved_is_terminal() {
        let auth = MemoryAuth::new().with_anonymous(SignInOutcome::Succeed("first".into()));
        let resolver = IdentityResolver::new(None);
        let _watch = resolver.watch(&auth);
        resolver.resolve(&auth).await;

        auth.sign_out();
        auth.restore_session(Session {
            user_id: "second".into(),
            id_token: None,
            refresh_token: None,
            expires_at: None,
            provider: SessionProvider::Resumed,
        });
        let state = resolver.resolve(&auth).await;

        assert_eq!(state.user_id.as_deref(), Some("first"));
        assert!(state.is_auth_ready);
        // sign-out and restore; the sign-in during RESOLVING is not counted
        assert_eq!(resolver.late_events(), 2);
    }
}
