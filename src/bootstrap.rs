//! Connection bootstrap
//!
//! Builds the one service handle for an application session and resolves
//! the identity against it. Failures never escape `initialize`: a missing or
//! malformed connection config, or a handle that cannot be constructed,
//! yields a degraded read-only context instead.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::auth::{AuthHandle, IdentityToolkitAuth, MemoryAuth, Session, SessionCell};
use crate::config::{Config, ConnectionConfig};
use crate::context::AppContext;
use crate::error::{DashboardError, Result};
use crate::identity::{IdentityResolver, IdentitySource};
use crate::notify::Notifier;
use crate::store::{DocumentStore, FirestoreStore, MemoryStore};

/// Initialized connection to the remote service
pub struct ServiceHandle {
    pub connection: ConnectionConfig,
    pub store: Rc<dyn DocumentStore>,
    pub auth: Rc<dyn AuthHandle>,
}

/// Builds service handles from a valid connection config
pub trait ServiceFactory {
    fn create(&self, connection: &ConnectionConfig) -> Result<ServiceHandle>;
}

/// Firestore and Identity Toolkit over REST, sharing one session
pub struct FirebaseRestFactory {
    http: reqwest::Client,
}

impl FirebaseRestFactory {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for FirebaseRestFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceFactory for FirebaseRestFactory {
    fn create(&self, connection: &ConnectionConfig) -> Result<ServiceHandle> {
        let session = SessionCell::default();
        let store = FirestoreStore::new(self.http.clone(), connection, Rc::clone(&session));
        let auth = IdentityToolkitAuth::new(self.http.clone(), connection, session);
        Ok(ServiceHandle {
            connection: connection.clone(),
            store: Rc::new(store),
            auth: Rc::new(auth),
        })
    }
}

/// Hands out pre-built in-process adapters
pub struct MemoryFactory {
    store: Rc<MemoryStore>,
    auth: Rc<MemoryAuth>,
    failure: Option<String>,
}

impl MemoryFactory {
    pub fn new(store: Rc<MemoryStore>, auth: Rc<MemoryAuth>) -> Self {
        Self {
            store,
            auth,
            failure: None,
        }
    }

    /// Every `create` fails with this message
    #[must_use]
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }
}

impl ServiceFactory for MemoryFactory {
    fn create(&self, connection: &ConnectionConfig) -> Result<ServiceHandle> {
        if let Some(message) = &self.failure {
            return Err(DashboardError::Store(message.clone()));
        }
        Ok(ServiceHandle {
            connection: connection.clone(),
            store: Rc::clone(&self.store) as Rc<dyn DocumentStore>,
            auth: Rc::clone(&self.auth) as Rc<dyn AuthHandle>,
        })
    }
}

/// Holds the single service handle; constructed once and passed down
#[derive(Default)]
pub struct ServiceRegistry {
    handle: RefCell<Option<Rc<ServiceHandle>>>,
    constructions: Cell<u32>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuse the existing handle, or build one with `factory`
    pub fn get_or_create(
        &self,
        connection: &ConnectionConfig,
        factory: &dyn ServiceFactory,
    ) -> Result<Rc<ServiceHandle>> {
        if let Some(handle) = self.handle.borrow().as_ref() {
            return Ok(Rc::clone(handle));
        }
        let handle = Rc::new(factory.create(connection)?);
        self.constructions.set(self.constructions.get() + 1);
        *self.handle.borrow_mut() = Some(Rc::clone(&handle));
        Ok(handle)
    }

    pub fn handle(&self) -> Option<Rc<ServiceHandle>> {
        self.handle.borrow().clone()
    }

    /// Handles built so far
    pub fn constructions(&self) -> u32 {
        self.constructions.get()
    }
}

pub struct Bootstrap<'a> {
    config: &'a Config,
    registry: &'a ServiceRegistry,
    factory: &'a dyn ServiceFactory,
    resumed: Option<Session>,
    refresh_token: Option<String>,
    resume_only: bool,
}

impl<'a> Bootstrap<'a> {
    pub fn new(config: &'a Config, registry: &'a ServiceRegistry, factory: &'a dyn ServiceFactory) -> Self {
        Self {
            config,
            registry,
            factory,
            resumed: None,
            refresh_token: None,
            resume_only: false,
        }
    }

    /// Session the client already holds; adopted before the auth listener
    /// is registered
    #[must_use]
    pub fn with_resumed_session(mut self, session: Option<Session>) -> Self {
        self.resumed = session;
        self
    }

    /// Refresh token used when no live session was resumed
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: Option<String>) -> Self {
        self.refresh_token = refresh_token.filter(|t| !t.trim().is_empty());
        self
    }

    /// Skip the sign-in strategies; without a resumed or refreshed session
    /// the identity ends on a local id
    #[must_use]
    pub fn resume_only(mut self) -> Self {
        self.resume_only = true;
        self
    }

    pub async fn initialize(self) -> AppContext {
        let notifier = Notifier::new(self.config.notification_ttl_seconds);
        let app_id = self.config.app_id.clone();

        let connection = match self.config.connection() {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!(error = %e, "connection config unusable; running read-only");
                notifier.warning(e.user_message());
                return AppContext::degraded(app_id, notifier, e.to_string());
            }
        };

        let services = match self.registry.get_or_create(connection, self.factory) {
            Ok(services) => services,
            Err(e) => {
                tracing::error!(error = %e, "failed to construct service handle; running read-only");
                notifier.warning("Could not connect to the database; running read-only.");
                return AppContext::degraded(app_id, notifier, e.to_string());
            }
        };
        tracing::debug!(
            project_id = connection.project_id(),
            store = services.store.name(),
            "services ready"
        );

        if let Some(session) = self.resumed {
            services.auth.restore_session(session);
        } else if let Some(refresh_token) = &self.refresh_token {
            match services.auth.refresh_session(refresh_token).await {
                Ok(session) => tracing::debug!(user_id = %session.user_id, "session refreshed"),
                Err(e) => tracing::warn!(error = %e, "session refresh failed"),
            }
        }

        let resolver = if self.resume_only {
            IdentityResolver::resume_only()
        } else {
            IdentityResolver::new(self.config.initial_auth_token.as_deref())
        };
        let watch = resolver.watch(services.auth.as_ref());
        let identity = resolver.resolve(services.auth.as_ref()).await;
        if identity.source == Some(IdentitySource::LocalRandom) {
            notifier.warning("Sign-in failed; using a local identity. Data may not sync.");
        }

        AppContext::ready(app_id, services, resolver.state_cell(), watch, notifier)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::auth::{SessionProvider, SignInOutcome};
    use crate::config::lookup_from;
    use rstest::rstest;

    fn memory_factory(auth: MemoryAuth) -> MemoryFactory {
        MemoryFactory::new(Rc::new(MemoryStore::new()), Rc::new(auth))
    }

    #[rstest]
    #[case::empty("{}")]
    #[case::no_key(r#"{"projectId":"p","appId":"a"}"#)]
    #[case::no_project(r#"{"apiKey":"k","appId":"a"}"#)]
    #[case::no_app(r#"{"apiKey":"k","projectId":"p"}"#)]
    #[case::blank_key(r#"{"apiKey":" ","projectId":"p","appId":"a"}"#)]
    #[case::malformed("{apiKey")]
    #[tokio::test]
    async fn test_incomplete_config_is_not_ready(#[case] raw: &str) {
        let config = Config::from_lookup(lookup_from(&[("FIREBASE_CONFIG", raw)]));
        let registry = ServiceRegistry::new();
        let factory = memory_factory(MemoryAuth::new());

        let ctx = Bootstrap::new(&config, &registry, &factory).initialize().await;

        assert!(!ctx.is_firebase_services_ready());
        assert!(ctx.diagnostic().is_some());
        assert_eq!(registry.constructions(), 0);
    }

    #[tokio::test]
    async fn test_empty_environment_renders_degraded() {
        let store = Rc::new(MemoryStore::new());
        let ctx = degraded_context(&store).await;

        assert!(!ctx.is_firebase_services_ready());
        assert!(!ctx.is_auth_ready());
        assert!(ctx.user_id().is_none());
        assert_eq!(store.operations(), 0);
    }

    #[tokio::test]
    async fn test_oversized_notification_ttl_does_not_panic() {
        let config = Config::from_lookup(lookup_from(&[("NOTIFICATION_TTL_SECONDS", "99999999999999")]));
        let registry = ServiceRegistry::new();
        let factory = memory_factory(MemoryAuth::new());

        let ctx = Bootstrap::new(&config, &registry, &factory).initialize().await;

        assert!(!ctx.is_firebase_services_ready());
        assert_eq!(ctx.notifier().active().len(), 1);
    }

    #[tokio::test]
    async fn test_initialize_twice_reuses_handle() {
        let config = valid_config();
        let registry = ServiceRegistry::new();
        let factory = memory_factory(MemoryAuth::new());

        let first = Bootstrap::new(&config, &registry, &factory).initialize().await;
        let handle = registry.handle().expect("handle built");
        let second = Bootstrap::new(&config, &registry, &factory).initialize().await;

        assert_eq!(registry.constructions(), 1);
        assert!(Rc::ptr_eq(&handle, &registry.handle().expect("still there")));
        assert!(first.is_firebase_services_ready() && second.is_firebase_services_ready());
    }

    #[tokio::test]
    async fn test_construction_failure_is_not_ready() {
        let registry = ServiceRegistry::new();
        let factory = memory_factory(MemoryAuth::new()).failing("quota exceeded");

        let ctx = Bootstrap::new(&valid_config(), &registry, &factory).initialize().await;

        assert!(!ctx.is_firebase_services_ready());
        assert!(ctx.diagnostic().is_some_and(|d| d.contains("quota exceeded")));
        assert!(registry.handle().is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_token_used_first() {
        let config = Config::from_lookup(lookup_from(&[
            ("FIREBASE_CONFIG", VALID_CONNECTION),
            ("INITIAL_AUTH_TOKEN", "canvas-token"),
        ]));
        let auth = MemoryAuth::new().with_custom_token(SignInOutcome::Succeed("token-user".into()));
        let registry = ServiceRegistry::new();
        let factory = memory_factory(auth);

        let ctx = Bootstrap::new(&config, &registry, &factory).initialize().await;

        assert_eq!(ctx.user_id().as_deref(), Some("token-user"));
        assert_eq!(ctx.identity().source, Some(IdentitySource::CustomToken));
    }

    #[tokio::test]
    async fn test_token_failure_falls_back_to_anonymous() {
        let config = Config::from_lookup(lookup_from(&[
            ("FIREBASE_CONFIG", VALID_CONNECTION),
            ("INITIAL_AUTH_TOKEN", "expired-token"),
        ]));
        let auth = MemoryAuth::new()
            .with_custom_token(SignInOutcome::Fail("TOKEN_EXPIRED".into()))
            .with_anonymous(SignInOutcome::Succeed("abc123".into()));
        let registry = ServiceRegistry::new();
        let factory = memory_factory(auth);

        let ctx = Bootstrap::new(&config, &registry, &factory).initialize().await;

        assert!(ctx.is_firebase_services_ready());
        assert!(ctx.is_auth_ready());
        assert_eq!(ctx.user_id().as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn test_both_sign_ins_fail_still_resolves() {
        let auth = MemoryAuth::new().with_anonymous(SignInOutcome::Fail("ADMIN_ONLY_OPERATION".into()));
        let registry = ServiceRegistry::new();
        let factory = memory_factory(auth);

        let ctx = Bootstrap::new(&valid_config(), &registry, &factory).initialize().await;

        let user_id = ctx.user_id().expect("fallback id");
        assert!(uuid::Uuid::parse_str(&user_id).is_ok());
        assert!(ctx.is_auth_ready());
        assert!(ctx.session().is_none());
    }

    #[tokio::test]
    async fn test_resumed_session_skips_sign_in() {
        let auth = Rc::new(MemoryAuth::new());
        let factory = MemoryFactory::new(Rc::new(MemoryStore::new()), Rc::clone(&auth));
        let registry = ServiceRegistry::new();
        let session = Session {
            user_id: "returning".into(),
            id_token: Some("t".into()),
            refresh_token: None,
            expires_at: None,
            provider: SessionProvider::Resumed,
        };

        let ctx = Bootstrap::new(&valid_config(), &registry, &factory)
            .with_resumed_session(Some(session))
            .initialize()
            .await;

        assert_eq!(ctx.user_id().as_deref(), Some("returning"));
        assert_eq!(ctx.identity().source, Some(IdentitySource::ExistingSession));
        assert_eq!(auth.attempts(), 0);
    }

    #[tokio::test]
    async fn test_refresh_token_keeps_user() {
        let auth = Rc::new(
            MemoryAuth::new()
                .with_refresh(SignInOutcome::Succeed("returning".into()))
                .with_anonymous(SignInOutcome::Succeed("someone-else".into())),
        );
        let factory = MemoryFactory::new(Rc::new(MemoryStore::new()), Rc::clone(&auth));
        let registry = ServiceRegistry::new();

        let ctx = Bootstrap::new(&valid_config(), &registry, &factory)
            .with_refresh_token(Some("refresh-1".into()))
            .initialize()
            .await;

        assert_eq!(ctx.user_id().as_deref(), Some("returning"));
        assert_eq!(ctx.identity().source, Some(IdentitySource::ExistingSession));
        assert_eq!(ctx.session().map(|s| s.provider), Some(SessionProvider::Refreshed));
        assert_eq!(auth.attempts(), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_in_resume_only_never_signs_in() {
        let auth = Rc::new(MemoryAuth::new().with_anonymous(SignInOutcome::Succeed("someone-else".into())));
        let factory = MemoryFactory::new(Rc::new(MemoryStore::new()), Rc::clone(&auth));
        let registry = ServiceRegistry::new();

        let ctx = Bootstrap::new(&valid_config(), &registry, &factory)
            .with_refresh_token(Some("revoked".into()))
            .resume_only()
            .initialize()
            .await;

        assert_eq!(ctx.identity().source, Some(IdentitySource::LocalRandom));
        assert_ne!(ctx.user_id().as_deref(), Some("someone-else"));
        assert_eq!(auth.attempts(), 1);
    }
}
