//! Shared application context
//!
//! Views get the store only through the primitives here. Each primitive is
//! gated on readiness and takes a path relative to the signed-in user;
//! everything lands under `artifacts/{app_id}/users/{user_id}/`.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use crate::auth::Session;
use crate::bootstrap::ServiceHandle;
use crate::error::{DashboardError, Result};
use crate::identity::{IdentityPhase, IdentitySource, IdentityState};
use crate::listener::Subscription;
use crate::notify::Notifier;
use crate::store::{
    CollectionPath, Document, DocumentPath, DocumentStore, Fields, Query, SnapshotListener,
};

/// Readiness flags and identity, as reported to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadinessState {
    pub is_firebase_services_ready: bool,
    pub is_auth_ready: bool,
    pub user_id: Option<String>,
    pub phase: IdentityPhase,
    pub source: Option<IdentitySource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

pub struct AppContext {
    app_id: String,
    services: Option<Rc<ServiceHandle>>,
    identity: Rc<RefCell<IdentityState>>,
    notifier: Notifier,
    diagnostic: Option<String>,
    _auth_watch: Option<Subscription>,
}

impl AppContext {
    pub(crate) fn ready(
        app_id: String,
        services: Rc<ServiceHandle>,
        identity: Rc<RefCell<IdentityState>>,
        auth_watch: Subscription,
        notifier: Notifier,
    ) -> Self {
        Self {
            app_id,
            services: Some(services),
            identity,
            notifier,
            diagnostic: None,
            _auth_watch: Some(auth_watch),
        }
    }

    pub(crate) fn degraded(app_id: String, notifier: Notifier, diagnostic: String) -> Self {
        Self {
            app_id,
            services: None,
            identity: Rc::default(),
            notifier,
            diagnostic: Some(diagnostic),
            _auth_watch: None,
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn is_firebase_services_ready(&self) -> bool {
        self.services.is_some()
    }

    pub fn is_auth_ready(&self) -> bool {
        self.identity.borrow().is_auth_ready
    }

    pub fn user_id(&self) -> Option<String> {
        self.identity.borrow().user_id.clone()
    }

    pub fn identity(&self) -> IdentityState {
        self.identity.borrow().clone()
    }

    /// Why the services are not ready, if they are not
    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }

    pub fn readiness(&self) -> ReadinessState {
        let identity = self.identity();
        ReadinessState {
            is_firebase_services_ready: self.is_firebase_services_ready(),
            is_auth_ready: identity.is_auth_ready,
            user_id: identity.user_id,
            phase: identity.phase,
            source: identity.source,
            diagnostic: self.diagnostic.clone(),
        }
    }

    /// The live session behind the identity, if any
    pub fn session(&self) -> Option<Session> {
        self.services.as_ref().and_then(|s| s.auth.current_session())
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Store and user id, or `NotReady` plus a warning
    fn gate(&self) -> Result<(&dyn DocumentStore, String)> {
        let Some(services) = &self.services else {
            self.notifier.warning("Database is not ready yet. Changes are disabled.");
            return Err(DashboardError::NotReady("document store not initialized".into()));
        };
        let Some(user_id) = self.user_id() else {
            self.notifier.warning("Still signing in. Please wait.");
            return Err(DashboardError::NotReady("identity not resolved".into()));
        };
        Ok((services.store.as_ref(), user_id))
    }

    fn user_root(&self, user_id: &str) -> Result<DocumentPath> {
        if user_id.contains('/') {
            return Err(DashboardError::Validation(format!("invalid user id: {user_id:?}")));
        }
        DocumentPath::parse(&format!("artifacts/{}/users/{user_id}", self.app_id))
    }

    /// Namespaced collection path for the current user
    pub fn user_collection(&self, relative: &str) -> Result<CollectionPath> {
        let user_id = self
            .user_id()
            .ok_or_else(|| DashboardError::NotReady("identity not resolved".into()))?;
        self.namespaced_collection(&user_id, relative)
    }

    /// Namespaced document path for the current user
    pub fn user_document(&self, relative: &str) -> Result<DocumentPath> {
        let user_id = self
            .user_id()
            .ok_or_else(|| DashboardError::NotReady("identity not resolved".into()))?;
        self.namespaced_document(&user_id, relative)
    }

    fn namespaced_collection(&self, user_id: &str, relative: &str) -> Result<CollectionPath> {
        CollectionPath::parse(&format!("{}/{}", self.user_root(user_id)?, relative.trim_matches('/')))
    }

    fn namespaced_document(&self, user_id: &str, relative: &str) -> Result<DocumentPath> {
        DocumentPath::parse(&format!("{}/{}", self.user_root(user_id)?, relative.trim_matches('/')))
    }

    /// Create a document with a generated id; returns the id
    pub async fn add_document(&self, collection: &str, fields: Fields) -> Result<String> {
        let (store, user_id) = self.gate()?;
        let collection = self.namespaced_collection(&user_id, collection)?;
        let path = store.add_document(&collection, fields).await?;
        Ok(path.id().to_string())
    }

    pub async fn set_document(&self, document: &str, fields: Fields, merge: bool) -> Result<()> {
        let (store, user_id) = self.gate()?;
        let path = self.namespaced_document(&user_id, document)?;
        store.set_document(&path, fields, merge).await
    }

    pub async fn update_document(&self, document: &str, fields: Fields) -> Result<()> {
        let (store, user_id) = self.gate()?;
        let path = self.namespaced_document(&user_id, document)?;
        store.update_document(&path, fields).await
    }

    pub async fn delete_document(&self, document: &str) -> Result<()> {
        let (store, user_id) = self.gate()?;
        let path = self.namespaced_document(&user_id, document)?;
        store.delete_document(&path).await
    }

    pub async fn get_document(&self, document: &str) -> Result<Option<Document>> {
        let (store, user_id) = self.gate()?;
        let path = self.namespaced_document(&user_id, document)?;
        store.get_document(&path).await
    }

    /// One-shot query; `shape` adds ordering and limits
    pub async fn query(&self, collection: &str, shape: impl FnOnce(Query) -> Query) -> Result<Vec<Document>> {
        let (store, user_id) = self.gate()?;
        let query = shape(Query::new(self.namespaced_collection(&user_id, collection)?));
        store.query(&query).await
    }

    /// Live query; the returned subscription tears it down
    pub async fn subscribe(
        &self,
        collection: &str,
        shape: impl FnOnce(Query) -> Query,
        listener: Rc<SnapshotListener>,
    ) -> Result<Subscription> {
        let (store, user_id) = self.gate()?;
        let query = shape(Query::new(self.namespaced_collection(&user_id, collection)?));
        store.subscribe(query, listener).await
    }

    /// Turn a failure into a notification
    pub fn report<T>(&self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(DashboardError::NotReady(reason)) => {
                // the gate already warned
                tracing::debug!(%reason, "store call skipped");
                None
            }
            Err(e) => {
                self.notifier.raise_error(&e);
                None
            }
        }
    }
}
