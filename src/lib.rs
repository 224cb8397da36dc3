//! Aura Dashboard Worker - trading dashboard backend for Cloudflare Workers
//!
//! Serves the Aura dashboard shell and the JSON API behind it. Every
//! request bootstraps its own application context: connection config, one
//! service handle (document store + auth), and a resolved identity under
//! which all user data is namespaced.
//!
//! # Architecture
//! - `bootstrap`/`identity`: service handle construction and identity
//!   resolution (token, then anonymous, then a local random id)
//! - `context`: readiness-gated, per-user CRUD/query/subscribe primitives
//! - `store`/`auth`: Firestore and Identity Toolkit REST adapters, plus
//!   in-process doubles
//! - `views`: chat, journal, settings, analysis, market overview
//! - `dashboard`: the web shell

// Clippy configuration for worker code patterns
#![allow(clippy::cast_precision_loss)] // Float casts OK for display
#![allow(clippy::doc_markdown)] // Doc style flexibility
#![allow(clippy::needless_pass_by_value)] // Worker framework patterns
#![allow(clippy::future_not_send)] // Single-threaded runtime
#![allow(clippy::map_unwrap_or)] // Explicit error handling preference

mod auth;
mod backend;
mod bootstrap;
mod config;
mod context;
mod dashboard;
mod error;
mod identity;
mod listener;
mod logging;
mod notify;
mod store;
mod types;
mod views;

use serde::Serialize;
use serde::de::DeserializeOwned;
use worker::{Context, Env, Request, Response, RouteContext, Router, event};

pub use auth::{AuthHandle, IdentityToolkitAuth, MemoryAuth, Session, SessionProvider, SignInOutcome};
pub use backend::{AnalysisRequest, AnalysisResult, BackendApi, BackendClient, MarketOverview, MarketQuote};
pub use bootstrap::{
    Bootstrap, FirebaseRestFactory, MemoryFactory, ServiceFactory, ServiceHandle, ServiceRegistry,
};
pub use config::{Config, ConnectionConfig};
pub use context::{AppContext, ReadinessState};
pub use dashboard::ShellState;
pub use error::{DashboardError, ErrorKind, Result};
pub use identity::{IdentityPhase, IdentityResolver, IdentitySource, IdentityState, IdentityStrategy};
pub use listener::{ListenerRegistry, Subscription};
pub use logging::ConsoleLayer;
pub use notify::{Notification, NotificationLevel, Notifier};
pub use store::{
    CollectionPath, Direction, Document, DocumentPath, DocumentStore, Fields, FirestoreStore,
    MemoryStore, Query,
};
pub use types::*;
pub use views::{
    AnalysisService, ChatExchange, ChatService, JournalSummary, LiveQuery, MarketPanel, MessageFeed,
    SettingsService, TIMEFRAMES, TradeInput, TradeJournal,
};

/// Result type alias for worker operations
type WResult<T> = std::result::Result<T, worker::Error>;

/// Main Worker entry point
#[event(fetch)]
async fn fetch(req: Request, env: Env, _ctx: Context) -> WResult<Response> {
    console_error_panic_hook::set_once();

    let config = Config::from_env(&env);
    logging::init(&config);
    if let Err(e) = config.validate() {
        tracing::warn!(error = %e, "configuration has invalid values");
    }

    let router = Router::with_data(config);

    router
        // Health check
        .get("/health", |_req, ctx| {
            let config = &ctx.data;
            Response::from_json(&HealthResponse {
                status: "healthy",
                version: env!("CARGO_PKG_VERSION"),
                environment: config.environment.clone(),
                firebase_configured: config.connection().is_ok(),
                timestamp: timestamp_now(),
            })
        })
        // Dashboard UI
        .get("/", |_req, ctx| render_shell(&ctx.data))
        .get("/dashboard", |_req, ctx| render_shell(&ctx.data))
        // Resolve identity for the page
        .post_async("/api/session", |req, ctx| async move {
            respond(open_session(&req, &ctx.data).await)
        })
        // Market overview, placeholders on failure
        .get_async("/api/market", |_req, ctx| async move {
            respond(Ok(market_overview(&ctx.data).await))
        })
        // Chat
        .get_async("/api/chat/sessions", |req, ctx| async move {
            respond(list_chat_sessions(&req, &ctx.data).await)
        })
        .post_async("/api/chat/sessions", |mut req, ctx| async move {
            respond(create_chat_session(&mut req, &ctx.data).await)
        })
        .get_async("/api/chat/sessions/:id/messages", |req, ctx| async move {
            respond(list_chat_messages(&req, &ctx).await)
        })
        .post_async("/api/chat/sessions/:id/messages", |mut req, ctx| async move {
            respond(send_chat_message(&mut req, &ctx).await)
        })
        // Analysis
        .post_async("/api/analysis", |mut req, ctx| async move {
            respond(request_analysis(&mut req, &ctx.data).await)
        })
        // Trade journal
        .get_async("/api/trades", |req, ctx| async move {
            respond(list_trades(&req, &ctx.data).await)
        })
        .post_async("/api/trades", |mut req, ctx| async move {
            respond(add_trade(&mut req, &ctx.data).await)
        })
        .put_async("/api/trades/:id", |mut req, ctx| async move {
            respond(update_trade(&mut req, &ctx).await)
        })
        .delete_async("/api/trades/:id", |req, ctx| async move {
            respond(delete_trade(&req, &ctx).await)
        })
        // Settings
        .get_async("/api/settings", |req, ctx| async move {
            respond(load_settings(&req, &ctx.data).await)
        })
        .put_async("/api/settings", |mut req, ctx| async move {
            respond(save_settings(&mut req, &ctx.data).await)
        })
        .run(req, env)
        .await
}

fn render_shell(config: &Config) -> WResult<Response> {
    Response::from_html(dashboard::dashboard_html(&ShellState::initial(config), config))
}

/// JSON body for a failed request
#[derive(Serialize)]
struct ErrorBody {
    error: bool,
    message: String,
    kind: &'static str,
}

fn status_for(err: &DashboardError) -> u16 {
    match err {
        DashboardError::NotFound(_) => 404,
        DashboardError::RateLimit(_) => 429,
        _ => match err.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::Authentication => 401,
            ErrorKind::Configuration | ErrorKind::NotReady => 503,
            ErrorKind::Network => 502,
            ErrorKind::Internal => 500,
        },
    }
}

fn error_response(err: &DashboardError) -> WResult<Response> {
    let status = status_for(err);
    if status >= 500 {
        tracing::error!(kind = err.kind().as_str(), error = %err, "request failed");
    } else {
        tracing::warn!(kind = err.kind().as_str(), error = %err, "request rejected");
    }
    Ok(Response::from_json(&ErrorBody {
        error: true,
        message: err.user_message(),
        kind: err.kind().as_str(),
    })?
    .with_status(status))
}

fn respond<T: Serialize>(result: Result<T>) -> WResult<Response> {
    match result {
        Ok(body) => Response::from_json(&body),
        Err(e) => error_response(&e),
    }
}

async fn read_json<T: DeserializeOwned>(req: &mut Request) -> Result<T> {
    req.json()
        .await
        .map_err(|e| DashboardError::Validation(format!("Invalid request body: {e}")))
}

fn param<'a, D>(ctx: &'a RouteContext<D>, name: &str) -> Result<&'a str> {
    ctx.param(name)
        .map(String::as_str)
        .ok_or_else(|| DashboardError::Validation(format!("missing path parameter {name}")))
}

const REFRESH_TOKEN_HEADER: &str = "X-Refresh-Token";

/// Credentials the page sends back: `Authorization: Bearer <idToken>` and
/// the refresh token in `X-Refresh-Token`
#[derive(Debug, Default)]
struct Credentials {
    session: Option<Session>,
    refresh_token: Option<String>,
}

impl Credentials {
    /// An expired id token is dropped when a refresh token can replace it
    fn parse(authorization: Option<&str>, refresh_token: Option<&str>, now: chrono::DateTime<chrono::Utc>) -> Result<Self> {
        let refresh_token = refresh_token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        let bearer = authorization
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty());

        let session = match bearer.map(|token| Session::from_id_token(token, now)) {
            None => None,
            Some(Ok(mut session)) => {
                session.refresh_token.clone_from(&refresh_token);
                Some(session)
            }
            Some(Err(e)) if refresh_token.is_some() => {
                tracing::debug!(error = %e, "id token unusable; refreshing");
                None
            }
            Some(Err(e)) => return Err(e),
        };
        Ok(Self { session, refresh_token })
    }

    fn from_request(req: &Request) -> Result<Self> {
        let headers = req.headers();
        let authorization = headers.get("Authorization")?;
        let refresh_token = headers.get(REFRESH_TOKEN_HEADER)?;
        Self::parse(authorization.as_deref(), refresh_token.as_deref(), chrono::Utc::now())
    }

    fn is_empty(&self) -> bool {
        self.session.is_none() && self.refresh_token.is_none()
    }
}

async fn bootstrap(config: &Config, credentials: Credentials, resume_only: bool) -> AppContext {
    let registry = ServiceRegistry::new();
    let factory = FirebaseRestFactory::new();
    let bootstrap = Bootstrap::new(config, &registry, &factory)
        .with_resumed_session(credentials.session)
        .with_refresh_token(credentials.refresh_token);
    if resume_only {
        bootstrap.resume_only().initialize().await
    } else {
        bootstrap.initialize().await
    }
}

/// Only a resumed or refreshed session may touch user data
fn require_session(ctx: AppContext) -> Result<AppContext> {
    if ctx.is_firebase_services_ready() && ctx.identity().source != Some(IdentitySource::ExistingSession) {
        return Err(DashboardError::Auth("session could not be resumed".into()));
    }
    Ok(ctx)
}

/// Context for a data route; the caller must already hold a session
async fn user_context(req: &Request, config: &Config) -> Result<AppContext> {
    let credentials = Credentials::from_request(req)?;
    if credentials.is_empty() {
        return Err(DashboardError::Auth("no session; call /api/session first".into()));
    }
    require_session(bootstrap(config, credentials, true).await)
}

async fn open_session(req: &Request, config: &Config) -> Result<SessionResponse> {
    let ctx = bootstrap(config, Credentials::from_request(req)?, false).await;
    let readiness = ctx.readiness();
    tracing::info!(
        services_ready = readiness.is_firebase_services_ready,
        auth_ready = readiness.is_auth_ready,
        source = ?readiness.source,
        "session opened"
    );
    Ok(SessionResponse {
        shell: ShellState::from_context(&ctx),
        session: ctx.session(),
        notifications: ctx.notifier().active(),
        readiness,
    })
}

#[derive(Serialize)]
struct MarketResponse {
    overview: MarketOverview,
    poll_seconds: u64,
    notifications: Vec<Notification>,
}

async fn market_overview(config: &Config) -> MarketResponse {
    let backend = BackendClient::new(&config.backend_base_url);
    let notifier = Notifier::new(config.notification_ttl_seconds);
    let mut panel = MarketPanel::new(&backend, notifier.clone(), config.market_poll_seconds);
    let overview = panel.refresh().await.clone();
    MarketResponse {
        overview,
        poll_seconds: panel.poll_interval().as_secs(),
        notifications: notifier.active(),
    }
}

#[derive(serde::Deserialize)]
struct NewChatSession {
    #[serde(default)]
    name: String,
}

#[derive(serde::Deserialize)]
struct NewChatMessage {
    text: String,
}

async fn list_chat_sessions(req: &Request, config: &Config) -> Result<Vec<ChatSession>> {
    let ctx = user_context(req, config).await?;
    let backend = BackendClient::new(&config.backend_base_url);
    ChatService::new(&ctx, &backend).sessions().await
}

async fn create_chat_session(req: &mut Request, config: &Config) -> Result<ChatSession> {
    let body: NewChatSession = read_json(req).await?;
    let ctx = user_context(req, config).await?;
    let backend = BackendClient::new(&config.backend_base_url);
    ChatService::new(&ctx, &backend).create_session(&body.name).await
}

async fn list_chat_messages(req: &Request, route: &RouteContext<Config>) -> Result<Vec<ChatMessage>> {
    let session_id = param(route, "id")?;
    let ctx = user_context(req, &route.data).await?;
    let backend = BackendClient::new(&route.data.backend_base_url);
    let chat = ChatService::new(&ctx, &backend);

    let mut feed = MessageFeed::new();
    feed.select(&chat, session_id).await?;
    let messages = feed.messages();
    feed.close();
    Ok(messages)
}

async fn send_chat_message(req: &mut Request, route: &RouteContext<Config>) -> Result<ChatExchange> {
    let session_id = param(route, "id")?;
    let body: NewChatMessage = read_json(req).await?;
    let ctx = user_context(req, &route.data).await?;
    let backend = BackendClient::new(&route.data.backend_base_url);
    ChatService::new(&ctx, &backend).send_message(session_id, &body.text).await
}

#[derive(Serialize)]
struct AnalysisResponse {
    result: AnalysisResult,
    notifications: Vec<Notification>,
}

async fn request_analysis(req: &mut Request, config: &Config) -> Result<AnalysisResponse> {
    let request: AnalysisRequest = read_json(req).await?;
    let backend = BackendClient::new(&config.backend_base_url);
    let notifier = Notifier::new(config.notification_ttl_seconds);
    let result = AnalysisService::new(&notifier, &backend).request(&request).await;
    Ok(AnalysisResponse {
        result,
        notifications: notifier.active(),
    })
}

#[derive(Serialize)]
struct TradesResponse {
    trades: Vec<TradeLogEntry>,
    summary: JournalSummary,
}

async fn list_trades(req: &Request, config: &Config) -> Result<TradesResponse> {
    let ctx = user_context(req, config).await?;
    let trades = TradeJournal::new(&ctx).trades().await?;
    Ok(TradesResponse {
        summary: JournalSummary::from_entries(&trades),
        trades,
    })
}

async fn add_trade(req: &mut Request, config: &Config) -> Result<TradeLogEntry> {
    let input: TradeInput = read_json(req).await?;
    let ctx = user_context(req, config).await?;
    TradeJournal::new(&ctx).add(&input).await
}

async fn update_trade(req: &mut Request, route: &RouteContext<Config>) -> Result<TradeLogEntry> {
    let id = param(route, "id")?;
    let input: TradeInput = read_json(req).await?;
    let ctx = user_context(req, &route.data).await?;
    TradeJournal::new(&ctx).update(id, &input).await
}

async fn delete_trade(req: &Request, route: &RouteContext<Config>) -> Result<serde_json::Value> {
    let id = param(route, "id")?;
    let ctx = user_context(req, &route.data).await?;
    TradeJournal::new(&ctx).delete(id).await?;
    Ok(serde_json::json!({ "deleted": id }))
}

async fn load_settings(req: &Request, config: &Config) -> Result<UserSettings> {
    let ctx = user_context(req, config).await?;
    SettingsService::new(&ctx).load().await
}

async fn save_settings(req: &mut Request, config: &Config) -> Result<UserSettings> {
    let settings: UserSettings = read_json(req).await?;
    let ctx = user_context(req, config).await?;
    SettingsService::new(&ctx).save(&settings).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(DashboardError::Validation("bad".into()), 400)]
    #[case(DashboardError::Auth("expired".into()), 401)]
    #[case(DashboardError::NotReady("store".into()), 503)]
    #[case(DashboardError::Config("missing".into()), 503)]
    #[case(DashboardError::Network("reset".into()), 502)]
    #[case(DashboardError::RateLimit(3), 429)]
    #[case(DashboardError::NotFound("trade".into()), 404)]
    #[case(DashboardError::Worker("boom".into()), 500)]
    fn test_status_mapping(#[case] err: DashboardError, #[case] status: u16) {
        assert_eq!(status_for(&err), status);
    }

    fn token(user_id: &str, exp: i64) -> String {
        auth::fake_id_token(&serde_json::json!({ "user_id": user_id, "exp": exp }))
    }

    #[test]
    fn test_credentials_attach_refresh_token() {
        let now = chrono::Utc::now();
        let bearer = format!("Bearer {}", token("u1", now.timestamp() + 600));

        let credentials = Credentials::parse(Some(&bearer), Some("r1"), now).unwrap();
        let session = credentials.session.expect("live token resumes");
        assert_eq!(session.user_id, "u1");
        assert_eq!(session.refresh_token.as_deref(), Some("r1"));
    }

    #[test]
    fn test_expired_token_falls_back_to_refresh() {
        let now = chrono::Utc::now();
        let bearer = format!("Bearer {}", token("u1", now.timestamp() - 60));

        let credentials = Credentials::parse(Some(&bearer), Some("r1"), now).unwrap();
        assert!(credentials.session.is_none());
        assert_eq!(credentials.refresh_token.as_deref(), Some("r1"));

        let err = Credentials::parse(Some(&bearer), None, now).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[test]
    fn test_missing_credentials_are_empty() {
        let credentials = Credentials::parse(None, Some("  "), chrono::Utc::now()).unwrap();
        assert!(credentials.is_empty());
    }

    #[tokio::test]
    async fn test_data_routes_reject_unresumed_identity() {
        let store = std::rc::Rc::new(MemoryStore::new());
        let anonymous = bootstrap::testing::memory_context(&store, "fresh").await;
        assert!(require_session(anonymous).is_err());

        let degraded = bootstrap::testing::degraded_context(&store).await;
        assert!(require_session(degraded).is_ok());
    }
}
