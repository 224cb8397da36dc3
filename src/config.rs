//! Configuration management for the dashboard
//!
//! Everything is read once at process start. Connection settings for the
//! document database come from a `FIREBASE_CONFIG` JSON blob, falling back to
//! the legacy one-variable-per-field layout.

use serde::{Deserialize, Serialize};
use worker::Env;

use crate::error::{DashboardError, Result};

const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:10000";
const DEFAULT_APP_ID: &str = "default-app-id";
/// Upper bound for the market polling interval
pub const MAX_MARKET_POLL_SECONDS: u64 = 3600;
/// Upper bound for the notification lifetime
pub const MAX_NOTIFICATION_TTL_SECONDS: u64 = 300;

/// Fields needed to address the remote document database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub auth_domain: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub storage_bucket: Option<String>,
    #[serde(default)]
    pub messaging_sender_id: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,
}

impl ConnectionConfig {
    /// Parse the JSON blob emitted by the Firebase console
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| DashboardError::Config(format!("FIREBASE_CONFIG is not valid JSON: {e}")))
    }

    /// Key, project id and app id must all be present and non-empty
    pub fn is_valid(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Names of the required fields that are absent or blank
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        for (name, value) in [
            ("apiKey", &self.api_key),
            ("projectId", &self.project_id),
            ("appId", &self.app_id),
        ] {
            if value.as_deref().is_none_or(|v| v.trim().is_empty()) {
                missing.push(name);
            }
        }
        missing
    }

    pub fn api_key(&self) -> &str {
        self.api_key.as_deref().unwrap_or_default()
    }

    pub fn project_id(&self) -> &str {
        self.project_id.as_deref().unwrap_or_default()
    }

    /// Legacy layout: one variable per field, with the `NEXT_PUBLIC_` spelling
    /// accepted as well
    fn from_fields(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let field = |name: &str| {
            lookup(&format!("FIREBASE_{name}"))
                .or_else(|| lookup(&format!("NEXT_PUBLIC_FIREBASE_{name}")))
                .filter(|v| !v.trim().is_empty())
        };
        Self {
            api_key: field("API_KEY"),
            auth_domain: field("AUTH_DOMAIN"),
            project_id: field("PROJECT_ID"),
            storage_bucket: field("STORAGE_BUCKET"),
            messaging_sender_id: field("MESSAGING_SENDER_ID"),
            app_id: field("APP_ID"),
        }
    }
}

/// Dashboard configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Environment (production, staging, development)
    pub environment: String,

    /// Log level
    pub log_level: String,

    /// Base URL of the chat/analysis backend
    pub backend_base_url: String,

    /// Namespace segment for persisted data
    pub app_id: String,

    /// Bootstrap token for custom-token sign-in
    pub initial_auth_token: Option<String>,

    /// Market overview polling interval
    pub market_poll_seconds: u64,

    /// Notification auto-dismiss interval
    pub notification_ttl_seconds: u64,

    /// Parsed connection settings, or the reason they could not be parsed
    connection: std::result::Result<ConnectionConfig, String>,
}

impl Config {
    /// Load configuration from Cloudflare environment variables and secrets
    pub fn from_env(env: &Env) -> Self {
        Self::from_lookup(|key| {
            env.var(key)
                .map(|v| v.to_string())
                .or_else(|_| env.secret(key).map(|v| v.to_string()))
                .ok()
        })
    }

    /// Build configuration from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let first = |keys: &[&str]| keys.iter().find_map(|k| lookup(k)).filter(|v| !v.is_empty());

        let connection = match lookup("FIREBASE_CONFIG").filter(|v| !v.trim().is_empty()) {
            Some(raw) => ConnectionConfig::from_json(&raw).map_err(|e| e.to_string()),
            None => Ok(ConnectionConfig::from_fields(&lookup)),
        };

        Self {
            environment: first(&["ENVIRONMENT"]).unwrap_or_else(|| "production".to_string()),

            log_level: first(&["LOG_LEVEL"]).unwrap_or_else(|| "info".to_string()),

            backend_base_url: first(&["BACKEND_BASE_URL", "NEXT_PUBLIC_BACKEND_BASE_URL"])
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string()),

            app_id: first(&["APP_ID", "NEXT_PUBLIC_APP_ID"])
                .unwrap_or_else(|| DEFAULT_APP_ID.to_string()),

            initial_auth_token: first(&["INITIAL_AUTH_TOKEN"]),

            market_poll_seconds: first(&["MARKET_POLL_SECONDS"])
                .map(|v| v.parse().unwrap_or(10))
                .unwrap_or(10)
                .min(MAX_MARKET_POLL_SECONDS),

            notification_ttl_seconds: first(&["NOTIFICATION_TTL_SECONDS"])
                .map(|v| v.parse().unwrap_or(5))
                .unwrap_or(5)
                .min(MAX_NOTIFICATION_TTL_SECONDS),

            connection,
        }
    }

    /// Connection settings, or a configuration error if they are malformed
    /// or incomplete
    pub fn connection(&self) -> Result<&ConnectionConfig> {
        let connection = self.connection.as_ref().map_err(|e| DashboardError::Config(e.clone()))?;
        let missing = connection.missing_fields();
        if !missing.is_empty() {
            return Err(DashboardError::Config(format!(
                "connection config incomplete, missing: {}",
                missing.join(", ")
            )));
        }
        Ok(connection)
    }

    /// Validate the non-connection settings
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_MARKET_POLL_SECONDS).contains(&self.market_poll_seconds) {
            return Err(DashboardError::Config(format!(
                "market_poll_seconds must be between 1 and {MAX_MARKET_POLL_SECONDS}"
            )));
        }
        if !(1..=MAX_NOTIFICATION_TTL_SECONDS).contains(&self.notification_ttl_seconds) {
            return Err(DashboardError::Config(format!(
                "notification_ttl_seconds must be between 1 and {MAX_NOTIFICATION_TTL_SECONDS}"
            )));
        }
        if !(self.backend_base_url.starts_with("http://") || self.backend_base_url.starts_with("https://")) {
            return Err(DashboardError::Config("backend_base_url must be an absolute http(s) URL".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
    let map: std::collections::HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| map.get(key).cloned()
}
