//! Common types for the dashboard
//!
//! Persisted records and API payloads shared across views.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Session;
use crate::context::ReadinessState;
use crate::dashboard::ShellState;
use crate::notify::Notification;

/// Collection of chat sessions, relative to the user root
pub const CHAT_SESSIONS: &str = "chatSessions";
/// Message sub-collection under each chat session
pub const MESSAGES: &str = "messages";
/// Trade journal entries
pub const TRADE_LOGS: &str = "tradeLogs";
/// The one settings document per user
pub const SETTINGS_DOC: &str = "settings/profile";

/// RFC 3339 with millisecond precision and a `Z` suffix, so timestamps sort
/// lexicographically
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn timestamp_now() -> String {
    format_timestamp(Utc::now())
}

/// A chat conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub created_at: String,
    #[serde(default)]
    pub last_message: Option<String>,
}

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    /// Role name in the backend's history format
    pub fn role(self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Voice,
    Analysis,
}

/// One message in a chat session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub id: String,
    pub sender: Sender,
    pub text: String,
    pub timestamp: String,
    #[serde(rename = "type", default)]
    pub kind: MessageType,
}

/// A journaled trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeLogEntry {
    #[serde(default)]
    pub id: String,
    pub instrument: String,
    pub entry_price: f64,
    pub exit_price: f64,
    pub volume: f64,
    pub profit_loss: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    pub timestamp: String,
}

impl TradeLogEntry {
    pub fn is_win(&self) -> bool {
        self.profit_loss > 0.0
    }
}

/// Per-user preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    pub default_symbol: String,
    pub default_timeframe: String,
    /// Percent of account risked per trade
    pub risk_per_trade: f64,
    pub notifications_enabled: bool,
    pub theme: String,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            default_symbol: "BTC/USD".to_string(),
            default_timeframe: "1h".to_string(),
            risk_per_trade: 1.0,
            notifications_enabled: true,
            theme: "dark".to_string(),
        }
    }
}

/// `POST /api/session` response
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub readiness: ReadinessState,
    pub shell: ShellState,
    /// Session the client should keep and send back as a bearer token
    pub session: Option<Session>,
    pub notifications: Vec<Notification>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub environment: String,
    pub firebase_configured: bool,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamps_sort_lexicographically() {
        let early = Utc.with_ymd_and_hms(2024, 9, 1, 9, 5, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 10, 1, 10, 0, 0).unwrap();
        assert_eq!(format_timestamp(early), "2024-09-01T09:05:00.000Z");
        assert!(format_timestamp(early) < format_timestamp(late));
    }

    #[test]
    fn test_message_type_field_name() {
        let message = ChatMessage {
            id: String::new(),
            sender: Sender::Assistant,
            text: "Support near 1.0850".into(),
            timestamp: "2024-09-01T09:05:00.000Z".into(),
            kind: MessageType::Analysis,
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "analysis");
        assert_eq!(json["sender"], "assistant");
    }

    #[test]
    fn test_settings_fill_missing_fields() {
        let settings: UserSettings = serde_json::from_str(r#"{"theme":"light"}"#).unwrap();
        assert_eq!(settings.theme, "light");
        assert_eq!(settings.default_symbol, "BTC/USD");
        assert!(settings.notifications_enabled);
    }
}
