//! Analysis backend REST client
//!
//! Implements the backend API for:
//! - Chat completion (conversation history + new message)
//! - Technical analysis (instrument, timeframe, parameters)
//! - Market overview (polled by the dashboard)
//!
//! Plain JSON request/response, no streaming, no automatic retry.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{DashboardError, Result};

/// One prior turn of the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: String,
    pub content: String,
}

/// Chat completion request
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub history: Vec<HistoryTurn>,
}

/// Chat completion response
#[derive(Debug, Deserialize)]
pub struct ChatReply {
    #[serde(alias = "reply", alias = "message")]
    pub response: String,
}

/// Analysis request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub symbol: String,
    pub timeframe: String,
    #[serde(default)]
    pub indicators: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Structured analysis result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisResult {
    pub symbol: String,
    pub timeframe: String,
    pub summary: String,
    pub signal: Option<String>,
    pub confidence: Option<f64>,
    pub support_levels: Vec<f64>,
    pub resistance_levels: Vec<f64>,
    pub indicators: serde_json::Map<String, serde_json::Value>,
}

/// Quote line in the market overview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketQuote {
    pub symbol: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub change_24h: Option<f64>,
}

/// Market overview
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketOverview {
    pub instruments: Vec<MarketQuote>,
    pub sentiment: Option<String>,
    pub updated_at: Option<String>,
}

/// Operations the views need from the analysis backend
#[async_trait(?Send)]
pub trait BackendApi {
    /// Ask the assistant
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply>;

    /// Request a technical analysis
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult>;

    /// Current market overview
    async fn market_overview(&self) -> Result<MarketOverview>;
}

/// Backend API client
pub struct BackendClient {
    base_url: String,
    http: reqwest::Client,
}

impl BackendClient {
    /// Create new client for the given base URL
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Perform GET request
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base_url);

        let response = self
            .http
            .get(&url)
            .header("Content-Type", "application/json")
            .send()
            .await?;

        handle_response(response).await
    }

    /// Perform POST request
    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{path}", self.base_url);

        let response = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        handle_response(response).await
    }
}

#[async_trait(?Send)]
impl BackendApi for BackendClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply> {
        self.post("/chat", request).await
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult> {
        self.post("/analyze", request).await
    }

    async fn market_overview(&self) -> Result<MarketOverview> {
        self.get("/market-overview").await
    }
}

/// Error for a rate-limited or missing resource; `None` for any other status
fn status_error(status: StatusCode, retry_after: Option<&str>, path: &str) -> Option<DashboardError> {
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            let seconds = retry_after.and_then(|v| v.trim().parse().ok()).unwrap_or(1);
            Some(DashboardError::RateLimit(seconds))
        }
        StatusCode::NOT_FOUND => Some(DashboardError::NotFound(path.to_string())),
        _ => None,
    }
}

/// Fail on rate limiting and non-success statuses, passing the response
/// through otherwise
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();

    let retry_after = response
        .headers()
        .get("Retry-After")
        .and_then(|v| v.to_str().ok());
    if let Some(err) = status_error(status, retry_after, response.url().path()) {
        return Err(err);
    }

    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".into());
        return Err(DashboardError::Backend {
            status: status.as_u16(),
            body,
        });
    }

    Ok(response)
}

/// Handle API response, checking for errors
pub(crate) async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let response = check_status(response).await?;
    response.json().await.map_err(DashboardError::from)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;

    use super::*;

    /// Canned backend; a `None` answer fails with a 503, `retry_after`
    /// rate-limits every call
    #[derive(Default)]
    pub(crate) struct StubBackend {
        pub reply: Option<String>,
        pub analysis: Option<AnalysisResult>,
        pub overview: Option<MarketOverview>,
        pub retry_after: Option<u64>,
        pub chats: RefCell<Vec<ChatRequest>>,
    }

    impl StubBackend {
        fn answer<T: Clone>(&self, value: Option<&T>) -> Result<T> {
            if let Some(seconds) = self.retry_after {
                return Err(DashboardError::RateLimit(seconds));
            }
            value.cloned().ok_or_else(|| DashboardError::Backend {
                status: 503,
                body: "unavailable".into(),
            })
        }
    }

    #[async_trait(?Send)]
    impl BackendApi for StubBackend {
        async fn chat(&self, request: &ChatRequest) -> Result<ChatReply> {
            self.chats.borrow_mut().push(request.clone());
            self.answer(self.reply.as_ref()).map(|response| ChatReply { response })
        }

        async fn analyze(&self, _request: &AnalysisRequest) -> Result<AnalysisResult> {
            self.answer(self.analysis.as_ref())
        }

        async fn market_overview(&self) -> Result<MarketOverview> {
            self.answer(self.overview.as_ref())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::retry_after(StatusCode::TOO_MANY_REQUESTS, Some("30"), Some(DashboardError::RateLimit(30)))]
    #[case::no_retry_after(StatusCode::TOO_MANY_REQUESTS, None, Some(DashboardError::RateLimit(1)))]
    #[case::http_date(StatusCode::TOO_MANY_REQUESTS, Some("Wed, 21 Oct 2026 07:28:00 GMT"), Some(DashboardError::RateLimit(1)))]
    #[case::missing(StatusCode::NOT_FOUND, None, Some(DashboardError::NotFound("/chat".into())))]
    #[case::server_error(StatusCode::BAD_GATEWAY, None, None)]
    #[case::ok(StatusCode::OK, Some("30"), None)]
    fn test_status_error(
        #[case] status: StatusCode,
        #[case] retry_after: Option<&str>,
        #[case] expected: Option<DashboardError>,
    ) {
        let actual = status_error(status, retry_after, "/chat");
        assert_eq!(actual.map(|e| e.to_string()), expected.map(|e| e.to_string()));
    }

    #[test]
    fn test_chat_request_serialization() {
        let request = ChatRequest {
            message: "Is EUR/USD oversold?".to_string(),
            history: vec![HistoryTurn {
                role: "user".into(),
                content: "hi".into(),
            }],
        };

        let json = serde_json::to_string(&request).expect("Request serialization should succeed");
        assert!(json.contains("EUR/USD"));
        assert!(json.contains("\"role\":\"user\""));
    }

    #[test]
    fn test_chat_reply_accepts_aliases() {
        let reply: ChatReply = serde_json::from_str(r#"{"reply":"hello"}"#).unwrap();
        assert_eq!(reply.response, "hello");
    }

    #[test]
    fn test_partial_analysis_result() {
        let result: AnalysisResult =
            serde_json::from_str(r#"{"symbol":"BTC/USD","summary":"range bound","support_levels":[60000.0]}"#)
                .unwrap();
        assert_eq!(result.symbol, "BTC/USD");
        assert!(result.signal.is_none());
        assert_eq!(result.support_levels, vec![60000.0]);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = BackendClient::new("https://backend.example.com/");
        assert_eq!(client.base_url(), "https://backend.example.com");
    }
}
