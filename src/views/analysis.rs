//! Technical analysis requests

use crate::backend::{AnalysisRequest, AnalysisResult, BackendApi};
use crate::error::{DashboardError, Result};
use crate::notify::Notifier;

/// Timeframes the backend understands
pub const TIMEFRAMES: [&str; 8] = ["1m", "5m", "15m", "30m", "1h", "4h", "1d", "1w"];

/// Needs no store access, so it works in read-only mode too
pub struct AnalysisService<'a> {
    notifier: &'a Notifier,
    backend: &'a dyn BackendApi,
}

impl<'a> AnalysisService<'a> {
    pub fn new(notifier: &'a Notifier, backend: &'a dyn BackendApi) -> Self {
        Self { notifier, backend }
    }

    /// Normalize and check a request before it leaves the worker
    pub fn validate(request: &AnalysisRequest) -> Result<AnalysisRequest> {
        let symbol = request.symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(DashboardError::Validation("Symbol is required".into()));
        }
        let timeframe = request.timeframe.trim().to_lowercase();
        if !TIMEFRAMES.contains(&timeframe.as_str()) {
            return Err(DashboardError::Validation(format!(
                "Timeframe must be one of {}",
                TIMEFRAMES.join(", ")
            )));
        }
        Ok(AnalysisRequest {
            symbol,
            timeframe,
            indicators: request
                .indicators
                .iter()
                .map(|i| i.trim().to_string())
                .filter(|i| !i.is_empty())
                .collect(),
            notes: request.notes.clone().filter(|n| !n.trim().is_empty()),
        })
    }

    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult> {
        let request = Self::validate(request)?;
        tracing::debug!(symbol = %request.symbol, timeframe = %request.timeframe, "requesting analysis");
        self.backend.analyze(&request).await
    }

    /// Like `analyze`, but a failure becomes a notification and an empty
    /// result
    pub async fn request(&self, request: &AnalysisRequest) -> AnalysisResult {
        match self.analyze(request).await {
            Ok(result) => result,
            Err(e) => {
                self.notifier.raise_error(&e);
                AnalysisResult {
                    symbol: request.symbol.clone(),
                    timeframe: request.timeframe.clone(),
                    summary: "N/A".to_string(),
                    ..AnalysisResult::default()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::StubBackend;
    use crate::error::ErrorKind;
    use crate::notify::NotificationLevel;

    fn request(symbol: &str, timeframe: &str) -> AnalysisRequest {
        AnalysisRequest {
            symbol: symbol.into(),
            timeframe: timeframe.into(),
            indicators: vec!["RSI".into(), " ".into()],
            notes: Some(String::new()),
        }
    }

    #[test]
    fn test_validate_normalizes() {
        let valid = AnalysisService::validate(&request(" eur/usd ", "4H")).unwrap();
        assert_eq!(valid.symbol, "EUR/USD");
        assert_eq!(valid.timeframe, "4h");
        assert_eq!(valid.indicators, vec!["RSI".to_string()]);
        assert!(valid.notes.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_timeframe() {
        assert!(AnalysisService::validate(&request("BTC/USD", "2h")).is_err());
        assert!(AnalysisService::validate(&request("", "1h")).is_err());
    }

    #[tokio::test]
    async fn test_invalid_request_yields_placeholder_and_warning() {
        let notifier = Notifier::new(5);
        let backend = StubBackend::default();

        let result = AnalysisService::new(&notifier, &backend).request(&request("BTC/USD", "2h")).await;

        assert_eq!(result.summary, "N/A");
        assert_eq!(result.symbol, "BTC/USD");
        assert_eq!(notifier.active()[0].level, NotificationLevel::Warning);
    }

    #[tokio::test]
    async fn test_analysis_result_passes_through() {
        let notifier = Notifier::new(5);
        let backend = StubBackend {
            analysis: Some(AnalysisResult {
                symbol: "EUR/USD".into(),
                timeframe: "4h".into(),
                summary: "Bullish divergence on RSI".into(),
                signal: Some("buy".into()),
                confidence: Some(0.72),
                ..AnalysisResult::default()
            }),
            ..StubBackend::default()
        };

        let result = AnalysisService::new(&notifier, &backend).request(&request("eur/usd", "4H")).await;

        assert_eq!(result.summary, "Bullish divergence on RSI");
        assert_eq!(result.signal.as_deref(), Some("buy"));
        assert!(notifier.active().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_analysis_is_an_error() {
        let notifier = Notifier::new(5);
        let backend = StubBackend {
            retry_after: Some(20),
            ..StubBackend::default()
        };
        let service = AnalysisService::new(&notifier, &backend);

        let err = service.analyze(&request("BTC/USD", "1h")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);

        let result = service.request(&request("BTC/USD", "1h")).await;
        assert_eq!(result.summary, "N/A");
        let active = notifier.active();
        assert_eq!(active[0].level, NotificationLevel::Error);
        assert!(active[0].message.contains("20s"));
    }
}
