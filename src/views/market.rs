//! Market overview panel

use std::time::Duration;

use crate::backend::{BackendApi, MarketOverview, MarketQuote};
use crate::notify::Notifier;

/// Instruments shown when the backend cannot be reached
const PLACEHOLDER_SYMBOLS: [&str; 3] = ["BTC/USD", "ETH/USD", "EUR/USD"];

pub struct MarketPanel<'a> {
    backend: &'a dyn BackendApi,
    notifier: Notifier,
    poll_interval: Duration,
    overview: MarketOverview,
}

impl<'a> MarketPanel<'a> {
    pub fn new(backend: &'a dyn BackendApi, notifier: Notifier, poll_seconds: u64) -> Self {
        Self {
            backend,
            notifier,
            poll_interval: Duration::from_secs(poll_seconds),
            overview: Self::placeholder(),
        }
    }

    /// Overview with every figure unknown
    pub fn placeholder() -> MarketOverview {
        MarketOverview {
            instruments: PLACEHOLDER_SYMBOLS
                .iter()
                .map(|symbol| MarketQuote {
                    symbol: (*symbol).to_string(),
                    price: None,
                    change_24h: None,
                })
                .collect(),
            sentiment: Some("N/A".to_string()),
            updated_at: None,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn overview(&self) -> &MarketOverview {
        &self.overview
    }

    /// Fetch a fresh overview, falling back to placeholders on failure
    pub async fn refresh(&mut self) -> &MarketOverview {
        self.overview = match self.backend.market_overview().await {
            Ok(overview) => overview,
            Err(e) => {
                self.notifier.raise_error(&e);
                Self::placeholder()
            }
        };
        &self.overview
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::StubBackend;
    use crate::notify::NotificationLevel;

    #[test]
    fn test_placeholder_is_all_unknown() {
        let overview = MarketPanel::placeholder();
        assert_eq!(overview.instruments.len(), 3);
        assert!(overview.instruments.iter().all(|q| q.price.is_none() && q.change_24h.is_none()));
    }

    #[test]
    fn test_poll_interval() {
        let backend = StubBackend::default();
        let panel = MarketPanel::new(&backend, Notifier::new(5), 10);
        assert_eq!(panel.poll_interval(), Duration::from_secs(10));
        assert_eq!(panel.overview().sentiment.as_deref(), Some("N/A"));
    }

    #[tokio::test]
    async fn test_refresh_shows_backend_overview() {
        let backend = StubBackend {
            overview: Some(MarketOverview {
                instruments: vec![MarketQuote {
                    symbol: "BTC/USD".into(),
                    price: Some(64_250.5),
                    change_24h: Some(-1.2),
                }],
                sentiment: Some("Risk-off".into()),
                updated_at: Some("2026-10-17T09:00:00.000Z".into()),
            }),
            ..StubBackend::default()
        };
        let notifier = Notifier::new(5);
        let mut panel = MarketPanel::new(&backend, notifier.clone(), 10);

        let overview = panel.refresh().await;
        assert_eq!(overview.instruments[0].price, Some(64_250.5));
        assert_eq!(overview.sentiment.as_deref(), Some("Risk-off"));
        assert!(notifier.active().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_refresh_falls_back_to_placeholder() {
        let backend = StubBackend {
            retry_after: Some(30),
            ..StubBackend::default()
        };
        let notifier = Notifier::new(5);
        let mut panel = MarketPanel::new(&backend, notifier.clone(), 10);

        assert_eq!(panel.refresh().await, &MarketPanel::placeholder());
        let active = notifier.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].level, NotificationLevel::Error);
        assert!(active[0].message.contains("retry in 30s"));
    }
}
