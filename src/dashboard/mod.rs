//! Dashboard module - Aura web shell
//!
//! Serves the single-page shell: sidebar, header with the user label,
//! notification area and the market overview panel. The page resolves its
//! identity through `POST /api/session` and polls `/api/market`.
//!
//! # Architecture
//! - `html.rs`: Page structure and layout
//! - `css.rs`: Styling with CSS custom properties
//! - `js.rs`: Session bootstrap, market polling, notifications

mod css;
mod html;
mod js;

use serde::Serialize;

use crate::config::Config;
use crate::context::AppContext;

const USER_ID_PREFIX_CHARS: usize = 8;

/// Header label and banner derived from the context
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShellState {
    pub user_label: String,
    pub read_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
}

/// `Loading...` until both flags are set, then a shortened user id
pub fn user_label(services_ready: bool, auth_ready: bool, user_id: Option<&str>) -> String {
    if !(services_ready && auth_ready) {
        return "Loading...".to_string();
    }
    match user_id {
        Some(id) if !id.is_empty() => {
            let prefix: String = id.chars().take(USER_ID_PREFIX_CHARS).collect();
            format!("{prefix}...")
        }
        _ => "N/A".to_string(),
    }
}

impl ShellState {
    pub fn from_context(ctx: &AppContext) -> Self {
        if !ctx.is_firebase_services_ready() {
            return Self::read_only();
        }
        Self {
            user_label: user_label(true, ctx.is_auth_ready(), ctx.user_id().as_deref()),
            read_only: false,
            banner: None,
        }
    }

    /// State before the page has resolved an identity
    pub fn initial(config: &Config) -> Self {
        if config.connection().is_err() {
            return Self::read_only();
        }
        Self {
            user_label: user_label(false, false, None),
            read_only: false,
            banner: None,
        }
    }

    fn read_only() -> Self {
        Self {
            user_label: "N/A".to_string(),
            read_only: true,
            banner: Some("Database is not configured. The dashboard is read-only.".to_string()),
        }
    }
}

/// Generate the complete dashboard HTML page
pub fn dashboard_html(shell: &ShellState, config: &Config) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Aura Trading Dashboard</title>
    <style>
{css}
    </style>
</head>
<body>
{html}
    <script>
const CONFIG = {{
    marketPollInterval: {poll_ms},
    notificationTtl: {ttl_ms},
    readOnly: {read_only},
    apiBase: ''
}};
{js}
    </script>
</body>
</html>"#,
        css = css::STYLES,
        html = html::render(shell),
        poll_ms = config.market_poll_seconds.saturating_mul(1000),
        ttl_ms = config.notification_ttl_seconds.saturating_mul(1000),
        read_only = shell.read_only,
        js = js::SCRIPT
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::testing::{degraded_context, memory_context, valid_config};
    use crate::store::MemoryStore;
    use rstest::rstest;
    use std::rc::Rc;

    #[rstest]
    #[case(false, true, Some("abcdefghijk"), "Loading...")]
    #[case(true, false, Some("abcdefghijk"), "Loading...")]
    #[case(true, true, Some("abcdefghijk"), "abcdefgh...")]
    #[case(true, true, Some("abc"), "abc...")]
    #[case(true, true, None, "N/A")]
    fn test_user_label(
        #[case] services_ready: bool,
        #[case] auth_ready: bool,
        #[case] user_id: Option<&str>,
        #[case] expected: &str,
    ) {
        assert_eq!(user_label(services_ready, auth_ready, user_id), expected);
    }

    #[tokio::test]
    async fn test_shell_from_context() {
        let store = Rc::new(MemoryStore::new());
        let ready = ShellState::from_context(&memory_context(&store, "trader-0042").await);
        assert_eq!(ready.user_label, "trader-0...");
        assert!(!ready.read_only);

        let degraded = ShellState::from_context(&degraded_context(&store).await);
        assert!(degraded.read_only);
        assert!(degraded.banner.is_some());
    }

    #[test]
    fn test_page_embeds_shell_and_config() {
        let config = valid_config();
        let page = dashboard_html(&ShellState::initial(&config), &config);
        assert!(page.contains("Aura Trading Dashboard"));
        assert!(page.contains("Loading..."));
        assert!(page.contains("marketPollInterval: 10000"));
        assert!(page.contains("readOnly: false"));
        assert!(page.contains("escapeHtml(q.symbol)"));
        assert!(page.contains("'X-Refresh-Token'"));
    }
}
