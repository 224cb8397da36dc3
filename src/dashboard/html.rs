//! Dashboard HTML template
//!
//! Contains the main page structure including:
//! - Sidebar with the view links
//! - Header with the user label
//! - Read-only banner and notification area
//! - Market overview panel

use super::ShellState;

/// Escape text for HTML element content
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn render(shell: &ShellState) -> String {
    let banner = shell
        .banner
        .as_deref()
        .map(|text| format!(r#"<div class="banner" id="banner">{}</div>"#, escape(text)))
        .unwrap_or_else(|| r#"<div class="banner hidden" id="banner"></div>"#.to_string());

    format!(
        r##"
    <div class="layout">
        <aside class="sidebar">
            <div class="brand">🤖 Aura Bot</div>
            <nav>
                <a class="nav-link active" href="#dashboard">Dashboard</a>
                <a class="nav-link" href="#chat">Chat</a>
                <a class="nav-link" href="#analysis">Analysis</a>
                <a class="nav-link" href="#journal">Journal</a>
                <a class="nav-link" href="#settings">Settings</a>
            </nav>
        </aside>

        <div class="main">
            <header>
                <h1>Aura Trading Dashboard</h1>
                <div class="header-controls">
                    <span class="refresh-time" id="refreshTime"></span>
                    <span class="user-label">User ID: <span id="userLabel">{user_label}</span></span>
                </div>
            </header>

            {banner}
            <div class="notifications" id="notifications"></div>

            <div class="grid">
                <!-- Market Overview -->
                <div class="card wide">
                    <div class="card-header">
                        <span class="card-title">📈 Market Overview</span>
                        <span class="sentiment" id="sentiment">N/A</span>
                    </div>
                    <div class="scan-grid" id="marketGrid">
                        <div class="scan-item"><span class="scan-symbol">Loading...</span></div>
                    </div>
                </div>

                <div class="card">
                    <div class="card-header"><span class="card-title">💬 Chat</span></div>
                    <p class="placeholder">Ask Aura about any instrument.</p>
                </div>

                <div class="card">
                    <div class="card-header"><span class="card-title">📓 Journal</span></div>
                    <p class="placeholder">Trades you log appear here.</p>
                </div>
            </div>
        </div>
    </div>
"##,
        user_label = escape(&shell.user_label),
        banner = banner,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_is_escaped() {
        let shell = ShellState {
            user_label: "<b>x".into(),
            read_only: true,
            banner: Some("read-only".into()),
        };
        let page = render(&shell);
        assert!(page.contains("&lt;b&gt;x"));
        assert!(page.contains(r#"<div class="banner" id="banner">read-only</div>"#));
    }
}
