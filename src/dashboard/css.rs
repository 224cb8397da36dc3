//! Dashboard CSS styles
//!
//! Styling for the dashboard shell. Uses CSS custom properties for
//! theming.

pub const STYLES: &str = r"
* { box-sizing: border-box; margin: 0; padding: 0; }

:root {
    --bg: #0d1117;
    --card: #161b22;
    --border: #30363d;
    --text: #c9d1d9;
    --text-dim: #8b949e;
    --green: #3fb950;
    --red: #f85149;
    --blue: #58a6ff;
    --yellow: #d29922;
    --purple: #a371f7;
}

body {
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
    background: var(--bg);
    color: var(--text);
    min-height: 100vh;
}

/* Header */
header {
    display: flex;
    justify-content: space-between;
    align-items: center;
    margin-bottom: 24px;
    padding: 16px 0;
    border-bottom: 1px solid var(--border);
}

h1 { font-size: 24px; font-weight: 600; }

.header-controls {
    display: flex;
    align-items: center;
    gap: 12px;
}

.refresh-time { font-size: 12px; color: var(--text-dim); }

/* Sidebar Layout */
.layout { display: flex; min-height: 100vh; }

.sidebar {
    width: 220px;
    flex-shrink: 0;
    border-right: 1px solid var(--border);
    padding: 20px 16px;
}

.brand { font-size: 20px; font-weight: 600; margin-bottom: 24px; color: var(--purple); }

.nav-link {
    display: block;
    padding: 8px 12px;
    border-radius: 6px;
    color: var(--text);
    text-decoration: none;
    font-size: 14px;
}

.nav-link:hover { background: var(--card); }
.nav-link.active { background: var(--card); color: var(--purple); }

.main { flex: 1; padding: 0 24px; }

.user-label { font-size: 13px; color: var(--text-dim); }

/* Read-only Banner */
.banner {
    background: rgba(210, 153, 34, 0.15);
    color: var(--yellow);
    border-radius: 8px;
    padding: 10px 14px;
    margin-bottom: 16px;
    font-size: 13px;
}

.hidden { display: none; }

/* Notifications */
.notifications {
    position: fixed;
    top: 16px;
    right: 16px;
    z-index: 50;
    display: flex;
    flex-direction: column;
    gap: 8px;
}

.notification {
    min-width: 240px;
    padding: 10px 14px;
    border-radius: 8px;
    color: #fff;
    font-size: 13px;
    display: flex;
    justify-content: space-between;
    align-items: center;
}

.notification-success { background: #238636; }
.notification-error { background: #da3633; }
.notification-warning { background: #9e6a03; }
.notification-info { background: #1f6feb; }

.notification-close {
    background: none;
    border: none;
    color: rgba(255, 255, 255, 0.7);
    margin-left: 12px;
    cursor: pointer;
    font-size: 16px;
}

/* Grid Layout */
.grid {
    display: grid;
    grid-template-columns: repeat(auto-fit, minmax(300px, 1fr));
    gap: 16px;
}

.wide { grid-column: 1 / -1; }

/* Cards */
.card {
    background: var(--card);
    border: 1px solid var(--border);
    border-radius: 12px;
    padding: 20px;
}

.card-header {
    display: flex;
    justify-content: space-between;
    align-items: center;
    margin-bottom: 16px;
}

.card-title {
    font-size: 14px;
    color: var(--text-dim);
    text-transform: uppercase;
    letter-spacing: 0.5px;
}

.sentiment { font-size: 12px; color: var(--text-dim); }
.placeholder { font-size: 13px; color: var(--text-dim); }

/* Colors */
.positive { color: var(--green); }
.negative { color: var(--red); }
.neutral { color: var(--text-dim); }

/* Market Grid */
.scan-grid {
    display: grid;
    grid-template-columns: repeat(auto-fill, minmax(140px, 1fr));
    gap: 10px;
    margin-top: 12px;
}

.scan-item {
    background: rgba(255, 255, 255, 0.03);
    border-radius: 8px;
    padding: 12px;
    text-align: center;
}

.scan-symbol { font-weight: 600; font-size: 14px; }

.scan-price { font-size: 13px; color: var(--text-dim); margin-top: 6px; }
.scan-change { font-size: 12px; margin-top: 2px; }

/* Responsive */
@media (max-width: 600px) {
    .grid { grid-template-columns: 1fr; }
    .layout { flex-direction: column; }
    .sidebar { width: 100%; border-right: none; border-bottom: 1px solid var(--border); }
    header { flex-direction: column; gap: 12px; }
}
";
