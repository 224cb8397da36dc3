//! Dashboard JavaScript
//!
//! Client-side logic for the shell:
//! - Resolve the session once on load, keeping the id and refresh tokens in
//!   localStorage
//! - Poll the market overview
//! - Show auto-dismissing notifications
//!
//! `CONFIG` is emitted by the page template.

pub const SCRIPT: &str = r##"
// ============================================================================
// State
// ============================================================================
const TOKEN_KEY = 'aura.idToken';
const REFRESH_KEY = 'aura.refreshToken';
let lastUpdate = null;

// ============================================================================
// API Functions
// ============================================================================
function authHeaders() {
    const headers = {};
    const token = localStorage.getItem(TOKEN_KEY);
    const refresh = localStorage.getItem(REFRESH_KEY);
    if (token) headers['Authorization'] = 'Bearer ' + token;
    if (refresh) headers['X-Refresh-Token'] = refresh;
    return headers;
}

function forgetSession() {
    localStorage.removeItem(TOKEN_KEY);
    localStorage.removeItem(REFRESH_KEY);
}

function escapeHtml(value) {
    return String(value ?? '').replace(/[&<>"']/g, c => ({
        '&': '&amp;', '<': '&lt;', '>': '&gt;', '"': '&quot;', "'": '&#39;'
    })[c]);
}

async function fetchJSON(endpoint, options = {}) {
    try {
        const res = await fetch(CONFIG.apiBase + endpoint, {
            ...options,
            headers: { 'Content-Type': 'application/json', ...authHeaders(), ...(options.headers || {}) }
        });
        return await res.json();
    } catch (e) {
        console.error(`Error fetching ${endpoint}:`, e);
        return null;
    }
}

// ============================================================================
// Notifications
// ============================================================================
function notify(level, message) {
    const area = document.getElementById('notifications');
    const item = document.createElement('div');
    item.className = 'notification notification-' + level;
    item.textContent = message;

    const close = document.createElement('button');
    close.className = 'notification-close';
    close.textContent = '×';
    close.onclick = () => item.remove();
    item.appendChild(close);

    area.appendChild(item);
    setTimeout(() => item.remove(), CONFIG.notificationTtl);
}

function showNotifications(list) {
    (list || []).forEach(n => notify(n.level, n.message));
}

// ============================================================================
// Session
// ============================================================================
async function resolveSession() {
    const data = await fetchJSON('/api/session', { method: 'POST', body: '{}' });
    if (!data) {
        notify('error', 'Could not reach the dashboard service.');
        return;
    }
    if (data.error) {
        // stale tokens: forget them and start over once
        if (data.kind === 'authentication' && (localStorage.getItem(TOKEN_KEY) || localStorage.getItem(REFRESH_KEY))) {
            forgetSession();
            return resolveSession();
        }
        notify('error', data.message);
        return;
    }

    if (data.session && data.session.id_token) {
        localStorage.setItem(TOKEN_KEY, data.session.id_token);
    }
    if (data.session && data.session.refresh_token) {
        localStorage.setItem(REFRESH_KEY, data.session.refresh_token);
    }
    document.getElementById('userLabel').textContent = data.shell.user_label;
    if (data.shell.banner) {
        const banner = document.getElementById('banner');
        banner.textContent = data.shell.banner;
        banner.classList.remove('hidden');
    }
    showNotifications(data.notifications);
}

// ============================================================================
// Market Overview
// ============================================================================
function formatFigure(value, suffix = '') {
    if (value == null || isNaN(value)) return 'N/A';
    return parseFloat(value).toFixed(2) + suffix;
}

function changeClass(value) {
    if (value == null) return 'neutral';
    if (value > 0) return 'positive';
    if (value < 0) return 'negative';
    return 'neutral';
}

function updateTimestamp() {
    lastUpdate = new Date();
    document.getElementById('refreshTime').textContent = 'Updated: ' + lastUpdate.toLocaleTimeString();
}

function updateMarket(data) {
    const grid = document.getElementById('marketGrid');
    if (!data || !data.overview) {
        grid.innerHTML = '<div class="scan-item"><span class="scan-symbol">N/A</span></div>';
        return;
    }

    const overview = data.overview;
    document.getElementById('sentiment').textContent = overview.sentiment || 'N/A';
    grid.innerHTML = overview.instruments.map(q => `<div class="scan-item">
            <div class="scan-symbol">${escapeHtml(q.symbol)}</div>
            <div class="scan-price">${formatFigure(q.price)}</div>
            <div class="scan-change ${changeClass(q.change_24h)}">${formatFigure(q.change_24h, '%')}</div>
        </div>`).join('');
    showNotifications(data.notifications);
}

async function refreshMarket() {
    updateMarket(await fetchJSON('/api/market'));
    updateTimestamp();
}

// ============================================================================
// Initialization
// ============================================================================
resolveSession();
refreshMarket();
setInterval(refreshMarket, CONFIG.marketPollInterval);
"##;
