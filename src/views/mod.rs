//! Views over the shared context
//!
//! Each view performs request/response or subscribe/unsubscribe against the
//! context primitives and the analysis backend. None of them render.

mod analysis;
mod chat;
mod journal;
mod live;
mod market;
mod settings;

pub use analysis::{AnalysisService, TIMEFRAMES};
pub use chat::{ChatExchange, ChatService, MessageFeed};
pub use journal::{JournalSummary, TradeInput, TradeJournal};
pub use live::LiveQuery;
pub use market::MarketPanel;
pub use settings::SettingsService;
