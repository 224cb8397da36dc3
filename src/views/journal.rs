//! Trade journal
//!
//! Form input arrives as strings and is validated into numbers before any
//! store call, so a malformed price never costs a round trip.

use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::error::{DashboardError, Result};
use crate::store::{Direction, decode_all, to_fields};
use crate::types::{TRADE_LOGS, TradeLogEntry, timestamp_now};

/// Raw trade form
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeInput {
    pub instrument: String,
    pub entry_price: String,
    pub exit_price: String,
    pub volume: String,
    #[serde(default)]
    pub journal: Option<String>,
}

fn parse_positive(label: &str, raw: &str) -> Result<f64> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| DashboardError::Validation(format!("{label} must be a number")))?;
    if !value.is_finite() || value <= 0.0 {
        return Err(DashboardError::Validation(format!("{label} must be greater than zero")));
    }
    Ok(value)
}

impl TradeInput {
    /// Validate into an entry stamped with `timestamp`
    pub fn validate(&self, timestamp: String) -> Result<TradeLogEntry> {
        let instrument = self.instrument.trim();
        if instrument.is_empty() {
            return Err(DashboardError::Validation("Instrument is required".into()));
        }
        let entry_price = parse_positive("Entry price", &self.entry_price)?;
        let exit_price = parse_positive("Exit price", &self.exit_price)?;
        let volume = parse_positive("Volume", &self.volume)?;

        Ok(TradeLogEntry {
            id: String::new(),
            instrument: instrument.to_uppercase(),
            entry_price,
            exit_price,
            volume,
            profit_loss: (exit_price - entry_price) * volume,
            journal: self
                .journal
                .as_deref()
                .map(str::trim)
                .filter(|j| !j.is_empty())
                .map(str::to_string),
            timestamp,
        })
    }
}

/// Aggregate figures over a set of entries
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JournalSummary {
    pub count: usize,
    pub wins: usize,
    pub total_profit_loss: f64,
    /// Percent of entries with positive P/L
    pub win_rate: f64,
}

impl JournalSummary {
    pub fn from_entries(entries: &[TradeLogEntry]) -> Self {
        let count = entries.len();
        let wins = entries.iter().filter(|e| e.is_win()).count();
        let total_profit_loss = entries.iter().map(|e| e.profit_loss).sum();
        let win_rate = if count > 0 {
            wins as f64 / count as f64 * 100.0
        } else {
            0.0
        };
        Self {
            count,
            wins,
            total_profit_loss,
            win_rate,
        }
    }
}

pub struct TradeJournal<'a> {
    ctx: &'a AppContext,
}

impl<'a> TradeJournal<'a> {
    pub fn new(ctx: &'a AppContext) -> Self {
        Self { ctx }
    }

    pub async fn add(&self, input: &TradeInput) -> Result<TradeLogEntry> {
        let mut entry = input.validate(timestamp_now())?;
        entry.id = self.ctx.add_document(TRADE_LOGS, to_fields(&entry)?).await?;
        self.ctx
            .notifier()
            .success(format!("Logged {} trade.", entry.instrument));
        Ok(entry)
    }

    /// Replace the figures of an existing entry; its timestamp is kept
    pub async fn update(&self, id: &str, input: &TradeInput) -> Result<TradeLogEntry> {
        let mut entry = input.validate(String::new())?;
        let mut fields = to_fields(&entry)?;
        fields.remove("timestamp");
        if entry.journal.is_none() {
            fields.insert("journal".into(), serde_json::Value::Null);
        }

        let path = format!("{TRADE_LOGS}/{id}");
        self.ctx.update_document(&path, fields).await?;
        entry.id = id.to_string();
        if let Some(stored) = self.ctx.get_document(&path).await? {
            entry.timestamp = stored.decode::<TradeLogEntry>()?.timestamp;
        }
        Ok(entry)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.ctx.delete_document(&format!("{TRADE_LOGS}/{id}")).await?;
        self.ctx.notifier().info("Trade removed from the journal.");
        Ok(())
    }

    /// Newest first; entries that no longer decode are skipped
    pub async fn trades(&self) -> Result<Vec<TradeLogEntry>> {
        let docs = self
            .ctx
            .query(TRADE_LOGS, |q| q.order_by("timestamp", Direction::Descending))
            .await?;
        Ok(decode_all(&docs))
    }

    pub async fn summary(&self) -> Result<JournalSummary> {
        Ok(JournalSummary::from_entries(&self.trades().await?))
    }
}
