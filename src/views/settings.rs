//! User settings
//!
//! One `settings/profile` document per identity. Loading a user with no
//! document yields the defaults; saving merges.

use super::analysis::TIMEFRAMES;
use crate::context::AppContext;
use crate::error::{DashboardError, Result};
use crate::store::to_fields;
use crate::types::{SETTINGS_DOC, UserSettings};

const THEMES: [&str; 2] = ["dark", "light"];

pub struct SettingsService<'a> {
    ctx: &'a AppContext,
}

impl<'a> SettingsService<'a> {
    pub fn new(ctx: &'a AppContext) -> Self {
        Self { ctx }
    }

    pub async fn load(&self) -> Result<UserSettings> {
        match self.ctx.get_document(SETTINGS_DOC).await? {
            Some(doc) => doc.decode(),
            None => Ok(UserSettings::default()),
        }
    }

    pub async fn save(&self, settings: &UserSettings) -> Result<UserSettings> {
        validate(settings)?;
        self.ctx
            .set_document(SETTINGS_DOC, to_fields(settings)?, true)
            .await?;
        self.ctx.notifier().success("Settings saved.");
        Ok(settings.clone())
    }
}

fn validate(settings: &UserSettings) -> Result<()> {
    if settings.default_symbol.trim().is_empty() {
        return Err(DashboardError::Validation("Default symbol is required".into()));
    }
    if !TIMEFRAMES.contains(&settings.default_timeframe.as_str()) {
        return Err(DashboardError::Validation(format!(
            "Unsupported timeframe: {}",
            settings.default_timeframe
        )));
    }
    if !(settings.risk_per_trade > 0.0 && settings.risk_per_trade <= 100.0) {
        return Err(DashboardError::Validation(
            "Risk per trade must be between 0 and 100 percent".into(),
        ));
    }
    if !THEMES.contains(&settings.theme.as_str()) {
        return Err(DashboardError::Validation(format!("Unknown theme: {}", settings.theme)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::testing::memory_context;
    use crate::store::MemoryStore;
    use std::rc::Rc;

    #[tokio::test]
    async fn test_defaults_then_saved_values() {
        let store = Rc::new(MemoryStore::new());
        let ctx = memory_context(&store, "alice").await;
        let service = SettingsService::new(&ctx);

        assert_eq!(service.load().await.unwrap(), UserSettings::default());

        let settings = UserSettings {
            default_symbol: "EUR/USD".into(),
            theme: "light".into(),
            ..UserSettings::default()
        };
        service.save(&settings).await.unwrap();
        assert_eq!(service.load().await.unwrap(), settings);
        assert_eq!(ctx.notifier().active()[0].message, "Settings saved.");
    }

    #[tokio::test]
    async fn test_invalid_settings_not_saved() {
        let store = Rc::new(MemoryStore::new());
        let ctx = memory_context(&store, "alice").await;
        let service = SettingsService::new(&ctx);
        let before = store.operations();

        let bad = UserSettings {
            risk_per_trade: 250.0,
            ..UserSettings::default()
        };
        assert!(matches!(service.save(&bad).await, Err(DashboardError::Validation(_))));
        let bad = UserSettings {
            default_timeframe: "2h".into(),
            ..UserSettings::default()
        };
        assert!(service.save(&bad).await.is_err());
        assert_eq!(store.operations(), before);
        assert!(ctx.notifier().active().is_empty());
    }
}
