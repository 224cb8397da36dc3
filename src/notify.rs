//! Transient user notifications
//!
//! Notifications auto-dismiss after a fixed interval; expired entries are
//! pruned whenever the active list is read.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::{DashboardError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub id: u64,
    pub level: NotificationLevel,
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

/// Shared notification queue; clones see the same queue
#[derive(Debug, Clone)]
pub struct Notifier {
    ttl: Duration,
    queue: Rc<RefCell<VecDeque<Notification>>>,
    next_id: Rc<Cell<u64>>,
}

impl Notifier {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            ttl: i64::try_from(ttl_seconds)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX),
            queue: Rc::default(),
            next_id: Rc::default(),
        }
    }

    pub fn raise(&self, level: NotificationLevel, message: impl Into<String>) -> u64 {
        self.raise_at(level, message, Utc::now())
    }

    pub fn raise_at(&self, level: NotificationLevel, message: impl Into<String>, now: DateTime<Utc>) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.queue.borrow_mut().push_back(Notification {
            id,
            level,
            message: message.into(),
            expires_at: now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        });
        id
    }

    pub fn success(&self, message: impl Into<String>) -> u64 {
        self.raise(NotificationLevel::Success, message)
    }

    pub fn info(&self, message: impl Into<String>) -> u64 {
        self.raise(NotificationLevel::Info, message)
    }

    pub fn warning(&self, message: impl Into<String>) -> u64 {
        self.raise(NotificationLevel::Warning, message)
    }

    /// Log the full error and surface its short message
    pub fn raise_error(&self, err: &DashboardError) -> u64 {
        let level = match err.kind() {
            ErrorKind::Validation | ErrorKind::NotReady => {
                tracing::warn!(kind = err.kind().as_str(), error = %err, "operation rejected");
                NotificationLevel::Warning
            }
            _ => {
                tracing::error!(kind = err.kind().as_str(), error = %err, "operation failed");
                NotificationLevel::Error
            }
        };
        self.raise(level, err.user_message())
    }

    pub fn dismiss(&self, id: u64) {
        self.queue.borrow_mut().retain(|n| n.id != id);
    }

    /// Unexpired notifications, oldest first
    pub fn active_at(&self, now: DateTime<Utc>) -> Vec<Notification> {
        let mut queue = self.queue.borrow_mut();
        queue.retain(|n| n.expires_at > now);
        queue.iter().cloned().collect()
    }

    pub fn active(&self) -> Vec<Notification> {
        self.active_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notifications_expire() {
        let notifier = Notifier::new(5);
        let now = Utc::now();
        notifier.raise_at(NotificationLevel::Info, "saved", now);
        notifier.raise_at(NotificationLevel::Error, "later", now + Duration::seconds(3));

        assert_eq!(notifier.active_at(now + Duration::seconds(4)).len(), 2);
        let left = notifier.active_at(now + Duration::seconds(6));
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].message, "later");
        assert!(notifier.active_at(now + Duration::seconds(9)).is_empty());
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let notifier = Notifier::new(u64::MAX);
        let now = Utc::now();
        notifier.raise_at(NotificationLevel::Warning, "read-only", now);
        let active = notifier.active_at(now);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].expires_at, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_error_levels_and_dismiss() {
        let notifier = Notifier::new(5);
        let shared = notifier.clone();
        let id = shared.raise_error(&DashboardError::Validation("Price must be a number".into()));
        notifier.raise_error(&DashboardError::Network("timeout".into()));

        let active = notifier.active();
        assert_eq!(active[0].level, NotificationLevel::Warning);
        assert_eq!(active[0].message, "Price must be a number");
        assert_eq!(active[1].level, NotificationLevel::Error);

        notifier.dismiss(id);
        assert_eq!(shared.active().len(), 1);
    }
}
