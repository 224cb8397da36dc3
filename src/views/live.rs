//! Keyed live subscription
//!
//! At most one subscription is alive per owner. Re-keying tears the old one
//! down before subscribing again; dropping the owner tears it down.

use std::future::Future;

use crate::error::Result;
use crate::listener::Subscription;

pub struct LiveQuery<K> {
    key: Option<K>,
    subscription: Option<Subscription>,
}

impl<K> Default for LiveQuery<K> {
    fn default() -> Self {
        Self {
            key: None,
            subscription: None,
        }
    }
}

impl<K: PartialEq> LiveQuery<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_some()
    }

    /// Subscribe for `key`. Returns false when already subscribed to it.
    pub async fn bind<F, Fut>(&mut self, key: K, subscribe: F) -> Result<bool>
    where
        F: FnOnce(&K) -> Fut,
        Fut: Future<Output = Result<Subscription>>,
    {
        if self.is_active() && self.key.as_ref() == Some(&key) {
            return Ok(false);
        }
        self.clear();

        let subscription = subscribe(&key).await?;
        self.key = Some(key);
        self.subscription = Some(subscription);
        Ok(true)
    }

    /// Tear down the current subscription, if any
    pub fn clear(&mut self) {
        self.key = None;
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Counters {
        subscribed: Cell<u32>,
        torn_down: Cell<u32>,
    }

    fn counted(counters: &Rc<Counters>) -> impl Future<Output = Result<Subscription>> + use<> {
        counters.subscribed.set(counters.subscribed.get() + 1);
        let counters = Rc::clone(counters);
        async move {
            Ok(Subscription::new(move || {
                counters.torn_down.set(counters.torn_down.get() + 1);
            }))
        }
    }

    #[tokio::test]
    async fn test_unmount_tears_down_once() {
        let counters = Rc::new(Counters::default());
        {
            let mut live = LiveQuery::new();
            assert!(live.bind("s1", |_| counted(&counters)).await.unwrap());
            assert_eq!(counters.subscribed.get(), 1);
        }
        assert_eq!(counters.torn_down.get(), 1);

        // remount
        let mut live = LiveQuery::new();
        live.bind("s1", |_| counted(&counters)).await.unwrap();
        assert_eq!(counters.subscribed.get(), 2);
        assert_eq!(counters.torn_down.get(), 1);
    }

    #[tokio::test]
    async fn test_rekey_replaces_subscription() {
        let counters = Rc::new(Counters::default());
        let mut live = LiveQuery::new();

        live.bind("s1", |_| counted(&counters)).await.unwrap();
        assert!(!live.bind("s1", |_| counted(&counters)).await.unwrap());
        live.bind("s2", |_| counted(&counters)).await.unwrap();

        assert_eq!(counters.subscribed.get(), 2);
        assert_eq!(counters.torn_down.get(), 1);
        assert_eq!(live.key(), Some(&"s2"));

        live.clear();
        assert!(!live.is_active());
        assert_eq!(counters.torn_down.get(), 2);
    }
}
