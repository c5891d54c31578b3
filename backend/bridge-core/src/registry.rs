//! Topic-keyed delivery of unsolicited host pushes.
//!
//! Callbacks run synchronously on the dispatcher actor, in subscription order,
//! as the push is processed. Callbacks are cloned out of the lock before they
//! run, so a callback may itself subscribe or unsubscribe.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FormatResult};
use std::sync::{Arc, RwLock, Weak};

use log::trace;
use serde_json::Value;

type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    topics: HashMap<String, Vec<(u64, Callback)>>,
}

/// Registry of push listeners. Clones share the same listeners.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `topic`.
    ///
    /// The listener stays registered until [`Subscription::unsubscribe`] is
    /// called; dropping the handle does not remove it.
    pub fn subscribe<F>(&self, topic: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let topic = topic.into();
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());

        inner.next_id += 1;
        let id = inner.next_id;
        inner
            .topics
            .entry(topic.clone())
            .or_default()
            .push((id, Arc::new(callback)));

        Subscription {
            id,
            topic,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `payload` to every listener of `topic`.
    ///
    /// Returns how many listeners ran; unknown topics are ignored.
    pub fn publish(&self, topic: &str, payload: &Value) -> usize {
        let callbacks: Vec<Callback> = {
            let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
            match inner.topics.get(topic) {
                Some(listeners) => listeners.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
                None => Vec::new(),
            }
        };

        if callbacks.is_empty() {
            trace!("No listeners for topic '{}'", topic);
        }

        for callback in &callbacks {
            callback(payload);
        }

        callbacks.len()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.topics.get(topic).map_or(0, Vec::len)
    }
}

impl Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut topics: Vec<(&String, usize)> = inner
            .topics
            .iter()
            .map(|(topic, listeners)| (topic, listeners.len()))
            .collect();
        topics.sort();
        f.debug_struct("SubscriptionRegistry")
            .field("topics", &topics)
            .finish()
    }
}

/// Handle returned by [`SubscriptionRegistry::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    topic: String,
    registry: Weak<RwLock<RegistryInner>>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Remove the listener. Returns false if the registry is gone.
    pub fn unsubscribe(self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };

        let mut inner = registry.write().unwrap_or_else(|e| e.into_inner());
        let Some(listeners) = inner.topics.get_mut(&self.topic) else {
            return false;
        };

        let before = listeners.len();
        listeners.retain(|(id, _)| *id != self.id);
        let removed = listeners.len() != before;

        if listeners.is_empty() {
            inner.topics.remove(&self.topic);
        }

        removed
    }
}
