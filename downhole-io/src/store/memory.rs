//! In-process shared store

use super::{Message, SharedStore, Subscription};
use crate::error::Result;
use crossbeam_channel::{Sender, unbounded};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Sending end kept per subscriber; `alive` dies with the [`Subscription`]
struct Subscriber {
    tx: Sender<Message>,
    alive: Weak<()>,
}

impl Subscriber {
    fn is_alive(&self) -> bool {
        self.alive.strong_count() > 0
    }
}

/// Lock-protected map plus per-topic subscriber channels
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
    topics: Mutex<HashMap<String, Vec<Subscriber>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live subscribers of `topic`; dropped subscriptions are pruned
    pub fn subscriber_count(&self, topic: &str) -> usize {
        let mut topics = self.topics.lock();
        let Some(subscribers) = topics.get_mut(topic) else {
            return 0;
        };
        subscribers.retain(Subscriber::is_alive);
        let live = subscribers.len();
        if live == 0 {
            topics.remove(topic);
        }
        live
    }
}

impl SharedStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn publish(&self, topic: &str, payload: &str) -> Result<usize> {
        let mut topics = self.topics.lock();
        let Some(subscribers) = topics.get_mut(topic) else {
            return Ok(0);
        };
        let msg = Message {
            topic: topic.to_string(),
            payload: payload.to_string(),
        };
        // Dropped subscriptions are pruned here
        subscribers.retain(|s| s.is_alive() && s.tx.send(msg.clone()).is_ok());
        let reached = subscribers.len();
        if subscribers.is_empty() {
            topics.remove(topic);
        }
        Ok(reached)
    }

    fn subscribe(&self, topic: &str) -> Result<Subscription> {
        let (tx, rx) = unbounded();
        let token = Arc::new(());
        self.topics
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(Subscriber {
                tx,
                alive: Arc::downgrade(&token),
            });
        log::debug!("New subscriber on '{}'", topic);
        Ok(Subscription::new(topic, rx, token))
    }
}
