// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


// Channel event bus
//
// Fans records out to any number of independent subscriptions per channel.
// Every subscription owns an unbounded queue, so a slow consumer never
// drops or reorders records and never blocks the publisher.
//
// The subscriber list of a channel is locked while the cache is updated
// and the record is queued, and also while a new subscriber reads the
// cache for replay. This makes "replay latest, then live" gap-free and
// duplicate-free for late subscribers.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::cache::LatestValueCache;
use crate::protocol::Record;

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<Arc<Record>>,
}

type SubscriberMap = DashMap<String, Vec<Subscriber>>;

pub struct ChannelBus {
    cache: Arc<LatestValueCache>,
    subscribers: Arc<SubscriberMap>,
    next_id: AtomicU64,
}

impl ChannelBus {
    pub fn new(cache: Arc<LatestValueCache>) -> Self {
        Self {
            cache,
            subscribers: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn cache(&self) -> &Arc<LatestValueCache> {
        &self.cache
    }

    /// Store `record` as the latest value of its channel, then queue it to
    /// every live subscription of that channel.
    pub fn publish(&self, record: Record) {
        let record = Arc::new(record);
        let mut subscribers = self.subscribers.entry(record.name.clone()).or_default();
        self.cache.set(record.clone());
        subscribers.retain(|s| s.tx.send(record.clone()).is_ok());
    }

    /// Subscribe to a channel. The cached latest value, if any, is the first
    /// item produced.
    pub fn subscribe(&self, channel: &str) -> Subscription {
        self.attach(channel, true)
    }

    /// Subscribe to records published from now on, without replaying the
    /// cached value.
    pub fn subscribe_live(&self, channel: &str) -> Subscription {
        self.attach(channel, false)
    }

    fn attach(&self, channel: &str, replay: bool) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut subscribers = self.subscribers.entry(channel.to_string()).or_default();
        if replay {
            if let Some(latest) = self.cache.get(channel) {
                // receiver is alive, cannot fail
                let _ = tx.send(latest);
            }
        }
        subscribers.push(Subscriber { id, tx });
        drop(subscribers);

        debug!("New subscription {} on channel '{}'", id, channel);

        Subscription {
            id,
            channel: channel.to_string(),
            rx,
            subscribers: Arc::downgrade(&self.subscribers),
            cancelled: false,
        }
    }

    /// Number of live subscriptions on a channel
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.subscribers
            .get(channel)
            .map(|subs| subs.iter().filter(|s| !s.tx.is_closed()).count())
            .unwrap_or(0)
    }
}

/// A cancellable, ordered sequence of records for one channel.
///
/// Dropping a subscription cancels it.
pub struct Subscription {
    id: u64,
    channel: String,
    rx: mpsc::UnboundedReceiver<Arc<Record>>,
    subscribers: std::sync::Weak<SubscriberMap>,
    cancelled: bool,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next record, or `None` once the subscription is cancelled and
    /// drained.
    pub async fn recv(&mut self) -> Option<Arc<Record>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<Record>> {
        self.rx.try_recv().ok()
    }

    /// Stop delivery to this subscription only. Records already queued can
    /// still be drained with `recv`.
    pub fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        self.rx.close();
        if let Some(subscribers) = self.subscribers.upgrade() {
            if let Some(mut subs) = subscribers.get_mut(&self.channel) {
                subs.retain(|s| s.id != self.id);
            }
        }
        debug!("Subscription {} on '{}' cancelled", self.id, self.channel);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("cancelled", &self.cancelled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Field, FieldValue};

    fn sample(channel: &str, n: i64) -> Record {
        Record::new(channel, vec![Field::new("n", FieldValue::Integer(n))])
    }

    fn bus() -> ChannelBus {
        ChannelBus::new(Arc::new(LatestValueCache::new()))
    }

    #[tokio::test]
    async fn test_publish_updates_cache_first() {
        let bus = bus();
        let mut sub = bus.subscribe("A");
        bus.publish(sample("A", 1));

        let received = sub.recv().await.unwrap();
        assert_eq!(bus.cache().get("A").unwrap(), received);
    }

    #[tokio::test]
    async fn test_cancel_removes_only_that_subscription() {
        let bus = bus();
        let mut first = bus.subscribe("A");
        let mut second = bus.subscribe("A");
        assert_eq!(bus.subscriber_count("A"), 2);

        first.cancel();
        assert_eq!(bus.subscriber_count("A"), 1);

        bus.publish(sample("A", 1));
        assert!(first.recv().await.is_none());
        assert_eq!(*second.recv().await.unwrap(), sample("A", 1));
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let bus = bus();
        {
            let _sub = bus.subscribe("A");
            assert_eq!(bus.subscriber_count("A"), 1);
        }
        assert_eq!(bus.subscriber_count("A"), 0);
    }

    #[tokio::test]
    async fn test_live_subscription_skips_cached_value() {
        let bus = bus();
        bus.publish(sample("A", 1));
        let mut live = bus.subscribe_live("A");
        assert!(live.try_recv().is_none());
        bus.publish(sample("A", 2));
        assert_eq!(*live.recv().await.unwrap(), sample("A", 2));
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let bus = bus();
        let mut a = bus.subscribe("A");
        bus.publish(sample("B", 1));
        bus.publish(sample("A", 2));
        assert_eq!(*a.recv().await.unwrap(), sample("A", 2));
        assert!(a.try_recv().is_none());
    }
}
