//! Bounded outbound queue for messages sent while disconnected.

use std::{collections::VecDeque, pin::Pin, time::Duration};

use tokio::time::{Instant, Sleep, sleep_until};

use super::{pending::ResponseCallback, protocol::Payload};

/// A payload waiting for a connection, with the callback it was sent with.
pub struct CachedMessage {
    pub payload: Payload,
    pub callback: Option<ResponseCallback>,
}

impl CachedMessage {
    pub fn new(payload: Payload, callback: Option<ResponseCallback>) -> Self {
        Self { payload, callback }
    }
}

impl std::fmt::Debug for CachedMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedMessage")
            .field("payload", &self.payload)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// FIFO ring of cached messages with drop-oldest eviction.
#[derive(Debug)]
pub struct OutboundCache {
    items: VecDeque<CachedMessage>,
    capacity: usize,
}

impl OutboundCache {
    /// Create a cache holding at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append `item`, evicting and returning the oldest entry when full.
    pub fn push(&mut self, item: CachedMessage) -> Option<CachedMessage> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Move the current backlog into a paced [`Drain`].
    ///
    /// Items pushed afterwards stay in the cache for a later drain.
    pub fn drain_in_order(&mut self, interval: Duration) -> Drain {
        Drain::new(std::mem::take(&mut self.items), interval)
    }

    /// Put an interrupted drain's leftovers back in front of newer items.
    ///
    /// The capacity still holds; the oldest entries overflow and are returned.
    pub fn requeue_front(&mut self, remaining: VecDeque<CachedMessage>) -> Vec<CachedMessage> {
        let mut merged = remaining;
        merged.append(&mut self.items);

        let overflow = merged.len().saturating_sub(self.capacity);
        let evicted = merged.drain(..overflow).collect();
        self.items = merged;
        evicted
    }

    /// Remove every cached item.
    pub fn take_all(&mut self) -> VecDeque<CachedMessage> {
        std::mem::take(&mut self.items)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A paced replay of a cache snapshot.
///
/// The first item is yielded immediately, each later one `interval` after the
/// previous.
pub struct Drain {
    backlog: VecDeque<CachedMessage>,
    interval: Duration,
    timer: Option<Pin<Box<Sleep>>>,
}

impl Drain {
    fn new(backlog: VecDeque<CachedMessage>, interval: Duration) -> Self {
        Self {
            backlog,
            interval,
            timer: None,
        }
    }

    /// Wait for the next slot and return the next item, or `None` once the
    /// backlog is exhausted.
    pub async fn next(&mut self) -> Option<CachedMessage> {
        if self.backlog.is_empty() {
            return None;
        }
        if let Some(timer) = self.timer.as_mut() {
            timer.as_mut().await;
        }
        let item = self.backlog.pop_front()?;
        let deadline = Instant::now() + self.interval;
        match self.timer.as_mut() {
            Some(timer) => timer.as_mut().reset(deadline),
            None => self.timer = Some(Box::pin(sleep_until(deadline))),
        }
        Some(item)
    }

    /// Stop the drain and hand back the items it has not yielded.
    pub fn into_remaining(self) -> VecDeque<CachedMessage> {
        self.backlog
    }
}

impl std::fmt::Debug for Drain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Drain")
            .field("remaining", &self.backlog.len())
            .field("interval", &self.interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CachedMessage {
        CachedMessage::new(Payload::Text(s.to_string()), None)
    }

    fn texts(items: impl IntoIterator<Item = CachedMessage>) -> Vec<String> {
        items
            .into_iter()
            .map(|m| match m.payload {
                Payload::Text(s) => s,
                Payload::Json(map) => serde_json::Value::Object(map).to_string(),
            })
            .collect()
    }

    #[test]
    fn test_push_evicts_oldest_when_full() {
        let mut cache = OutboundCache::new(2);
        assert!(cache.push(text("m1")).is_none());
        assert!(cache.push(text("m2")).is_none());

        let evicted = cache.push(text("m3")).expect("eviction");
        assert_eq!(texts([evicted]), vec!["m1"]);
        assert_eq!(texts(cache.take_all()), vec!["m2", "m3"]);
    }

    #[test]
    fn test_requeue_front_keeps_order_and_capacity() {
        let mut cache = OutboundCache::new(3);
        cache.push(text("a"));
        cache.push(text("b"));
        let drain = cache.drain_in_order(Duration::from_millis(10));

        cache.push(text("c"));
        cache.push(text("d"));

        let evicted = cache.requeue_front(drain.into_remaining());
        assert_eq!(texts(evicted), vec!["a"]);
        assert_eq!(texts(cache.take_all()), vec!["b", "c", "d"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_paces_items() {
        let mut cache = OutboundCache::new(10);
        cache.push(text("x"));
        cache.push(text("y"));
        cache.push(text("z"));

        let mut drain = cache.drain_in_order(Duration::from_millis(100));
        assert!(cache.is_empty());

        let start = Instant::now();
        let mut seen = Vec::new();
        while let Some(item) = drain.next().await {
            seen.push((texts([item]).remove(0), start.elapsed()));
        }

        assert_eq!(
            seen,
            vec![
                ("x".to_string(), Duration::ZERO),
                ("y".to_string(), Duration::from_millis(100)),
                ("z".to_string(), Duration::from_millis(200)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_items_pushed_during_drain_wait_for_next_drain() {
        let mut cache = OutboundCache::new(10);
        cache.push(text("first"));
        let mut drain = cache.drain_in_order(Duration::from_millis(50));

        cache.push(text("late"));
        assert_eq!(texts([drain.next().await.expect("item")]), vec!["first"]);
        assert!(drain.next().await.is_none());
        assert_eq!(cache.len(), 1);
    }
}
