//! Registry of live push connections.
//!
//! Each connection carries an immutable filter and a bounded queue. Writes
//! are non-blocking: when a queue is full the oldest undelivered frame is
//! dropped and counted, and delivery continues.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use tokio::sync::Notify;
use uuid::Uuid;

use freightwire_common::error::Result;
use freightwire_common::{Article, FreightwireError, SubscriptionFilter};

/// Per-connection send buffer capacity.
const SEND_BUFFER: usize = 32;

/// Frames sent over the push channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushFrame<'a> {
    NewArticle { data: &'a Article },
    Ping,
}

struct Connection {
    filter: SubscriptionFilter,
    queue: Mutex<VecDeque<Arc<str>>>,
    notify: Notify,
    dropped: AtomicU64,
}

impl Connection {
    /// Non-blocking enqueue with drop-oldest overflow.
    fn push(&self, frame: Arc<str>) {
        {
            let mut queue = self.queue.lock().expect("push queue poisoned");
            if queue.len() >= SEND_BUFFER {
                queue.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            queue.push_back(frame);
        }
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<Arc<str>> {
        self.queue.lock().expect("push queue poisoned").pop_front()
    }
}

pub struct PushRegistry {
    connections: RwLock<HashMap<Uuid, Arc<Connection>>>,
    max_connections: usize,
    total_dropped: AtomicU64,
}

impl PushRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            max_connections,
            total_dropped: AtomicU64::new(0),
        }
    }

    /// Register a live connection. Refused with a capacity error beyond the
    /// connection cap.
    pub fn register(self: &Arc<Self>, filter: SubscriptionFilter) -> Result<PushHandle> {
        let mut connections = self.connections.write().expect("push registry poisoned");
        if connections.len() >= self.max_connections {
            return Err(FreightwireError::Capacity(format!(
                "push connection limit reached ({})",
                self.max_connections
            )));
        }

        let id = Uuid::new_v4();
        let connection = Arc::new(Connection {
            filter,
            queue: Mutex::new(VecDeque::with_capacity(SEND_BUFFER)),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        });
        connections.insert(id, Arc::clone(&connection));

        Ok(PushHandle {
            id,
            connection,
            registry: Arc::clone(self),
        })
    }

    fn unregister(&self, id: Uuid) {
        self.connections
            .write()
            .expect("push registry poisoned")
            .remove(&id);
    }

    /// Fan an article out to every matching connection. Holds the read lock
    /// only for the duration of the non-blocking enqueues.
    pub fn broadcast(&self, article: &Article, payload: &str) -> usize {
        let frame: Arc<str> = Arc::from(payload);
        let connections = self.connections.read().expect("push registry poisoned");
        let mut delivered = 0;
        for connection in connections.values() {
            if connection.filter.matches(article) {
                let before = connection.dropped.load(Ordering::Relaxed);
                connection.push(Arc::clone(&frame));
                let overflow = connection.dropped.load(Ordering::Relaxed) - before;
                if overflow > 0 {
                    self.total_dropped.fetch_add(overflow, Ordering::Relaxed);
                }
                delivered += 1;
            }
        }
        delivered
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().expect("push registry poisoned").len()
    }

    pub fn total_dropped(&self) -> u64 {
        self.total_dropped.load(Ordering::Relaxed)
    }
}

/// Receiving side of one push connection. Dropping the handle removes the
/// connection from the registry.
pub struct PushHandle {
    id: Uuid,
    connection: Arc<Connection>,
    registry: Arc<PushRegistry>,
}

impl PushHandle {
    /// Next frame for this connection, in dispatch order.
    pub async fn recv(&self) -> Arc<str> {
        loop {
            if let Some(frame) = self.connection.pop() {
                return frame;
            }
            self.connection.notify.notified().await;
        }
    }

    pub fn try_recv(&self) -> Option<Arc<str>> {
        self.connection.pop()
    }

    pub fn dropped(&self) -> u64 {
        self.connection.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for PushHandle {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sqlx::types::Json;

    fn article(mode: &str) -> Article {
        Article {
            id: Uuid::new_v4(),
            source_id: "s".to_string(),
            source_name: None,
            url: format!("https://example.com/{}", Uuid::new_v4()),
            title: "t".to_string(),
            body_text: None,
            body_markdown: None,
            language: Some("en".to_string()),
            published_at: None,
            fetched_at: Utc::now(),
            summary_en: None,
            summary_zh: None,
            transport_modes: vec![mode.to_string()],
            primary_topic: None,
            secondary_topics: vec![],
            content_type: None,
            regions: vec![],
            entities: Json(Default::default()),
            sentiment: None,
            market_impact: None,
            urgency: None,
            key_metrics: Json(vec![]),
            title_simhash: None,
            content_minhash: None,
            embedding: None,
            processing_status: freightwire_common::ProcessingStatus::Completed,
            llm_processed: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn ocean_filter() -> SubscriptionFilter {
        SubscriptionFilter {
            transport_modes: vec!["ocean".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn matching_connection_receives() {
        let registry = Arc::new(PushRegistry::new(10));
        let handle = registry.register(ocean_filter()).unwrap();

        let delivered = registry.broadcast(&article("ocean"), "frame-1");
        assert_eq!(delivered, 1);
        assert_eq!(handle.try_recv().as_deref(), Some("frame-1"));
    }

    #[test]
    fn non_matching_connection_skipped() {
        let registry = Arc::new(PushRegistry::new(10));
        let handle = registry.register(ocean_filter()).unwrap();

        let delivered = registry.broadcast(&article("air"), "frame-1");
        assert_eq!(delivered, 0);
        assert!(handle.try_recv().is_none());
    }

    #[test]
    fn capacity_enforced() {
        let registry = Arc::new(PushRegistry::new(2));
        let _a = registry.register(SubscriptionFilter::default()).unwrap();
        let _b = registry.register(SubscriptionFilter::default()).unwrap();
        let refused = registry.register(SubscriptionFilter::default());
        assert!(matches!(refused, Err(FreightwireError::Capacity(_))));
    }

    #[test]
    fn dropping_handle_frees_slot() {
        let registry = Arc::new(PushRegistry::new(1));
        let handle = registry.register(SubscriptionFilter::default()).unwrap();
        assert_eq!(registry.connection_count(), 1);
        drop(handle);
        assert_eq!(registry.connection_count(), 0);
        assert!(registry.register(SubscriptionFilter::default()).is_ok());
    }

    #[test]
    fn overflow_drops_oldest_and_counts() {
        let registry = Arc::new(PushRegistry::new(1));
        let handle = registry.register(SubscriptionFilter::default()).unwrap();
        let a = article("ocean");

        for i in 0..SEND_BUFFER + 2 {
            registry.broadcast(&a, &format!("frame-{i}"));
        }

        assert_eq!(handle.dropped(), 2);
        assert_eq!(registry.total_dropped(), 2);
        // Oldest two were dropped; the first frame delivered is frame-2.
        assert_eq!(handle.try_recv().as_deref(), Some("frame-2"));
    }

    #[test]
    fn delivery_order_preserved() {
        let registry = Arc::new(PushRegistry::new(1));
        let handle = registry.register(SubscriptionFilter::default()).unwrap();
        let a = article("ocean");

        registry.broadcast(&a, "first");
        registry.broadcast(&a, "second");

        assert_eq!(handle.try_recv().as_deref(), Some("first"));
        assert_eq!(handle.try_recv().as_deref(), Some("second"));
    }
}
