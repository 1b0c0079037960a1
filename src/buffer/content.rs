use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

use super::item::{DisplayItem, ItemType, Speaker};
use crate::error::LiveError;

type SubscriberFn = Arc<dyn Fn(&[DisplayItem]) + Send + Sync>;

#[derive(Clone, Copy, PartialEq)]
enum SubscriberKind {
    /// Receives the full item list on every change
    Full,
    /// Receives only the items added since its last notification
    Changes,
}

struct Subscriber {
    id: u64,
    kind: SubscriberKind,
    callback: SubscriberFn,
}

type SubscriberRegistry = Arc<Mutex<Vec<Subscriber>>>;

/// Handle returned by `subscribe`; removes exactly that subscriber.
pub struct BufferSubscription {
    id: u64,
    subscribers: Weak<Mutex<Vec<Subscriber>>>,
}

impl BufferSubscription {
    /// Remove the subscriber. Idempotent.
    pub fn unsubscribe(&self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.lock().unwrap().retain(|s| s.id != self.id);
        }
    }
}

/// On-demand buffer statistics.
#[derive(Debug, Clone, Serialize)]
pub struct BufferStatistics {
    pub total_items: usize,
    pub type_distribution: HashMap<ItemType, usize>,
    pub speaker_distribution: HashMap<Speaker, usize>,
    pub oldest_timestamp: Option<i64>,
    pub newest_timestamp: Option<i64>,
    pub average_item_age_ms: i64,
}

struct Store {
    items: VecDeque<DisplayItem>,
    /// High-water mark for the monotonic timestamp invariant
    last_timestamp: i64,
    next_item_seq: u64,
}

/// Bounded, ordered store of display-ready items.
///
/// Append-only log semantics: items are never mutated once added, and
/// leave only by oldest-first eviction past `max_size` or an explicit
/// clear. One writer, many readers; subscriber callbacks fire
/// synchronously inside `add_item` and must be cheap.
pub struct ContentBuffer {
    max_size: usize,
    store: Mutex<Store>,
    subscribers: SubscriberRegistry,
    next_subscriber_id: AtomicU64,
}

impl ContentBuffer {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            store: Mutex::new(Store {
                items: VecDeque::new(),
                last_timestamp: 0,
                next_item_seq: 0,
            }),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_subscriber_id: AtomicU64::new(0),
        }
    }

    /// Append an item, assigning `id` and `timestamp` when absent, evict
    /// past capacity, then notify subscribers. Returns the finalized item.
    pub fn add_item(&self, mut item: DisplayItem) -> DisplayItem {
        let snapshot = {
            let mut store = self.store.lock().unwrap();

            if item.id.is_empty() {
                item.id = format!("item-{}-{}", store.next_item_seq, uuid::Uuid::new_v4());
            }
            store.next_item_seq += 1;

            if item.timestamp == 0 {
                let now = chrono::Utc::now().timestamp_millis();
                item.timestamp = now.max(store.last_timestamp);
            }
            store.last_timestamp = store.last_timestamp.max(item.timestamp);

            store.items.push_back(item.clone());

            // FIFO by insertion order, not by timestamp value.
            while store.items.len() > self.max_size {
                if let Some(evicted) = store.items.pop_front() {
                    debug!("evicted item {}", evicted.id);
                }
            }

            store.items.iter().cloned().collect::<Vec<_>>()
        };

        self.notify(&snapshot, std::slice::from_ref(&item));
        item
    }

    /// Snapshot of the current contents, oldest first. Callers may mutate
    /// the returned list freely.
    pub fn get_buffer(&self) -> Vec<DisplayItem> {
        self.store.lock().unwrap().items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.store.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().unwrap().items.is_empty()
    }

    /// Register a listener invoked with the full item list on every change.
    pub fn subscribe<F>(&self, callback: F) -> BufferSubscription
    where
        F: Fn(&[DisplayItem]) + Send + Sync + 'static,
    {
        self.register(SubscriberKind::Full, Arc::new(callback))
    }

    /// Register a listener invoked only with items it has not seen yet.
    pub fn subscribe_changes<F>(&self, callback: F) -> BufferSubscription
    where
        F: Fn(&[DisplayItem]) + Send + Sync + 'static,
    {
        self.register(SubscriberKind::Changes, Arc::new(callback))
    }

    /// Case-insensitive substring search over item content.
    pub fn search(&self, query: &str) -> Vec<DisplayItem> {
        let needle = query.to_lowercase();
        self.store
            .lock()
            .unwrap()
            .items
            .iter()
            .filter(|item| item.content.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    pub fn search_by_type(&self, item_type: ItemType) -> Vec<DisplayItem> {
        self.store
            .lock()
            .unwrap()
            .items
            .iter()
            .filter(|item| item.item_type == item_type)
            .cloned()
            .collect()
    }

    pub fn search_by_speaker(&self, speaker: Speaker) -> Vec<DisplayItem> {
        self.store
            .lock()
            .unwrap()
            .items
            .iter()
            .filter(|item| item.speaker == Some(speaker))
            .cloned()
            .collect()
    }

    /// Items whose timestamp falls in `[start, end]`.
    pub fn search_by_time_range(&self, start: i64, end: i64) -> Vec<DisplayItem> {
        self.store
            .lock()
            .unwrap()
            .items
            .iter()
            .filter(|item| item.timestamp >= start && item.timestamp <= end)
            .cloned()
            .collect()
    }

    /// Empty the store and notify subscribers with an empty list.
    pub fn clear(&self) {
        {
            let mut store = self.store.lock().unwrap();
            store.items.clear();
        }
        self.notify(&[], &[]);
    }

    pub fn statistics(&self) -> BufferStatistics {
        let store = self.store.lock().unwrap();
        let now = chrono::Utc::now().timestamp_millis();

        let mut type_distribution: HashMap<ItemType, usize> = HashMap::new();
        let mut speaker_distribution: HashMap<Speaker, usize> = HashMap::new();
        let mut age_total: i64 = 0;

        for item in &store.items {
            *type_distribution.entry(item.item_type).or_insert(0) += 1;
            if let Some(speaker) = item.speaker {
                *speaker_distribution.entry(speaker).or_insert(0) += 1;
            }
            age_total += (now - item.timestamp).max(0);
        }

        let total_items = store.items.len();
        BufferStatistics {
            total_items,
            type_distribution,
            speaker_distribution,
            oldest_timestamp: store.items.front().map(|i| i.timestamp),
            newest_timestamp: store.items.back().map(|i| i.timestamp),
            average_item_age_ms: if total_items == 0 {
                0
            } else {
                age_total / total_items as i64
            },
        }
    }

    /// Serialize the full item list.
    pub fn export_json(&self) -> Result<String, LiveError> {
        let items = self.get_buffer();
        serde_json::to_string(&items).map_err(|e| LiveError::BufferImport(e.to_string()))
    }

    /// Replace the contents with a previously exported list. A parse
    /// failure leaves the existing contents untouched. Returns the number
    /// of imported items (after capacity eviction).
    pub fn import_json(&self, json: &str) -> Result<usize, LiveError> {
        let imported: Vec<DisplayItem> =
            serde_json::from_str(json).map_err(|e| LiveError::BufferImport(e.to_string()))?;

        let snapshot = {
            let mut store = self.store.lock().unwrap();
            store.items = imported.into();
            while store.items.len() > self.max_size {
                store.items.pop_front();
            }
            store.last_timestamp = store
                .items
                .iter()
                .map(|i| i.timestamp)
                .max()
                .unwrap_or(store.last_timestamp);
            store.items.iter().cloned().collect::<Vec<_>>()
        };

        self.notify(&snapshot, &snapshot);
        Ok(snapshot.len())
    }

    fn register(&self, kind: SubscriberKind, callback: SubscriberFn) -> BufferSubscription {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.lock().unwrap().push(Subscriber {
            id,
            kind,
            callback,
        });

        BufferSubscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    /// Fan out synchronously, outside the store lock, in registration
    /// order.
    fn notify(&self, full: &[DisplayItem], changed: &[DisplayItem]) {
        let subscribers: Vec<(SubscriberKind, SubscriberFn)> = {
            let guard = self.subscribers.lock().unwrap();
            guard
                .iter()
                .map(|s| (s.kind, Arc::clone(&s.callback)))
                .collect()
        };

        for (kind, callback) in subscribers {
            match kind {
                SubscriberKind::Full => callback(full),
                SubscriberKind::Changes => callback(changed),
            }
        }
    }
}
