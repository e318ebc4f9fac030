//! In-process message store with a broadcast change feed.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::{StreamExt, stream};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use uuid::Uuid;

use super::{ChangeBatch, ChangeStream, DocumentChange, MessageStore, StoreError};
use crate::chat::{Message, MessageId, MessageRecord};

/// Default capacity of the change broadcast channel.
const DEFAULT_FEED_CAPACITY: usize = 256;

/// Thread-safe in-memory document store.
///
/// Writes publish their change while still holding the write lock, so a
/// subscriber that snapshots under the same lock never misses or doubles a
/// change.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

#[derive(Debug)]
struct MemoryStoreInner {
    docs: RwLock<Docs>,
    changes: broadcast::Sender<ChangeBatch>,
}

#[derive(Debug, Default)]
struct Docs {
    /// id -> (insertion sequence, document)
    by_id: HashMap<MessageId, (u64, Message)>,
    next_seq: u64,
}

impl Docs {
    fn ordered(&self) -> Vec<MessageRecord> {
        let mut entries: Vec<_> = self.by_id.iter().collect();
        entries.sort_by_key(|(_, (seq, msg))| (msg.date, *seq));
        entries
            .into_iter()
            .map(|(id, (_, msg))| MessageRecord::new(id.clone(), msg.clone()))
            .collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_FEED_CAPACITY)
    }

    /// Create an empty store whose change feed buffers `capacity` batches.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(MemoryStoreInner {
                docs: RwLock::new(Docs::default()),
                changes,
            }),
        }
    }

    /// Create a store pre-filled with records, keeping their ids.
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = MessageRecord>) -> Self {
        let store = Self::new();
        {
            let mut docs = store.inner.docs.write().unwrap();
            for record in records {
                let seq = docs.next_seq;
                docs.next_seq += 1;
                docs.by_id.insert(record.id, (seq, record.data));
            }
        }
        store
    }

    /// Number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.docs.read().unwrap().by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn publish(&self, change: DocumentChange) {
        // No subscribers is not an error.
        let _ = self.inner.changes.send(ChangeBatch::single(change));
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create(&self, message: &Message) -> Result<MessageId, StoreError> {
        let id = MessageId::new(Uuid::new_v4().simple().to_string());
        let mut docs = self.inner.docs.write().unwrap();
        let seq = docs.next_seq;
        docs.next_seq += 1;
        docs.by_id.insert(id.clone(), (seq, message.clone()));
        self.publish(DocumentChange::added(MessageRecord::new(
            id.clone(),
            message.clone(),
        )));
        Ok(id)
    }

    async fn query_ordered(&self) -> Result<Vec<MessageRecord>, StoreError> {
        Ok(self.inner.docs.read().unwrap().ordered())
    }

    async fn get(&self, id: &MessageId) -> Result<Option<MessageRecord>, StoreError> {
        let docs = self.inner.docs.read().unwrap();
        Ok(docs
            .by_id
            .get(id)
            .map(|(_, msg)| MessageRecord::new(id.clone(), msg.clone())))
    }

    async fn update(&self, id: &MessageId, message: &Message) -> Result<(), StoreError> {
        let mut docs = self.inner.docs.write().unwrap();
        let Some(entry) = docs.by_id.get_mut(id) else {
            return Err(StoreError::NotFound(id.clone()));
        };
        entry.1 = message.clone();
        self.publish(DocumentChange::modified(MessageRecord::new(
            id.clone(),
            message.clone(),
        )));
        Ok(())
    }

    async fn delete(&self, id: &MessageId) -> Result<(), StoreError> {
        let mut docs = self.inner.docs.write().unwrap();
        if docs.by_id.remove(id).is_none() {
            return Err(StoreError::NotFound(id.clone()));
        }
        self.publish(DocumentChange::removed(id.clone()));
        Ok(())
    }

    async fn subscribe(&self) -> Result<ChangeStream, StoreError> {
        let (rx, snapshot) = {
            let docs = self.inner.docs.read().unwrap();
            (self.inner.changes.subscribe(), docs.ordered())
        };

        let live = BroadcastStream::new(rx).map(|res| {
            res.map_err(|BroadcastStreamRecvError::Lagged(n)| StoreError::Lagged(n))
        });

        Ok(Box::pin(
            stream::once(async move { Ok(ChangeBatch::snapshot(snapshot)) }).chain(live),
        ))
    }
}
