//! Message store adapter.
//!
//! [`MessageStore`] is the seam between the chat flows and whichever
//! document database holds the `messages` collection. Every provider offers
//! the same four writes/reads plus a push-based change feed:
//!
//! - the first item of [`MessageStore::subscribe`] is the whole collection,
//!   ordered by date, with every document reported as [`ChangeKind::Added`];
//! - later items are batches of changes carrying post-write data only.
//!
//! # Providers
//!
//! - [`memory::MemoryStore`]: in-process, the default
//! - [`surreal::SurrealStore`]: SurrealDB live query
//! - [`postgres::PostgresStore`]: Postgres `LISTEN/NOTIFY`
//! - [`retry::RetryingStore`]: wraps any of the above with retry on transient failures

pub mod memory;
pub mod postgres;
pub mod retry;
pub mod surreal;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;

use crate::chat::{Message, MessageId, MessageRecord};
use crate::config::StoreConfig;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use retry::{RetryPolicy, RetryingStore};
pub use surreal::SurrealStore;

/// Errors raised by store providers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No document with this id exists.
    #[error("message not found: {0}")]
    NotFound(MessageId),

    /// The backend could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected or failed the operation.
    #[error("store error: {0}")]
    Backend(String),

    /// A change-feed subscriber fell behind and missed `n` batches.
    #[error("change feed lagged by {0} batches")]
    Lagged(u64),

    /// The change feed is closed.
    #[error("change feed closed")]
    Closed,
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Backend(_))
    }
}

/// What happened to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One document change inside a [`ChangeBatch`].
///
/// `data` is the document after the write; removals carry no data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChange {
    pub kind: ChangeKind,
    pub id: MessageId,
    pub data: Option<Message>,
}

impl DocumentChange {
    pub fn added(record: MessageRecord) -> Self {
        Self {
            kind: ChangeKind::Added,
            id: record.id,
            data: Some(record.data),
        }
    }

    pub fn modified(record: MessageRecord) -> Self {
        Self {
            kind: ChangeKind::Modified,
            id: record.id,
            data: Some(record.data),
        }
    }

    pub fn removed(id: MessageId) -> Self {
        Self {
            kind: ChangeKind::Removed,
            id,
            data: None,
        }
    }

    /// The changed document as a record, if it carries data.
    #[must_use]
    pub fn record(&self) -> Option<MessageRecord> {
        self.data
            .as_ref()
            .map(|data| MessageRecord::new(self.id.clone(), data.clone()))
    }
}

/// A set of changes delivered together by the change feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    pub changes: Vec<DocumentChange>,
}

impl ChangeBatch {
    pub fn new(changes: Vec<DocumentChange>) -> Self {
        Self { changes }
    }

    pub fn single(change: DocumentChange) -> Self {
        Self {
            changes: vec![change],
        }
    }

    /// The initial snapshot batch: every record reported as added.
    pub fn snapshot(records: Vec<MessageRecord>) -> Self {
        Self {
            changes: records.into_iter().map(DocumentChange::added).collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// The change feed returned by [`MessageStore::subscribe`].
pub type ChangeStream = Pin<Box<dyn Stream<Item = Result<ChangeBatch, StoreError>> + Send>>;

/// Document store holding the message collection.
#[async_trait]
pub trait MessageStore: Send + Sync + std::fmt::Debug {
    /// Insert a new document and return the id the store assigned.
    async fn create(&self, message: &Message) -> Result<MessageId, StoreError>;

    /// All documents ordered ascending by `date`.
    async fn query_ordered(&self) -> Result<Vec<MessageRecord>, StoreError>;

    /// A single document.
    async fn get(&self, id: &MessageId) -> Result<Option<MessageRecord>, StoreError>;

    /// Overwrite every field of an existing document.
    async fn update(&self, id: &MessageId, message: &Message) -> Result<(), StoreError>;

    /// Remove a document.
    async fn delete(&self, id: &MessageId) -> Result<(), StoreError>;

    /// Subscribe to the ordered change feed.
    async fn subscribe(&self) -> Result<ChangeStream, StoreError>;
}

/// Sort records ascending by date; ties keep their incoming order.
pub(crate) fn sort_by_date(records: &mut [MessageRecord]) {
    records.sort_by_key(|r| r.data.date);
}

/// Connect the provider named in the configuration and wrap it with retry.
pub async fn connect(config: &StoreConfig) -> anyhow::Result<Arc<dyn MessageStore>> {
    let inner: Arc<dyn MessageStore> = match config.provider.as_str() {
        "surrealdb" => Arc::new(SurrealStore::connect(config).await?),
        "postgres" => Arc::new(PostgresStore::connect(config).await?),
        "memory" => Arc::new(MemoryStore::new()),
        other => anyhow::bail!("unknown store provider: {other}"),
    };

    tracing::info!(
        name: "store.connected",
        provider = %config.provider,
        collection = %config.collection,
        "Message store connected"
    );

    Ok(Arc::new(RetryingStore::new(
        inner,
        RetryPolicy::from_config(config),
    )))
}
