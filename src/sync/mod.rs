//! Live synchronization between the message store and the rendered view.
//!
//! A [`LiveSync`] owns one subscription to the store's change feed and one
//! rendered [`MessageList`]. It is an ordinary value with an explicit
//! lifecycle, so independent instances (one per test, say) share nothing.
//!
//! # Lifecycle
//!
//! 1. [`LiveSync::start`] subscribes to the change feed, renders the full
//!    list from [`MessageStore::query_ordered`], and spawns the listener.
//! 2. The first batch from the feed replays the existing collection as
//!    `added` changes. Those are already on screen and are suppressed; once
//!    that batch is applied the instance reports [`LiveSync::is_initialized`].
//! 3. Later batches are applied according to the [`SyncPolicy`] and every
//!    resulting [`ViewUpdate`] is broadcast to subscribers.
//! 4. [`LiveSync::stop`] aborts the listener and drops the subscription.

mod update;
mod view;

pub use update::ViewUpdate;
pub use view::MessageList;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::chat::{MessageId, MessageRecord};
use crate::render::{Affordances, Node};
use crate::store::{ChangeBatch, ChangeKind, ChangeStream, MessageStore, StoreError};

/// How the view reacts to `modified` changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPolicy {
    /// Ignore modifications; editing is not offered.
    Static,
    /// Rebuild the whole list from the store on every modification.
    #[default]
    Refresh,
    /// Patch the modified message in place by id.
    Patch,
}

impl SyncPolicy {
    /// Whether messages offer the edit affordance under this policy.
    #[must_use]
    pub fn allows_edit(self) -> bool {
        !matches!(self, Self::Static)
    }

    #[must_use]
    pub fn affordances(self) -> Affordances {
        Affordances {
            delete: true,
            edit: self.allows_edit(),
        }
    }
}

/// A live view of the message collection.
#[derive(Debug)]
pub struct LiveSync {
    inner: Arc<SyncInner>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug)]
struct SyncInner {
    store: Arc<dyn MessageStore>,
    policy: SyncPolicy,
    view: RwLock<MessageList>,
    updates: broadcast::Sender<ViewUpdate>,
    initialized: AtomicBool,
}

impl LiveSync {
    /// Create a stopped instance. `capacity` bounds the update broadcast.
    pub fn new(store: Arc<dyn MessageStore>, policy: SyncPolicy, capacity: usize) -> Self {
        let (updates, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(SyncInner {
                store,
                policy,
                view: RwLock::new(MessageList::new(policy.affordances())),
                updates,
                initialized: AtomicBool::new(false),
            }),
            listener: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn policy(&self) -> SyncPolicy {
        self.inner.policy
    }

    /// Subscribe, render the full list, and start applying changes.
    ///
    /// Starting a running instance does nothing.
    pub async fn start(&self) -> Result<(), StoreError> {
        let mut listener = self.listener.lock().await;
        if listener.is_some() {
            return Ok(());
        }

        let feed = self.inner.store.subscribe().await?;
        self.inner.refresh().await?;

        let inner = Arc::clone(&self.inner);
        *listener = Some(tokio::spawn(async move { inner.listen(feed).await }));

        info!(
            name: "sync.started",
            policy = ?self.inner.policy,
            messages = self.inner.view.read().unwrap().len(),
            "Live sync started"
        );
        Ok(())
    }

    /// Stop applying changes and drop the subscription.
    pub async fn stop(&self) {
        let handle = self.listener.lock().await.take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
            info!(name: "sync.stopped", "Live sync stopped");
        }
    }

    /// Whether the listener task is running.
    pub async fn is_running(&self) -> bool {
        self.listener
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Whether the initial snapshot batch has been applied.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    /// Rebuild the whole view from the store.
    pub async fn refresh(&self) -> Result<(), StoreError> {
        self.inner.refresh().await
    }

    /// Apply one change batch to the view.
    pub async fn apply_batch(&self, batch: ChangeBatch) -> Result<(), StoreError> {
        self.inner.apply_batch(batch).await
    }

    /// Receive view updates from now on.
    #[must_use]
    pub fn updates(&self) -> broadcast::Receiver<ViewUpdate> {
        self.inner.updates.subscribe()
    }

    /// The current list plus a receiver for every update after it.
    ///
    /// Both are taken under the view lock, so nothing falls between them.
    #[must_use]
    pub fn snapshot(&self) -> (Node, broadcast::Receiver<ViewUpdate>) {
        let view = self.inner.view.read().unwrap();
        (view.render(), self.inner.updates.subscribe())
    }

    /// Render the current `#messages` list.
    #[must_use]
    pub fn render(&self) -> Node {
        self.inner.view.read().unwrap().render()
    }

    /// The rendered copy of a message.
    #[must_use]
    pub fn get(&self, id: &MessageId) -> Option<MessageRecord> {
        self.inner.view.read().unwrap().get(id).cloned()
    }

    /// Ids in display order.
    #[must_use]
    pub fn ids(&self) -> Vec<MessageId> {
        self.inner.view.read().unwrap().ids()
    }

    /// Rendered messages in display order.
    #[must_use]
    pub fn records(&self) -> Vec<MessageRecord> {
        self.inner.view.read().unwrap().records().to_vec()
    }
}

impl Drop for LiveSync {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.get_mut().take() {
            handle.abort();
        }
    }
}

impl SyncInner {
    fn emit(&self, update: ViewUpdate) {
        // No browser connected is fine.
        let _ = self.updates.send(update);
    }

    async fn refresh(&self) -> Result<(), StoreError> {
        let records = self.store.query_ordered().await?;
        let mut view = self.view.write().unwrap();
        let update = view.reset(records);
        debug!(messages = view.len(), "View refreshed");
        self.emit(update);
        Ok(())
    }

    async fn apply_batch(&self, batch: ChangeBatch) -> Result<(), StoreError> {
        let initial = !self.initialized.load(Ordering::SeqCst);
        let mut needs_refresh = false;

        debug!(name: "sync.batch", changes = batch.len(), initial, "Applying change batch");

        {
            let mut view = self.view.write().unwrap();
            for change in batch.changes {
                let update = match change.kind {
                    ChangeKind::Added if initial => None,
                    ChangeKind::Added => change.record().and_then(|r| view.append(r)),
                    ChangeKind::Modified => match self.policy {
                        SyncPolicy::Static => None,
                        SyncPolicy::Refresh => {
                            needs_refresh = true;
                            None
                        }
                        SyncPolicy::Patch => change.record().and_then(|r| view.replace(r)),
                    },
                    ChangeKind::Removed => view.remove(&change.id),
                };
                if let Some(update) = update {
                    self.emit(update);
                }
            }
        }

        self.initialized.store(true, Ordering::SeqCst);

        if needs_refresh {
            self.refresh().await?;
        }
        Ok(())
    }

    async fn listen(self: Arc<Self>, mut feed: ChangeStream) {
        while let Some(item) = feed.next().await {
            let result = match item {
                Ok(batch) => self.apply_batch(batch).await,
                Err(StoreError::Lagged(missed)) => {
                    warn!(name: "sync.lagged", missed, "Change feed lagged, refreshing view");
                    self.refresh().await
                }
                Err(err) => {
                    warn!(error = %err, "Change feed error, refreshing view");
                    self.refresh().await
                }
            };
            if let Err(err) = result {
                warn!(error = %err, "Failed to apply change batch");
            }
        }
        info!("Change feed closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Message;
    use crate::store::{DocumentChange, MemoryStore};
    use chrono::{TimeZone, Utc};

    fn rec(id: &str, text: &str, secs: i64) -> MessageRecord {
        MessageRecord::new(
            id,
            Message {
                username: "anna".into(),
                message: text.into(),
                date: Utc.timestamp_opt(secs, 0).unwrap(),
                my_timestamp: secs.to_string(),
            },
        )
    }

    fn sync_over(records: Vec<MessageRecord>, policy: SyncPolicy) -> (LiveSync, MemoryStore) {
        let store = MemoryStore::with_records(records);
        (LiveSync::new(Arc::new(store.clone()), policy, 16), store)
    }

    fn ids(sync: &LiveSync) -> Vec<String> {
        sync.ids().iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn test_initial_batch_adds_are_suppressed() {
        let (sync, _store) = sync_over(vec![], SyncPolicy::Refresh);
        assert!(!sync.is_initialized());

        sync.apply_batch(ChangeBatch::snapshot(vec![rec("a", "x", 1)]))
            .await
            .unwrap();
        assert!(sync.is_initialized());
        assert!(sync.ids().is_empty());

        sync.apply_batch(ChangeBatch::single(DocumentChange::added(rec("b", "y", 2))))
            .await
            .unwrap();
        assert_eq!(ids(&sync), ["b"]);
    }

    #[tokio::test]
    async fn test_static_policy_ignores_modifications() {
        let (sync, _store) = sync_over(vec![rec("a", "x", 1)], SyncPolicy::Static);
        sync.refresh().await.unwrap();
        sync.apply_batch(ChangeBatch::default()).await.unwrap();

        sync.apply_batch(ChangeBatch::single(DocumentChange::modified(rec(
            "a", "edited", 1,
        ))))
        .await
        .unwrap();

        assert_eq!(sync.get(&MessageId::from("a")).unwrap().data.message, "x");
        assert!(!sync.policy().affordances().edit);
    }

    #[tokio::test]
    async fn test_refresh_policy_rereads_store() {
        let (sync, store) = sync_over(vec![rec("a", "x", 1), rec("b", "y", 2)], SyncPolicy::Refresh);
        sync.refresh().await.unwrap();
        sync.apply_batch(ChangeBatch::default()).await.unwrap();

        let edited = rec("a", "edited", 5);
        store.update(&edited.id, &edited.data).await.unwrap();
        sync.apply_batch(ChangeBatch::single(DocumentChange::modified(edited)))
            .await
            .unwrap();

        assert_eq!(ids(&sync), ["b", "a"]);
        assert_eq!(sync.get(&MessageId::from("a")).unwrap().data.message, "edited");
    }

    #[tokio::test]
    async fn test_patch_policy_replaces_by_id() {
        let (sync, _store) = sync_over(vec![rec("a", "x", 1), rec("b", "y", 2)], SyncPolicy::Patch);
        sync.refresh().await.unwrap();
        sync.apply_batch(ChangeBatch::default()).await.unwrap();
        let mut updates = sync.updates();

        sync.apply_batch(ChangeBatch::single(DocumentChange::modified(rec(
            "a", "edited", 1,
        ))))
        .await
        .unwrap();

        assert_eq!(ids(&sync), ["a", "b"]);
        assert!(matches!(
            updates.try_recv().unwrap(),
            ViewUpdate::Replace { .. }
        ));
    }

    #[tokio::test]
    async fn test_removed_targets_only_its_id() {
        let (sync, _store) = sync_over(
            vec![rec("a", "x", 1), rec("b", "y", 2), rec("c", "z", 3)],
            SyncPolicy::Refresh,
        );
        sync.refresh().await.unwrap();
        sync.apply_batch(ChangeBatch::default()).await.unwrap();

        sync.apply_batch(ChangeBatch::single(DocumentChange::removed(MessageId::from(
            "b",
        ))))
        .await
        .unwrap();

        assert_eq!(ids(&sync), ["a", "c"]);
    }

    #[tokio::test]
    async fn test_snapshot_pairs_view_with_receiver() {
        let (sync, _store) = sync_over(vec![rec("a", "x", 1)], SyncPolicy::Refresh);
        sync.refresh().await.unwrap();
        sync.apply_batch(ChangeBatch::default()).await.unwrap();

        let (list, mut rx) = sync.snapshot();
        assert!(list.to_html().contains("data-id=\"a\""));

        sync.apply_batch(ChangeBatch::single(DocumentChange::added(rec("b", "y", 2))))
            .await
            .unwrap();
        assert_eq!(
            rx.try_recv().unwrap().id(),
            Some(&MessageId::from("b"))
        );
    }

    #[tokio::test]
    async fn test_feed_errors_trigger_full_refresh() {
        for err in [StoreError::Lagged(3), StoreError::Backend("connection reset".into())] {
            let (sync, _store) = sync_over(
                vec![rec("a", "x", 1), rec("b", "y", 2)],
                SyncPolicy::Refresh,
            );
            assert!(sync.ids().is_empty());
            let mut updates = sync.updates();

            let feed: ChangeStream = Box::pin(futures::stream::iter(vec![Err(err)]));
            Arc::clone(&sync.inner).listen(feed).await;

            assert_eq!(ids(&sync), ["a", "b"]);
            assert!(matches!(updates.try_recv().unwrap(), ViewUpdate::Reset { .. }));
        }
    }
}
