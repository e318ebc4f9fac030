//! The edit overlay.
//!
//! Opening reads the message text from the rendered view rather than the
//! store, so the overlay shows exactly what the user is looking at. Saving
//! writes a full replacement record; the view only changes once the store's
//! change feed reports the modification.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::{Draft, MessageId, TimestampFormat};
use crate::render::{self, Node};
use crate::store::{MessageStore, StoreError};
use crate::sync::LiveSync;

/// Result of saving an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A field was empty; nothing was written.
    Skipped,
    /// The replacement record was written.
    Saved,
}

/// Opens and saves the edit overlay for single messages.
#[derive(Debug, Clone)]
pub struct EditOverlay {
    store: Arc<dyn MessageStore>,
    format: TimestampFormat,
    restamp: bool,
}

impl EditOverlay {
    /// `restamp` selects whether a saved edit gets a fresh `date` or keeps
    /// the stored one.
    pub fn new(store: Arc<dyn MessageStore>, format: TimestampFormat, restamp: bool) -> Self {
        Self {
            store,
            format,
            restamp,
        }
    }

    /// Render the overlay for a rendered message, or `None` if it is not on
    /// screen.
    #[must_use]
    pub fn open(&self, sync: &LiveSync, id: &MessageId) -> Option<Node> {
        if !sync.policy().allows_edit() {
            return None;
        }
        let record = sync.get(id)?;
        Some(render::edit_overlay(id, &record.data.message))
    }

    pub async fn save(&self, id: &MessageId, draft: Draft) -> Result<SaveOutcome, StoreError> {
        self.save_at(id, draft, Utc::now()).await
    }

    /// Save with `now` as the fresh timestamp.
    pub async fn save_at(
        &self,
        id: &MessageId,
        draft: Draft,
        now: DateTime<Utc>,
    ) -> Result<SaveOutcome, StoreError> {
        if !draft.is_complete() {
            debug!(id = %id, "Skipping edit with an empty field");
            return Ok(SaveOutcome::Skipped);
        }

        let date = if self.restamp {
            now
        } else {
            self.store
                .get(id)
                .await?
                .ok_or_else(|| StoreError::NotFound(id.clone()))?
                .data
                .date
        };

        let Some(message) = draft.into_message(date, &self.format) else {
            return Ok(SaveOutcome::Skipped);
        };

        self.store.update(id, &message).await?;
        info!(name: "message.updated", id = %id, "Message updated");
        Ok(SaveOutcome::Saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{Message, MessageRecord};
    use crate::store::MemoryStore;
    use crate::sync::SyncPolicy;
    use chrono::TimeZone;

    fn seeded() -> (MemoryStore, MessageRecord) {
        let record = MessageRecord::new(
            "a",
            Message {
                username: "anna".into(),
                message: "original".into(),
                date: Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
                my_timestamp: "2024. 01. 01. 09:00:00".into(),
            },
        );
        (MemoryStore::with_records([record.clone()]), record)
    }

    #[tokio::test]
    async fn test_save_replaces_fields_and_keeps_id() {
        let (store, record) = seeded();
        let overlay = EditOverlay::new(Arc::new(store.clone()), TimestampFormat::default(), true);
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 10, 30, 0).unwrap();

        let outcome = overlay
            .save_at(&record.id, Draft::new("bob", "changed"), now)
            .await
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Saved);

        let stored = store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.id, record.id);
        assert_eq!(stored.data.username, "bob");
        assert_eq!(stored.data.message, "changed");
        assert_eq!(stored.data.date, now);
        assert_eq!(stored.data.my_timestamp, "2024. 01. 02. 10:30:00");
    }

    #[tokio::test]
    async fn test_save_can_keep_original_date() {
        let (store, record) = seeded();
        let overlay = EditOverlay::new(Arc::new(store.clone()), TimestampFormat::default(), false);

        overlay
            .save(&record.id, Draft::new("anna", "changed"))
            .await
            .unwrap();

        let stored = store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.data.date, record.data.date);
        assert_eq!(stored.data.message, "changed");
    }

    #[tokio::test]
    async fn test_save_unknown_id_is_not_found() {
        let (store, _) = seeded();
        let overlay = EditOverlay::new(Arc::new(store), TimestampFormat::default(), true);
        let missing = MessageId::from("missing");

        assert_eq!(
            overlay.save(&missing, Draft::new("anna", "x")).await,
            Err(StoreError::NotFound(missing))
        );
    }

    #[tokio::test]
    async fn test_open_reads_rendered_view() {
        let (store, record) = seeded();
        let store: Arc<dyn MessageStore> = Arc::new(store);
        let sync = LiveSync::new(Arc::clone(&store), SyncPolicy::Refresh, 8);
        let overlay = EditOverlay::new(Arc::clone(&store), TimestampFormat::default(), true);

        assert!(overlay.open(&sync, &record.id).is_none());

        sync.refresh().await.unwrap();
        let node = overlay.open(&sync, &record.id).unwrap();
        assert!(node.to_html().contains(">original</textarea>"));
    }

    #[tokio::test]
    async fn test_open_disabled_under_static_policy() {
        let (store, record) = seeded();
        let store: Arc<dyn MessageStore> = Arc::new(store);
        let sync = LiveSync::new(Arc::clone(&store), SyncPolicy::Static, 8);
        sync.refresh().await.unwrap();

        let overlay = EditOverlay::new(store, TimestampFormat::default(), true);
        assert!(overlay.open(&sync, &record.id).is_none());
    }
}
