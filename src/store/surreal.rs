use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::{Any, connect};
use surrealdb::opt::auth::Root;
use surrealdb::{Action, Notification, Surreal};
use uuid::Uuid;

use super::{
    ChangeBatch, ChangeStream, DocumentChange, MessageStore, StoreError, sort_by_date,
};
use crate::chat::{Message, MessageId, MessageRecord};
use crate::config::StoreConfig;

/// SurrealDB-backed message collection.
///
/// The change feed is a live query on the table; the snapshot batch is read
/// after the live query is registered so nothing written in between is lost.
#[derive(Debug, Clone)]
pub struct SurrealStore {
    db: Surreal<Any>,
    table: String,
}

// Stored content. Surreal record keys are escaped when printed, so the
// message id is kept as a plain field instead of being read back from `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MessageRow {
    message_id: String,
    username: String,
    message: String,
    date: DateTime<Utc>,
    #[serde(rename = "myTimestamp")]
    my_timestamp: String,
}

impl MessageRow {
    fn new(id: &MessageId, msg: &Message) -> Self {
        Self {
            message_id: id.as_str().to_string(),
            username: msg.username.clone(),
            message: msg.message.clone(),
            date: msg.date,
            my_timestamp: msg.my_timestamp.clone(),
        }
    }

    fn into_record(self) -> MessageRecord {
        MessageRecord::new(
            self.message_id,
            Message {
                username: self.username,
                message: self.message,
                date: self.date,
                my_timestamp: self.my_timestamp,
            },
        )
    }
}

fn backend(err: surrealdb::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

impl SurrealStore {
    pub async fn connect(config: &StoreConfig) -> anyhow::Result<Self> {
        let db = connect(config.database_url.as_str()).await?;

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            db.signin(Root {
                username: username.as_str(),
                password: password.as_str(),
            })
            .await?;
        }

        db.use_ns(config.namespace.as_str())
            .use_db(config.database.as_str())
            .await?;

        Ok(Self {
            db,
            table: config.collection.clone(),
        })
    }

    async fn select_all(&self) -> Result<Vec<MessageRecord>, StoreError> {
        let rows: Vec<MessageRow> = self.db.select(self.table.as_str()).await.map_err(backend)?;
        let mut records: Vec<MessageRecord> =
            rows.into_iter().map(MessageRow::into_record).collect();
        sort_by_date(&mut records);
        Ok(records)
    }
}

fn to_change(notification: Notification<MessageRow>) -> Option<DocumentChange> {
    let record = notification.data.into_record();
    match notification.action {
        Action::Create => Some(DocumentChange::added(record)),
        Action::Update => Some(DocumentChange::modified(record)),
        Action::Delete => Some(DocumentChange::removed(record.id)),
        _ => None,
    }
}

#[async_trait]
impl MessageStore for SurrealStore {
    async fn create(&self, message: &Message) -> Result<MessageId, StoreError> {
        let id = MessageId::new(Uuid::new_v4().simple().to_string());
        let _: Option<MessageRow> = self
            .db
            .create((self.table.as_str(), id.as_str()))
            .content(MessageRow::new(&id, message))
            .await
            .map_err(backend)?;
        Ok(id)
    }

    async fn query_ordered(&self) -> Result<Vec<MessageRecord>, StoreError> {
        self.select_all().await
    }

    async fn get(&self, id: &MessageId) -> Result<Option<MessageRecord>, StoreError> {
        let row: Option<MessageRow> = self
            .db
            .select((self.table.as_str(), id.as_str()))
            .await
            .map_err(backend)?;
        Ok(row.map(MessageRow::into_record))
    }

    async fn update(&self, id: &MessageId, message: &Message) -> Result<(), StoreError> {
        let updated: Option<MessageRow> = self
            .db
            .update((self.table.as_str(), id.as_str()))
            .content(MessageRow::new(id, message))
            .await
            .map_err(backend)?;
        updated
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn delete(&self, id: &MessageId) -> Result<(), StoreError> {
        let deleted: Option<MessageRow> = self
            .db
            .delete((self.table.as_str(), id.as_str()))
            .await
            .map_err(backend)?;
        deleted
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn subscribe(&self) -> Result<ChangeStream, StoreError> {
        let live: surrealdb::method::Stream<Vec<MessageRow>> = self
            .db
            .select(self.table.as_str())
            .live()
            .await
            .map_err(backend)?;
        let snapshot = self.select_all().await?;

        let changes = live.filter_map(|item| async move {
            match item {
                Ok(notification) => to_change(notification).map(|c| Ok(ChangeBatch::single(c))),
                Err(err) => Some(Err(backend(err))),
            }
        });

        Ok(Box::pin(
            futures::stream::once(async move { Ok(ChangeBatch::snapshot(snapshot)) })
                .chain(changes),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ChangeKind;
    use chrono::TimeZone;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn open() -> (SurrealStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            provider: "surrealdb".to_string(),
            database_url: format!("surrealkv://{}", dir.path().join("chat.db").display()),
            ..StoreConfig::default()
        };
        (SurrealStore::connect(&config).await.unwrap(), dir)
    }

    fn message(text: &str, minute: u32) -> Message {
        Message {
            username: "anna".into(),
            message: text.into(),
            date: Utc.with_ymd_and_hms(2024, 3, 9, 12, minute, 0).unwrap(),
            my_timestamp: format!("12:{minute:02}"),
        }
    }

    async fn next_batch(feed: &mut ChangeStream) -> ChangeBatch {
        tokio::time::timeout(Duration::from_secs(5), feed.next())
            .await
            .expect("timed out waiting for a change")
            .expect("feed ended")
            .expect("feed error")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_crud_keeps_message_id() {
        let (store, _dir) = open().await;

        let late = store.create(&message("late", 5)).await.unwrap();
        let early = store.create(&message("early", 1)).await.unwrap();

        let record = store.get(&late).await.unwrap().unwrap();
        assert_eq!(record.id, late);
        assert_eq!(record.data, message("late", 5));

        let ordered: Vec<MessageId> = store
            .query_ordered()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ordered, [early.clone(), late.clone()]);

        store.update(&early, &message("edited", 7)).await.unwrap();
        assert_eq!(
            store.get(&early).await.unwrap().unwrap().data.message,
            "edited"
        );

        store.delete(&late).await.unwrap();
        assert!(store.get(&late).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_ids_are_not_found() {
        let (store, _dir) = open().await;
        let missing = MessageId::from("missing");

        assert_eq!(
            store.update(&missing, &message("x", 1)).await,
            Err(StoreError::NotFound(missing.clone()))
        );
        assert_eq!(
            store.delete(&missing).await,
            Err(StoreError::NotFound(missing.clone()))
        );
        // Update must not have created the record
        assert!(store.get(&missing).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_subscribe_snapshot_then_live_changes() {
        let (store, _dir) = open().await;
        let first = store.create(&message("first", 1)).await.unwrap();

        let mut feed = store.subscribe().await.unwrap();
        let snapshot = next_batch(&mut feed).await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.changes[0].kind, ChangeKind::Added);
        assert_eq!(snapshot.changes[0].id, first);

        let second = store.create(&message("second", 2)).await.unwrap();
        let added = next_batch(&mut feed).await;
        assert_eq!(added.changes[0].kind, ChangeKind::Added);
        assert_eq!(added.changes[0].id, second);

        store.update(&first, &message("first, edited", 1)).await.unwrap();
        let modified = next_batch(&mut feed).await;
        assert_eq!(modified.changes[0].kind, ChangeKind::Modified);
        assert_eq!(modified.changes[0].id, first);
        assert_eq!(
            modified.changes[0].data.as_ref().map(|m| m.message.as_str()),
            Some("first, edited")
        );

        store.delete(&second).await.unwrap();
        let removed = next_batch(&mut feed).await;
        assert_eq!(removed.changes[0].kind, ChangeKind::Removed);
        assert_eq!(removed.changes[0].id, second);
    }
}
