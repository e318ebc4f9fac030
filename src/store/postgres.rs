use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::postgres::{PgListener, PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{ChangeBatch, ChangeStream, DocumentChange, MessageStore, StoreError};
use crate::chat::{Message, MessageId, MessageRecord};
use crate::config::StoreConfig;

/// Channel the `messages_notify` trigger publishes on.
const CHANGE_CHANNEL: &str = "message_changes";

/// Table created by the bundled migrations.
const TABLE: &str = "messages";

/// Postgres-backed message collection.
///
/// Changes reach subscribers through `LISTEN message_changes`; the trigger
/// only sends the operation and id, so inserted and updated rows are read
/// back before being forwarded.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

#[derive(Debug, Deserialize)]
struct ChangeNotice {
    op: String,
    id: String,
}

fn backend(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        other => StoreError::Backend(other.to_string()),
    }
}

fn row_to_record(row: &PgRow) -> Result<MessageRecord, sqlx::Error> {
    let id: String = row.try_get("id")?;
    let date: DateTime<Utc> = row.try_get("date")?;
    Ok(MessageRecord::new(
        id,
        Message {
            username: row.try_get("username")?,
            message: row.try_get("message")?,
            date,
            my_timestamp: row.try_get("my_timestamp")?,
        },
    ))
}

async fn fetch_record(pool: &PgPool, id: &str) -> Result<Option<MessageRecord>, StoreError> {
    let row = sqlx::query(
        "SELECT id, username, message, date, my_timestamp FROM messages WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(backend)?;

    row.as_ref()
        .map(row_to_record)
        .transpose()
        .map_err(backend)
}

impl PostgresStore {
    pub async fn connect(config: &StoreConfig) -> anyhow::Result<Self> {
        if config.collection != TABLE {
            tracing::warn!(
                collection = %config.collection,
                "Postgres provider always uses the `messages` table"
            );
        }

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&config.database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl MessageStore for PostgresStore {
    async fn create(&self, message: &Message) -> Result<MessageId, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        sqlx::query(
            r#"
            INSERT INTO messages (id, username, message, date, my_timestamp)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&id)
        .bind(&message.username)
        .bind(&message.message)
        .bind(message.date)
        .bind(&message.my_timestamp)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(MessageId::new(id))
    }

    async fn query_ordered(&self) -> Result<Vec<MessageRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, username, message, date, my_timestamp FROM messages ORDER BY date ASC, seq ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter()
            .map(row_to_record)
            .collect::<Result<Vec<_>, _>>()
            .map_err(backend)
    }

    async fn get(&self, id: &MessageId) -> Result<Option<MessageRecord>, StoreError> {
        fetch_record(&self.pool, id.as_str()).await
    }

    async fn update(&self, id: &MessageId, message: &Message) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET username = $2, message = $3, date = $4, my_timestamp = $5
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .bind(&message.username)
        .bind(&message.message)
        .bind(message.date)
        .bind(&message.my_timestamp)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }

    async fn delete(&self, id: &MessageId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<ChangeStream, StoreError> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(backend)?;
        listener.listen(CHANGE_CHANNEL).await.map_err(backend)?;

        let snapshot = self.query_ordered().await?;
        let pool = self.pool.clone();

        let stream = async_stream::stream! {
            yield Ok(ChangeBatch::snapshot(snapshot));

            loop {
                let notification = match listener.recv().await {
                    Ok(n) => n,
                    Err(err) => {
                        // The listener reconnects on the next recv; anything
                        // sent meanwhile is gone, so report it as a gap.
                        yield Err(backend(err));
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                };

                let notice: ChangeNotice = match serde_json::from_str(notification.payload()) {
                    Ok(notice) => notice,
                    Err(err) => {
                        tracing::warn!(error = %err, "Ignoring malformed change notice");
                        continue;
                    }
                };

                let change = match notice.op.as_str() {
                    "DELETE" => Some(DocumentChange::removed(MessageId::new(notice.id))),
                    op => match fetch_record(&pool, &notice.id).await {
                        Ok(Some(record)) if op == "INSERT" => Some(DocumentChange::added(record)),
                        Ok(Some(record)) => Some(DocumentChange::modified(record)),
                        // Deleted again before we could read it; the delete notice follows.
                        Ok(None) => None,
                        Err(err) => {
                            yield Err(err);
                            None
                        }
                    },
                };

                if let Some(change) = change {
                    yield Ok(ChangeBatch::single(change));
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
