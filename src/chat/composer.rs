//! Message submission.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::{Draft, MessageId, TimestampFormat};
use crate::store::{MessageStore, StoreError};

/// Result of a submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// A field was empty; nothing was written.
    Skipped,
    /// The message was stored under this id.
    Sent(MessageId),
}

/// Builds messages from drafts and writes them to the store.
#[derive(Debug, Clone)]
pub struct Composer {
    store: Arc<dyn MessageStore>,
    format: TimestampFormat,
}

impl Composer {
    pub fn new(store: Arc<dyn MessageStore>, format: TimestampFormat) -> Self {
        Self { store, format }
    }

    /// Submit a draft stamped with the current time.
    pub async fn submit(&self, draft: Draft) -> Result<Submission, StoreError> {
        self.submit_at(draft, Utc::now()).await
    }

    /// Submit a draft stamped with `date`.
    pub async fn submit_at(
        &self,
        draft: Draft,
        date: DateTime<Utc>,
    ) -> Result<Submission, StoreError> {
        let Some(message) = draft.into_message(date, &self.format) else {
            debug!("Skipping submit with an empty field");
            return Ok(Submission::Skipped);
        };

        let id = self.store.create(&message).await?;
        info!(
            name: "message.created",
            id = %id,
            username = %message.username,
            "Message created"
        );
        Ok(Submission::Sent(id))
    }
}
