//! Retry wrapper for message stores.
//!
//! Only idempotent operations are retried. `create` assigns a fresh id on
//! every attempt, so a retry after a lost acknowledgement would duplicate
//! the message; its failures go straight back to the caller instead.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::{ChangeStream, MessageStore, StoreError};
use crate::chat::{Message, MessageId, MessageRecord};
use crate::config::StoreConfig;

/// How often and how patiently to retry transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Delay before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    async fn run<T, F, Fut>(&self, op: &'static str, mut attempt: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(err) if err.is_transient() && retries < self.max_retries => {
                    retries += 1;
                    warn!(
                        name: "store.retry",
                        op,
                        attempt = retries,
                        error = %err,
                        "Transient store failure, retrying"
                    );
                    tokio::time::sleep(self.backoff * retries).await;
                }
                other => return other,
            }
        }
    }
}

/// A [`MessageStore`] that retries idempotent operations of an inner store.
#[derive(Debug, Clone)]
pub struct RetryingStore {
    inner: Arc<dyn MessageStore>,
    policy: RetryPolicy,
}

impl RetryingStore {
    pub fn new(inner: Arc<dyn MessageStore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl MessageStore for RetryingStore {
    async fn create(&self, message: &Message) -> Result<MessageId, StoreError> {
        self.inner.create(message).await
    }

    async fn query_ordered(&self) -> Result<Vec<MessageRecord>, StoreError> {
        self.policy
            .run("query_ordered", || self.inner.query_ordered())
            .await
    }

    async fn get(&self, id: &MessageId) -> Result<Option<MessageRecord>, StoreError> {
        self.policy.run("get", || self.inner.get(id)).await
    }

    async fn update(&self, id: &MessageId, message: &Message) -> Result<(), StoreError> {
        self.policy
            .run("update", || self.inner.update(id, message))
            .await
    }

    async fn delete(&self, id: &MessageId) -> Result<(), StoreError> {
        self.policy.run("delete", || self.inner.delete(id)).await
    }

    async fn subscribe(&self) -> Result<ChangeStream, StoreError> {
        self.policy.run("subscribe", || self.inner.subscribe()).await
    }
}
