//! Message value and handler capability.
//!
//! This module provides:
//! - `RedisMessage` - one stream entry payload plus its record id
//! - `MessageHandler` - the single-method capability a subscriber supplies
//! - `HandlerFn` - adapter turning an async closure into a handler

use crate::error::SubscriberError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;

/// One payload delivered from a Redis stream entry.
///
/// Created when an entry is read and dropped after acknowledgment; a record
/// retried after a restart is delivered as a fresh value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisMessage {
    payload: String,
    record_id: String,
}

impl RedisMessage {
    pub fn new(payload: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            record_id: record_id.into(),
        }
    }

    /// The entry's payload string.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// The Redis-assigned `ms-seq` record id, monotonic per stream.
    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    /// The entry creation time encoded in the record id, if parseable.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.record_id
            .split('-')
            .next()
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
    }
}

/// The capability a subscriber supplies to consume messages.
///
/// Returning `Ok` acknowledges the record; returning `Err` leaves it on the
/// pending-entries list and terminates the channel processor that delivered
/// it. Handlers run on the processor's task, so their latency directly
/// back-pressures reads.
///
/// # Example
///
/// ```rust,ignore
/// struct OrderHandler;
///
/// #[async_trait]
/// impl MessageHandler for OrderHandler {
///     async fn handle(&self, message: RedisMessage) -> Result<(), SubscriberError> {
///         process_order(message.payload()).await
///     }
/// }
/// ```
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process a single message.
    async fn handle(&self, message: RedisMessage) -> Result<(), SubscriberError>;
}

/// Adapter that lets a plain async closure act as a [`MessageHandler`].
pub struct HandlerFn<F>(pub F);

#[async_trait]
impl<F, Fut> MessageHandler for HandlerFn<F>
where
    F: Fn(RedisMessage) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), SubscriberError>> + Send,
{
    async fn handle(&self, message: RedisMessage) -> Result<(), SubscriberError> {
        (self.0)(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_parsed_from_record_id() {
        let now_ms = Utc::now().timestamp_millis();
        let message = RedisMessage::new("payload", format!("{}-0", now_ms));

        let ts = message.timestamp().unwrap();
        assert_eq!(ts.timestamp_millis(), now_ms);
    }

    #[test]
    fn test_timestamp_absent_for_malformed_id() {
        let message = RedisMessage::new("payload", "not-an-id");
        assert!(message.timestamp().is_none());
    }

    #[tokio::test]
    async fn test_handler_fn_adapter() {
        let handler = HandlerFn(|message: RedisMessage| async move {
            if message.payload() == "bad" {
                Err(SubscriberError::Handler("rejected".to_string()))
            } else {
                Ok(())
            }
        });

        assert!(handler
            .handle(RedisMessage::new("ok", "1-0"))
            .await
            .is_ok());
        assert!(handler
            .handle(RedisMessage::new("bad", "2-0"))
            .await
            .is_err());
    }
}
