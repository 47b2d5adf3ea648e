//! Error types for the subscriber runtime.
//!
//! This module provides:
//! - `SubscriberError` - The main error type for all subscriber operations
//! - Recognition helpers that classify Redis command errors by message
//!   substring, which is the contract Redis offers for these conditions

use thiserror::Error;

/// Errors that can occur in the subscriber runtime.
#[derive(Error, Debug)]
pub enum SubscriberError {
    /// Redis connection or command error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failure returned by the application message handler.
    #[error("Handler error: {0}")]
    Handler(String),

    /// Consumer group bootstrap error.
    #[error("Consumer group error: {0}")]
    ConsumerGroup(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A wait for processor termination was interrupted.
    #[error("Interrupted: {0}")]
    Interrupted(String),
}

impl SubscriberError {
    /// Check whether this is the `XGROUP CREATE` failure reported when the
    /// stream key does not exist yet.
    ///
    /// The stream is created lazily by the first producer, so a consumer can
    /// race ahead of the first publish; this condition is retried with a
    /// sleep rather than propagated. If the Redis server ever changes the
    /// message, this substring is the place to update.
    pub fn is_stream_missing(&self) -> bool {
        match self {
            Self::Redis(e) => e
                .to_string()
                .contains("The XGROUP subcommand requires the key to exist"),
            _ => false,
        }
    }

    /// Check whether this is the `BUSYGROUP` error reported when the
    /// consumer group already exists. Treated as success during bootstrap.
    pub fn is_group_already_exists(&self) -> bool {
        match self {
            Self::Redis(e) => {
                let err_str = e.to_string();
                err_str.contains("BUSYGROUP")
                    || err_str.contains("Consumer Group name already exists")
            }
            _ => false,
        }
    }

    /// Check if this is a BLOCK timeout (normal behavior, not an error).
    ///
    /// When `XREADGROUP BLOCK` expires with no messages Redis answers nil,
    /// which surfaces from the client as a timeout/nil-shaped error rather
    /// than an empty reply.
    pub fn is_block_timeout(&self) -> bool {
        match self {
            Self::Redis(e) => {
                let err_str = e.to_string().to_lowercase();
                if err_str.contains("connection") {
                    return false;
                }
                err_str.contains("timeout")
                    || err_str.contains("timed out")
                    || err_str.contains("nil")
                    || (err_str.contains("response") && err_str.contains("type"))
            }
            _ => false,
        }
    }

    /// Check if this is a connection-related error.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Redis(e) => {
                let err_str = e.to_string().to_lowercase();
                err_str.contains("connection")
                    || err_str.contains("disconnected")
                    || err_str.contains("broken pipe")
                    || err_str.contains("reset by peer")
                    || err_str.contains("refused")
                    || err_str.contains("io error")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redis::{ErrorKind, RedisError};

    fn server_error(detail: &str) -> SubscriberError {
        SubscriberError::Redis(RedisError::from((
            ErrorKind::ResponseError,
            "An error was signalled by the server",
            detail.to_string(),
        )))
    }

    #[test]
    fn test_stream_missing_recognized() {
        let err = server_error("The XGROUP subcommand requires the key to exist");
        assert!(err.is_stream_missing());
        assert!(!err.is_group_already_exists());
    }

    #[test]
    fn test_group_exists_recognized() {
        let err = server_error("BUSYGROUP Consumer Group name already exists");
        assert!(err.is_group_already_exists());
        assert!(!err.is_stream_missing());
    }

    #[test]
    fn test_unrelated_server_error_not_recognized() {
        let err = server_error("WRONGTYPE Operation against a key holding the wrong kind of value");
        assert!(!err.is_stream_missing());
        assert!(!err.is_group_already_exists());
        assert!(!err.is_block_timeout());
    }

    #[test]
    fn test_block_timeout_recognized() {
        let err = SubscriberError::Redis(RedisError::from((
            ErrorKind::IoError,
            "timed out",
        )));
        assert!(err.is_block_timeout());
    }

    #[test]
    fn test_connection_error_not_a_block_timeout() {
        let err = SubscriberError::Redis(RedisError::from((
            ErrorKind::IoError,
            "connection timed out",
        )));
        assert!(err.is_connection_error());
        assert!(!err.is_block_timeout());
    }

    #[test]
    fn test_handler_error_not_recognized_as_redis_condition() {
        let err = SubscriberError::Handler("downstream rejected the message".to_string());
        assert!(!err.is_stream_missing());
        assert!(!err.is_group_already_exists());
        assert!(!err.is_block_timeout());
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_error_display() {
        let err = SubscriberError::ConsumerGroup("bootstrap failed".to_string());
        assert_eq!(err.to_string(), "Consumer group error: bootstrap failed");
    }
}
