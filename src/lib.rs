//! Redis Messaging
//!
//! An assignment-driven Redis Streams consumer runtime. A Redis instance is
//! both the transport and the coordination medium: producers append entries
//! to streams ("channels"), an external coordinator leases each member of a
//! subscriber group a subset of the channels, and this crate's runtime
//! reads that assignment, consumes the assigned channels through Redis
//! Streams consumer groups, and acknowledges entries only after the
//! application handler succeeded.
//!
//! ## Features
//!
//! - **At-least-once delivery**: records are acked only after the handler
//!   returned `Ok`; restarts drain the pending-entries list first
//! - **Dynamic assignment**: a TTL'd assignment key is polled and the set
//!   of running channel processors is reconciled on every change
//! - **Bounded shutdown**: stopping a processor is cooperative and bounded
//!   by the configured `XREADGROUP BLOCK` timeout
//! - **In-order per channel**: one processor per (subscriber, channel)
//!   delivers records in Redis id order, pending before new
//!
//! ## Example
//!
//! ```ignore
//! use redis_messaging::{connect, MessageHandler, RedisMessage, SubscriberConfig, Subscription, SubscriberError};
//! use std::sync::Arc;
//!
//! struct PrintHandler;
//!
//! #[async_trait::async_trait]
//! impl MessageHandler for PrintHandler {
//!     async fn handle(&self, message: RedisMessage) -> Result<(), SubscriberError> {
//!         println!("{} -> {}", message.record_id(), message.payload());
//!         Ok(())
//!     }
//! }
//!
//! let redis = connect("redis://127.0.0.1:6379").await?;
//! let subscription = Subscription::start(
//!     redis,
//!     SubscriberConfig::default(),
//!     "billing",
//!     "member-1",
//!     Arc::new(PrintHandler),
//! )
//! .await?;
//! ```

mod assignment;
mod config;
mod connection;
mod error;
mod keys;
mod listener;
mod message;
mod processor;
mod subscription;

// Re-export main types
pub use assignment::{Assignment, AssignmentStore};
pub use config::{HostAndPort, SubscriberConfig};
pub use connection::{connect, connect_from_config, connect_with_retry};
pub use error::SubscriberError;
pub use keys::key_for_assignment;
pub use listener::{AssignmentCallback, AssignmentListener};
pub use message::{HandlerFn, MessageHandler, RedisMessage};
pub use processor::ChannelProcessor;
pub use subscription::Subscription;
