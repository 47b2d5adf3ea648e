//! Per-channel consumer-group read loop.
//!
//! One `ChannelProcessor` serves one (subscriber, channel) pair. It
//! bootstraps the channel's Redis consumer group, drains the subscriber's
//! pending-entries list, then long-polls for new entries, acknowledging
//! each record only after the handler returned `Ok`.

use crate::config::SubscriberConfig;
use crate::error::SubscriberError;
use crate::message::{MessageHandler, RedisMessage};
use redis::aio::ConnectionManager;
use redis::streams::{StreamId, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, trace};

enum ReadFrom {
    /// The subscriber's pending-entries list (`XREADGROUP ... STREAMS c 0`).
    Pending,
    /// Entries never delivered to the group (`XREADGROUP ... STREAMS c >`).
    New,
}

/// The read loop for one channel of one subscriber.
///
/// `process()` blocks until [`stop`](ChannelProcessor::stop) is requested,
/// the handler fails, or an unexpected Redis error occurs. The Redis
/// consumer group and consumer are both named after the subscriber id, so a
/// restart with the same id re-reads exactly its own pending entries before
/// touching new ones.
///
/// A processor is single-shot: once `process()` has returned it stays
/// terminated and a fresh instance must be constructed to resume the
/// channel.
pub struct ChannelProcessor {
    redis: ConnectionManager,
    subscriber_id: String,
    channel: String,
    handler: Arc<dyn MessageHandler>,
    running: AtomicBool,
    terminated_tx: watch::Sender<bool>,
    terminated_rx: watch::Receiver<bool>,
    sleep_when_stream_missing: Duration,
    block_stream_time_ms: u64,
}

impl ChannelProcessor {
    pub fn new(
        redis: ConnectionManager,
        config: &SubscriberConfig,
        subscriber_id: impl Into<String>,
        channel: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        let subscriber_id = subscriber_id.into();
        let channel = channel.into();
        let (terminated_tx, terminated_rx) = watch::channel(false);

        info!(
            channel = %channel,
            subscriber_id = %subscriber_id,
            "Channel processor created"
        );

        Self {
            redis,
            subscriber_id,
            channel,
            handler,
            running: AtomicBool::new(false),
            terminated_tx,
            terminated_rx,
            sleep_when_stream_missing: Duration::from_millis(config.sleep_when_stream_missing_ms),
            block_stream_time_ms: config.block_stream_time_ms,
        }
    }

    /// Run the processing loop until stopped or failed.
    ///
    /// The termination latch is released exactly once, on every exit path,
    /// so a concurrent [`stop`](ChannelProcessor::stop) never hangs.
    pub async fn process(&self) -> Result<(), SubscriberError> {
        info!(
            channel = %self.channel,
            subscriber_id = %self.subscriber_id,
            "Channel processor started"
        );
        self.running.store(true, Ordering::SeqCst);

        let result = self.run().await;
        self.terminated_tx.send_replace(true);

        match &result {
            Ok(()) => info!(
                channel = %self.channel,
                subscriber_id = %self.subscriber_id,
                "Channel processor finished"
            ),
            Err(e) => error!(
                channel = %self.channel,
                subscriber_id = %self.subscriber_id,
                error = %e,
                "Channel processor failed"
            ),
        }

        result
    }

    /// Request the loop to stop and wait for termination.
    ///
    /// Latency is bounded by whichever blocking call is outstanding: the
    /// `XREADGROUP BLOCK` timeout or one stream-missing sleep interval.
    pub async fn stop(&self) -> Result<(), SubscriberError> {
        info!(
            channel = %self.channel,
            subscriber_id = %self.subscriber_id,
            "Stopping channel processor"
        );
        self.running.store(false, Ordering::SeqCst);

        let mut terminated = self.terminated_rx.clone();
        terminated
            .wait_for(|done| *done)
            .await
            .map_err(|e| SubscriberError::Interrupted(e.to_string()))?;

        info!(
            channel = %self.channel,
            subscriber_id = %self.subscriber_id,
            "Stopped channel processor"
        );
        Ok(())
    }

    /// The channel this processor reads.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn run(&self) -> Result<(), SubscriberError> {
        self.ensure_consumer_group().await?;
        self.drain_pending().await?;
        self.read_new().await
    }

    /// Create the channel's consumer group, waiting out a stream that no
    /// producer has created yet.
    ///
    /// The group's read position starts at `0` so entries published between
    /// stream creation and group creation are still delivered.
    async fn ensure_consumer_group(&self) -> Result<(), SubscriberError> {
        debug!(channel = %self.channel, subscriber_id = %self.subscriber_id, "Ensuring consumer group exists");

        while self.is_running() {
            let mut conn = self.redis.clone();
            let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(&self.channel)
                .arg(&self.subscriber_id)
                .arg("0")
                .query_async(&mut conn)
                .await;

            match result {
                Ok(()) => {
                    info!(channel = %self.channel, subscriber_id = %self.subscriber_id, "Created consumer group");
                    return Ok(());
                }
                Err(e) => {
                    let err = SubscriberError::from(e);
                    if err.is_stream_missing() {
                        debug!(
                            channel = %self.channel,
                            sleep_ms = %self.sleep_when_stream_missing.as_millis(),
                            "Stream does not exist yet, waiting for first publish"
                        );
                        tokio::time::sleep(self.sleep_when_stream_missing).await;
                        continue;
                    }
                    if err.is_group_already_exists() {
                        debug!(channel = %self.channel, subscriber_id = %self.subscriber_id, "Consumer group already exists");
                        return Ok(());
                    }
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    /// Re-deliver everything this subscriber was handed but never acked.
    ///
    /// An empty batch means the pending-entries list is drained and new
    /// entries may be consumed.
    async fn drain_pending(&self) -> Result<(), SubscriberError> {
        debug!(channel = %self.channel, "Draining pending records");

        while self.is_running() {
            let records = self.read_batch(ReadFrom::Pending).await?;
            if records.is_empty() {
                return Ok(());
            }
            self.handle_records(records).await?;
        }

        Ok(())
    }

    async fn read_new(&self) -> Result<(), SubscriberError> {
        trace!(channel = %self.channel, "Reading new records");

        while self.is_running() {
            let records = self.read_batch(ReadFrom::New).await?;
            self.handle_records(records).await?;
        }

        Ok(())
    }

    async fn read_batch(&self, from: ReadFrom) -> Result<Vec<StreamId>, SubscriberError> {
        let mut conn = self.redis.clone();

        let mut opts =
            StreamReadOptions::default().group(&self.subscriber_id, &self.subscriber_id);
        let offset = match from {
            ReadFrom::Pending => "0",
            ReadFrom::New => {
                opts = opts.block(self.block_stream_time_ms as usize);
                ">"
            }
        };

        let result: Result<StreamReadReply, _> = conn
            .xread_options(&[&self.channel], &[offset], &opts)
            .await;

        match result {
            Ok(reply) => {
                let records: Vec<StreamId> =
                    reply.keys.into_iter().flat_map(|key| key.ids).collect();
                if !records.is_empty() {
                    trace!(
                        channel = %self.channel,
                        count = records.len(),
                        "Read records"
                    );
                }
                Ok(records)
            }
            Err(e) => {
                let err = SubscriberError::from(e);
                // BLOCK expiring with no entries surfaces as a nil/timeout
                // shaped error, not as an empty reply.
                if err.is_block_timeout() {
                    Ok(vec![])
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn handle_records(&self, records: Vec<StreamId>) -> Result<(), SubscriberError> {
        for record in records {
            for value in record.map.values() {
                let Some(payload) = field_value_to_string(value) else {
                    debug!(
                        channel = %self.channel,
                        record_id = %record.id,
                        "Skipping non-string field value"
                    );
                    continue;
                };
                self.handle_message(payload, &record.id).await?;
            }
        }
        Ok(())
    }

    async fn handle_message(
        &self,
        payload: String,
        record_id: &str,
    ) -> Result<(), SubscriberError> {
        trace!(
            channel = %self.channel,
            record_id = %record_id,
            "Invoking message handler"
        );

        if let Err(e) = self
            .handler
            .handle(RedisMessage::new(payload, record_id))
            .await
        {
            error!(
                channel = %self.channel,
                record_id = %record_id,
                error = %e,
                "Message handler failed, record left pending"
            );
            return Err(e);
        }

        let mut conn = self.redis.clone();
        let _: () = conn
            .xack(&self.channel, &self.subscriber_id, &[record_id])
            .await?;

        trace!(channel = %self.channel, record_id = %record_id, "Acknowledged record");
        Ok(())
    }
}

fn field_value_to_string(value: &redis::Value) -> Option<String> {
    match value {
        redis::Value::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).to_string()),
        redis::Value::SimpleString(s) => Some(s.clone()),
        redis::Value::Int(i) => Some(i.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_to_string() {
        assert_eq!(
            field_value_to_string(&redis::Value::BulkString(b"{\"a\":1}".to_vec())),
            Some("{\"a\":1}".to_string())
        );
        assert_eq!(
            field_value_to_string(&redis::Value::SimpleString("ok".to_string())),
            Some("ok".to_string())
        );
        assert_eq!(
            field_value_to_string(&redis::Value::Int(7)),
            Some("7".to_string())
        );
        assert_eq!(field_value_to_string(&redis::Value::Nil), None);
    }
}
