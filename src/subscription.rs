//! Assignment-driven subscription runtime.
//!
//! A `Subscription` composes an [`AssignmentListener`] with a dynamic pool
//! of [`ChannelProcessor`]s: whenever the member's assignment changes, the
//! running processor set is reconciled against the newly assigned channel
//! set, starting a processor task per added channel and stopping the
//! processor of each removed one.

use crate::assignment::{Assignment, AssignmentStore};
use crate::config::SubscriberConfig;
use crate::error::SubscriberError;
use crate::listener::{AssignmentCallback, AssignmentListener};
use crate::message::MessageHandler;
use crate::processor::ChannelProcessor;
use redis::aio::ConnectionManager;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

struct ProcessorHandle {
    processor: Arc<ChannelProcessor>,
    task: JoinHandle<Result<(), SubscriberError>>,
}

struct SubscriptionState {
    redis: ConnectionManager,
    config: SubscriberConfig,
    /// Group id of the subscription; doubles as the Redis consumer-group
    /// name and consumer name of every channel processor.
    subscriber_id: String,
    handler: Arc<dyn MessageHandler>,
    processors: Mutex<HashMap<String, ProcessorHandle>>,
}

impl SubscriptionState {
    /// Bring the running processor set in line with the assignment.
    ///
    /// Diffing is by channel-name set only: partition churn inside an
    /// unchanged channel set restarts nothing.
    async fn reconcile(&self, assignment: Assignment) {
        let desired = assignment.channel_names();
        let mut processors = self.processors.lock().await;
        let current: BTreeSet<String> = processors.keys().cloned().collect();

        let added: Vec<String> = desired.difference(&current).cloned().collect();
        let removed: Vec<String> = current.difference(&desired).cloned().collect();

        if added.is_empty() && removed.is_empty() {
            return;
        }

        info!(
            subscriber_id = %self.subscriber_id,
            added = ?added,
            removed = ?removed,
            "Reconciling channel processors"
        );

        for channel in added {
            let processor = Arc::new(ChannelProcessor::new(
                self.redis.clone(),
                &self.config,
                self.subscriber_id.clone(),
                channel.clone(),
                Arc::clone(&self.handler),
            ));
            let task = tokio::spawn({
                let processor = Arc::clone(&processor);
                async move { processor.process().await }
            });
            processors.insert(channel, ProcessorHandle { processor, task });
        }

        for channel in removed {
            if let Some(handle) = processors.remove(&channel) {
                stop_and_join(&channel, handle).await;
            }
        }
    }
}

async fn stop_and_join(channel: &str, handle: ProcessorHandle) {
    if let Err(e) = handle.processor.stop().await {
        error!(channel = %channel, error = %e, "Failed to stop channel processor");
        return;
    }
    match handle.task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(channel = %channel, error = %e, "Channel processor had exited with error")
        }
        Err(e) => error!(channel = %channel, error = %e, "Channel processor task panicked"),
    }
}

/// One member's subscription to the channels its group assigns to it.
///
/// # Example
///
/// ```rust,ignore
/// let redis = connect("redis://127.0.0.1:6379").await?;
/// let config = SubscriberConfig::default();
///
/// let subscription = Subscription::start(
///     redis,
///     config,
///     "billing",
///     "member-1",
///     Arc::new(OrderHandler),
/// )
/// .await?;
///
/// // ... runs until ...
/// subscription.close().await;
/// ```
pub struct Subscription {
    listener: AssignmentListener,
    state: Arc<SubscriptionState>,
}

impl Subscription {
    /// Start consuming as `member_id` of `group_id`.
    ///
    /// The member's channel processors use `group_id` as both the Redis
    /// consumer-group name and consumer name, so the group id must stay
    /// stable across restarts for pending entries to be recovered.
    pub async fn start(
        redis: ConnectionManager,
        config: SubscriberConfig,
        group_id: impl Into<String>,
        member_id: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Self, SubscriberError> {
        let group_id = group_id.into();
        let member_id = member_id.into();

        info!(
            group_id = %group_id,
            member_id = %member_id,
            "Starting subscription"
        );

        let store = AssignmentStore::new(redis.clone(), config.assignment_ttl_ms);
        let state = Arc::new(SubscriptionState {
            redis,
            subscriber_id: group_id.clone(),
            handler,
            processors: Mutex::new(HashMap::new()),
            config: config.clone(),
        });

        let callback: AssignmentCallback = {
            let state = Arc::clone(&state);
            Arc::new(move |assignment| {
                let state = Arc::clone(&state);
                Box::pin(async move { state.reconcile(assignment).await })
            })
        };

        let listener =
            AssignmentListener::start(store, group_id, member_id, &config, callback).await?;

        Ok(Self { listener, state })
    }

    /// Start with a generated one-shot member id.
    ///
    /// Suitable when member identity is leased per process lifetime and the
    /// coordinator assigns against whatever members it currently sees.
    pub async fn start_anonymous(
        redis: ConnectionManager,
        config: SubscriberConfig,
        group_id: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Self, SubscriberError> {
        let member_id = format!("member-{}", Uuid::new_v4());
        Self::start(redis, config, group_id, member_id, handler).await
    }

    /// Channels with a running (or terminally failed but not yet
    /// unassigned) processor.
    pub async fn active_channels(&self) -> BTreeSet<String> {
        self.state.processors.lock().await.keys().cloned().collect()
    }

    /// Stop listening for assignments, stop all channel processors, and
    /// wait for their tasks to finish.
    pub async fn close(mut self) {
        info!(subscriber_id = %self.state.subscriber_id, "Closing subscription");

        self.listener.remove().await;

        let mut processors = self.state.processors.lock().await;
        let channels: Vec<String> = processors.keys().cloned().collect();
        for channel in channels {
            if let Some(handle) = processors.remove(&channel) {
                stop_and_join(&channel, handle).await;
            }
        }

        info!(subscriber_id = %self.state.subscriber_id, "Subscription closed");
    }
}
