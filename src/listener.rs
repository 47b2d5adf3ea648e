//! Assignment change detection.
//!
//! The listener polls a member's assignment key at a fixed interval and
//! invokes a callback whenever the decoded document changes to a present
//! value. Absent reads are remembered but not reported (unless
//! `treat_missing_as_empty` is set), so a transient coordinator outage does
//! not tear a consumer down.

use crate::assignment::{Assignment, AssignmentStore};
use crate::config::SubscriberConfig;
use crate::error::SubscriberError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Async callback invoked with each newly observed assignment.
///
/// Runs on the listener's poll task; a callback slower than the poll
/// interval delays subsequent polls, which is acceptable.
pub type AssignmentCallback =
    Arc<dyn Fn(Assignment) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Polls the assignment key for one (group, member) pair and reports
/// changes.
///
/// Construction performs one immediate read and fires the callback if a
/// value is present, then spawns the recurring poll task. Polls are serial
/// and never overlap. [`remove`](AssignmentListener::remove) cancels the
/// task; an in-flight callback completes first.
pub struct AssignmentListener {
    shutdown: watch::Sender<bool>,
    poll_task: Option<JoinHandle<()>>,
}

impl AssignmentListener {
    pub async fn start(
        store: AssignmentStore,
        group_id: impl Into<String>,
        member_id: impl Into<String>,
        config: &SubscriberConfig,
        callback: AssignmentCallback,
    ) -> Result<Self, SubscriberError> {
        let group_id = group_id.into();
        let member_id = member_id.into();
        let interval = Duration::from_millis(config.assignment_listener_interval_ms);
        let treat_missing_as_empty = config.treat_missing_as_empty;

        let mut last_assignment = store.read(&group_id, &member_id).await?;
        if let Some(assignment) = &last_assignment {
            info!(
                group_id = %group_id,
                member_id = %member_id,
                "Initial assignment present"
            );
            callback(assignment.clone()).await;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let poll_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            debug!(group_id = %group_id, member_id = %member_id, "Assignment listener stopping");
                            break;
                        }
                    }
                    _ = tokio::time::sleep(interval) => {
                        let current = match store.read(&group_id, &member_id).await {
                            Ok(current) => current,
                            Err(e @ SubscriberError::Serialization(_)) => {
                                // Corrupt document under a live key; retrying
                                // cannot help.
                                error!(
                                    group_id = %group_id,
                                    member_id = %member_id,
                                    error = %e,
                                    "Assignment document failed to decode, listener terminating"
                                );
                                break;
                            }
                            Err(e) => {
                                warn!(
                                    group_id = %group_id,
                                    member_id = %member_id,
                                    error = %e,
                                    "Assignment read failed, will retry"
                                );
                                continue;
                            }
                        };

                        if current == last_assignment {
                            continue;
                        }

                        match current {
                            Some(assignment) => {
                                info!(group_id = %group_id, member_id = %member_id, "Assignment changed");
                                callback(assignment.clone()).await;
                                last_assignment = Some(assignment);
                            }
                            None => {
                                info!(
                                    group_id = %group_id,
                                    member_id = %member_id,
                                    "Assignment key absent"
                                );
                                if treat_missing_as_empty {
                                    callback(Assignment::default()).await;
                                }
                                last_assignment = None;
                            }
                        }
                    }
                }
            }
        });

        Ok(Self {
            shutdown,
            poll_task: Some(poll_task),
        })
    }

    /// Cancel the recurring poll and wait for the poll task to finish.
    pub async fn remove(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.poll_task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "Assignment listener poll task panicked");
            }
        }
    }
}
