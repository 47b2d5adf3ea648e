//! Redis connection bootstrap.

use redis::aio::ConnectionManager;
use redis::Client;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::SubscriberConfig;
use crate::error::SubscriberError;

/// Connect to Redis and return a `ConnectionManager`.
///
/// The `ConnectionManager` automatically handles connection failures and
/// reconnections; cloning it is cheap and every component of this crate
/// works on cheap clones of one manager. The connection is verified with a
/// `PING` before being handed out.
pub async fn connect(url: &str) -> Result<ConnectionManager, SubscriberError> {
    info!(url = %url, "Connecting to Redis");

    let client = Client::open(url)?;
    let manager = ConnectionManager::new(client).await?;

    let mut conn = manager.clone();
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;

    info!("Connected to Redis");
    Ok(manager)
}

/// Connect to the first server of a [`SubscriberConfig`].
pub async fn connect_from_config(
    config: &SubscriberConfig,
) -> Result<ConnectionManager, SubscriberError> {
    connect(&config.url()?).await
}

/// Connect with exponential-backoff retries for transient startup failures.
///
/// Delays start at 100ms and double per attempt, capped at 5s.
pub async fn connect_with_retry(
    url: &str,
    max_retries: u32,
) -> Result<ConnectionManager, SubscriberError> {
    let mut attempt = 0;
    let mut delay_ms: u64 = 100;

    loop {
        match connect(url).await {
            Ok(manager) => return Ok(manager),
            Err(e) => {
                attempt += 1;
                if attempt > max_retries {
                    return Err(e);
                }
                warn!(
                    attempt = attempt,
                    delay_ms = delay_ms,
                    error = %e,
                    "Redis connection failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = (delay_ms * 2).min(5_000);
            }
        }
    }
}
