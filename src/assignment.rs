//! Assignment document and its TTL'd Redis store.
//!
//! An assignment tells one member of a subscriber group which channels it
//! currently owns. It is produced by an external coordinator, written
//! through [`AssignmentStore`], and read back by the assignment listener.

use crate::error::SubscriberError;
use crate::keys::key_for_assignment;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// The channels (and optional per-channel partitions) assigned to one
/// member of a subscriber group.
///
/// Compares by value; `BTreeMap`/`BTreeSet` keep the serialized form
/// canonical, so value equality and serialized equality coincide. The
/// consumer never mutates an assignment in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    #[serde(default)]
    channels: BTreeMap<String, BTreeSet<u32>>,
}

impl Assignment {
    /// An assignment over the given channels with no partition detail.
    pub fn from_channels<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            channels: channels
                .into_iter()
                .map(|c| (c.into(), BTreeSet::new()))
                .collect(),
        }
    }

    /// Add or replace the partition set for one channel.
    pub fn with_partitions(
        mut self,
        channel: impl Into<String>,
        partitions: impl IntoIterator<Item = u32>,
    ) -> Self {
        self.channels
            .insert(channel.into(), partitions.into_iter().collect());
        self
    }

    /// The assigned channel names.
    pub fn channel_names(&self) -> BTreeSet<String> {
        self.channels.keys().cloned().collect()
    }

    /// The partition set for one channel, if the channel is assigned.
    pub fn partitions(&self, channel: &str) -> Option<&BTreeSet<u32>> {
        self.channels.get(channel)
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Reads and writes assignment documents under their TTL'd keys.
///
/// Writes are plain `SET ... PX` and reads plain `GET`; each operation is
/// idempotent at the Redis level. The coordinator re-writes periodically to
/// extend its lease.
#[derive(Clone)]
pub struct AssignmentStore {
    redis: ConnectionManager,
    assignment_ttl_ms: u64,
}

impl AssignmentStore {
    pub fn new(redis: ConnectionManager, assignment_ttl_ms: u64) -> Self {
        Self {
            redis,
            assignment_ttl_ms,
        }
    }

    /// Write the member's initial assignment.
    pub async fn initialize(
        &self,
        group_id: &str,
        member_id: &str,
        assignment: &Assignment,
    ) -> Result<(), SubscriberError> {
        self.write(group_id, member_id, assignment).await
    }

    /// Overwrite the member's assignment and reset its TTL.
    pub async fn save(
        &self,
        group_id: &str,
        member_id: &str,
        assignment: &Assignment,
    ) -> Result<(), SubscriberError> {
        self.write(group_id, member_id, assignment).await
    }

    /// Read the member's current assignment.
    ///
    /// Returns `None` when the key is absent or expired. A present key that
    /// fails to decode is corrupt state and propagates as an error; it is
    /// never mapped to `None`.
    pub async fn read(
        &self,
        group_id: &str,
        member_id: &str,
    ) -> Result<Option<Assignment>, SubscriberError> {
        let key = key_for_assignment(group_id, member_id);
        let mut conn = self.redis.clone();

        let raw: Option<String> = conn.get(&key).await?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn write(
        &self,
        group_id: &str,
        member_id: &str,
        assignment: &Assignment,
    ) -> Result<(), SubscriberError> {
        let key = key_for_assignment(group_id, member_id);
        let json = serde_json::to_string(assignment)?;
        let mut conn = self.redis.clone();

        let _: () = redis::cmd("SET")
            .arg(&key)
            .arg(&json)
            .arg("PX")
            .arg(self.assignment_ttl_ms)
            .query_async(&mut conn)
            .await?;

        debug!(key = %key, ttl_ms = self.assignment_ttl_ms, "Wrote assignment");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_equality_by_value() {
        let a = Assignment::from_channels(["orders", "payments"]);
        let b = Assignment::from_channels(["payments", "orders"]);
        assert_eq!(a, b);

        let c = b.clone().with_partitions("orders", [0, 1]);
        assert_ne!(a, c);
    }

    #[test]
    fn test_assignment_serde_round_trip() {
        let assignment =
            Assignment::from_channels(["orders"]).with_partitions("payments", [2, 0, 1]);

        let json = serde_json::to_string(&assignment).unwrap();
        let decoded: Assignment = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded, assignment);
        assert_eq!(
            decoded.partitions("payments").unwrap().iter().copied().collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_assignment_canonical_serialization() {
        let a = Assignment::from_channels(["b", "a"]);
        let b = Assignment::from_channels(["a", "b"]);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_assignment_channel_names() {
        let assignment = Assignment::from_channels(["orders", "shipping"]);
        let names: Vec<_> = assignment.channel_names().into_iter().collect();
        assert_eq!(names, vec!["orders".to_string(), "shipping".to_string()]);
        assert!(!assignment.is_empty());
        assert!(Assignment::default().is_empty());
    }

    #[test]
    fn test_assignment_decodes_missing_channels_field() {
        let decoded: Assignment = serde_json::from_str("{}").unwrap();
        assert!(decoded.is_empty());
    }
}
