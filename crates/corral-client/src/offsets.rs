//! Committed-offset tracking.
//!
//! One persistent node per `(group, topic, partition)` holds the
//! committed offset as a UTF-8 decimal. The store caches reads and
//! enforces the monotonic-commit rule: `commit` never moves an offset
//! backward; only the explicit `seek` reset can.

use crate::coordination::{paths, CoordResult, Coordination};
use bytes::Bytes;
use corral_core::BrokerPartition;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct OffsetStore {
    coordination: Arc<dyn Coordination>,
    group: String,
    topic: String,
    cache: RwLock<HashMap<(u32, u32), u64>>,
}

impl OffsetStore {
    pub fn new(
        coordination: Arc<dyn Coordination>,
        group: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            coordination,
            group: group.into(),
            topic: topic.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Offset the next fetch for `partition` should start from.
    ///
    /// Reads through to the persisted record on first use; a partition
    /// with no committed offset starts at 0.
    pub async fn position(&self, partition: &BrokerPartition) -> CoordResult<u64> {
        if let Some(offset) = self.cache.read().get(&partition.id()) {
            return Ok(*offset);
        }

        let path = paths::offset(&self.group, &self.topic, &partition.node_name());
        let offset = match self.coordination.get_data(&path).await? {
            Some(data) => parse_offset(&data).unwrap_or_else(|| {
                warn!(path = %path, "unparseable committed offset, starting from 0");
                0
            }),
            None => 0,
        };

        self.cache.write().insert(partition.id(), offset);
        Ok(offset)
    }

    /// Advance the committed offset. A commit at or below the current
    /// position is a no-op; offsets never move backward here.
    pub async fn commit(&self, partition: &BrokerPartition, offset: u64) -> CoordResult<()> {
        let current = self.cache.read().get(&partition.id()).copied();
        if let Some(current) = current {
            if offset <= current {
                return Ok(());
            }
        }

        let path = paths::offset(&self.group, &self.topic, &partition.node_name());
        self.coordination
            .set_data(&path, Bytes::from(offset.to_string()))
            .await?;
        self.cache.write().insert(partition.id(), offset);
        debug!(
            group = %self.group,
            topic = %self.topic,
            partition = %partition.node_name(),
            offset,
            "offset committed"
        );
        Ok(())
    }

    /// Drop every cached position, forcing the next reads back to the
    /// persisted records. Called when partition ownership changes: a
    /// partition regained after a rebalance may have been advanced by
    /// another member in the meantime.
    pub fn invalidate(&self) {
        self.cache.write().clear();
    }

    /// Explicit reset. Unlike [`commit`](Self::commit), this may move the
    /// offset backward. It is the one sanctioned way to re-consume.
    pub async fn seek(&self, partition: &BrokerPartition, offset: u64) -> CoordResult<()> {
        let path = paths::offset(&self.group, &self.topic, &partition.node_name());
        self.coordination
            .set_data(&path, Bytes::from(offset.to_string()))
            .await?;
        self.cache.write().insert(partition.id(), offset);
        debug!(
            group = %self.group,
            topic = %self.topic,
            partition = %partition.node_name(),
            offset,
            "offset reset"
        );
        Ok(())
    }
}

fn parse_offset(data: &[u8]) -> Option<u64> {
    std::str::from_utf8(data).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_offset() {
        assert_eq!(parse_offset(b"42"), Some(42));
        assert_eq!(parse_offset(b" 7\n"), Some(7));
        assert_eq!(parse_offset(b"not-a-number"), None);
        assert_eq!(parse_offset(b""), None);
    }
}
