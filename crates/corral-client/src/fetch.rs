//! Partition-aware fetch routing.
//!
//! One fetch pass works against a single assignment snapshot: partitions
//! are fetched concurrently, an unreachable broker excludes only its own
//! partitions, and offsets advance only for entries that made it into the
//! result. If a rebalance installed a newer assignment while the pass was
//! in flight, the whole result is discarded: nothing from a superseded
//! version is surfaced or committed.

use crate::broker::BrokerClient;
use crate::coordinator::{GroupCoordinator, MemberState};
use crate::error::{Error, Result};
use crate::offsets::OffsetStore;
use corral_core::{BrokerPartition, FetchResult, PartitionMessages};
use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct FetchRouter {
    broker: Arc<dyn BrokerClient>,
    coordinator: Arc<GroupCoordinator>,
    offsets: Arc<OffsetStore>,
    topic: String,
    /// Assignment version of the previous pass; a bump invalidates the
    /// offset cache (a regained partition may have moved under another
    /// member)
    seen_version: AtomicU64,
}

enum PartitionFetch {
    Fetched(PartitionMessages),
    Unreachable(BrokerPartition),
    Failed(Error),
}

impl FetchRouter {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        coordinator: Arc<GroupCoordinator>,
        offsets: Arc<OffsetStore>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            coordinator,
            offsets,
            topic: topic.into(),
            seen_version: AtomicU64::new(0),
        }
    }

    /// Fetch new messages from every partition in the current assignment.
    ///
    /// An empty assignment fetches nothing and returns an empty result.
    /// Partitions with no new data contribute an entry with an empty
    /// message list. Neither is an error.
    pub async fn fetch(&self) -> Result<FetchResult> {
        match self.coordinator.state() {
            MemberState::Closed => return Err(Error::Closed),
            MemberState::SessionLost => {
                return Err(Error::SessionExpired {
                    consumer_id: self.coordinator.consumer_id().to_string(),
                })
            }
            _ => {}
        }

        let snapshot = self.coordinator.assignment();
        if self.seen_version.swap(snapshot.version, Ordering::SeqCst) != snapshot.version {
            self.offsets.invalidate();
        }
        if snapshot.is_empty() {
            return Ok(FetchResult::default());
        }

        let passes = snapshot
            .partitions
            .iter()
            .map(|partition| self.fetch_partition(partition));
        let outcomes = join_all(passes).await;

        // A rebalance that completed mid-flight supersedes everything we
        // just read; drop it on the floor without advancing offsets.
        let current = self.coordinator.assignment();
        if current.version != snapshot.version {
            debug!(
                topic = %self.topic,
                stale_version = snapshot.version,
                current_version = current.version,
                "discarding fetch results from superseded assignment"
            );
            return Ok(FetchResult::default());
        }

        let mut result = FetchResult::default();
        for outcome in outcomes {
            match outcome {
                PartitionFetch::Fetched(entry) => {
                    self.offsets
                        .commit(&entry.partition, entry.next_offset)
                        .await
                        .map_err(|e| {
                            Error::from_coord(e, self.coordinator.consumer_id())
                        })?;
                    result.entries.push(entry);
                }
                PartitionFetch::Unreachable(partition) => {
                    result.unreachable.push(partition);
                }
                PartitionFetch::Failed(e) => return Err(e),
            }
        }

        Ok(result)
    }

    async fn fetch_partition(&self, partition: &BrokerPartition) -> PartitionFetch {
        let offset = match self.offsets.position(partition).await {
            Ok(offset) => offset,
            Err(e) => {
                return PartitionFetch::Failed(Error::from_coord(
                    e,
                    self.coordinator.consumer_id(),
                ))
            }
        };

        match self.broker.fetch(partition, &self.topic, offset).await {
            Ok(batch) => {
                let next_offset = offset + batch.messages.len() as u64;
                PartitionFetch::Fetched(PartitionMessages {
                    partition: partition.clone(),
                    messages: batch.messages,
                    next_offset,
                })
            }
            Err(e) if e.is_unreachable() => {
                // Transient by assumption: the partition stays owned and
                // is retried on the next pass. Only membership/topology
                // events move ownership, never a failed fetch.
                warn!(
                    topic = %self.topic,
                    partition = %partition.node_name(),
                    error = %e,
                    "broker unreachable, excluding partition from this fetch"
                );
                PartitionFetch::Unreachable(partition.clone())
            }
            Err(e) => PartitionFetch::Failed(e.into()),
        }
    }
}
