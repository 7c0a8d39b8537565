//! High-level group consumer.
//!
//! Composes the group coordinator (membership + rebalancing) with the
//! fetch router (routing + offsets) behind the surface most callers
//! want: join, fetch in a loop, close.
//!
//! # Example
//!
//! ```rust,ignore
//! use corral_client::{Consumer, ConsumerConfig};
//!
//! let config = ConsumerConfig::builder()
//!     .group("analytics")
//!     .topic("events")
//!     .build();
//!
//! let consumer = Consumer::join(coordination, brokers, config).await?;
//! loop {
//!     let result = consumer.fetch().await?;
//!     for entry in &result {
//!         for message in &entry.messages {
//!             handle(message);
//!         }
//!     }
//! }
//! ```

use crate::broker::BrokerClient;
use crate::config::ConsumerConfig;
use crate::coordination::Coordination;
use crate::coordinator::{GroupCoordinator, MemberState};
use crate::error::{Error, Result};
use crate::fetch::FetchRouter;
use crate::offsets::OffsetStore;
use crate::topology::TopologyView;
use corral_core::{BrokerPartition, FetchResult};
use std::sync::Arc;
use tracing::info;

/// One member of a consumer group.
///
/// Partition ownership shifts underneath as members join and leave;
/// `fetch` always works against the coordinator's current converged
/// assignment. Offsets advance automatically as fetches succeed
/// (at-least-once: a crash between fetch and processing re-reads).
pub struct Consumer {
    coordinator: Arc<GroupCoordinator>,
    router: FetchRouter,
    offsets: Arc<OffsetStore>,
}

impl Consumer {
    /// Register with the group, run the initial rebalance, and start
    /// watching for membership and topology changes.
    pub async fn join(
        coordination: Arc<dyn Coordination>,
        brokers: Arc<dyn BrokerClient>,
        config: ConsumerConfig,
    ) -> Result<Self> {
        let topology = TopologyView::new(Arc::clone(&coordination), config.topic.clone());
        let offsets = Arc::new(OffsetStore::new(
            Arc::clone(&coordination),
            config.group.clone(),
            config.topic.clone(),
        ));
        let topic = config.topic.clone();

        let coordinator = GroupCoordinator::new(coordination, topology, config);
        coordinator.join().await?;

        let router = FetchRouter::new(brokers, Arc::clone(&coordinator), Arc::clone(&offsets), topic);

        Ok(Self {
            coordinator,
            router,
            offsets,
        })
    }

    /// Fetch new messages from every owned partition. See
    /// [`FetchRouter::fetch`](crate::fetch::FetchRouter) for the
    /// per-partition failure and empty-result contracts.
    pub async fn fetch(&self) -> Result<FetchResult> {
        self.router.fetch().await
    }

    /// Partitions this member currently owns.
    pub fn broker_partitions(&self) -> Vec<BrokerPartition> {
        self.coordinator.assignment().partitions.clone()
    }

    /// Assignment version, bumped by every rebalance.
    pub fn assignment_version(&self) -> u64 {
        self.coordinator.assignment().version
    }

    pub fn consumer_id(&self) -> &str {
        self.coordinator.consumer_id()
    }

    pub fn state(&self) -> MemberState {
        self.coordinator.state()
    }

    /// Reset the committed offset for an owned partition. The next fetch
    /// starts from `offset`; this is the only way offsets move backward.
    pub async fn seek(&self, partition: &BrokerPartition, offset: u64) -> Result<()> {
        if !self.coordinator.assignment().owns(partition) {
            return Err(Error::Coordination(format!(
                "cannot seek partition {} this member does not own",
                partition.node_name()
            )));
        }
        self.offsets
            .seek(partition, offset)
            .await
            .map_err(|e| Error::from_coord(e, self.coordinator.consumer_id()))
    }

    /// Recover from [`MemberState::SessionLost`] by re-joining from
    /// scratch. The member gets a fresh registration and re-claims a
    /// slice as if it had never been in the group.
    pub async fn rejoin(&self) -> Result<()> {
        self.coordinator.rejoin().await
    }

    /// Leave the group: release ownership markers and delete the member
    /// registration. Idempotent.
    pub async fn close(&self) -> Result<()> {
        self.coordinator.close().await?;
        info!(consumer = %self.coordinator.consumer_id(), "consumer closed");
        Ok(())
    }
}
