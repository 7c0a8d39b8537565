//! High-level producer.
//!
//! Producers are group-independent: every producer sees the same full
//! partition set from the topology view and spreads messages over it.

use crate::broker::BrokerClient;
use crate::config::ProducerConfig;
use crate::coordination::Coordination;
use crate::error::Result;
use crate::produce::{PartitionSelector, ProducePartitioner};
use crate::topology::TopologyView;
use bytes::Bytes;
use corral_core::{BrokerPartition, ProduceReport};
use std::sync::Arc;
use tracing::info;

/// Routes outgoing messages across a topic's full partition set.
pub struct Producer {
    topology: Arc<TopologyView>,
    partitioner: ProducePartitioner,
    topic: String,
}

impl Producer {
    /// Create a producer and resolve the initial topology. Starts the
    /// background watcher so the partition set tracks broker changes.
    pub async fn new(
        coordination: Arc<dyn Coordination>,
        brokers: Arc<dyn BrokerClient>,
        config: ProducerConfig,
    ) -> Result<Self> {
        let topology = TopologyView::new(coordination, config.topic.clone());
        // An empty partition set here is fine: a topic with no brokers
        // yet produces empty reports until registrations appear.
        if let Err(e) = topology.refresh().await {
            tracing::warn!(topic = %config.topic, error = %e, "initial topology resolution failed");
        }
        topology.start();

        let partitioner =
            ProducePartitioner::new(brokers, Arc::clone(&topology), config.topic.clone());

        info!(topic = %config.topic, "producer ready");
        Ok(Self {
            topology,
            partitioner,
            topic: config.topic,
        })
    }

    /// Send messages spread round-robin across the partition set.
    pub async fn send(&self, messages: Vec<Bytes>) -> Result<ProduceReport> {
        self.partitioner
            .produce(messages, PartitionSelector::RoundRobin)
            .await
    }

    /// Send all messages to the partition at `index` in the ordered
    /// partition list.
    pub async fn send_to(&self, index: usize, messages: Vec<Bytes>) -> Result<ProduceReport> {
        self.partitioner
            .produce(messages, PartitionSelector::Index(index))
            .await
    }

    /// The full partition set this producer currently routes over.
    pub fn broker_partitions(&self) -> Vec<BrokerPartition> {
        self.topology.snapshot().as_ref().clone()
    }

    /// Stop the background topology watcher.
    pub fn close(&self) {
        self.topology.stop();
        info!(topic = %self.topic, "producer closed");
    }
}
