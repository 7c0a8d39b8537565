//! Broker and partition identities.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// One partition of a topic, hosted by one broker.
///
/// Identity is `(broker_id, partition_index)`; host and port are
/// transport details and take no part in equality, hashing, or ordering.
/// The total order by `(broker_id, partition_index)` is load-bearing:
/// every group member sorts the same partition set the same way before
/// computing its assignment, and any divergence here breaks the
/// disjointness guarantee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerPartition {
    /// Broker identifier as registered with the coordination service
    pub broker_id: u32,
    /// Host for broker connections
    pub host: String,
    /// Port for broker connections
    pub port: u16,
    /// Partition index within this broker's slice of the topic
    pub partition_index: u32,
}

impl BrokerPartition {
    /// Identity key: `(broker_id, partition_index)`.
    pub fn id(&self) -> (u32, u32) {
        (self.broker_id, self.partition_index)
    }

    /// Node name used for ownership markers and offset records,
    /// `{broker_id}-{partition_index}`.
    pub fn node_name(&self) -> String {
        format!("{}-{}", self.broker_id, self.partition_index)
    }

    /// Parse a `{broker_id}-{partition_index}` node name.
    pub fn parse_node_name(name: &str) -> Option<(u32, u32)> {
        let (broker, partition) = name.split_once('-')?;
        Some((broker.parse().ok()?, partition.parse().ok()?))
    }
}

impl PartialEq for BrokerPartition {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for BrokerPartition {}

impl Hash for BrokerPartition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl PartialOrd for BrokerPartition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BrokerPartition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id().cmp(&other.id())
    }
}

impl fmt::Display for BrokerPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{} ({}:{})", self.broker_id, self.partition_index, self.host, self.port)
    }
}

/// Broker registration document, stored at `/brokers/{broker_id}`.
///
/// The partition count is read from here, never guessed: a topic's total
/// partition set is the sum of `partitions_per_topic` over all registered
/// brokers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerMeta {
    /// Host for client connections
    pub host: String,
    /// Port for client connections
    pub port: u16,
    /// Number of partitions this broker hosts per topic
    pub partitions_per_topic: u32,
}

impl BrokerMeta {
    /// Expand this broker's registration into its `BrokerPartition`s.
    pub fn partitions(&self, broker_id: u32) -> impl Iterator<Item = BrokerPartition> + '_ {
        (0..self.partitions_per_topic).map(move |partition_index| BrokerPartition {
            broker_id,
            host: self.host.clone(),
            port: self.port,
            partition_index,
        })
    }
}
