//! Partition-aware produce routing.
//!
//! Producers see the full group-independent topology. Without an explicit
//! target, messages spread over the partition set by round-robin: one
//! monotonically increasing counter taken modulo the current partition
//! count, so the spread stays even as brokers come and go. Each resolved
//! partition gets one produce call with its sub-batch, and a broker being
//! down fails only its own sub-batch.

use crate::broker::BrokerClient;
use crate::error::{Error, Result};
use crate::topology::TopologyView;
use bytes::Bytes;
use corral_core::{BrokerPartition, Delivery, DeliveryFailure, ProduceReport};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// How a produce call picks partitions for its messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartitionSelector {
    /// Spread messages round-robin across the full partition set
    #[default]
    RoundRobin,
    /// Send every message to the partition at this index in the ordered
    /// partition list
    Index(usize),
}

pub struct ProducePartitioner {
    broker: Arc<dyn BrokerClient>,
    topology: Arc<TopologyView>,
    topic: String,
    cursor: AtomicU64,
}

impl ProducePartitioner {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        topology: Arc<TopologyView>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            topology,
            topic: topic.into(),
            cursor: AtomicU64::new(0),
        }
    }

    /// Route `messages` across the current topology.
    ///
    /// No registered brokers means nowhere to send: the report comes back
    /// empty rather than erroring, matching the empty-topic contract on
    /// the fetch side.
    pub async fn produce(
        &self,
        messages: Vec<Bytes>,
        selector: PartitionSelector,
    ) -> Result<ProduceReport> {
        if messages.is_empty() {
            return Ok(ProduceReport::default());
        }

        let mut partitions = self.topology.snapshot();
        if partitions.is_empty() {
            // Cold start: the view may simply never have resolved yet.
            match self.topology.refresh().await {
                Ok(_) => partitions = self.topology.snapshot(),
                Err(e) => {
                    warn!(topic = %self.topic, error = %e, "topology refresh failed before produce");
                }
            }
        }
        if partitions.is_empty() {
            debug!(topic = %self.topic, "no brokers registered, nothing produced");
            return Ok(ProduceReport::default());
        }

        let batches = self.split(&messages, &partitions, selector)?;

        let sends = batches.into_iter().map(|(index, batch)| {
            let partition = partitions[index].clone();
            async move {
                let count = batch.len();
                match self.broker.produce(&partition, &self.topic, batch).await {
                    Ok(append_offset) => Ok(Delivery {
                        partition,
                        append_offset,
                        count,
                    }),
                    Err(e) => Err(DeliveryFailure {
                        partition,
                        reason: e.to_string(),
                        count,
                    }),
                }
            }
        });

        let mut report = ProduceReport::default();
        for outcome in join_all(sends).await {
            match outcome {
                Ok(delivery) => report.deliveries.push(delivery),
                Err(failure) => {
                    warn!(
                        topic = %self.topic,
                        partition = %failure.partition.node_name(),
                        reason = %failure.reason,
                        "produce sub-batch failed"
                    );
                    report.failures.push(failure);
                }
            }
        }
        Ok(report)
    }

    /// Group messages into per-partition sub-batches, keyed by index into
    /// the ordered partition list.
    fn split(
        &self,
        messages: &[Bytes],
        partitions: &[BrokerPartition],
        selector: PartitionSelector,
    ) -> Result<BTreeMap<usize, Vec<Bytes>>> {
        let mut batches: BTreeMap<usize, Vec<Bytes>> = BTreeMap::new();
        match selector {
            PartitionSelector::Index(index) => {
                if index >= partitions.len() {
                    return Err(Error::PartitionOutOfRange {
                        index,
                        available: partitions.len(),
                    });
                }
                batches.insert(index, messages.to_vec());
            }
            PartitionSelector::RoundRobin => {
                for message in messages {
                    let index =
                        (self.cursor.fetch_add(1, Ordering::Relaxed) % partitions.len() as u64)
                            as usize;
                    batches.entry(index).or_default().push(message.clone());
                }
            }
        }
        Ok(batches)
    }
}
