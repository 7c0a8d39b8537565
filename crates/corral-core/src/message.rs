//! Fetch and produce result types.

use crate::partition::BrokerPartition;
use bytes::Bytes;

/// One broker fetch response: a batch of messages and the partition's
/// high watermark at fetch time.
#[derive(Debug, Clone, Default)]
pub struct FetchBatch {
    pub messages: Vec<Bytes>,
    pub high_watermark: u64,
}

/// Messages fetched from a single owned partition.
#[derive(Debug, Clone)]
pub struct PartitionMessages {
    /// Partition the messages came from
    pub partition: BrokerPartition,
    /// Messages in broker storage order (possibly empty)
    pub messages: Vec<Bytes>,
    /// Offset the next fetch for this partition will start from
    pub next_offset: u64,
}

/// Aggregated result of one fetch pass over an assignment snapshot.
///
/// Partitions whose broker was unreachable are listed in `unreachable`
/// rather than failing the call; they stay owned and are retried on the
/// next fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    /// Per-partition message sets, in assignment order
    pub entries: Vec<PartitionMessages>,
    /// Partitions excluded from this pass because their broker failed
    pub unreachable: Vec<BrokerPartition>,
}

impl FetchResult {
    /// Total messages across all partitions.
    pub fn message_count(&self) -> usize {
        self.entries.iter().map(|e| e.messages.len()).sum()
    }

    /// Partitions that contributed an entry to this result.
    pub fn broker_partitions(&self) -> Vec<&BrokerPartition> {
        self.entries.iter().map(|e| &e.partition).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| e.messages.is_empty())
    }
}

impl<'a> IntoIterator for &'a FetchResult {
    type Item = &'a PartitionMessages;
    type IntoIter = std::slice::Iter<'a, PartitionMessages>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// A successful append to one partition.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub partition: BrokerPartition,
    /// Offset at which the sub-batch was appended
    pub append_offset: u64,
    /// Number of messages appended
    pub count: usize,
}

/// A failed append to one partition; the messages were not delivered.
#[derive(Debug, Clone)]
pub struct DeliveryFailure {
    pub partition: BrokerPartition,
    pub reason: String,
    pub count: usize,
}

/// Per-partition outcome of one produce call. Partial failure is normal:
/// one unreachable broker fails only its own sub-batch.
#[derive(Debug, Clone, Default)]
pub struct ProduceReport {
    pub deliveries: Vec<Delivery>,
    pub failures: Vec<DeliveryFailure>,
}

impl ProduceReport {
    pub fn delivered_count(&self) -> usize {
        self.deliveries.iter().map(|d| d.count).sum()
    }

    pub fn failed_count(&self) -> usize {
        self.failures.iter().map(|f| f.count).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
