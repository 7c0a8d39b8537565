//! Broker capability.
//!
//! Wire encoding and connection management live behind this trait; the
//! routing layer only needs the two log operations and the ability to
//! tell "broker is down" apart from everything else, so it can exclude a
//! partition and continue instead of failing a whole fetch or produce
//! pass.

use async_trait::async_trait;
use bytes::Bytes;
use corral_core::{BrokerPartition, FetchBatch};
use thiserror::Error;

/// Result type for broker operations
pub type BrokerResult<T> = std::result::Result<T, BrokerError>;

/// Broker errors
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker could not be reached (connection refused, timeout,
    /// mid-request drop). Routers exclude the partition and continue.
    #[error("broker unreachable: {0}")]
    Unreachable(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("broker error: {0}")]
    Other(String),
}

impl BrokerError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, BrokerError::Unreachable(_))
    }
}

/// Capability contract for talking to individual brokers.
///
/// The target [`BrokerPartition`] carries the broker's host and port and
/// the partition index; implementations resolve their own connections
/// from it.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Append `messages` to the partition's log. Returns the offset at
    /// which the batch was appended.
    async fn produce(
        &self,
        target: &BrokerPartition,
        topic: &str,
        messages: Vec<Bytes>,
    ) -> BrokerResult<u64>;

    /// Read messages from `offset` onward. An offset at the head of the
    /// log returns an empty batch, not an error.
    async fn fetch(
        &self,
        target: &BrokerPartition,
        topic: &str,
        offset: u64,
    ) -> BrokerResult<FetchBatch>;
}
