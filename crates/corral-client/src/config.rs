//! Consumer and producer configuration.

use std::time::Duration;
use uuid::Uuid;

/// Configuration for a group consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Consumer group name
    pub group: String,
    /// Topic to consume
    pub topic: String,
    /// Member id within the group. Auto-generated (`{group}-{uuid}`)
    /// when not set; must be unique across live members.
    pub consumer_id: Option<String>,
    /// Initial backoff after an ownership-claim conflict
    pub rebalance_backoff: Duration,
    /// Backoff cap for claim-conflict retries
    pub rebalance_backoff_max: Duration,
    /// How many full rebalance passes to attempt before surfacing
    /// `RebalanceFailed`
    pub rebalance_attempts: u32,
}

impl ConsumerConfig {
    pub fn builder() -> ConsumerConfigBuilder {
        ConsumerConfigBuilder::new()
    }

    /// Resolve the member id, generating one if the caller did not pin it.
    pub(crate) fn resolve_consumer_id(&self) -> String {
        self.consumer_id
            .clone()
            .unwrap_or_else(|| format!("{}-{}", self.group, Uuid::new_v4()))
    }
}

/// Builder for [`ConsumerConfig`].
#[derive(Debug, Default)]
pub struct ConsumerConfigBuilder {
    group: Option<String>,
    topic: Option<String>,
    consumer_id: Option<String>,
    rebalance_backoff: Option<Duration>,
    rebalance_backoff_max: Option<Duration>,
    rebalance_attempts: Option<u32>,
}

impl ConsumerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Pin the member id instead of generating one.
    pub fn consumer_id(mut self, id: impl Into<String>) -> Self {
        self.consumer_id = Some(id.into());
        self
    }

    pub fn rebalance_backoff(mut self, backoff: Duration) -> Self {
        self.rebalance_backoff = Some(backoff);
        self
    }

    pub fn rebalance_backoff_max(mut self, max: Duration) -> Self {
        self.rebalance_backoff_max = Some(max);
        self
    }

    pub fn rebalance_attempts(mut self, attempts: u32) -> Self {
        self.rebalance_attempts = Some(attempts);
        self
    }

    pub fn build(self) -> ConsumerConfig {
        ConsumerConfig {
            group: self.group.unwrap_or_else(|| "default-group".into()),
            topic: self.topic.unwrap_or_else(|| "default".into()),
            consumer_id: self.consumer_id,
            rebalance_backoff: self.rebalance_backoff.unwrap_or(Duration::from_millis(50)),
            rebalance_backoff_max: self
                .rebalance_backoff_max
                .unwrap_or(Duration::from_secs(2)),
            rebalance_attempts: self.rebalance_attempts.unwrap_or(16),
        }
    }
}

/// Configuration for a producer.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Topic to produce to
    pub topic: String,
}

impl ProducerConfig {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
        }
    }
}
