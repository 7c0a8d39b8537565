//! # Corral Client
//!
//! Consumer-group coordination and partition-aware routing for a
//! partitioned log messaging platform.
//!
//! Many independent consumer processes in a named group divide a topic's
//! partitions among themselves without overlap, re-dividing automatically
//! as members join or leave and as brokers come and go. There is no
//! leader: every member watches the same coordination-service facts
//! (sibling membership, broker registrations), computes the same
//! deterministic range split, and claims its slice with create-if-absent
//! ownership markers; claim conflicts from racing snapshots resolve by
//! backoff and re-run.
//!
//! The two external collaborators are capabilities the caller provides:
//!
//! - [`Coordination`]: a ZooKeeper-like service with ephemeral nodes and
//!   one-shot watches
//! - [`BrokerClient`]: produce/fetch against individual brokers
//!
//! ## Consuming
//!
//! ```rust,ignore
//! let config = ConsumerConfig::builder().group("g1").topic("events").build();
//! let consumer = Consumer::join(coordination, brokers, config).await?;
//! let result = consumer.fetch().await?;
//! ```
//!
//! ## Producing
//!
//! ```rust,ignore
//! let producer = Producer::new(coordination, brokers, ProducerConfig::new("events")).await?;
//! producer.send(vec![Bytes::from("hello")]).await?;
//! ```

pub mod broker;
pub mod config;
pub mod consumer;
pub mod coordination;
pub mod coordinator;
pub mod error;
pub mod fetch;
pub mod offsets;
pub mod produce;
pub mod producer;
pub mod topology;

pub use broker::{BrokerClient, BrokerError, BrokerResult};
pub use config::{ConsumerConfig, ConsumerConfigBuilder, ProducerConfig};
pub use consumer::Consumer;
pub use coordination::{paths, CoordError, CoordResult, Coordination, Watch, WatchEvent, WatchTrigger};
pub use coordinator::{GroupCoordinator, MemberState};
pub use error::{Error, Result};
pub use fetch::FetchRouter;
pub use offsets::OffsetStore;
pub use produce::{PartitionSelector, ProducePartitioner};
pub use producer::Producer;
pub use topology::{TopologyEvent, TopologyView};
