//! # Corral
//!
//! Consumer-group client for partitioned log messaging platforms.
//!
//! This crate is the unified entry point for the Corral ecosystem,
//! re-exporting the data model from [`corral_core`] and the coordination
//! and routing layers from [`corral_client`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use corral::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> corral::client::Result<()> {
//!     let config = ConsumerConfig::builder()
//!         .group("analytics")
//!         .topic("events")
//!         .build();
//!
//!     // `coordination` and `brokers` are backend capabilities supplied
//!     // by the embedding application.
//!     let consumer = Consumer::join(coordination, brokers, config).await?;
//!
//!     loop {
//!         let result = consumer.fetch().await?;
//!         for entry in &result {
//!             for message in &entry.messages {
//!                 println!("{}: {:?}", entry.partition, message);
//!             }
//!         }
//!     }
//! }
//! ```

#![deny(rustdoc::broken_intra_doc_links)]

// Re-export component crates
pub use corral_client as client;
pub use corral_core as core;

/// Prelude module for convenient imports.
///
/// ```rust
/// use corral::prelude::*;
/// ```
pub mod prelude {
    pub use corral_client::{
        BrokerClient, Consumer, ConsumerConfig, Coordination, MemberState, PartitionSelector,
        Producer, ProducerConfig,
    };
    pub use corral_core::{Assignment, BrokerMeta, BrokerPartition, FetchResult, ProduceReport};
}
