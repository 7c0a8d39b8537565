//! # Corral Core
//!
//! Shared data model for the Corral client: broker/partition identities,
//! versioned partition assignments, and the deterministic range assigner
//! that every group member computes independently.
//!
//! This crate is deliberately runtime-free: no I/O, no async. Everything
//! here is a value type or a pure function so that the coordination layer
//! in `corral-client` can be tested against it without a broker in sight.

pub mod assignment;
pub mod message;
pub mod partition;

pub use assignment::{range_split, Assignment};
pub use message::{Delivery, DeliveryFailure, FetchBatch, FetchResult, PartitionMessages, ProduceReport};
pub use partition::{BrokerMeta, BrokerPartition};
