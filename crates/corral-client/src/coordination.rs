//! Coordination service capability.
//!
//! The client never talks to a specific coordination backend directly; it
//! programs against the [`Coordination`] trait, which any ZooKeeper-like
//! service can satisfy: persistent and ephemeral nodes, create-if-absent,
//! and one-shot watches.
//!
//! # Watch semantics
//!
//! A [`Watch`] fires **at most once**. Whoever needs continuous
//! notification must re-register after every fire; the topology view and
//! the group coordinator both re-arm on each refresh/rebalance pass. This
//! mirrors the underlying service's contract and must not be papered over
//! with an always-on subscription.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::oneshot;

/// Result type for coordination operations
pub type CoordResult<T> = std::result::Result<T, CoordError>;

/// Coordination service errors
#[derive(Debug, Error)]
pub enum CoordError {
    /// The service invalidated this client's session. Every ephemeral
    /// node the session created is gone; the member must re-join from
    /// scratch.
    #[error("session expired")]
    SessionExpired,

    #[error("node already exists: {0}")]
    NodeExists(String),

    #[error("node not found: {0}")]
    NoNode(String),

    #[error("coordination service unavailable: {0}")]
    Unavailable(String),
}

/// What a fired watch reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    /// The watched path's children or existence changed
    Changed,
    /// The session backing the watch ended; no further fires will come
    SessionEnded,
}

/// One-shot notification token returned alongside a watched read.
///
/// Backed by a `oneshot` channel so the at-most-once contract is
/// structural: consuming the watch consumes the registration.
#[derive(Debug)]
pub struct Watch(oneshot::Receiver<WatchEvent>);

impl Watch {
    /// Create a connected (trigger, watch) pair. Implementations keep the
    /// trigger and hand the watch to the caller.
    pub fn pair() -> (WatchTrigger, Watch) {
        let (tx, rx) = oneshot::channel();
        (WatchTrigger(tx), Watch(rx))
    }

    /// Wait for the watch to fire. A dropped trigger (service shutdown,
    /// session teardown) reports [`WatchEvent::SessionEnded`].
    pub async fn fired(self) -> WatchEvent {
        self.0.await.unwrap_or(WatchEvent::SessionEnded)
    }
}

/// Sender half of a [`Watch`], held by the coordination backend.
#[derive(Debug)]
pub struct WatchTrigger(oneshot::Sender<WatchEvent>);

impl WatchTrigger {
    /// Fire the watch. Firing twice is impossible by construction; a
    /// receiver that already went away is ignored.
    pub fn fire(self, event: WatchEvent) {
        let _ = self.0.send(event);
    }
}

/// Capability contract for the coordination service.
///
/// Node data is opaque bytes; the client stores UTF-8 decimal offsets,
/// consumer ids, and JSON broker registrations. Implementations are
/// expected to create intermediate path components for `ensure_path` and
/// `set_data`, and to auto-remove ephemeral nodes when the creating
/// session ends.
#[async_trait]
pub trait Coordination: Send + Sync {
    /// Idempotently create a persistent node (and missing parents).
    async fn ensure_path(&self, path: &str) -> CoordResult<()>;

    /// Create an ephemeral node tied to this session. Errors with
    /// [`CoordError::NodeExists`] if the node is already present.
    async fn create_ephemeral(&self, path: &str, data: Bytes) -> CoordResult<()>;

    /// Create an ephemeral node only if absent. Returns `true` when this
    /// call created the node, `false` when another holder beat us to it.
    /// This is the sole conflict-resolution primitive for ownership
    /// markers.
    async fn create_if_absent(&self, path: &str, data: Bytes) -> CoordResult<bool>;

    /// Delete a node. Deleting a missing node errors with
    /// [`CoordError::NoNode`].
    async fn delete(&self, path: &str) -> CoordResult<()>;

    /// Read a node's data; `None` if the node does not exist.
    async fn get_data(&self, path: &str) -> CoordResult<Option<Bytes>>;

    /// Upsert a persistent node's data, creating it (and parents) if
    /// missing.
    async fn set_data(&self, path: &str, data: Bytes) -> CoordResult<()>;

    /// List a node's children in lexical order. A missing path lists as
    /// empty.
    async fn get_children(&self, path: &str) -> CoordResult<Vec<String>>;

    /// List children and register a one-shot watch that fires on the next
    /// child add/remove under `path`.
    async fn get_children_watch(&self, path: &str) -> CoordResult<(Vec<String>, Watch)>;

    /// Existence check with a one-shot watch on the next create/delete of
    /// `path`.
    async fn exists_watch(&self, path: &str) -> CoordResult<(bool, Watch)>;
}

/// Node-tree layout shared by every Corral client.
///
/// ```text
/// /brokers/{broker_id}                              broker registration (JSON BrokerMeta)
/// /groups/{group}/{topic}/members/{consumer_id}     ephemeral group membership
/// /groups/{group}/{topic}/owners/{broker}-{part}    ephemeral ownership marker
/// /groups/{group}/{topic}/offsets/{broker}-{part}   persistent committed offset
/// ```
pub mod paths {
    /// Root of broker registrations
    pub const BROKERS: &str = "/brokers";

    pub fn broker(broker_id: u32) -> String {
        format!("{BROKERS}/{broker_id}")
    }

    pub fn members_dir(group: &str, topic: &str) -> String {
        format!("/groups/{group}/{topic}/members")
    }

    pub fn member(group: &str, topic: &str, consumer_id: &str) -> String {
        format!("/groups/{group}/{topic}/members/{consumer_id}")
    }

    pub fn owners_dir(group: &str, topic: &str) -> String {
        format!("/groups/{group}/{topic}/owners")
    }

    pub fn owner(group: &str, topic: &str, node_name: &str) -> String {
        format!("/groups/{group}/{topic}/owners/{node_name}")
    }

    pub fn offsets_dir(group: &str, topic: &str) -> String {
        format!("/groups/{group}/{topic}/offsets")
    }

    pub fn offset(group: &str, topic: &str, node_name: &str) -> String {
        format!("/groups/{group}/{topic}/offsets/{node_name}")
    }
}
