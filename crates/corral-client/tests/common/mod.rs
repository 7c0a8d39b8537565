//! Shared test fixtures: an in-memory coordination service with
//! ZooKeeper-like semantics (ephemeral nodes, one-shot watches, session
//! expiry) and an in-memory broker cluster with per-partition logs and a
//! per-broker outage switch.

use async_trait::async_trait;
use bytes::Bytes;
use corral_client::{
    paths, BrokerClient, BrokerError, BrokerResult, CoordError, CoordResult, Coordination, Watch,
    WatchEvent, WatchTrigger,
};
use corral_core::{BrokerMeta, BrokerPartition, FetchBatch};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// In-memory coordination service
// ============================================================================

#[derive(Debug, Clone)]
struct Node {
    data: Bytes,
    /// Creating session for ephemeral nodes; None = persistent
    ephemeral: Option<u64>,
}

#[derive(Default)]
struct Tree {
    nodes: BTreeMap<String, Node>,
    /// Children watches by watched path, with the registering session
    child_watches: HashMap<String, Vec<(u64, WatchTrigger)>>,
    /// Existence watches by watched path, with the registering session
    exists_watches: HashMap<String, Vec<(u64, WatchTrigger)>>,
}

/// The coordination service. Tests hold this to mint sessions, expire
/// them, and register brokers.
pub struct MemoryCoordination {
    tree: Mutex<Tree>,
    next_session: AtomicU64,
}

impl MemoryCoordination {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tree: Mutex::new(Tree::default()),
            next_session: AtomicU64::new(1),
        })
    }

    /// Open a session. Each consumer/producer under test gets its own.
    pub fn session(self: &Arc<Self>) -> Arc<MemorySession> {
        let id = self.next_session.fetch_add(1, Ordering::SeqCst);
        Arc::new(MemorySession {
            service: Arc::clone(self),
            id: AtomicU64::new(id),
            expired: AtomicBool::new(false),
        })
    }

    /// Expire a session: drop its ephemeral nodes (firing sibling
    /// watches) and fire its own watches with `SessionEnded`. Subsequent
    /// operations on the session fail with `SessionExpired` until
    /// [`heal`](Self::heal).
    pub fn expire(&self, session: &MemorySession) {
        session.expired.store(true, Ordering::SeqCst);
        let id = session.id.load(Ordering::SeqCst);

        let mut fired = Vec::new();
        {
            let mut tree = self.tree.lock();

            let dead: Vec<String> = tree
                .nodes
                .iter()
                .filter(|(_, node)| node.ephemeral == Some(id))
                .map(|(path, _)| path.clone())
                .collect();
            for path in &dead {
                tree.nodes.remove(path);
                collect_change_watches(&mut tree, path, &mut fired);
            }

            // The dying session's own registrations fire SessionEnded.
            for watches in tree.child_watches.values_mut() {
                let mut kept = Vec::new();
                for (owner, trigger) in watches.drain(..) {
                    if owner == id {
                        fired.push((trigger, WatchEvent::SessionEnded));
                    } else {
                        kept.push((owner, trigger));
                    }
                }
                *watches = kept;
            }
            for watches in tree.exists_watches.values_mut() {
                let mut kept = Vec::new();
                for (owner, trigger) in watches.drain(..) {
                    if owner == id {
                        fired.push((trigger, WatchEvent::SessionEnded));
                    } else {
                        kept.push((owner, trigger));
                    }
                }
                *watches = kept;
            }
        }

        for (trigger, event) in fired {
            trigger.fire(event);
        }
    }

    /// Give an expired session a fresh identity. Ephemeral nodes from the
    /// old identity stay gone; this models reconnecting with a new
    /// session, not resuming the old one.
    pub fn heal(&self, session: &MemorySession) {
        let id = self.next_session.fetch_add(1, Ordering::SeqCst);
        session.id.store(id, Ordering::SeqCst);
        session.expired.store(false, Ordering::SeqCst);
    }

    /// Register a broker at `/brokers/{id}` with standard test host/port.
    pub fn register_broker(&self, broker_id: u32, partitions_per_topic: u32) {
        let meta = BrokerMeta {
            host: "localhost".into(),
            port: 9101 + broker_id as u16,
            partitions_per_topic,
        };
        let data = Bytes::from(serde_json::to_vec(&meta).unwrap());
        self.write_persistent(&paths::broker(broker_id), data);
    }

    /// Remove a broker registration, as if the broker deregistered.
    pub fn deregister_broker(&self, broker_id: u32) {
        let path = paths::broker(broker_id);
        let mut fired = Vec::new();
        {
            let mut tree = self.tree.lock();
            if tree.nodes.remove(&path).is_some() {
                collect_change_watches(&mut tree, &path, &mut fired);
            }
        }
        for (trigger, event) in fired {
            trigger.fire(event);
        }
    }

    /// Owner-marker values currently present for a group/topic.
    pub fn owners(&self, group: &str, topic: &str) -> BTreeMap<String, String> {
        let dir = paths::owners_dir(group, topic);
        let tree = self.tree.lock();
        tree.nodes
            .iter()
            .filter(|(path, _)| parent_of(path) == dir)
            .map(|(path, node)| {
                (
                    path.rsplit('/').next().unwrap().to_string(),
                    String::from_utf8_lossy(&node.data).into_owned(),
                )
            })
            .collect()
    }

    fn write_persistent(&self, path: &str, data: Bytes) {
        let mut fired = Vec::new();
        {
            let mut tree = self.tree.lock();
            upsert(&mut tree, path, data, None, &mut fired);
        }
        for (trigger, event) in fired {
            trigger.fire(event);
        }
    }
}

fn parent_of(path: &str) -> String {
    match path.rsplit_once('/') {
        Some(("", _)) => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
        None => "/".to_string(),
    }
}

/// Queue the watches affected by a create/delete of `path`: children
/// watches on the parent and existence watches on the path itself.
fn collect_change_watches(
    tree: &mut Tree,
    path: &str,
    fired: &mut Vec<(WatchTrigger, WatchEvent)>,
) {
    let parent = parent_of(path);
    if let Some(watches) = tree.child_watches.remove(&parent) {
        for (_, trigger) in watches {
            fired.push((trigger, WatchEvent::Changed));
        }
    }
    if let Some(watches) = tree.exists_watches.remove(path) {
        for (_, trigger) in watches {
            fired.push((trigger, WatchEvent::Changed));
        }
    }
}

/// Create or replace a node, creating missing persistent parents, queuing
/// watches for every node that came into existence.
fn upsert(
    tree: &mut Tree,
    path: &str,
    data: Bytes,
    ephemeral: Option<u64>,
    fired: &mut Vec<(WatchTrigger, WatchEvent)>,
) {
    let mut prefix = String::new();
    for component in path.split('/').filter(|c| !c.is_empty()) {
        prefix.push('/');
        prefix.push_str(component);
        let is_target = prefix == path;
        if !tree.nodes.contains_key(&prefix) {
            tree.nodes.insert(
                prefix.clone(),
                Node {
                    data: if is_target { data.clone() } else { Bytes::new() },
                    ephemeral: if is_target { ephemeral } else { None },
                },
            );
            collect_change_watches(tree, &prefix, fired);
        } else if is_target {
            if let Some(node) = tree.nodes.get_mut(&prefix) {
                node.data = data.clone();
            }
        }
    }
}

/// One client session against [`MemoryCoordination`].
pub struct MemorySession {
    service: Arc<MemoryCoordination>,
    id: AtomicU64,
    expired: AtomicBool,
}

impl MemorySession {
    fn check(&self) -> CoordResult<u64> {
        if self.expired.load(Ordering::SeqCst) {
            Err(CoordError::SessionExpired)
        } else {
            Ok(self.id.load(Ordering::SeqCst))
        }
    }
}

#[async_trait]
impl Coordination for MemorySession {
    async fn ensure_path(&self, path: &str) -> CoordResult<()> {
        self.check()?;
        let mut fired = Vec::new();
        {
            let mut tree = self.service.tree.lock();
            if !tree.nodes.contains_key(path) {
                upsert(&mut tree, path, Bytes::new(), None, &mut fired);
            }
        }
        for (trigger, event) in fired {
            trigger.fire(event);
        }
        Ok(())
    }

    async fn create_ephemeral(&self, path: &str, data: Bytes) -> CoordResult<()> {
        let session = self.check()?;
        let mut fired = Vec::new();
        {
            let mut tree = self.service.tree.lock();
            if tree.nodes.contains_key(path) {
                return Err(CoordError::NodeExists(path.to_string()));
            }
            upsert(&mut tree, path, data, Some(session), &mut fired);
        }
        for (trigger, event) in fired {
            trigger.fire(event);
        }
        Ok(())
    }

    async fn create_if_absent(&self, path: &str, data: Bytes) -> CoordResult<bool> {
        let session = self.check()?;
        let mut fired = Vec::new();
        let created = {
            let mut tree = self.service.tree.lock();
            if tree.nodes.contains_key(path) {
                false
            } else {
                upsert(&mut tree, path, data, Some(session), &mut fired);
                true
            }
        };
        for (trigger, event) in fired {
            trigger.fire(event);
        }
        Ok(created)
    }

    async fn delete(&self, path: &str) -> CoordResult<()> {
        self.check()?;
        let mut fired = Vec::new();
        {
            let mut tree = self.service.tree.lock();
            if tree.nodes.remove(path).is_none() {
                return Err(CoordError::NoNode(path.to_string()));
            }
            collect_change_watches(&mut tree, path, &mut fired);
        }
        for (trigger, event) in fired {
            trigger.fire(event);
        }
        Ok(())
    }

    async fn get_data(&self, path: &str) -> CoordResult<Option<Bytes>> {
        self.check()?;
        let tree = self.service.tree.lock();
        Ok(tree.nodes.get(path).map(|node| node.data.clone()))
    }

    async fn set_data(&self, path: &str, data: Bytes) -> CoordResult<()> {
        self.check()?;
        let mut fired = Vec::new();
        {
            let mut tree = self.service.tree.lock();
            upsert(&mut tree, path, data, None, &mut fired);
        }
        for (trigger, event) in fired {
            trigger.fire(event);
        }
        Ok(())
    }

    async fn get_children(&self, path: &str) -> CoordResult<Vec<String>> {
        self.check()?;
        let tree = self.service.tree.lock();
        Ok(children_of(&tree, path))
    }

    async fn get_children_watch(&self, path: &str) -> CoordResult<(Vec<String>, Watch)> {
        let session = self.check()?;
        let mut tree = self.service.tree.lock();
        let children = children_of(&tree, path);
        let (trigger, watch) = Watch::pair();
        tree.child_watches
            .entry(path.to_string())
            .or_default()
            .push((session, trigger));
        Ok((children, watch))
    }

    async fn exists_watch(&self, path: &str) -> CoordResult<(bool, Watch)> {
        let session = self.check()?;
        let mut tree = self.service.tree.lock();
        let exists = tree.nodes.contains_key(path);
        let (trigger, watch) = Watch::pair();
        tree.exists_watches
            .entry(path.to_string())
            .or_default()
            .push((session, trigger));
        Ok((exists, watch))
    }
}

fn children_of(tree: &Tree, path: &str) -> Vec<String> {
    let mut children: Vec<String> = tree
        .nodes
        .keys()
        .filter(|candidate| parent_of(candidate) == path)
        .map(|candidate| candidate.rsplit('/').next().unwrap().to_string())
        .collect();
    children.sort();
    children
}

// ============================================================================
// In-memory broker cluster
// ============================================================================

#[derive(Default)]
struct BrokerState {
    /// (broker_id, topic, partition_index) -> log
    logs: HashMap<(u32, String, u32), Vec<Bytes>>,
    down: HashSet<u32>,
}

/// All test brokers behind one `BrokerClient`, addressed per call by the
/// target `BrokerPartition`.
pub struct MemoryBrokers {
    state: Mutex<BrokerState>,
}

impl MemoryBrokers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(BrokerState::default()),
        })
    }

    /// Flip a broker's outage switch. A down broker stays registered with
    /// the coordination service; only its connections fail.
    pub fn set_down(&self, broker_id: u32, down: bool) {
        let mut state = self.state.lock();
        if down {
            state.down.insert(broker_id);
        } else {
            state.down.remove(&broker_id);
        }
    }

    pub fn log_len(&self, broker_id: u32, topic: &str, partition_index: u32) -> usize {
        self.state
            .lock()
            .logs
            .get(&(broker_id, topic.to_string(), partition_index))
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl BrokerClient for MemoryBrokers {
    async fn produce(
        &self,
        target: &BrokerPartition,
        topic: &str,
        messages: Vec<Bytes>,
    ) -> BrokerResult<u64> {
        let mut state = self.state.lock();
        if state.down.contains(&target.broker_id) {
            return Err(BrokerError::Unreachable(format!(
                "{}:{}",
                target.host, target.port
            )));
        }
        let log = state
            .logs
            .entry((target.broker_id, topic.to_string(), target.partition_index))
            .or_default();
        let append_offset = log.len() as u64;
        log.extend(messages);
        Ok(append_offset)
    }

    async fn fetch(
        &self,
        target: &BrokerPartition,
        topic: &str,
        offset: u64,
    ) -> BrokerResult<FetchBatch> {
        let state = self.state.lock();
        if state.down.contains(&target.broker_id) {
            return Err(BrokerError::Unreachable(format!(
                "{}:{}",
                target.host, target.port
            )));
        }
        let log = state
            .logs
            .get(&(target.broker_id, topic.to_string(), target.partition_index));
        let (messages, high_watermark) = match log {
            Some(log) => {
                let start = (offset as usize).min(log.len());
                (log[start..].to_vec(), log.len() as u64)
            }
            None => (Vec::new(), 0),
        };
        Ok(FetchBatch {
            messages,
            high_watermark,
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Poll `predicate` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Group-convergence check: the consumers' slices cover `total`
/// partitions exactly once and shares differ by at most one.
#[allow(dead_code)]
pub fn converged(consumers: &[&corral_client::Consumer], total: usize) -> bool {
    let sets: Vec<BTreeSet<(u32, u32)>> = consumers
        .iter()
        .map(|c| c.broker_partitions().iter().map(|p| p.id()).collect())
        .collect();
    let union: BTreeSet<(u32, u32)> = sets.iter().flatten().copied().collect();
    let sum: usize = sets.iter().map(BTreeSet::len).sum();
    if union.len() != total || sum != total {
        return false;
    }
    let max = sets.iter().map(BTreeSet::len).max().unwrap_or(0);
    let min = sets.iter().map(BTreeSet::len).min().unwrap_or(0);
    max - min <= 1
}

#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "corral_client=debug".into()),
        )
        .with_test_writer()
        .try_init();
}
