//! Live broker/partition topology for one topic.
//!
//! The coordination service holds one registration node per broker; each
//! registration says how many partitions that broker hosts per topic. The
//! view resolves those registrations into the ordered `BrokerPartition`
//! set, re-resolves whenever the children watch on `/brokers` fires, and
//! broadcasts a [`TopologyEvent`] so the group coordinator (and anyone
//! else) can react. The watch is one-shot and re-armed on every pass.

use crate::coordination::{paths, CoordError, CoordResult, Coordination, WatchEvent};
use corral_core::{BrokerMeta, BrokerPartition};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Topology change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyEvent {
    /// The broker registration set changed; the partition set may differ
    BrokersChanged,
}

/// Tracks the full partition set for a topic, independent of any group.
pub struct TopologyView {
    coordination: Arc<dyn Coordination>,
    topic: String,
    snapshot: RwLock<Arc<Vec<BrokerPartition>>>,
    events: broadcast::Sender<TopologyEvent>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl TopologyView {
    pub fn new(coordination: Arc<dyn Coordination>, topic: impl Into<String>) -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            coordination,
            topic: topic.into(),
            snapshot: RwLock::new(Arc::new(Vec::new())),
            events,
            watcher: Mutex::new(None),
        })
    }

    /// Current resolved partition set. Cheap; never blocks on I/O.
    pub fn snapshot(&self) -> Arc<Vec<BrokerPartition>> {
        self.snapshot.read().clone()
    }

    /// Subscribe to change notifications from the background watcher.
    pub fn subscribe(&self) -> broadcast::Receiver<TopologyEvent> {
        self.events.subscribe()
    }

    /// Re-read broker registrations and install the resolved set.
    pub async fn refresh(&self) -> CoordResult<Vec<BrokerPartition>> {
        let broker_ids = self.coordination.get_children(paths::BROKERS).await?;
        let partitions = self.resolve(&broker_ids).await?;
        self.install(partitions.clone());
        Ok(partitions)
    }

    /// Start the background watcher that re-resolves on registration
    /// changes. Idempotent; the previous watcher is kept if running.
    pub fn start(self: &Arc<Self>) {
        let mut guard = self.watcher.lock();
        if guard.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let view = Arc::clone(self);
        *guard = Some(tokio::spawn(async move { view.watch_loop().await }));
    }

    /// Stop the background watcher. Further refreshes stay available.
    pub fn stop(&self) {
        if let Some(handle) = self.watcher.lock().take() {
            handle.abort();
        }
    }

    async fn watch_loop(self: Arc<Self>) {
        loop {
            let (broker_ids, watch) =
                match self.coordination.get_children_watch(paths::BROKERS).await {
                    Ok(armed) => armed,
                    Err(CoordError::SessionExpired) => {
                        debug!(topic = %self.topic, "topology watcher stopping: session expired");
                        return;
                    }
                    Err(e) => {
                        warn!(topic = %self.topic, error = %e, "broker listing failed, retrying");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        continue;
                    }
                };

            match self.resolve(&broker_ids).await {
                Ok(partitions) => {
                    if self.install(partitions) {
                        let _ = self.events.send(TopologyEvent::BrokersChanged);
                    }
                }
                Err(CoordError::SessionExpired) => return,
                Err(e) => {
                    warn!(topic = %self.topic, error = %e, "topology resolution failed");
                }
            }

            if watch.fired().await == WatchEvent::SessionEnded {
                debug!(topic = %self.topic, "topology watcher stopping: watch channel ended");
                return;
            }
        }
    }

    /// Expand broker registrations into the ordered partition set.
    ///
    /// A registration that disappears between listing and read is simply
    /// excluded; the next watch fire picks the change up. Malformed
    /// registrations are excluded the same way.
    async fn resolve(&self, broker_ids: &[String]) -> CoordResult<Vec<BrokerPartition>> {
        let mut partitions = Vec::new();

        for raw_id in broker_ids {
            let Ok(broker_id) = raw_id.parse::<u32>() else {
                warn!(topic = %self.topic, node = %raw_id, "ignoring non-numeric broker registration");
                continue;
            };

            let data = match self.coordination.get_data(&paths::broker(broker_id)).await? {
                Some(data) => data,
                None => {
                    debug!(topic = %self.topic, broker_id, "broker vanished mid-resolution, excluding");
                    continue;
                }
            };

            match serde_json::from_slice::<BrokerMeta>(&data) {
                Ok(meta) => partitions.extend(meta.partitions(broker_id)),
                Err(e) => {
                    warn!(topic = %self.topic, broker_id, error = %e, "malformed broker registration, excluding");
                }
            }
        }

        partitions.sort();
        Ok(partitions)
    }

    /// Install a snapshot; returns whether it differs from the previous.
    fn install(&self, partitions: Vec<BrokerPartition>) -> bool {
        let mut guard = self.snapshot.write();
        if **guard == partitions {
            return false;
        }
        debug!(
            topic = %self.topic,
            partitions = partitions.len(),
            "topology updated"
        );
        *guard = Arc::new(partitions);
        true
    }
}

impl Drop for TopologyView {
    fn drop(&mut self) {
        if let Some(handle) = self.watcher.lock().take() {
            handle.abort();
        }
    }
}
