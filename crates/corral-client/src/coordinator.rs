//! Group membership and the rebalance state machine.
//!
//! Every member runs the same loop against the same watched facts: the
//! sibling member list and the broker topology. There is no leader: when
//! either watch fires, each member independently recomputes the
//! deterministic range split and then claims its slice with
//! create-if-absent ownership markers. Two members acting on slightly
//! different snapshots collide on a marker; the loser backs off and
//! re-runs the whole pass from a fresh snapshot. That retry loop is the
//! entire conflict-resolution protocol.

use crate::config::ConsumerConfig;
use crate::coordination::{paths, CoordError, Coordination, Watch, WatchEvent};
use crate::error::{Error, Result};
use crate::topology::{TopologyEvent, TopologyView};
use corral_core::{range_split, Assignment, BrokerPartition};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lifecycle of one group member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberState {
    /// Constructed, not yet registered with the group
    Unregistered,
    /// Registration created, first rebalance not yet complete
    Joining,
    /// Holding a converged assignment
    Active,
    /// A membership or topology change is being absorbed
    Rebalancing,
    /// The coordination session expired; only a full re-join recovers
    SessionLost,
    /// Shut down; terminal
    Closed,
}

/// Registers one consumer in a group and keeps its partition slice
/// current across membership and topology changes.
pub struct GroupCoordinator {
    coordination: Arc<dyn Coordination>,
    topology: Arc<TopologyView>,
    config: ConsumerConfig,
    consumer_id: String,
    state: RwLock<MemberState>,
    /// Current assignment, swapped whole on every rebalance
    assignment: RwLock<Arc<Assignment>>,
    /// Ownership markers this member holds, by partition identity
    claimed: Mutex<BTreeSet<(u32, u32)>>,
    /// Membership watch armed by the latest rebalance pass
    member_watch: tokio::sync::Mutex<Option<Watch>>,
    /// Serializes rebalance passes against each other and against close
    rebalance_gate: tokio::sync::Mutex<()>,
    closing: AtomicBool,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl GroupCoordinator {
    pub fn new(
        coordination: Arc<dyn Coordination>,
        topology: Arc<TopologyView>,
        config: ConsumerConfig,
    ) -> Arc<Self> {
        let consumer_id = config.resolve_consumer_id();
        Arc::new(Self {
            coordination,
            topology,
            config,
            consumer_id,
            state: RwLock::new(MemberState::Unregistered),
            assignment: RwLock::new(Arc::new(Assignment::empty())),
            claimed: Mutex::new(BTreeSet::new()),
            member_watch: tokio::sync::Mutex::new(None),
            rebalance_gate: tokio::sync::Mutex::new(()),
            closing: AtomicBool::new(false),
            watcher: Mutex::new(None),
        })
    }

    pub fn consumer_id(&self) -> &str {
        &self.consumer_id
    }

    pub fn state(&self) -> MemberState {
        *self.state.read()
    }

    /// Snapshot of the current assignment. Routers capture this once per
    /// call so a concurrent rebalance can never mix two versions into one
    /// operation.
    pub fn assignment(&self) -> Arc<Assignment> {
        self.assignment.read().clone()
    }

    /// Register with the group and run the first rebalance. On return the
    /// member is `Active` and the background watch loop is running.
    pub async fn join(self: &Arc<Self>) -> Result<()> {
        match self.state() {
            MemberState::Unregistered | MemberState::SessionLost => {}
            MemberState::Closed => return Err(Error::Closed),
            other => {
                debug!(state = ?other, "join ignored: already registered");
                return Ok(());
            }
        }
        self.closing.store(false, Ordering::SeqCst);
        *self.state.write() = MemberState::Joining;

        let group = &self.config.group;
        let topic = &self.config.topic;
        for path in [
            paths::BROKERS.to_string(),
            paths::members_dir(group, topic),
            paths::owners_dir(group, topic),
            paths::offsets_dir(group, topic),
        ] {
            if let Err(e) = self.coordination.ensure_path(&path).await {
                return Err(self.fail_join(e));
            }
        }

        let member_path = paths::member(group, topic, &self.consumer_id);
        match self
            .coordination
            .create_ephemeral(&member_path, self.consumer_id.clone().into())
            .await
        {
            Ok(()) => {}
            Err(CoordError::NodeExists(_)) => {
                *self.state.write() = MemberState::Unregistered;
                return Err(Error::MemberExists {
                    consumer_id: self.consumer_id.clone(),
                });
            }
            Err(e) => return Err(self.fail_join(e)),
        }

        info!(
            group = %group,
            topic = %topic,
            consumer = %self.consumer_id,
            "joined consumer group"
        );

        self.topology.start();
        // Subscribed before the first rebalance so a topology change
        // landing between that pass and the watch loop is not lost.
        let topology_events = self.topology.subscribe();

        match self.rebalance().await {
            Ok(()) => {}
            Err(e) => {
                if matches!(e, Error::SessionExpired { .. }) {
                    self.on_session_lost();
                }
                return Err(e);
            }
        }

        let coordinator = Arc::clone(self);
        let handle = tokio::spawn(async move { coordinator.run(topology_events).await });
        *self.watcher.lock() = Some(handle);

        Ok(())
    }

    /// Hard reset after session loss: back to `Unregistered` and through
    /// the whole join again. Nothing from the lost session is reused.
    pub async fn rejoin(self: &Arc<Self>) -> Result<()> {
        if self.state() != MemberState::SessionLost {
            return Err(Error::Coordination(format!(
                "rejoin only valid from SessionLost, member is {:?}",
                self.state()
            )));
        }
        self.claimed.lock().clear();
        *self.assignment.write() = Arc::new(Assignment::empty());
        *self.state.write() = MemberState::Unregistered;
        self.join().await
    }

    /// One full rebalance: snapshot members + topology, compute the
    /// range split, release markers we no longer own, claim the new ones,
    /// and install the next assignment version. Claim conflicts restart
    /// the pass from a fresh snapshot after a jittered backoff.
    pub(crate) async fn rebalance(&self) -> Result<()> {
        let _gate = self.rebalance_gate.lock().await;
        if self.closing.load(Ordering::SeqCst) {
            return Ok(());
        }

        if self.state() == MemberState::Active {
            *self.state.write() = MemberState::Rebalancing;
        }

        let group = self.config.group.clone();
        let topic = self.config.topic.clone();
        let members_dir = paths::members_dir(&group, &topic);

        let mut backoff = self.config.rebalance_backoff;
        let attempts = self.config.rebalance_attempts.max(1);

        for attempt in 1..=attempts {
            if self.closing.load(Ordering::SeqCst) {
                return Ok(());
            }

            // (a) fresh snapshots; the membership watch is re-armed here
            // on every pass, preserving its one-shot contract.
            let (mut members, watch) = self
                .coordination
                .get_children_watch(&members_dir)
                .await
                .map_err(|e| self.coord_err(e))?;
            *self.member_watch.lock().await = Some(watch);
            members.sort();

            let partitions = self
                .topology
                .refresh()
                .await
                .map_err(|e| self.coord_err(e))?;

            // (b) deterministic split, identical on every member
            let target = range_split(&members, &partitions)
                .remove(&self.consumer_id)
                .unwrap_or_default();
            let target_ids: BTreeSet<(u32, u32)> = target.iter().map(|p| p.id()).collect();

            // (c) release markers for partitions no longer ours
            let stale: Vec<(u32, u32)> = self
                .claimed
                .lock()
                .iter()
                .filter(|id| !target_ids.contains(id))
                .copied()
                .collect();
            for (broker_id, partition_index) in stale {
                let path = paths::owner(&group, &topic, &format!("{broker_id}-{partition_index}"));
                match self.coordination.delete(&path).await {
                    Ok(()) | Err(CoordError::NoNode(_)) => {
                        self.claimed.lock().remove(&(broker_id, partition_index));
                    }
                    Err(e) => return Err(self.coord_err(e)),
                }
            }

            // (d) claim newly owned partitions
            let mut conflict = None;
            for partition in &target {
                if self.claimed.lock().contains(&partition.id()) {
                    continue;
                }
                let path = paths::owner(&group, &topic, &partition.node_name());
                let created = self
                    .coordination
                    .create_if_absent(&path, self.consumer_id.clone().into())
                    .await
                    .map_err(|e| self.coord_err(e))?;
                if created {
                    self.claimed.lock().insert(partition.id());
                } else {
                    conflict = Some(partition.clone());
                    break;
                }
            }

            // (e) conflict: someone acted on an older snapshot (or we
            // did). Back off and re-run the whole pass.
            if let Some(partition) = conflict {
                let holder = self.marker_holder(&group, &topic, &partition).await;
                warn!(
                    group = %group,
                    topic = %topic,
                    consumer = %self.consumer_id,
                    partition = %partition.node_name(),
                    holder = %holder.as_deref().unwrap_or("unknown"),
                    attempt,
                    "ownership claim conflict, backing off"
                );
                tokio::time::sleep(jittered(backoff)).await;
                backoff = (backoff * 2).min(self.config.rebalance_backoff_max);
                continue;
            }

            // (f) install the new assignment
            let installed = {
                let mut assignment = self.assignment.write();
                let next = Arc::new(assignment.advance(target));
                *assignment = next.clone();
                next
            };
            *self.state.write() = MemberState::Active;
            info!(
                group = %group,
                topic = %topic,
                consumer = %self.consumer_id,
                version = installed.version,
                partitions = installed.len(),
                "rebalance complete"
            );
            return Ok(());
        }

        Err(Error::RebalanceFailed { attempts })
    }

    /// Background loop: wait for a membership watch fire or a topology
    /// event, then rebalance. Runs until close or session loss.
    async fn run(self: Arc<Self>, mut topology_events: broadcast::Receiver<TopologyEvent>) {
        loop {
            if self.closing.load(Ordering::SeqCst) {
                return;
            }

            let watch = self.member_watch.lock().await.take();
            let Some(watch) = watch else {
                // No armed watch means the last rebalance never ran; a
                // closed/lost member has nothing left to watch.
                return;
            };

            let trigger = tokio::select! {
                event = watch.fired() => match event {
                    WatchEvent::Changed => "membership",
                    WatchEvent::SessionEnded => {
                        self.on_session_lost();
                        return;
                    }
                },
                event = topology_events.recv() => match event {
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => "topology",
                    // The topology watcher only stops on close or session
                    // loss; either way the member watch settles it next
                    // iteration.
                    Err(broadcast::error::RecvError::Closed) => continue,
                },
            };

            debug!(
                group = %self.config.group,
                consumer = %self.consumer_id,
                trigger,
                "change observed, rebalancing"
            );

            loop {
                match self.rebalance().await {
                    Ok(()) => break,
                    Err(Error::SessionExpired { .. }) => {
                        self.on_session_lost();
                        return;
                    }
                    Err(e) if self.closing.load(Ordering::SeqCst) => {
                        debug!(error = %e, "rebalance abandoned during close");
                        return;
                    }
                    Err(e) => {
                        // Keep trying from the background loop; the
                        // foreground surface for this failure is join().
                        error!(
                            group = %self.config.group,
                            consumer = %self.consumer_id,
                            error = %e,
                            "background rebalance failed, retrying"
                        );
                        tokio::time::sleep(self.config.rebalance_backoff_max).await;
                    }
                }
            }
        }
    }

    fn on_session_lost(&self) {
        // Every ephemeral node from the session (membership and markers)
        // is already gone on the service side.
        self.claimed.lock().clear();
        *self.state.write() = MemberState::SessionLost;
        self.topology.stop();
        error!(
            group = %self.config.group,
            topic = %self.config.topic,
            consumer = %self.consumer_id,
            "coordination session lost, member needs a full re-join"
        );
    }

    /// Release everything and deregister. Idempotent. A rebalance in
    /// flight finishes (and keeps its claimed markers consistent) before
    /// teardown proceeds.
    pub async fn close(&self) -> Result<()> {
        if self.state() == MemberState::Closed {
            return Ok(());
        }
        self.closing.store(true, Ordering::SeqCst);

        // Waits for any in-flight rebalance pass to finish releasing or
        // claiming before we start tearing markers down.
        let _gate = self.rebalance_gate.lock().await;

        if let Some(handle) = self.watcher.lock().take() {
            handle.abort();
        }
        self.topology.stop();

        let group = &self.config.group;
        let topic = &self.config.topic;

        let held: Vec<(u32, u32)> = self.claimed.lock().iter().copied().collect();
        for (broker_id, partition_index) in held {
            let path = paths::owner(group, topic, &format!("{broker_id}-{partition_index}"));
            match self.coordination.delete(&path).await {
                Ok(()) | Err(CoordError::NoNode(_)) | Err(CoordError::SessionExpired) => {}
                Err(e) => warn!(path = %path, error = %e, "failed to release ownership marker"),
            }
        }
        self.claimed.lock().clear();

        let member_path = paths::member(group, topic, &self.consumer_id);
        match self.coordination.delete(&member_path).await {
            Ok(()) | Err(CoordError::NoNode(_)) | Err(CoordError::SessionExpired) => {}
            Err(e) => warn!(path = %member_path, error = %e, "failed to delete member registration"),
        }

        *self.state.write() = MemberState::Closed;
        info!(
            group = %group,
            topic = %topic,
            consumer = %self.consumer_id,
            "consumer group member closed"
        );
        Ok(())
    }

    async fn marker_holder(
        &self,
        group: &str,
        topic: &str,
        partition: &BrokerPartition,
    ) -> Option<String> {
        let path = paths::owner(group, topic, &partition.node_name());
        let data = self.coordination.get_data(&path).await.ok().flatten()?;
        String::from_utf8(data.to_vec()).ok()
    }

    fn coord_err(&self, err: CoordError) -> Error {
        Error::from_coord(err, &self.consumer_id)
    }

    /// Resolve a failed join: session expiry lands in `SessionLost` (the
    /// caller may heal the connection and re-join), anything else backs
    /// out to `Unregistered`.
    fn fail_join(&self, err: CoordError) -> Error {
        match err {
            CoordError::SessionExpired => {
                self.on_session_lost();
            }
            _ => *self.state.write() = MemberState::Unregistered,
        }
        self.coord_err(err)
    }
}

/// Backoff with up to 50% additive jitter, so colliding members do not
/// retry in lockstep.
fn jittered(base: Duration) -> Duration {
    let millis = base.as_millis() as u64;
    let jitter = if millis == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=millis / 2)
    };
    base + Duration::from_millis(jitter)
}
