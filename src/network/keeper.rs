//! Node keeper
//!
//! Owns the committed active-node index and the candidate view for the
//! current pulse. Independent reader/writer locks guard the origin record,
//! the cloud hash, the active index and the bootstrap flag; a plain mutex
//! guards the candidate view handoff. No method holds two of them at once,
//! and no signing or signature check runs under a lock.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::{ClaimError, KeeperResult};
use crate::network::claim::{Claim, NodeJoinClaim};
use crate::network::claim_queue::ClaimQueue;
use crate::network::index::{ActiveIndex, IndexStats};
use crate::network::node::Node;
use crate::network::types::{DynamicRole, KeeperState, NodeId, PulseNumber, ShortNodeId, StaticRole};
use crate::network::unsync::{MergeReport, UnsyncList};
use crate::security::CryptographyService;

/// Hook invoked once the cluster has acknowledged the local node's leave
pub trait GracefulStop: Send + Sync {
    fn stop(&self);
}

impl<F> GracefulStop for F
where
    F: Fn() + Send + Sync,
{
    fn stop(&self) {
        self()
    }
}

/// Node keeper statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct KeeperStats {
    /// Candidate views promoted into the active index
    pub rounds_promoted: u64,
    /// Nodes admitted through join claims
    pub nodes_admitted: u64,
    /// Nodes removed through leave claims
    pub nodes_removed: u64,
    /// Claims discarded by validation or conflict resolution
    pub claims_dropped: u64,
    /// Claims without membership effect
    pub claims_ignored: u64,
}

pub struct NodeKeeper {
    origin_id: NodeId,
    origin: RwLock<Node>,
    state: RwLock<KeeperState>,
    claim_queue: ClaimQueue,
    nodes_joined_during_prev_pulse: AtomicBool,

    cloud_hash: RwLock<Vec<u8>>,

    active: RwLock<ActiveIndex>,

    sync: Mutex<Option<UnsyncList>>,

    is_bootstrap: RwLock<bool>,

    leave_acknowledged: AtomicBool,
    stats: Mutex<KeeperStats>,

    cryptography: Arc<dyn CryptographyService>,
    graceful_stop: Option<Arc<dyn GracefulStop>>,
}

impl NodeKeeper {
    /// Create a keeper for `origin` with an empty active index
    pub fn new(origin: Node, cryptography: Arc<dyn CryptographyService>) -> Self {
        Self {
            origin_id: origin.id(),
            origin: RwLock::new(origin),
            state: RwLock::new(KeeperState::Undefined),
            claim_queue: ClaimQueue::new(),
            nodes_joined_during_prev_pulse: AtomicBool::new(false),
            cloud_hash: RwLock::new(Vec::new()),
            active: RwLock::new(ActiveIndex::new()),
            sync: Mutex::new(None),
            is_bootstrap: RwLock::new(false),
            leave_acknowledged: AtomicBool::new(false),
            stats: Mutex::new(KeeperStats::default()),
            cryptography,
            graceful_stop: None,
        }
    }

    /// Install the hook fired when the local node's leave is merged
    pub fn with_graceful_stop(mut self, stop: impl GracefulStop + 'static) -> Self {
        self.graceful_stop = Some(Arc::new(stop));
        self
    }

    /// Local node as last committed, or as constructed before the first commit
    ///
    /// The origin record is refreshed after the active index write lock is
    /// released, so for a moment the index can already hold the origin's new
    /// state while this still returns the previous record.
    pub fn get_origin(&self) -> Node {
        self.origin.read().clone()
    }

    pub fn get_cloud_hash(&self) -> Vec<u8> {
        self.cloud_hash.read().clone()
    }

    pub fn set_cloud_hash(&self, cloud_hash: Vec<u8>) {
        *self.cloud_hash.write() = cloud_hash;
    }

    pub fn is_bootstrapped(&self) -> bool {
        *self.is_bootstrap.read()
    }

    pub fn set_is_bootstrapped(&self, is_bootstrap: bool) {
        *self.is_bootstrap.write() = is_bootstrap;
    }

    pub fn get_state(&self) -> KeeperState {
        *self.state.read()
    }

    pub fn set_state(&self, state: KeeperState) {
        *self.state.write() = state;
    }

    /// Committed nodes sorted by identifier
    pub fn get_active_nodes(&self) -> Vec<Node> {
        self.active.read().sorted_nodes()
    }

    pub fn get_active_node(&self, id: &NodeId) -> Option<Node> {
        self.active.read().get(id).cloned()
    }

    pub fn get_active_node_by_short_id(&self, short_id: ShortNodeId) -> Option<Node> {
        self.active.read().get_by_short_id(short_id).cloned()
    }

    /// Identifiers holding `role`, sorted; `None` when no node holds it
    pub fn get_active_nodes_by_role(&self, role: StaticRole) -> Option<Vec<NodeId>> {
        self.active.read().role_members(role)
    }

    pub fn get_active_nodes_by_dynamic_role(&self, role: DynamicRole) -> Option<Vec<NodeId>> {
        self.get_active_nodes_by_role(role.static_role())
    }

    /// Sizes of the index structures, read atomically
    pub fn index_stats(&self) -> IndexStats {
        self.active.read().stats()
    }

    pub fn is_index_consistent(&self) -> bool {
        self.active.read().is_consistent()
    }

    /// Insert nodes directly, bypassing the claim protocol
    ///
    /// Bootstrap only. Nodes the index refuses (short-id collision, left
    /// the cluster, not active) are skipped with a warning.
    pub fn add_active_nodes(&self, nodes: impl IntoIterator<Item = Node>) {
        let mut added = Vec::new();
        let mut origin_update = None;
        {
            let mut active = self.active.write();
            for node in nodes {
                let id = node.id();
                match active.insert(node.clone()) {
                    Ok(_) => {
                        added.push(id.to_string());
                        if id == self.origin_id {
                            origin_update = Some(node);
                        }
                    }
                    Err(err) => warn!(node = %id, %err, "skipping bootstrap node"),
                }
            }
        }

        if let Some(origin) = origin_update {
            *self.origin.write() = origin;
            info!(node = %self.origin_id, "added origin node to active list");
        }
        debug!(nodes = %added.join(", "), "added active nodes");
    }

    /// Queue a claim for the next merge; the queue is unbounded
    pub fn add_pending_claim(&self, claim: Claim) -> bool {
        debug!(kind = claim.kind(), claimant = %claim.claimant(), "queued pending claim");
        self.claim_queue.push(claim);
        true
    }

    pub fn get_claim_queue(&self) -> &ClaimQueue {
        &self.claim_queue
    }

    /// Whether the last promotion admitted any node
    pub fn nodes_joined_during_previous_pulse(&self) -> bool {
        self.nodes_joined_during_prev_pulse.load(Ordering::Acquire)
    }

    /// Whether this keeper has already acted on the origin's own leave
    pub fn has_left_cluster(&self) -> bool {
        self.leave_acknowledged.load(Ordering::Acquire)
    }

    pub fn get_stats(&self) -> KeeperStats {
        self.stats.lock().clone()
    }

    /// Candidate view over the current active set, with no claims yet
    pub fn get_unsync_list(&self, pulse: PulseNumber) -> UnsyncList {
        UnsyncList::new(pulse, self.get_active_nodes())
    }

    /// Candidate view of `length` empty slots, for a node that does not know the active list yet
    pub fn get_sparse_unsync_list(&self, pulse: PulseNumber, length: usize) -> UnsyncList {
        UnsyncList::sparse(pulse, length)
    }

    /// Signed join claim describing the local node
    #[instrument(skip(self), fields(origin = %self.origin_id))]
    pub fn get_origin_claim(&self) -> KeeperResult<NodeJoinClaim> {
        let origin = self.get_origin();

        let key = self.cryptography.get_public_key().map_err(ClaimError::KeyExport)?;
        let exported = self
            .cryptography
            .export_public_key(&key)
            .map_err(ClaimError::KeyExport)?;

        let claim = NodeJoinClaim::new(
            origin.id(),
            origin.role(),
            origin.short_id(),
            origin.address(),
            exported,
        )
        .with_relay(origin.short_id())
        .sign(self.cryptography.as_ref())?;
        Ok(claim)
    }

    /// Store the candidate view for the next promotion
    ///
    /// A view that was stored but never promoted is replaced; its claims go
    /// back to the front of the claim queue for the next round.
    pub fn sync(&self, list: UnsyncList) {
        let replaced = self.sync.lock().replace(list);
        if let Some(previous) = replaced {
            warn!(
                pulse = %previous.pulse(),
                claims = previous.claims().len(),
                "replacing candidate view that was never promoted, requeueing its claims"
            );
            self.claim_queue.requeue_front(previous.into_claims());
        }
    }

    /// Merge the stored candidate view into the active index
    ///
    /// Readers observe either the index before this call or after it. The
    /// candidate view is consumed whether or not its claims were admitted.
    #[instrument(skip(self), fields(origin = %self.origin_id))]
    pub fn move_sync_to_active(&self) -> MergeReport {
        let Some(list) = self.sync.lock().take() else {
            warn!("no candidate view to promote");
            return MergeReport::default();
        };

        let batch = list.prepare(self.cryptography.as_ref());
        let mut report = {
            let mut active = self.active.write();
            batch.apply(&mut active, &self.origin_id)
        };

        let origin_update = report
            .admitted
            .iter()
            .chain(report.removed.iter())
            .find(|node| node.id() == self.origin_id)
            .cloned();
        if let Some(origin) = origin_update {
            *self.origin.write() = origin;
        }

        self.nodes_joined_during_prev_pulse
            .store(!report.admitted.is_empty(), Ordering::Release);
        {
            let mut stats = self.stats.lock();
            stats.rounds_promoted += 1;
            stats.nodes_admitted += report.admitted.len() as u64;
            stats.nodes_removed += report.removed.len() as u64;
            stats.claims_dropped += report.dropped.len() as u64;
            stats.claims_ignored += report.ignored as u64;
        }

        if report.left_cluster {
            report.left_cluster = self.acknowledge_leave(report.pulse);
        }

        debug!(
            pulse = %report.pulse,
            admitted = report.admitted.len(),
            removed = report.removed.len(),
            dropped = report.dropped.len(),
            "promoted candidate view"
        );
        report
    }

    /// Fire the graceful stop hook the first time only
    fn acknowledge_leave(&self, pulse: PulseNumber) -> bool {
        if self
            .leave_acknowledged
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        info!(node = %self.origin_id, %pulse, "node leave acknowledged by network");
        if let Some(stop) = &self.graceful_stop {
            stop.stop();
        }
        true
    }
}

impl fmt::Debug for NodeKeeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeKeeper")
            .field("origin", &self.origin_id)
            .field("state", &self.get_state())
            .field("active", &self.index_stats().nodes)
            .field("pending_claims", &self.claim_queue.len())
            .finish()
    }
}
