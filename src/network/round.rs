//! Pulse-driven round driver
//!
//! Sequences one membership round per pulse: drain the claim queue, build
//! and store the candidate view, promote it, then publish the new cloud hash.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{KeeperError, KeeperResult};
use crate::network::keeper::NodeKeeper;
use crate::network::node::calculate_nodes_hash;
use crate::network::types::{KeeperState, PulseNumber};
use crate::network::unsync::MergeReport;

/// Why [`RoundDriver::run`] returned
#[derive(Debug)]
pub enum RoundExit {
    /// The local node's leave was merged; the process should stop serving
    LeftCluster(MergeReport),
    /// The pulse source hung up
    PulseSourceClosed,
}

#[derive(Debug)]
pub struct RoundDriver {
    keeper: Arc<NodeKeeper>,
    last_pulse: Option<PulseNumber>,
}

impl RoundDriver {
    pub fn new(keeper: Arc<NodeKeeper>) -> Self {
        Self {
            keeper,
            last_pulse: None,
        }
    }

    pub fn keeper(&self) -> &Arc<NodeKeeper> {
        &self.keeper
    }

    pub fn last_pulse(&self) -> Option<PulseNumber> {
        self.last_pulse
    }

    /// Run the membership round for `pulse`
    ///
    /// Pulses must strictly increase; a stale pulse leaves the queue intact.
    pub fn on_pulse(&mut self, pulse: PulseNumber) -> KeeperResult<MergeReport> {
        if let Some(last) = self.last_pulse {
            if pulse <= last {
                return Err(KeeperError::StalePulse { received: pulse, last });
            }
        }

        let claims = self.keeper.get_claim_queue().drain();
        let mut list = self.keeper.get_unsync_list(pulse);
        list.add_claims(claims);
        self.keeper.sync(list);

        let report = self.keeper.move_sync_to_active();
        let nodes = self.keeper.get_active_nodes();
        self.keeper.set_cloud_hash(calculate_nodes_hash(&nodes));
        self.keeper.set_state(KeeperState::Ready);
        self.last_pulse = Some(pulse);

        debug!(%pulse, active = nodes.len(), "round complete");
        Ok(report)
    }

    /// Run rounds until the local node leaves or the pulse source closes
    pub async fn run(mut self, mut pulses: mpsc::Receiver<PulseNumber>) -> RoundExit {
        while let Some(pulse) = pulses.recv().await {
            match self.on_pulse(pulse) {
                Ok(report) if report.left_cluster => {
                    info!(%pulse, "left cluster, stopping round driver");
                    return RoundExit::LeftCluster(report);
                }
                Ok(_) => {}
                Err(err) => warn!(%pulse, %err, "skipping pulse"),
            }
        }
        RoundExit::PulseSourceClosed
    }
}
