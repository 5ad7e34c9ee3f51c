//! Boundary interfaces to the durability and DR transport subsystems.
//!
//! Implementations live with those subsystems (native engine, transport
//! layer); the bookkeeping core only calls through these seams.

use heron_common::error::HeronResult;
use heron_common::types::{CatalogVersion, PartitionId};
use heron_site::tasker::SiteTaskerQueue;

use crate::sequence_id::DrSequenceId;

/// What the command log hands back for one partition's recovery: the
/// bounds of the logged stream segment and how much work it contains.
#[derive(Debug, Clone)]
pub struct ReplayPlan {
    pub partition: PartitionId,
    /// First identifier the plan will re-deliver.
    pub first: DrSequenceId,
    /// Last identifier the plan will re-deliver.
    pub last: DrSequenceId,
    /// Number of logged tasks in the plan.
    pub task_count: u64,
}

/// The durability/log-replay collaborator. Supplies recovery work derived
/// from the command log; the caller decides, via the apply tracker, which
/// re-delivered records are admitted.
pub trait CommandLogReplayer: Send + Sync {
    /// Inspect the log and produce a plan for the partition, or `None`
    /// when the log holds nothing to replay.
    fn generate_replay_plan(&self, partition: PartitionId) -> HeronResult<Option<ReplayPlan>>;

    /// Re-deliver the plan's tasks onto the partition's queue. Returns the
    /// number of tasks enqueued.
    fn replay(&self, plan: &ReplayPlan, queue: &SiteTaskerQueue) -> HeronResult<u64>;

    /// Whether any transaction has been re-initiated from the log since
    /// startup. Consulted before declaring recovery complete.
    fn has_replayed_txns(&self) -> bool;
}

/// The DR transport/coordination collaborator on the consumer side.
///
/// All callbacks are fire-and-forget from the pipeline's point of view;
/// retry, pacing, and escalation live behind this seam.
pub trait ConsumerDrGateway: Send + Sync {
    /// The producer shipped a catalog change; subsequent records were
    /// produced under `version`.
    fn notify_catalog_updated(&self, version: CatalogVersion);

    /// An applied record conflicted with local state and was resolved by
    /// policy; report for operator visibility.
    fn report_conflict(&self, partition: PartitionId, id: DrSequenceId, description: &str);

    /// Records between `last_applied` and `received` are suspected lost;
    /// ask the producer to re-send.
    fn request_retransmit(
        &self,
        partition: PartitionId,
        last_applied: DrSequenceId,
        received: DrSequenceId,
    );

    /// The partition has no usable tracking state for `cluster_tag`; ask
    /// for a full base snapshot.
    fn request_resync(&self, partition: PartitionId, cluster_tag: u8);
}
