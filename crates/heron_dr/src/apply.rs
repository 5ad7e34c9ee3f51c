//! The consumer-side apply pipeline: classify, then admit or escalate.
//!
//! `DrApplyPipeline` is the single point where a replicated record either
//! becomes a scheduled site task or is disposed of:
//!
//! ```text
//! record ──▶ classify ──▶ Success   ──▶ offer onto partition queue
//!                         Duplicate ──▶ drop (already applied)
//!                         Gap       ──▶ gateway.request_retransmit
//!                         Ambiguous ──▶ gateway.request_resync
//! ```
//!
//! Delivery must be serialized per (cluster, partition) upstream; the
//! pipeline classifies in arrival order and does not reorder.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use heron_common::error::{DrError, HeronResult};
use heron_common::types::PartitionId;
use heron_site::tasker::{SiteTask, SiteTaskerQueue};

use crate::gateway::ConsumerDrGateway;
use crate::idempotency::{ApplyTracker, IdempotencyOutcome};
use crate::sequence_id::DrSequenceId;

/// One replicated record, ready to schedule: its stream position plus the
/// task that applies it.
pub struct ReplicatedRecord {
    pub id: DrSequenceId,
    pub task: Box<dyn SiteTask>,
}

/// Per-outcome delivery counters.
#[derive(Debug, Default)]
pub struct DrApplyMetrics {
    pub applied: AtomicU64,
    pub duplicates: AtomicU64,
    pub gaps: AtomicU64,
    pub ambiguous: AtomicU64,
}

impl DrApplyMetrics {
    pub fn snapshot(&self) -> DrApplyMetricsSnapshot {
        DrApplyMetricsSnapshot {
            applied: self.applied.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            gaps: self.gaps.load(Ordering::Relaxed),
            ambiguous: self.ambiguous.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`DrApplyMetrics`] for reporting.
#[derive(Debug, Clone)]
pub struct DrApplyMetricsSnapshot {
    pub applied: u64,
    pub duplicates: u64,
    pub gaps: u64,
    pub ambiguous: u64,
}

/// Admission point for replicated records on a consumer node.
pub struct DrApplyPipeline {
    tracker: Arc<ApplyTracker>,
    gateway: Arc<dyn ConsumerDrGateway>,
    queues: DashMap<PartitionId, Arc<SiteTaskerQueue>>,
    metrics: DrApplyMetrics,
}

impl DrApplyPipeline {
    pub fn new(tracker: Arc<ApplyTracker>, gateway: Arc<dyn ConsumerDrGateway>) -> Self {
        Self {
            tracker,
            gateway,
            queues: DashMap::new(),
            metrics: DrApplyMetrics::default(),
        }
    }

    /// Route admitted records for `partition` onto `queue`. Seeding the
    /// tracker is a separate step — a registered partition without tracking
    /// state still classifies as `Ambiguous`, by design of the tracker.
    pub fn register_partition(&self, partition: PartitionId, queue: Arc<SiteTaskerQueue>) {
        self.queues.insert(partition, queue);
    }

    /// Remove the partition's route and all of its tracking state.
    pub fn deregister_partition(&self, partition: PartitionId) {
        self.queues.remove(&partition);
        self.tracker.forget_partition(partition);
    }

    /// Classify and dispose of one record. Returns the classification so
    /// transport-level acking can mirror it.
    ///
    /// Errors only on misuse (unregistered partition); `Duplicate`, `Gap`
    /// and `Ambiguous` are ordinary return values.
    pub fn deliver(
        &self,
        partition: PartitionId,
        record: ReplicatedRecord,
    ) -> HeronResult<IdempotencyOutcome> {
        let queue = self
            .queues
            .get(&partition)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(DrError::UnknownPartition(partition))?;

        let cluster_tag = record.id.cluster_tag();
        let outcome = self.tracker.classify_and_apply(partition, record.id);
        match outcome {
            IdempotencyOutcome::Success => {
                self.metrics.applied.fetch_add(1, Ordering::Relaxed);
                queue.offer(record.task);
            }
            IdempotencyOutcome::Duplicate => {
                self.metrics.duplicates.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    partition = %partition,
                    cluster_tag,
                    id = %record.id,
                    "dropping already-applied record",
                );
            }
            IdempotencyOutcome::Gap => {
                self.metrics.gaps.fetch_add(1, Ordering::Relaxed);
                match self.tracker.last_applied(cluster_tag, partition) {
                    Some(last_applied) => {
                        tracing::warn!(
                            partition = %partition,
                            cluster_tag,
                            last_applied = %last_applied,
                            received = %record.id,
                            "sequence gap in replicated stream; requesting retransmit",
                        );
                        self.gateway
                            .request_retransmit(partition, last_applied, record.id);
                    }
                    // Tracking state was dropped between classification and
                    // this read; only a resync can re-establish it.
                    None => self.gateway.request_resync(partition, cluster_tag),
                }
            }
            IdempotencyOutcome::Ambiguous => {
                self.metrics.ambiguous.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    partition = %partition,
                    cluster_tag,
                    id = %record.id,
                    "no tracking state for record; requesting resync",
                );
                self.gateway.request_resync(partition, cluster_tag);
            }
        }
        Ok(outcome)
    }

    /// Shared tracker, for seeding and recovery policy.
    pub fn tracker(&self) -> &Arc<ApplyTracker> {
        &self.tracker
    }

    pub fn metrics(&self) -> &DrApplyMetrics {
        &self.metrics
    }
}
