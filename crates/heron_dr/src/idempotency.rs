//! Idempotent apply classification for replicated streams.
//!
//! For every (source cluster, destination partition) pair the consumer
//! remembers the last identifier it accepted. Each arriving record is
//! classified against that state before it may touch the committed stream:
//! the expected next record advances the state, a replay is dropped, a
//! jump forward is flagged as suspected loss. Classification assumes
//! records arrive on a serialized per-(cluster, partition) channel; it
//! does not reorder.

use dashmap::DashMap;

use heron_common::error::DrError;
use heron_common::types::PartitionId;

use crate::sequence_id::DrSequenceId;

/// Relationship of an arriving record to the tracked apply state.
///
/// `Duplicate` and `Gap` are failures in the reporting sense only: they are
/// routine operational states returned as data for the caller's replay /
/// repair policy, never raised as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdempotencyOutcome {
    /// The expected next record; state advanced.
    Success,
    /// At or below the last accepted position; already applied, safe to drop.
    Duplicate,
    /// Unexpectedly far ahead; records are suspected lost.
    Gap,
    /// No tracking state exists for this (cluster, partition) yet — the
    /// partition joined after the stream began and cannot tell a replayed
    /// record from a legitimate continuation. Distinct from `Success` and
    /// from both failures; callers must handle it explicitly (resync).
    Ambiguous,
}

impl IdempotencyOutcome {
    /// Whether this outcome signals a delivery fault (`Duplicate`/`Gap`).
    /// `Ambiguous` is insufficient information, not a fault.
    pub fn is_failure(self) -> bool {
        matches!(self, IdempotencyOutcome::Duplicate | IdempotencyOutcome::Gap)
    }

    /// Stable wire code. The mapping is explicit and independent of
    /// declaration order; peers persist these bytes.
    pub fn wire_code(self) -> i8 {
        match self {
            IdempotencyOutcome::Success => 0,
            IdempotencyOutcome::Duplicate => -1,
            IdempotencyOutcome::Gap => 1,
            IdempotencyOutcome::Ambiguous => -2,
        }
    }

    /// Invert [`wire_code`](IdempotencyOutcome::wire_code). An unlisted
    /// code means corrupted or incompatible data and is a hard error.
    pub fn from_wire_code(code: i8) -> Result<IdempotencyOutcome, DrError> {
        match code {
            0 => Ok(IdempotencyOutcome::Success),
            -1 => Ok(IdempotencyOutcome::Duplicate),
            1 => Ok(IdempotencyOutcome::Gap),
            -2 => Ok(IdempotencyOutcome::Ambiguous),
            other => Err(DrError::UnknownWireCode(other)),
        }
    }

    /// Label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            IdempotencyOutcome::Success => "success",
            IdempotencyOutcome::Duplicate => "duplicate",
            IdempotencyOutcome::Gap => "gap",
            IdempotencyOutcome::Ambiguous => "ambiguous",
        }
    }
}

impl std::fmt::Display for IdempotencyOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ApplyTracker — last-accepted state per (cluster, partition)
// ---------------------------------------------------------------------------

/// Key: (source cluster tag, destination partition). The tag is always the
/// one carried by incoming records / passed at seed time — never extracted
/// from a before-zero baseline, whose tag field is not meaningful.
type TrackerKey = (u8, PartitionId);

/// Concurrent last-accepted bookkeeping for a consumer node.
///
/// The read-classify-write step runs under the entry's map guard, so two
/// racing deliveries of the same record cannot both classify as `Success`.
pub struct ApplyTracker {
    last_applied: DashMap<TrackerKey, DrSequenceId>,
}

impl ApplyTracker {
    pub fn new() -> Self {
        Self {
            last_applied: DashMap::new(),
        }
    }

    /// Install tracking state for a (cluster, partition): the initial-ack
    /// baseline at stream subscription, or a snapshot-carried identifier
    /// after a base snapshot load. Overwrites any existing entry.
    pub fn seed(&self, cluster_tag: u8, partition: PartitionId, baseline: DrSequenceId) {
        tracing::debug!(
            cluster_tag,
            partition = %partition,
            baseline = %baseline,
            "seeding apply tracker",
        );
        self.last_applied
            .insert((cluster_tag, partition), baseline);
    }

    /// Classify `incoming` against the tracked state for its cluster and
    /// the given partition, advancing the state only on `Success`.
    ///
    /// `Gap` never advances state here; whether to resume past a gap is the
    /// caller's recovery policy, applied via [`seed`](ApplyTracker::seed).
    pub fn classify_and_apply(
        &self,
        partition: PartitionId,
        incoming: DrSequenceId,
    ) -> IdempotencyOutcome {
        debug_assert!(!incoming.is_empty(), "sentinel identifiers carry no record");

        let key = (incoming.cluster_tag(), partition);
        let Some(mut entry) = self.last_applied.get_mut(&key) else {
            return IdempotencyOutcome::Ambiguous;
        };

        let last = *entry;
        let expected = if last.is_before_zero() {
            0
        } else {
            last.sequence_number() + 1
        };
        let seq = incoming.sequence_number();

        if seq == expected {
            *entry = incoming;
            IdempotencyOutcome::Success
        } else if !last.is_before_zero() && seq <= last.sequence_number() {
            IdempotencyOutcome::Duplicate
        } else {
            // Ahead of expected — or any nonzero sequence against a
            // before-zero baseline, where nothing can be a replay.
            IdempotencyOutcome::Gap
        }
    }

    /// Last accepted identifier for a (cluster, partition), if tracked.
    pub fn last_applied(&self, cluster_tag: u8, partition: PartitionId) -> Option<DrSequenceId> {
        self.last_applied
            .get(&(cluster_tag, partition))
            .map(|entry| *entry)
    }

    /// Drop all tracking state for a partition (rebalanced away).
    pub fn forget_partition(&self, partition: PartitionId) {
        self.last_applied.retain(|(_, p), _| *p != partition);
    }

    /// Drop all tracking state for a source cluster (removed from the mesh).
    pub fn forget_cluster(&self, cluster_tag: u8) {
        self.last_applied.retain(|(c, _), _| *c != cluster_tag);
    }

    /// Number of tracked (cluster, partition) pairs.
    pub fn len(&self) -> usize {
        self.last_applied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_applied.is_empty()
    }
}

impl Default for ApplyTracker {
    fn default() -> Self {
        Self::new()
    }
}
