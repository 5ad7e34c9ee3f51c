//! Packed DR sequence identifiers.
//!
//! Every record in a replicated stream carries a single signed 64-bit
//! identifier that encodes which cluster produced it and where in that
//! cluster's stream it sits:
//!
//! ```text
//! bit 63        bits 62..55          bits 54..0
//! ┌─────┬──────────────────┬──────────────────────────┐
//! │empty│   cluster tag    │     sequence counter     │
//! └─────┴──────────────────┴──────────────────────────┘
//! ```
//!
//! The packing is wire- and disk-stable: peers and older versions compare
//! raw values directly, so the layout must never change. Do not replace
//! this with a struct-of-fields representation.

use std::fmt;

use serde::{Deserialize, Serialize};

use heron_common::error::DrError;

/// Largest value the 8-bit cluster tag field can hold.
pub const MAX_CLUSTER_TAG: u16 = 0xFF;

/// Largest value the 55-bit sequence counter field can hold.
pub const MAX_SEQUENCE_NUMBER: u64 = (1 << 55) - 1;

const SEQUENCE_MASK: i64 = MAX_SEQUENCE_NUMBER as i64;
const CLUSTER_SHIFT: u32 = 55;
// Bit 63. Doubles as the sign bit, which is what makes sentinel-tagged
// raw values negative.
const EMPTY_FLAG: i64 = i64::MIN;

/// A position in one source cluster's replicated output stream.
///
/// Immutable value type; ordering is the signed order of the raw packed
/// value, exactly as peers that persist raw values compare them.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DrSequenceId(i64);

impl DrSequenceId {
    /// Pack a cluster tag and sequence counter. Rejects values that do not
    /// fit their fields; never clamps.
    pub fn from_components(cluster_tag: u16, sequence: u64) -> Result<DrSequenceId, DrError> {
        if cluster_tag > MAX_CLUSTER_TAG {
            return Err(DrError::ClusterTagOutOfRange(cluster_tag));
        }
        if sequence > MAX_SEQUENCE_NUMBER {
            return Err(DrError::SequenceOutOfRange(sequence));
        }
        Ok(DrSequenceId(
            ((cluster_tag as i64) << CLUSTER_SHIFT) | sequence as i64,
        ))
    }

    /// The "no data produced yet" sentinel for a cluster: empty flag set,
    /// sequence field saturated so it sorts after every real identifier of
    /// the same cluster.
    pub fn empty(cluster_tag: u16) -> Result<DrSequenceId, DrError> {
        if cluster_tag > MAX_CLUSTER_TAG {
            return Err(DrError::ClusterTagOutOfRange(cluster_tag));
        }
        Ok(DrSequenceId(
            EMPTY_FLAG | ((cluster_tag as i64) << CLUSTER_SHIFT) | SEQUENCE_MASK,
        ))
    }

    /// The value immediately preceding sequence 0 of a cluster — the
    /// baseline installed before any record has arrived, so that the
    /// stream's first record classifies as expected-next.
    ///
    /// Constructed by subtracting one from `(cluster_tag, 0)`, which
    /// borrows out of the sequence field: the result's sequence field is
    /// all-ones and its cluster-tag field is NOT `cluster_tag` (for tag 0
    /// even the empty flag ends up set). Use [`is_before_zero`] to detect
    /// such values and do not read [`cluster_tag`] off them.
    ///
    /// [`is_before_zero`]: DrSequenceId::is_before_zero
    /// [`cluster_tag`]: DrSequenceId::cluster_tag
    pub fn initial_ack(cluster_tag: u16) -> Result<DrSequenceId, DrError> {
        if cluster_tag > MAX_CLUSTER_TAG {
            return Err(DrError::ClusterTagOutOfRange(cluster_tag));
        }
        Ok(DrSequenceId(
            ((cluster_tag as i64) << CLUSTER_SHIFT).wrapping_sub(1),
        ))
    }

    /// Reconstruct from a persisted/wire raw value. No validation: every
    /// bit pattern a peer produced is meaningful.
    pub fn from_raw(raw: i64) -> DrSequenceId {
        DrSequenceId(raw)
    }

    /// The raw packed value, for persistence and wire transfer.
    pub fn raw(self) -> i64 {
        self.0
    }

    /// True iff the empty/sentinel flag is set.
    pub fn is_empty(self) -> bool {
        self.0 & EMPTY_FLAG != 0
    }

    /// True iff the sequence field is all-ones — the shape of an
    /// initial-ack baseline (and, incidentally, of the empty sentinel).
    /// Inspects only the sequence field; see [`initial_ack`].
    ///
    /// [`initial_ack`]: DrSequenceId::initial_ack
    pub fn is_before_zero(self) -> bool {
        self.0 & SEQUENCE_MASK == SEQUENCE_MASK
    }

    /// The source-cluster tag field. Only meaningful on real identifiers;
    /// before-zero values carry a borrowed, decremented tag.
    pub fn cluster_tag(self) -> u8 {
        ((self.0 >> CLUSTER_SHIFT) & 0xFF) as u8
    }

    /// The sequence counter field, with tag and sentinel bits masked off.
    pub fn sequence_number(self) -> u64 {
        (self.0 & SEQUENCE_MASK) as u64
    }

    /// Human-facing value: sentinel-tagged identifiers display as their raw
    /// (negative) value, real ones as the bare sequence number. The cluster
    /// tag is intentionally dropped for brevity.
    pub fn display_value(self) -> i64 {
        if self.0 < 0 {
            self.0
        } else {
            self.0 & SEQUENCE_MASK
        }
    }
}

impl fmt::Display for DrSequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_value())
    }
}

#[cfg(test)]
mod sequence_id_tests {
    use super::*;

    #[test]
    fn test_component_round_trip() {
        for &cluster in &[0u16, 1, 7, 128, 255] {
            for &seq in &[0u64, 1, 42, 1 << 30, MAX_SEQUENCE_NUMBER] {
                let id = DrSequenceId::from_components(cluster, seq).unwrap();
                assert_eq!(id.cluster_tag() as u16, cluster);
                assert_eq!(id.sequence_number(), seq);
                assert!(!id.is_empty());
            }
        }
    }

    #[test]
    fn test_raw_round_trip_is_bit_exact() {
        let id = DrSequenceId::from_components(9, 123_456_789).unwrap();
        assert_eq!(DrSequenceId::from_raw(id.raw()), id);
        let empty = DrSequenceId::empty(9).unwrap();
        assert_eq!(DrSequenceId::from_raw(empty.raw()), empty);
    }

    #[test]
    fn test_cluster_tag_out_of_range_rejected() {
        assert!(matches!(
            DrSequenceId::from_components(256, 0),
            Err(DrError::ClusterTagOutOfRange(256))
        ));
        assert!(DrSequenceId::empty(300).is_err());
        assert!(DrSequenceId::initial_ack(1000).is_err());
    }

    #[test]
    fn test_sequence_out_of_range_rejected() {
        assert!(matches!(
            DrSequenceId::from_components(0, MAX_SEQUENCE_NUMBER + 1),
            Err(DrError::SequenceOutOfRange(_))
        ));
        assert!(DrSequenceId::from_components(0, u64::MAX).is_err());
    }

    #[test]
    fn test_empty_marker_shape() {
        for &cluster in &[0u16, 3, 255] {
            let empty = DrSequenceId::empty(cluster).unwrap();
            assert!(empty.is_empty());
            assert_eq!(empty.sequence_number(), MAX_SEQUENCE_NUMBER);
            assert_eq!(empty.cluster_tag() as u16, cluster);
            assert!(empty.raw() < 0, "sentinel flag is the sign bit");
            // Saturated sequence field also reads as before-zero.
            assert!(empty.is_before_zero());
        }
    }

    #[test]
    fn test_initial_ack_is_one_below_sequence_zero() {
        let ack = DrSequenceId::initial_ack(3).unwrap();
        let zero = DrSequenceId::from_components(3, 0).unwrap();
        assert_eq!(ack.raw(), zero.raw() - 1);
        assert!(ack.is_before_zero());
        assert!(!ack.is_empty());
        // The borrow decrements the tag field; the tag is not recoverable.
        assert_eq!(ack.cluster_tag(), 2);
    }

    #[test]
    fn test_initial_ack_for_cluster_zero_goes_negative() {
        let ack = DrSequenceId::initial_ack(0).unwrap();
        assert_eq!(ack.raw(), -1);
        assert!(ack.is_before_zero());
        // The borrow reaches the sentinel bit itself.
        assert!(ack.is_empty());
    }

    #[test]
    fn test_ordering_is_signed_raw_order() {
        let low = DrSequenceId::from_components(1, 500).unwrap();
        let high = DrSequenceId::from_components(1, 501).unwrap();
        let other_cluster = DrSequenceId::from_components(2, 0).unwrap();
        assert!(low < high);
        // Raw order: the higher-tagged cluster dominates any sequence.
        assert!(high < other_cluster);
        // Sentinel-tagged values are negative, so they sort below real ids.
        let empty = DrSequenceId::empty(1).unwrap();
        assert!(empty < low);
    }

    #[test]
    fn test_display_value() {
        let real = DrSequenceId::from_components(200, 77).unwrap();
        assert_eq!(real.display_value(), 77);
        assert_eq!(real.to_string(), "77");

        let empty = DrSequenceId::empty(200).unwrap();
        assert_eq!(empty.display_value(), empty.raw());
        assert!(empty.display_value() < 0);
    }
}
