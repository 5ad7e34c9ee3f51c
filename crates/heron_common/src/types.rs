//! Canonical identifier types shared across Heron crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a data partition: one shard of the database's data and
/// transaction stream, with its own execution site and its own per-source
/// apply tracking state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PartitionId(pub u32);

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Catalog version number, bumped on every schema/deployment change.
/// Consumers of replicated streams compare this against the version a
/// record was produced under.
pub type CatalogVersion = u64;

#[cfg(test)]
mod tests {
    use super::PartitionId;

    #[test]
    fn test_partition_id_display() {
        assert_eq!(PartitionId(7).to_string(), "P7");
    }

    #[test]
    fn test_partition_id_ordering() {
        assert!(PartitionId(1) < PartitionId(2));
    }
}
