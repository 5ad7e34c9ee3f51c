//! DR (cross-datacenter replication) bookkeeping for the consumer side:
//! packed sequence identifiers, idempotent apply classification, and the
//! pipeline that admits replicated records onto partition sites.
//!
//! ## Invariants
//! - DRB-1: a record is enqueued for execution at most once per partition.
//! - DRB-2: apply tracking state only advances on an expected-next record.
//! - DRB-3: gaps and duplicates are reported to the caller as data, never
//!   raised as errors — recovery policy lives upstream.

pub mod apply;
pub mod gateway;
pub mod idempotency;
pub mod sequence_id;
