use thiserror::Error;

use crate::types::PartitionId;

/// Convenience alias for `Result<T, HeronError>`.
pub type HeronResult<T> = Result<T, HeronError>;

/// Error classification for handling decisions.
///
/// - `InvalidArgument` — caller passed out-of-range data; fail fast, never clamp
/// - `Corruption`      — persisted/wire data cannot be interpreted; not recoverable
/// - `Transient`       — task-log I/O, resource pressure; retry MAY succeed
/// - `InternalBug`     — should never happen; triggers alert + diagnostic dump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    Corruption,
    Transient,
    InternalBug,
}

/// Top-level error type that all crate-specific errors convert into.
#[derive(Error, Debug)]
pub enum HeronError {
    #[error("DR error: {0}")]
    Dr(#[from] DrError),

    #[error("Site error: {0}")]
    Site(#[from] SiteError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// DR bookkeeping errors.
#[derive(Error, Debug)]
pub enum DrError {
    #[error("Cluster tag {0} exceeds the 8-bit tag field")]
    ClusterTagOutOfRange(u16),

    #[error("Sequence number {0} exceeds the 55-bit counter field")]
    SequenceOutOfRange(u64),

    #[error("Unknown idempotency wire code: {0}")]
    UnknownWireCode(i8),

    #[error("Partition {0} has no registered apply queue")]
    UnknownPartition(PartitionId),
}

/// Execution-site errors.
#[derive(Error, Debug)]
pub enum SiteError {
    #[error("Task log error on {partition}: {reason}")]
    TaskLog {
        partition: PartitionId,
        reason: String,
    },

    #[error("Site thread for {0} exited abnormally")]
    ThreadFailed(PartitionId),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: String,
    },
}

// ── HeronError classification & helpers ─────────────────────────────────────

impl HeronError {
    /// Classify this error for handling decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            // Caller passed data that violates a construction precondition.
            HeronError::Dr(DrError::ClusterTagOutOfRange(_)) => ErrorKind::InvalidArgument,
            HeronError::Dr(DrError::SequenceOutOfRange(_)) => ErrorKind::InvalidArgument,
            HeronError::Config(_) => ErrorKind::InvalidArgument,

            // Wire/persisted data we cannot interpret.
            HeronError::Dr(DrError::UnknownWireCode(_)) => ErrorKind::Corruption,

            // Task-log I/O may recover on retry.
            HeronError::Site(SiteError::TaskLog { .. }) => ErrorKind::Transient,

            // Everything else is an internal bug.
            HeronError::Dr(DrError::UnknownPartition(_)) => ErrorKind::InternalBug,
            HeronError::Site(SiteError::ThreadFailed(_)) => ErrorKind::InternalBug,
            HeronError::Internal(_) => ErrorKind::InternalBug,
        }
    }

    /// Returns true if the caller passed invalid data.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self.kind(), ErrorKind::InvalidArgument)
    }

    /// Returns true if this is a data corruption / incompatibility error.
    pub fn is_corruption(&self) -> bool {
        matches!(self.kind(), ErrorKind::Corruption)
    }

    /// Returns true if a retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
    }

    /// Returns true if this is an internal bug that should never occur.
    pub fn is_internal_bug(&self) -> bool {
        matches!(self.kind(), ErrorKind::InternalBug)
    }

    /// Add context string to an error, **preserving error classification**
    /// where possible. `Internal` gets the context prepended; structured
    /// variants are wrapped as `Internal` only as a last resort.
    pub fn with_context(self, ctx: impl Into<String>) -> Self {
        let ctx = ctx.into();
        match self {
            HeronError::Internal(msg) => HeronError::Internal(format!("{ctx}: {msg}")),
            HeronError::Site(SiteError::TaskLog { partition, reason }) => {
                HeronError::Site(SiteError::TaskLog {
                    partition,
                    reason: format!("{ctx}: {reason}"),
                })
            }
            other => HeronError::Internal(format!("{ctx}: {other}")),
        }
    }

    /// Emit a structured log entry for internal-bug errors. Call before
    /// surfacing such an error to an operator-facing channel.
    pub fn log_if_internal(&self) {
        if self.is_internal_bug() {
            tracing::error!(
                error_category = "InternalBug",
                component = self.affected_component(),
                "INTERNAL: {}",
                self
            );
        }
    }

    /// Identify the affected component for structured logging.
    fn affected_component(&self) -> &'static str {
        match self {
            HeronError::Dr(_) => "dr",
            HeronError::Site(_) => "site",
            HeronError::Config(_) => "config",
            HeronError::Internal(_) => "internal",
        }
    }
}

/// Add context to a Result, preserving error classification.
/// Usage: `some_result.ctx("stage=replay, partition=P3")?`
pub trait ErrorContext<T> {
    fn ctx(self, context: &str) -> Result<T, HeronError>;
    fn ctx_with(self, f: impl FnOnce() -> String) -> Result<T, HeronError>;
}

impl<T, E: Into<HeronError>> ErrorContext<T> for Result<T, E> {
    fn ctx(self, context: &str) -> Result<T, HeronError> {
        self.map_err(|e| e.into().with_context(context))
    }
    fn ctx_with(self, f: impl FnOnce() -> String) -> Result<T, HeronError> {
        self.map_err(|e| e.into().with_context(f()))
    }
}

#[cfg(test)]
mod error_classification {
    use super::*;

    // ── ErrorKind classification ─────────────────────────────────────────────

    #[test]
    fn test_cluster_tag_out_of_range_is_invalid_argument() {
        let e = HeronError::Dr(DrError::ClusterTagOutOfRange(300));
        assert_eq!(e.kind(), ErrorKind::InvalidArgument);
        assert!(e.is_invalid_argument());
        assert!(!e.is_corruption());
        assert!(!e.is_internal_bug());
    }

    #[test]
    fn test_sequence_out_of_range_is_invalid_argument() {
        let e = HeronError::Dr(DrError::SequenceOutOfRange(u64::MAX));
        assert_eq!(e.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_unknown_wire_code_is_corruption() {
        let e = HeronError::Dr(DrError::UnknownWireCode(42));
        assert_eq!(e.kind(), ErrorKind::Corruption);
        assert!(e.is_corruption());
    }

    #[test]
    fn test_task_log_is_transient() {
        let e = HeronError::Site(SiteError::TaskLog {
            partition: PartitionId(3),
            reason: "short read".into(),
        });
        assert_eq!(e.kind(), ErrorKind::Transient);
        assert!(e.is_transient());
    }

    #[test]
    fn test_unknown_partition_is_internal_bug() {
        let e = HeronError::Dr(DrError::UnknownPartition(PartitionId(9)));
        assert_eq!(e.kind(), ErrorKind::InternalBug);
    }

    #[test]
    fn test_config_error_is_invalid_argument() {
        let e = HeronError::Config(ConfigError::InvalidValue {
            field: "dr.cluster_tag",
            reason: "must be <= 255".into(),
        });
        assert_eq!(e.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_internal_string_is_internal_bug() {
        let e = HeronError::Internal("something went wrong".into());
        assert_eq!(e.kind(), ErrorKind::InternalBug);
    }

    // ── with_context ─────────────────────────────────────────────────────────

    #[test]
    fn test_with_context_wraps_message() {
        let e = HeronError::Internal("original".into());
        let e2 = e.with_context("stage=apply, partition=P1");
        assert!(e2.to_string().contains("stage=apply"));
        assert!(e2.to_string().contains("original"));
    }

    #[test]
    fn test_with_context_preserves_task_log_classification() {
        let e = HeronError::Site(SiteError::TaskLog {
            partition: PartitionId(1),
            reason: "disk full".into(),
        });
        let e2 = e.with_context("stage=replay");
        assert_eq!(e2.kind(), ErrorKind::Transient);
        assert!(e2.to_string().contains("stage=replay"));
        assert!(e2.to_string().contains("disk full"));
    }

    // ── ErrorContext trait ───────────────────────────────────────────────────

    #[test]
    fn test_error_context_trait_ctx() {
        let result: Result<(), DrError> = Err(DrError::UnknownWireCode(7));
        let result2: Result<(), HeronError> = result.ctx("stage=decode");
        let err = result2.unwrap_err();
        assert!(err.to_string().contains("stage=decode"));
    }

    #[test]
    fn test_error_context_trait_ctx_with() {
        let partition = PartitionId(4);
        let result: Result<(), DrError> = Err(DrError::UnknownPartition(partition));
        let result2: Result<(), HeronError> =
            result.ctx_with(|| format!("partition={partition}"));
        let err = result2.unwrap_err();
        assert!(err.to_string().contains("partition=P4"));
    }

    #[test]
    fn test_error_context_ok_passthrough() {
        let result: Result<i32, DrError> = Ok(42);
        let result2: Result<i32, HeronError> = result.ctx("should not appear");
        assert_eq!(result2.unwrap(), 42);
    }
}
