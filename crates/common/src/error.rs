//! Error types for the Application Master

use thiserror::Error;

/// Main error type for the control plane.
///
/// Variants map onto the five error kinds the design distinguishes:
/// invariant violations, task errors, container errors, node errors, and
/// RPC errors. Only `Invariant` is fatal to the AM process; the rest are
/// recoverable and handled by the owning state machine.
#[derive(Error, Debug)]
pub enum Error {
    /// Programmer error / invariant violation. Aborts the AM; the DAG fails.
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// Task error: worker failure, read error, commit denied.
    #[error("task error: {0}")]
    Task(String),

    /// Container error: launch failed, timed out, NM stop failed, preempted.
    #[error("container error: {0}")]
    Container(String),

    /// Node error: node lost or blacklisted.
    #[error("node error: {0}")]
    Node(String),

    /// RPC error: unknown container, bad heartbeat sequence.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// Configuration errors.
    #[error("configuration error: {0}")]
    Config(String),

    /// Validation errors (e.g. a DAG submitted with a cycle).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Serialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Binary wire codec errors.
    #[error("codec error: {0}")]
    Codec(String),

    /// IO errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors.
    #[error("internal error: {0}")]
    Internal(String),

    /// Unknown errors, wrapped from anyhow at a boundary.
    #[error("unknown error: {0}")]
    Unknown(#[from] anyhow::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the failure this error represents should be retried by
    /// rescheduling, rather than surfaced as a terminal failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Task(_) | Error::Container(_) | Error::Node(_))
    }

    /// True only for the class of errors that must abort the AM process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Invariant(_))
    }

    /// Error severity for metrics labelling.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Error::Invariant(_) | Error::Config(_) => ErrorSeverity::Critical,
            Error::Node(_) | Error::Container(_) => ErrorSeverity::High,
            Error::Task(_) | Error::Rpc(_) => ErrorSeverity::Medium,
            Error::Validation(_) => ErrorSeverity::Low,
            _ => ErrorSeverity::Medium,
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Low => "low",
            ErrorSeverity::Medium => "medium",
            ErrorSeverity::High => "high",
            ErrorSeverity::Critical => "critical",
        }
    }
}
