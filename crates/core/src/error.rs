//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures. Every variant
/// is recoverable at the caller's discretion and carries enough detail to
/// render a user-facing message. Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. out-of-range amount).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An actor-side business precondition is unmet (e.g. tax registration
    /// not connected, action attempted by the wrong role).
    #[error("precondition not met: {0}")]
    Precondition(String),

    /// A transition's required source status does not match the record's
    /// current status. Callers should treat this as a stale view and refresh
    /// the record before retrying.
    #[error("invalid transition: expected status '{expected}', found '{actual}'")]
    State { expected: String, actual: String },

    /// A transition was attempted on a record already in a terminal status.
    #[error("request is terminal: {0}")]
    Terminal(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested record was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    pub fn state(expected: impl ToString, actual: impl ToString) -> Self {
        Self::State {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn terminal(msg: impl Into<String>) -> Self {
        Self::Terminal(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
