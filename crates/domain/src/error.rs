/// Failure taxonomy shared by every crate in the workspace.
///
/// `Validation` and `PreconditionFailed` are surfaced to the caller of the
/// pure functions that raise them; everything else bubbles up to the worker
/// loops which log and decide between retry and quarantine.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum DomainError {
    /// Bad input, the caller has to fix the request.
    #[error("validation: {0}")]
    Validation(String),
    /// A referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// State machine or idempotence violation.
    #[error("conflict: {0}")]
    Conflict(String),
    /// A business rule blocks the operation (no active supply, outside the
    /// correction window, ...).
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    /// Duplicate key or broken uniqueness constraint.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),
    /// Transport-level failure on inbox or outbox traffic.
    #[error("external: {0}")]
    External(String),
    /// Anything unexpected.
    #[error("internal: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
