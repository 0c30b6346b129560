//! Errors raised by the pure reconciliation model.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Deterministic failures: a boundary value that cannot be accepted, or a
/// relationship shape the model refuses. Platform and storage failures live in infra.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A platform or tenant identifier could not be accepted.
    #[error("invalid {kind}: {reason}")]
    InvalidId { kind: &'static str, reason: String },

    /// A relationship breaks the master/child rules (both roles, self-links,
    /// a manual trigger aimed at a child).
    #[error("relationship invariant violated: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    pub fn invalid_id(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidId {
            kind,
            reason: reason.into(),
        }
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_value() {
        assert_eq!(
            DomainError::invalid_id("NodeId", "empty").to_string(),
            "invalid NodeId: empty"
        );
        assert_eq!(
            DomainError::invariant("node m lists itself as a child").to_string(),
            "relationship invariant violated: node m lists itself as a child"
        );
    }
}
