//! Infrastructure error model.
//!
//! Adapter errors (`PlatformError`, `PersistenceError`, `LedgerError`) stay close
//! to their backends; `SyncError` is what the pipeline and engine surface.

use thiserror::Error;

use stocklink_core::{DomainError, NodeId};

/// Failure talking to the commerce platform.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("platform request failed: {0}")]
    Request(String),

    #[error("platform request timed out")]
    Timeout,

    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("platform rejected write: {0}")]
    Rejected(String),
}

/// Failure of the durable baseline store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("baseline storage error: {0}")]
    Storage(String),
}

/// Failure of a TTL key ledger backend (dedup / echo / debounce).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("key ledger backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by the reconciliation pipeline.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// Inbound signature did not verify; nothing was processed.
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The platform does not know the node's relationship; callers degrade to unassigned.
    #[error("relationship not found for node {0}")]
    RelationshipNotFound(NodeId),

    #[error("platform read failed for node {node}: {source}")]
    PlatformRead { node: NodeId, source: PlatformError },

    #[error("platform write failed for node {node}: {source}")]
    PlatformWrite { node: NodeId, source: PlatformError },

    /// Baseline store failure; degrades the next delta computation.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl SyncError {
    pub fn platform_read(node: &NodeId, source: PlatformError) -> Self {
        Self::PlatformRead {
            node: node.clone(),
            source,
        }
    }

    pub fn platform_write(node: &NodeId, source: PlatformError) -> Self {
        Self::PlatformWrite {
            node: node.clone(),
            source,
        }
    }

    /// High-severity errors must be logged at `error` level and monitored.
    pub fn is_high_severity(&self) -> bool {
        matches!(self, SyncError::Persistence(_))
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
