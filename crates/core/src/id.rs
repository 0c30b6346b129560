//! Strongly-typed identifiers used across the workspace.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a tenant (one merchant shop; multi-tenant boundary).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(Uuid);

impl TenantId {
    /// Create a new identifier.
    ///
    /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
    /// for determinism.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for TenantId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for TenantId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for TenantId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s.trim())
            .map_err(|e| DomainError::invalid_id("TenantId", e.to_string()))?;
        Ok(Self(uuid))
    }
}

/// Opaque identifier of a sellable unit on the commerce platform.
///
/// Ordering is lexicographic; batches use it to process children deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

/// Opaque identifier of a stock location on the commerce platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationId(String);

macro_rules! impl_opaque_id {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Validate and wrap a platform identifier (must be non-blank).
            pub fn parse(raw: impl Into<String>) -> Result<Self, DomainError> {
                let raw = raw.into();
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(DomainError::invalid_id($name, "empty"));
                }
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<&str> for $t {
            /// Infallible conversion for literals and already-validated ids.
            ///
            /// Blank input is kept verbatim; use `parse` at system boundaries.
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

impl_opaque_id!(NodeId, "NodeId");
impl_opaque_id!(LocationId, "LocationId");
