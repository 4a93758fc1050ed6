//! Keystone Common - Shared types for the multi-tenant records core
//!
//! This crate provides the identifiers and the stable error surface shared
//! by every other Keystone crate:
//! - Tenant and resource identifiers
//! - The machine-readable error-code contract ([`error::ApiError`])

#![warn(missing_docs)]

pub mod error;

pub use error::{ApiError, ErrorBody};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tenant ID. Root of ownership: every owned resource carries exactly one.
pub type TenantId = Uuid;

/// Owned-resource identifier.
///
/// Sequential integers on purpose: the query-scoping contract must hold even
/// when identifiers are trivially guessable, so nothing in the system is
/// allowed to rely on id secrecy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ResourceId(u64);

impl ResourceId {
    /// Wrap a raw identifier.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a canonical relationship row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RelationshipId(u64);

impl RelationshipId {
    /// Wrap a raw identifier.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_ordering() {
        let a = ResourceId::new(3);
        let b = ResourceId::new(17);

        assert!(a < b);
        assert_eq!(a.min(b), a);
        assert_eq!(a.max(b), b);
    }

    #[test]
    fn test_resource_id_display() {
        assert_eq!(ResourceId::new(42).to_string(), "42");
    }
}
