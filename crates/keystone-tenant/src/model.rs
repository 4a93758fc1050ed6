//! Tenant Data Model

use chrono::{DateTime, Utc};
use keystone_common::TenantId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Account holder. Every owned resource in the system belongs to exactly
/// one tenant, and a tenant is never hard-deleted, only deactivated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    /// Unique tenant ID
    pub tenant_id: TenantId,
    /// Login email, unique across the registry
    pub email: String,
    /// One-way hash of the login credential; the raw value is never stored
    pub credential_hash: String,
    /// Role within the account
    pub role: TenantRole,
    /// Active/deactivated flag
    pub status: TenantStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Set once on deactivation
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl Tenant {
    /// Create a new tenant. Tenants come into existence through invite
    /// acceptance; see `OnboardingService`.
    pub fn new(email: &str, credential: &str, role: TenantRole, now: DateTime<Utc>) -> Self {
        Self {
            tenant_id: Uuid::new_v4(),
            email: email.to_string(),
            credential_hash: hash_credential(credential),
            role,
            status: TenantStatus::Active,
            created_at: now,
            deactivated_at: None,
        }
    }

    /// Whether this tenant may act at all.
    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }

    /// Constant-shape credential check against the stored hash.
    pub fn verify_credential(&self, credential: &str) -> bool {
        self.credential_hash == hash_credential(credential)
    }

    /// Replace the stored credential hash.
    pub fn set_credential(&mut self, credential: &str) {
        self.credential_hash = hash_credential(credential);
    }
}

/// Hash a credential for storage.
pub fn hash_credential(credential: &str) -> String {
    hex::encode(Sha256::digest(credential.as_bytes()))
}

/// Role within an account. Roles beyond these two are out of scope; there
/// is deliberately no superuser that bypasses tenant scoping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TenantRole {
    /// Account owner; may issue invites and deactivate tenants
    Owner,
    /// User who joined through an invite
    Invited,
}

/// Tenant lifecycle flag. Deactivation replaces deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TenantStatus {
    /// May authenticate and operate on owned resources
    Active,
    /// Retained for history, denied on every path
    Deactivated,
}
