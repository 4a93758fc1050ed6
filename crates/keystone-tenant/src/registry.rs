//! Tenant Registry

use crate::model::{hash_credential, Tenant, TenantStatus};
use chrono::{DateTime, Utc};
use keystone_common::{ApiError, TenantId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Persistent record of account holders. Rows are deactivated in place,
/// never removed.
pub struct TenantRegistry {
    tenants: Arc<RwLock<HashMap<TenantId, Tenant>>>,
}

impl TenantRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            tenants: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a freshly created tenant. Fails if the email is already
    /// registered, including to a deactivated tenant.
    pub fn insert(&self, tenant: Tenant) -> Result<(), RegistryError> {
        let mut tenants = self.tenants.write();
        if tenants.values().any(|t| t.email == tenant.email) {
            return Err(RegistryError::EmailTaken);
        }
        tenants.insert(tenant.tenant_id, tenant);
        Ok(())
    }

    /// Look up a tenant by id.
    pub fn get(&self, tenant_id: &TenantId) -> Option<Tenant> {
        self.tenants.read().get(tenant_id).cloned()
    }

    /// Look up a tenant by login email.
    pub fn find_by_email(&self, email: &str) -> Option<Tenant> {
        self.tenants.read().values().find(|t| t.email == email).cloned()
    }

    /// Deactivate a tenant in place. The row and everything it owns stay.
    pub fn deactivate(&self, tenant_id: &TenantId, now: DateTime<Utc>) -> Result<(), RegistryError> {
        let mut tenants = self.tenants.write();
        let tenant = tenants.get_mut(tenant_id).ok_or(RegistryError::NotFound)?;

        tenant.status = TenantStatus::Deactivated;
        tenant.deactivated_at = Some(now);

        Ok(())
    }

    /// Replace a tenant's credential hash.
    pub fn set_credential(&self, tenant_id: &TenantId, credential: &str) -> Result<(), RegistryError> {
        let mut tenants = self.tenants.write();
        let tenant = tenants.get_mut(tenant_id).ok_or(RegistryError::NotFound)?;

        tenant.credential_hash = hash_credential(credential);

        Ok(())
    }

    /// Roll back a row inserted in the same request that never became
    /// visible to its user. Only invite acceptance uses this, when it loses
    /// the token-consumption race.
    pub(crate) fn discard(&self, tenant_id: &TenantId) {
        self.tenants.write().remove(tenant_id);
    }

    /// Number of registered tenants, deactivated included.
    pub fn count(&self) -> usize {
        self.tenants.read().len()
    }
}

impl Default for TenantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No tenant with that id
    #[error("not found")]
    NotFound,
    /// Email already registered
    #[error("that email is already in use")]
    EmailTaken,
}

impl ApiError for RegistryError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "resource_not_found",
            Self::EmailTaken => "email_taken",
        }
    }
}
