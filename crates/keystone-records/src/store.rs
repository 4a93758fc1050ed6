//! Tenant-Scoped Record Store
//!
//! The query-scoping contract lives here: every accessor takes the governing
//! tenant and applies it as a mandatory predicate, detail lookups included.
//! Resource identifiers are guessable integers, so an id alone proves
//! nothing. A tenant/id mismatch returns the same `NotFound` as a missing
//! row; callers can never distinguish "not yours" from "does not exist".

use crate::lifecycle::{self, LifecycleState, TransitionError};
use crate::model::{OwnedRecord, ResourceKind};
use crate::relationship::RelationshipStore;
use chrono::{DateTime, Utc};
use keystone_common::{ApiError, ResourceId, TenantId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Read-time visibility filter. Archival is not deletion: excluded states
/// stay fully queryable by explicit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// The active workstream: everything except imported and archived
    Default,
    /// Every state
    All,
    /// Exactly one state
    InState(LifecycleState),
}

impl Visibility {
    fn admits(self, state: LifecycleState) -> bool {
        match self {
            Self::Default => state.default_visible(),
            Self::All => true,
            Self::InState(s) => state == s,
        }
    }
}

/// Store of owned resources.
pub struct RecordStore {
    records: Arc<RwLock<HashMap<ResourceId, OwnedRecord>>>,
    next_id: AtomicU64,
}

impl RecordStore {
    /// Empty store.
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    fn allocate_id(&self) -> ResourceId {
        ResourceId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Create a record in the `Active` state, owned by `tenant`.
    pub fn create(
        &self,
        tenant: TenantId,
        kind: ResourceKind,
        label: &str,
        attributes: serde_json::Value,
    ) -> OwnedRecord {
        self.create_in_state(tenant, kind, label, attributes, LifecycleState::Active)
    }

    /// Create a record in the `Imported` state, outside the default view
    /// until explicitly activated.
    pub fn create_imported(
        &self,
        tenant: TenantId,
        kind: ResourceKind,
        label: &str,
        attributes: serde_json::Value,
    ) -> OwnedRecord {
        self.create_in_state(tenant, kind, label, attributes, LifecycleState::Imported)
    }

    fn create_in_state(
        &self,
        tenant: TenantId,
        kind: ResourceKind,
        label: &str,
        attributes: serde_json::Value,
        state: LifecycleState,
    ) -> OwnedRecord {
        let record = OwnedRecord::new(self.allocate_id(), tenant, kind, label, attributes, state);
        self.records.write().insert(record.id, record.clone());
        record
    }

    /// Create a genuinely dependent child row. Ownership is scoped through
    /// the parent, which must resolve under the same tenant.
    pub fn create_child(
        &self,
        tenant: TenantId,
        parent_id: ResourceId,
        kind: ResourceKind,
        label: &str,
        attributes: serde_json::Value,
    ) -> Result<OwnedRecord, StoreError> {
        // Join-enforced scoping: the parent lookup carries the predicate.
        self.get(tenant, parent_id)?;

        let mut record =
            OwnedRecord::new(self.allocate_id(), tenant, kind, label, attributes, LifecycleState::Active);
        record.parent_id = Some(parent_id);
        self.records.write().insert(record.id, record.clone());
        Ok(record)
    }

    /// Detail lookup. The tenant predicate applies even though the id is
    /// unique on its own.
    pub fn get(&self, tenant: TenantId, id: ResourceId) -> Result<OwnedRecord, StoreError> {
        self.records
            .read()
            .get(&id)
            .filter(|r| r.tenant_id == tenant)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    /// List records under the tenant, optionally narrowed by kind.
    pub fn list(
        &self,
        tenant: TenantId,
        kind: Option<ResourceKind>,
        visibility: Visibility,
    ) -> Vec<OwnedRecord> {
        let mut rows: Vec<OwnedRecord> = self
            .records
            .read()
            .values()
            .filter(|r| r.tenant_id == tenant)
            .filter(|r| kind.map(|k| r.kind == k).unwrap_or(true))
            .filter(|r| visibility.admits(r.state))
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.id);
        rows
    }

    /// Update the display label.
    pub fn update_label(
        &self,
        tenant: TenantId,
        id: ResourceId,
        label: &str,
    ) -> Result<OwnedRecord, StoreError> {
        self.mutate(tenant, id, |record| {
            record.label = label.to_string();
        })
    }

    /// Replace the opaque attribute payload.
    pub fn update_attributes(
        &self,
        tenant: TenantId,
        id: ResourceId,
        attributes: serde_json::Value,
    ) -> Result<OwnedRecord, StoreError> {
        self.mutate(tenant, id, |record| {
            record.attributes = attributes;
        })
    }

    /// Apply a lifecycle transition under the tenant predicate.
    pub fn transition(
        &self,
        tenant: TenantId,
        id: ResourceId,
        to: LifecycleState,
        now: DateTime<Utc>,
    ) -> Result<OwnedRecord, StoreError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&id)
            .filter(|r| r.tenant_id == tenant)
            .ok_or(StoreError::NotFound)?;

        let from = record.state;
        lifecycle::apply(record, to, now)?;

        tracing::debug!(
            resource_id = %id,
            kind = record.kind.name(),
            from = from.name(),
            to = to.name(),
            "lifecycle transition"
        );

        Ok(record.clone())
    }

    /// Archive a record. Its row and every historical reference stay.
    pub fn archive(
        &self,
        tenant: TenantId,
        id: ResourceId,
        now: DateTime<Utc>,
    ) -> Result<OwnedRecord, StoreError> {
        self.transition(tenant, id, LifecycleState::Archived, now)
    }

    /// Bring an archived record back into the default view.
    pub fn reactivate(
        &self,
        tenant: TenantId,
        id: ResourceId,
        now: DateTime<Utc>,
    ) -> Result<OwnedRecord, StoreError> {
        self.transition(tenant, id, LifecycleState::Active, now)
    }

    /// Restricted removal. Archival is the normal retirement path; removal
    /// exists only for rows nothing references. The record's whole
    /// descendant tree goes with it, so the restriction covers every row in
    /// that tree: a relationship referencing any of them blocks the removal,
    /// which keeps relationship views from ever pointing at a removed row.
    pub fn remove(
        &self,
        tenant: TenantId,
        id: ResourceId,
        relationships: &RelationshipStore,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write();
        if !records.get(&id).map(|r| r.tenant_id == tenant).unwrap_or(false) {
            return Err(StoreError::NotFound);
        }

        // Children may themselves have children; walk the full tree.
        let mut doomed = vec![id];
        let mut frontier = vec![id];
        while let Some(parent) = frontier.pop() {
            for record in records.values() {
                if record.tenant_id == tenant && record.parent_id == Some(parent) {
                    doomed.push(record.id);
                    frontier.push(record.id);
                }
            }
        }

        if doomed
            .iter()
            .any(|&rid| relationships.references(tenant, rid))
        {
            return Err(StoreError::RemovalRestricted);
        }

        for rid in doomed {
            records.remove(&rid);
        }
        Ok(())
    }

    /// Number of records owned by the tenant, all states.
    pub fn count(&self, tenant: TenantId) -> usize {
        self.records
            .read()
            .values()
            .filter(|r| r.tenant_id == tenant)
            .count()
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore {
    fn mutate(
        &self,
        tenant: TenantId,
        id: ResourceId,
        f: impl FnOnce(&mut OwnedRecord),
    ) -> Result<OwnedRecord, StoreError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&id)
            .filter(|r| r.tenant_id == tenant)
            .ok_or(StoreError::NotFound)?;

        f(record);
        record.touch();
        Ok(record.clone())
    }
}

/// Store errors. Ownership violations surface as `NotFound`, never as a
/// distinguishable "forbidden".
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    /// No such record under this tenant
    #[error("not found")]
    NotFound,
    /// Other rows still reference the record
    #[error("record is still referenced")]
    RemovalRestricted,
    /// Lifecycle transition rejected
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl ApiError for StoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "resource_not_found",
            Self::RemovalRestricted => "removal_restricted",
            Self::Transition(e) => e.code(),
        }
    }
}
