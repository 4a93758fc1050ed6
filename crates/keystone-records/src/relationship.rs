//! Relationship Canonicalizer
//!
//! Symmetric pairwise relationships stored as a single row keyed by
//! `(tenant, lo, hi)` where the two resource ids are sorted before storage.
//! Relating A to B and B to A therefore resolve to the same row, and the
//! uniqueness of the pair key lets two concurrent creators race safely to a
//! single row instead of taking an application-level lock.

use crate::store::RecordStore;
use chrono::{DateTime, Utc};
use keystone_common::{ApiError, RelationshipId, ResourceId, TenantId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A canonical relationship row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    /// Row identifier
    pub id: RelationshipId,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Lesser resource id of the pair
    pub lo: ResourceId,
    /// Greater resource id of the pair
    pub hi: ResourceId,
    /// Relationship kind, e.g. "spouse" or "referred_by"
    pub kind: String,
    /// Free-text notes; descriptive only, never parsed for control decisions
    pub notes: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

/// One side of a relationship as seen from a record. "The other resource"
/// is derived at read time from whichever side matched; it is never stored
/// twice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipView {
    /// Row identifier
    pub relationship_id: RelationshipId,
    /// The resource on the other side of the pair
    pub other: ResourceId,
    /// Relationship kind
    pub kind: String,
    /// Free-text notes
    pub notes: Option<String>,
}

#[derive(Default)]
struct Inner {
    by_pair: HashMap<(TenantId, ResourceId, ResourceId), RelationshipId>,
    rows: HashMap<RelationshipId, Relationship>,
}

/// Store of canonical relationship rows.
pub struct RelationshipStore {
    inner: Arc<RwLock<Inner>>,
    next_id: AtomicU64,
}

impl RelationshipStore {
    /// Empty store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Relate two resources of the same tenant. Rejects self-relationships;
    /// fails closed when either resource does not resolve under the tenant.
    /// If the canonical pair already exists this is an idempotent no-op that
    /// returns the existing row's id.
    pub fn relate(
        &self,
        records: &RecordStore,
        tenant: TenantId,
        a: ResourceId,
        b: ResourceId,
        kind: &str,
        notes: Option<String>,
    ) -> Result<RelationshipId, RelationError> {
        if a == b {
            return Err(RelationError::SelfRelationship);
        }

        // Both sides must belong to the tenant; a foreign resource is
        // indistinguishable from a missing one.
        records.get(tenant, a).map_err(|_| RelationError::NotFound)?;
        records.get(tenant, b).map_err(|_| RelationError::NotFound)?;

        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };

        let mut inner = self.inner.write();
        if let Some(&existing) = inner.by_pair.get(&(tenant, lo, hi)) {
            return Ok(existing);
        }

        let id = RelationshipId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let now = Utc::now();
        inner.by_pair.insert((tenant, lo, hi), id);
        inner.rows.insert(
            id,
            Relationship {
                id,
                tenant_id: tenant,
                lo,
                hi,
                kind: kind.to_string(),
                notes,
                created_at: now,
                updated_at: now,
            },
        );

        Ok(id)
    }

    /// Every relationship the resource participates in, from either side.
    pub fn list_related(&self, tenant: TenantId, resource: ResourceId) -> Vec<RelationshipView> {
        let inner = self.inner.read();
        let mut views: Vec<RelationshipView> = inner
            .rows
            .values()
            .filter(|r| r.tenant_id == tenant && (r.lo == resource || r.hi == resource))
            .map(|r| RelationshipView {
                relationship_id: r.id,
                other: if r.lo == resource { r.hi } else { r.lo },
                kind: r.kind.clone(),
                notes: r.notes.clone(),
            })
            .collect();
        views.sort_by_key(|v| v.relationship_id);
        views
    }

    /// Fetch a row under the tenant predicate.
    pub fn get(&self, tenant: TenantId, id: RelationshipId) -> Result<Relationship, RelationError> {
        self.inner
            .read()
            .rows
            .get(&id)
            .filter(|r| r.tenant_id == tenant)
            .cloned()
            .ok_or(RelationError::NotFound)
    }

    /// Update kind/notes. Re-verifies tenant ownership of the row.
    pub fn update(
        &self,
        tenant: TenantId,
        id: RelationshipId,
        kind: &str,
        notes: Option<String>,
    ) -> Result<Relationship, RelationError> {
        let mut inner = self.inner.write();
        let row = inner
            .rows
            .get_mut(&id)
            .filter(|r| r.tenant_id == tenant)
            .ok_or(RelationError::NotFound)?;

        row.kind = kind.to_string();
        row.notes = notes;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    /// Remove a row. Re-verifies tenant ownership.
    pub fn remove(&self, tenant: TenantId, id: RelationshipId) -> Result<(), RelationError> {
        let mut inner = self.inner.write();
        let row = inner
            .rows
            .get(&id)
            .filter(|r| r.tenant_id == tenant)
            .cloned()
            .ok_or(RelationError::NotFound)?;

        inner.by_pair.remove(&(row.tenant_id, row.lo, row.hi));
        inner.rows.remove(&id);
        Ok(())
    }

    /// Whether any relationship row references the resource. Used by the
    /// record store's restrict-on-delete check.
    pub fn references(&self, tenant: TenantId, resource: ResourceId) -> bool {
        self.inner
            .read()
            .rows
            .values()
            .any(|r| r.tenant_id == tenant && (r.lo == resource || r.hi == resource))
    }
}

impl Default for RelationshipStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Canonicalizer errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RelationError {
    /// A record cannot be related to itself
    #[error("a record cannot be related to itself")]
    SelfRelationship,
    /// Row or resource missing under this tenant
    #[error("not found")]
    NotFound,
}

impl ApiError for RelationError {
    fn code(&self) -> &'static str {
        match self {
            Self::SelfRelationship => "self_relationship",
            Self::NotFound => "resource_not_found",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceKind;
    use serde_json::json;

    fn pair(store: &RecordStore, tenant: TenantId) -> (ResourceId, ResourceId) {
        let a = store.create(tenant, ResourceKind::Contact, "A", json!({}));
        let b = store.create(tenant, ResourceKind::Contact, "B", json!({}));
        (a.id, b.id)
    }

    #[test]
    fn test_reversed_pair_resolves_to_same_row() {
        let records = RecordStore::new();
        let rels = RelationshipStore::new();
        let tenant = TenantId::new_v4();
        let (a, b) = pair(&records, tenant);

        let first = rels.relate(&records, tenant, a, b, "spouse", None).unwrap();
        let second = rels.relate(&records, tenant, b, a, "spouse", None).unwrap();

        assert_eq!(first, second);
        assert_eq!(rels.list_related(tenant, a).len(), 1);
    }

    #[test]
    fn test_list_related_derives_other_side() {
        let records = RecordStore::new();
        let rels = RelationshipStore::new();
        let tenant = TenantId::new_v4();
        let (a, b) = pair(&records, tenant);

        rels.relate(&records, tenant, a, b, "spouse", None).unwrap();

        assert_eq!(rels.list_related(tenant, a)[0].other, b);
        assert_eq!(rels.list_related(tenant, b)[0].other, a);
    }

    #[test]
    fn test_self_relationship_rejected() {
        let records = RecordStore::new();
        let rels = RelationshipStore::new();
        let tenant = TenantId::new_v4();
        let (a, _) = pair(&records, tenant);

        assert_eq!(
            rels.relate(&records, tenant, a, a, "self", None),
            Err(RelationError::SelfRelationship)
        );
    }

    #[test]
    fn test_cross_tenant_pair_fails_closed() {
        let records = RecordStore::new();
        let rels = RelationshipStore::new();
        let t1 = TenantId::new_v4();
        let t2 = TenantId::new_v4();

        let mine = records.create(t1, ResourceKind::Contact, "A", json!({}));
        let theirs = records.create(t2, ResourceKind::Contact, "B", json!({}));

        assert_eq!(
            rels.relate(&records, t1, mine.id, theirs.id, "spouse", None),
            Err(RelationError::NotFound)
        );
        assert!(rels.list_related(t1, mine.id).is_empty());
    }

    #[test]
    fn test_update_and_remove_reverify_tenant() {
        let records = RecordStore::new();
        let rels = RelationshipStore::new();
        let t1 = TenantId::new_v4();
        let t2 = TenantId::new_v4();
        let (a, b) = pair(&records, t1);

        let id = rels.relate(&records, t1, a, b, "spouse", None).unwrap();

        assert!(rels.update(t2, id, "colleague", None).is_err());
        assert!(rels.remove(t2, id).is_err());

        rels.update(t1, id, "colleague", Some("met 2019".into())).unwrap();
        assert_eq!(rels.get(t1, id).unwrap().kind, "colleague");

        rels.remove(t1, id).unwrap();
        assert!(rels.get(t1, id).is_err());
        // The pair key is free again.
        assert!(rels.relate(&records, t1, a, b, "spouse", None).is_ok());
    }

    #[test]
    fn test_concurrent_relate_converges_on_one_row() {
        let records = Arc::new(RecordStore::new());
        let rels = Arc::new(RelationshipStore::new());
        let tenant = TenantId::new_v4();
        let (a, b) = pair(&records, tenant);

        let mut handles = Vec::new();
        for i in 0..8 {
            let records = Arc::clone(&records);
            let rels = Arc::clone(&rels);
            // Half the callers supply the pair reversed.
            let (x, y) = if i % 2 == 0 { (a, b) } else { (b, a) };
            handles.push(std::thread::spawn(move || {
                rels.relate(&records, tenant, x, y, "spouse", None).unwrap()
            }));
        }

        let ids: Vec<RelationshipId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(rels.list_related(tenant, a).len(), 1);
    }
}
