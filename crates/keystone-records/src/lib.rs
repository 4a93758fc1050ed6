//! Keystone Records - Tenant-Scoped Owned Resources
//!
//! Storage layer for the business records (contacts, engagements, tasks,
//! transactions, professionals, templates, intake configurations). The
//! business semantics of a record are opaque here; what this crate enforces
//! is the cross-cutting contract:
//!
//! - **Query scoping**: every accessor takes the governing tenant and
//!   applies it as a mandatory predicate. A tenant/id mismatch is
//!   indistinguishable from a missing row.
//! - **Lifecycle states**: a closed set with an explicit transition table;
//!   archival replaces deletion.
//! - **Canonical relationships**: symmetric pairs stored once, under a
//!   deterministic ordering.

#![warn(missing_docs)]
#![allow(dead_code)]

pub mod lifecycle;
pub mod model;
pub mod relationship;
pub mod store;

pub use lifecycle::{LifecycleState, TransitionError};
pub use model::{OwnedRecord, ResourceKind};
pub use relationship::{RelationError, Relationship, RelationshipStore, RelationshipView};
pub use store::{RecordStore, StoreError, Visibility};
