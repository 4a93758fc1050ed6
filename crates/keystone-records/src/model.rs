//! Owned-Resource Data Model

use crate::lifecycle::LifecycleState;
use chrono::{DateTime, Utc};
use keystone_common::{ResourceId, TenantId};
use serde::{Deserialize, Serialize};

/// Category of an owned resource. The governance layer treats all of them
/// alike; business routes attach meaning to the attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Person the tenant works with
    Contact,
    /// Meeting, call, or showing
    Engagement,
    /// To-do item, possibly a child of another record
    Task,
    /// Business transaction; opaque to this layer
    Transaction,
    /// Service professional (inspector, lender, attorney, ...)
    Professional,
    /// Reusable document template
    Template,
    /// Configuration of a public intake link
    IntakeConfig,
}

impl ResourceKind {
    /// Kind name for logging and filtering.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Contact => "contact",
            Self::Engagement => "engagement",
            Self::Task => "task",
            Self::Transaction => "transaction",
            Self::Professional => "professional",
            Self::Template => "template",
            Self::IntakeConfig => "intake_config",
        }
    }
}

/// An owned resource. The tenant identifier is set at creation and never
/// reassigned; no accessor in this crate mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedRecord {
    /// Resource identifier, unique across all tenants
    pub id: ResourceId,
    /// Owning tenant, immutable after creation
    pub tenant_id: TenantId,
    /// Resource category
    pub kind: ResourceKind,
    /// Display label
    pub label: String,
    /// Business fields, opaque to the governance layer
    pub attributes: serde_json::Value,
    /// Lifecycle state
    pub state: LifecycleState,
    /// Set on entry to `Archived`, cleared on reactivation
    pub archived_at: Option<DateTime<Utc>>,
    /// Parent record for genuinely dependent child rows (e.g. sub-tasks)
    pub parent_id: Option<ResourceId>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl OwnedRecord {
    pub(crate) fn new(
        id: ResourceId,
        tenant_id: TenantId,
        kind: ResourceKind,
        label: &str,
        attributes: serde_json::Value,
        state: LifecycleState,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            tenant_id,
            kind,
            label: label.to_string(),
            attributes,
            state,
            archived_at: None,
            parent_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
