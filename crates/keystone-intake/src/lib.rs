//! Keystone Intake - Public Lead Capture
//!
//! The one write path open to the anonymous internet: a visitor follows a
//! public intake link and submits a lead form. The capability token behind
//! the link is the sole authority — ownership of the created record is
//! derived from it, never from anything the visitor's client claims.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │ raw token ──► resolver (derive tenant) ──► intake config check │
//! │                                                   │            │
//! │        contact record created under derived tenant◄┘           │
//! └────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use keystone_common::{ApiError, ResourceId, TenantId};
use keystone_records::{OwnedRecord, RecordStore, ResourceKind, StoreError};
use keystone_tenant::resolver::{OwnershipResolver, RequestContext, ResolveError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// A public intake form submission, as deserialized from the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeSubmission {
    /// Intake form the link points at
    pub intake_config_id: ResourceId,
    /// Visitor's name
    pub name: String,
    /// Visitor's email
    pub email: String,
    /// Free-form message
    pub message: String,
    /// Tenant the client claims to be submitting to. Present because old
    /// clients send it; the server ignores it unconditionally.
    #[serde(default)]
    pub claimed_tenant_id: Option<TenantId>,
}

/// Handles submissions arriving through public intake links.
pub struct PublicIntakeService {
    resolver: Arc<OwnershipResolver>,
    records: Arc<RecordStore>,
}

impl PublicIntakeService {
    /// Build the service over the shared resolver and record store.
    pub fn new(resolver: Arc<OwnershipResolver>, records: Arc<RecordStore>) -> Self {
        Self { resolver, records }
    }

    /// Accept one submission. The governing tenant comes from the token;
    /// the referenced intake form must be live under that same tenant.
    /// Intake tokens are multi-use, so nothing is burned here.
    pub fn submit(
        &self,
        raw_token: &str,
        submission: &IntakeSubmission,
        now: DateTime<Utc>,
    ) -> Result<OwnedRecord, IntakeError> {
        let ctx = RequestContext::TokenBearing {
            raw_token: raw_token.to_string(),
        };
        let tenant = self.resolver.resolve_owner(&ctx, now)?;

        if let Some(claimed) = submission.claimed_tenant_id {
            if claimed != tenant {
                tracing::warn!(
                    tenant_id = %tenant,
                    "submission claimed a different tenant; claim ignored"
                );
            }
        }

        // The form itself must resolve under the derived tenant and still be
        // in the working set. A retired or foreign form looks missing.
        let config = self.records.get(tenant, submission.intake_config_id)?;
        if config.kind != ResourceKind::IntakeConfig || !config.state.default_visible() {
            return Err(IntakeError::NotFound);
        }

        let lead = self.records.create(
            tenant,
            ResourceKind::Contact,
            &submission.name,
            json!({
                "email": submission.email,
                "message": submission.message,
                "source": "public_intake",
                "intake_config_id": submission.intake_config_id,
            }),
        );

        tracing::info!(
            tenant_id = %tenant,
            lead_id = %lead.id,
            "public intake submission accepted"
        );

        Ok(lead)
    }
}

/// Submission failures. The link error is generic and the form error is the
/// scoped store's `NotFound`; a visitor probing with stolen ids learns
/// nothing either way.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    /// Token missing, expired, or revoked
    #[error("link invalid or expired")]
    InvalidLink(#[from] ResolveError),
    /// Intake form missing, foreign, or retired
    #[error("not found")]
    NotFound,
}

impl From<StoreError> for IntakeError {
    fn from(_: StoreError) -> Self {
        Self::NotFound
    }
}

impl ApiError for IntakeError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidLink(_) => "invalid_token",
            Self::NotFound => "resource_not_found",
        }
    }
}
