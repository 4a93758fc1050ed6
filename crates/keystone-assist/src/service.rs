//! Gated Drafting Service
//!
//! Orchestrates one gated request end to end: directive version check,
//! resource ownership check, guard evaluation, the timeout-bounded upstream
//! call, and post-success accounting. The request is awaited inline; the
//! caller's result always reflects both the guard's decision and the
//! upstream outcome.

use crate::config::{AssistSettings, Capability, GlobalFlags};
use crate::guard::{DenyReason, UsageGuard};
use crate::usage::UsageLedger;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use keystone_common::{ApiError, ResourceId, TenantId};
use keystone_records::{OwnedRecord, RecordStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Version of the prompt/template logic requests are written against.
/// Requests carrying any other version are rejected outright, so behavior
/// never drifts silently under a stale client.
pub const DIRECTIVE_VERSION: u16 = 2;

/// A drafting request.
#[derive(Debug, Clone)]
pub struct DraftRequest {
    /// Record the draft is about; verified against the resolved tenant
    /// before anything else runs
    pub resource_id: ResourceId,
    /// Directive version the caller was built against
    pub directive_version: u16,
}

/// Output of a successful upstream call.
#[derive(Debug, Clone)]
pub struct DraftOutput {
    /// Generated text
    pub text: String,
    /// Actual cost in the smallest currency unit, reported post-success
    pub cost_cents: u64,
}

/// Upstream failure, opaque to callers. Payload details stay out of the
/// error; they go to logs at the adapter layer if anywhere.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The upstream call failed
    #[error("upstream generation failed")]
    Upstream,
}

/// The expensive external capability, behind a seam so tests can script it.
#[async_trait]
pub trait DraftBackend: Send + Sync {
    /// Generate a draft for the record.
    async fn generate(
        &self,
        record: &OwnedRecord,
        request: &DraftRequest,
    ) -> Result<DraftOutput, BackendError>;
}

/// The gated drafting service.
pub struct AssistService {
    records: Arc<RecordStore>,
    ledger: Arc<UsageLedger>,
    guard: UsageGuard,
    backend: Arc<dyn DraftBackend>,
    directive_version: u16,
    call_timeout: Duration,
    /// Optional pre-flight estimate for the monthly cap check. None means
    /// the cap is checked only against already-recorded spend; see the
    /// settings surface for the trade-off.
    preflight_estimate_cents: Option<u64>,
}

impl AssistService {
    /// Build the service over shared stores and an upstream backend.
    pub fn new(
        records: Arc<RecordStore>,
        ledger: Arc<UsageLedger>,
        backend: Arc<dyn DraftBackend>,
    ) -> Self {
        Self {
            records,
            guard: UsageGuard::new(Arc::clone(&ledger)),
            ledger,
            backend,
            directive_version: DIRECTIVE_VERSION,
            call_timeout: Duration::from_secs(30),
            preflight_estimate_cents: None,
        }
    }

    /// Override the upstream timeout.
    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Enable pre-flight cap checking with a fixed per-call estimate.
    pub fn with_preflight_estimate(mut self, cents: u64) -> Self {
        self.preflight_estimate_cents = Some(cents);
        self
    }

    /// Run one gated request for the resolved tenant.
    pub async fn draft(
        &self,
        flags: &GlobalFlags,
        tenant: TenantId,
        settings: &AssistSettings,
        request: &DraftRequest,
    ) -> Result<DraftOutput, AssistError> {
        self.draft_on(flags, tenant, settings, request, Utc::now().date_naive())
            .await
    }

    /// As [`draft`](Self::draft), with the calendar day injected. The day
    /// drives the ledger's lazy resets.
    pub async fn draft_on(
        &self,
        flags: &GlobalFlags,
        tenant: TenantId,
        settings: &AssistSettings,
        request: &DraftRequest,
        today: NaiveDate,
    ) -> Result<DraftOutput, AssistError> {
        let started = Instant::now();
        let result = self.run(flags, tenant, settings, request, today).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        // One structured line per gated request: tenant, capability,
        // outcome, latency. Never any request or draft text.
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.code(),
        };
        tracing::info!(
            tenant_id = %tenant,
            capability = Capability::AiDrafting.as_str(),
            outcome,
            latency_ms,
            "gated drafting request"
        );

        result
    }

    async fn run(
        &self,
        flags: &GlobalFlags,
        tenant: TenantId,
        settings: &AssistSettings,
        request: &DraftRequest,
        today: NaiveDate,
    ) -> Result<DraftOutput, AssistError> {
        if request.directive_version != self.directive_version {
            return Err(AssistError::InvalidRequest);
        }

        // Ownership check before the guard: a foreign resource id must look
        // exactly like a missing one, and must not touch quota state.
        let record = self
            .records
            .get(tenant, request.resource_id)
            .map_err(|_| AssistError::ResourceNotFound)?;

        let pending = self.preflight_estimate_cents.unwrap_or(0);
        self.guard
            .evaluate(flags, tenant, Capability::AiDrafting, settings, pending, today)?;

        // The expensive call. On timeout or error nothing is recorded; the
        // caller may retry at their discretion and the attempt costs nothing.
        let output = match timeout(self.call_timeout, self.backend.generate(&record, request)).await
        {
            Err(_) => return Err(AssistError::UpstreamTimeout),
            Ok(Err(BackendError::Upstream)) => return Err(AssistError::UpstreamError),
            Ok(Ok(output)) => output,
        };

        self.ledger
            .record_success(tenant, Capability::AiDrafting, output.cost_cents, today);

        Ok(output)
    }
}

/// Everything a gated request can fail with.
#[derive(Debug, thiserror::Error)]
pub enum AssistError {
    /// Denied by the flag/quota gate
    #[error(transparent)]
    Denied(#[from] DenyReason),
    /// Target resource missing under the resolved tenant
    #[error("not found")]
    ResourceNotFound,
    /// Directive version mismatch
    #[error("this request was built against an outdated directive version")]
    InvalidRequest,
    /// Upstream failed; retryable, not billed
    #[error("generation failed, please try again")]
    UpstreamError,
    /// Upstream timed out; retryable, not billed
    #[error("generation timed out, please try again")]
    UpstreamTimeout,
}

impl ApiError for AssistError {
    fn code(&self) -> &'static str {
        match self {
            Self::Denied(reason) => reason.code(),
            Self::ResourceNotFound => "resource_not_found",
            Self::InvalidRequest => "invalid_request",
            Self::UpstreamError => "upstream_error",
            Self::UpstreamTimeout => "upstream_timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_records::ResourceKind;
    use serde_json::json;

    enum Mode {
        Succeed(u64),
        Fail,
        Hang,
    }

    struct ScriptedBackend {
        mode: Mode,
    }

    #[async_trait]
    impl DraftBackend for ScriptedBackend {
        async fn generate(
            &self,
            _record: &OwnedRecord,
            _request: &DraftRequest,
        ) -> Result<DraftOutput, BackendError> {
            match self.mode {
                Mode::Succeed(cost_cents) => Ok(DraftOutput {
                    text: "Dear Jordan, ...".into(),
                    cost_cents,
                }),
                Mode::Fail => Err(BackendError::Upstream),
                Mode::Hang => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Err(BackendError::Upstream)
                }
            }
        }
    }

    struct Fixture {
        records: Arc<RecordStore>,
        ledger: Arc<UsageLedger>,
        service: AssistService,
        tenant: TenantId,
        resource: ResourceId,
    }

    fn fixture(mode: Mode) -> Fixture {
        let records = Arc::new(RecordStore::new());
        let ledger = Arc::new(UsageLedger::new());
        let tenant = TenantId::new_v4();
        let record = records.create(tenant, ResourceKind::Contact, "Jordan", json!({}));

        let service = AssistService::new(
            Arc::clone(&records),
            Arc::clone(&ledger),
            Arc::new(ScriptedBackend { mode }),
        )
        .with_timeout(Duration::from_millis(50));

        Fixture {
            records,
            ledger,
            service,
            tenant,
            resource: record.id,
        }
    }

    fn on() -> GlobalFlags {
        GlobalFlags {
            assist_enabled: true,
        }
    }

    fn opted_in(daily_limit: u32) -> AssistSettings {
        AssistSettings {
            enabled: true,
            daily_limit,
            monthly_cap_cents: None,
        }
    }

    fn request(resource_id: ResourceId) -> DraftRequest {
        DraftRequest {
            resource_id,
            directive_version: DIRECTIVE_VERSION,
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_fourth_call_denied_and_counter_stays_at_three() {
        let f = fixture(Mode::Succeed(7));
        let settings = opted_in(3);
        let today = day(2024, 3, 14);

        for _ in 0..3 {
            f.service
                .draft_on(&on(), f.tenant, &settings, &request(f.resource), today)
                .await
                .unwrap();
        }

        let err = f
            .service
            .draft_on(&on(), f.tenant, &settings, &request(f.resource), today)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "daily_limit_reached");

        let snap = f.ledger.snapshot(f.tenant, Capability::AiDrafting, today);
        assert_eq!(snap.daily_count, 3);
        assert_eq!(snap.monthly_spend_cents, 21);
    }

    #[tokio::test]
    async fn test_upstream_failure_is_never_billed() {
        let f = fixture(Mode::Fail);
        let today = day(2024, 3, 14);

        let err = f
            .service
            .draft_on(&on(), f.tenant, &opted_in(10), &request(f.resource), today)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "upstream_error");

        let snap = f.ledger.snapshot(f.tenant, Capability::AiDrafting, today);
        assert_eq!(snap.daily_count, 0);
        assert_eq!(snap.monthly_spend_cents, 0);
    }

    #[tokio::test]
    async fn test_upstream_timeout_is_never_billed() {
        let f = fixture(Mode::Hang);
        let today = day(2024, 3, 14);

        let err = f
            .service
            .draft_on(&on(), f.tenant, &opted_in(10), &request(f.resource), today)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "upstream_timeout");

        let snap = f.ledger.snapshot(f.tenant, Capability::AiDrafting, today);
        assert_eq!(snap.daily_count, 0);
    }

    #[tokio::test]
    async fn test_global_flag_wins_over_tenant_opt_in() {
        let f = fixture(Mode::Succeed(7));
        let flags = GlobalFlags {
            assist_enabled: false,
        };

        let err = f
            .service
            .draft_on(
                &flags,
                f.tenant,
                &opted_in(10),
                &request(f.resource),
                day(2024, 3, 14),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "capability_globally_disabled");
    }

    #[tokio::test]
    async fn test_directive_version_mismatch_rejected_first() {
        let f = fixture(Mode::Succeed(7));
        let mut req = request(f.resource);
        req.directive_version = DIRECTIVE_VERSION + 1;

        let err = f
            .service
            .draft_on(&on(), f.tenant, &opted_in(10), &req, day(2024, 3, 14))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_request");
    }

    #[tokio::test]
    async fn test_foreign_resource_looks_missing_and_costs_nothing() {
        let f = fixture(Mode::Succeed(7));
        let stranger = TenantId::new_v4();
        let foreign = f
            .records
            .create(stranger, ResourceKind::Contact, "Sam", json!({}));
        let today = day(2024, 3, 14);

        let err = f
            .service
            .draft_on(&on(), f.tenant, &opted_in(10), &request(foreign.id), today)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "resource_not_found");

        let snap = f.ledger.snapshot(f.tenant, Capability::AiDrafting, today);
        assert_eq!(snap.daily_count, 0);
    }

    #[tokio::test]
    async fn test_new_day_resets_before_limit_check() {
        let f = fixture(Mode::Succeed(7));
        let settings = opted_in(1);

        f.service
            .draft_on(&on(), f.tenant, &settings, &request(f.resource), day(2024, 3, 14))
            .await
            .unwrap();
        assert!(f
            .service
            .draft_on(&on(), f.tenant, &settings, &request(f.resource), day(2024, 3, 14))
            .await
            .is_err());

        // No scheduled job: the first request of the next day resets in place.
        f.service
            .draft_on(&on(), f.tenant, &settings, &request(f.resource), day(2024, 3, 15))
            .await
            .unwrap();
    }
}
