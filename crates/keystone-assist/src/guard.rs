//! Usage Guard
//!
//! Layered gate evaluated before every expensive call. Flag checks come
//! first and short-circuit: a globally disabled capability never reaches the
//! quota state at all.

use crate::config::{AssistSettings, Capability, GlobalFlags};
use crate::usage::UsageLedger;
use chrono::NaiveDate;
use keystone_common::{ApiError, TenantId};
use std::sync::Arc;

/// Why a gated request was denied. Quota and flag denials are not a
/// security boundary, so the reason is specific; clarity helps the
/// legitimate tenant adjust settings or wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DenyReason {
    /// Master switch is off
    #[error("this capability is currently switched off")]
    CapabilityGloballyDisabled,
    /// Tenant has not opted in
    #[error("enable this capability in your settings first")]
    CapabilityNotEnabled,
    /// Daily request limit reached
    #[error("daily request limit reached")]
    DailyLimitReached,
    /// Monthly spending cap reached
    #[error("monthly spending cap reached")]
    MonthlyCapReached,
}

impl ApiError for DenyReason {
    fn code(&self) -> &'static str {
        match self {
            Self::CapabilityGloballyDisabled => "capability_globally_disabled",
            Self::CapabilityNotEnabled => "capability_not_enabled",
            Self::DailyLimitReached => "daily_limit_reached",
            Self::MonthlyCapReached => "monthly_cap_reached",
        }
    }
}

/// The guard: flags first, then the ledger's reset-and-check.
pub struct UsageGuard {
    ledger: Arc<UsageLedger>,
}

impl UsageGuard {
    /// Build a guard over the shared ledger.
    pub fn new(ledger: Arc<UsageLedger>) -> Self {
        Self { ledger }
    }

    /// Evaluate the full gate. Permitting does not increment anything;
    /// accounting happens only after the expensive call succeeds.
    pub fn evaluate(
        &self,
        flags: &GlobalFlags,
        tenant: TenantId,
        capability: Capability,
        settings: &AssistSettings,
        pending_cost_cents: u64,
        today: NaiveDate,
    ) -> Result<(), DenyReason> {
        if !flags.assist_enabled {
            return Err(DenyReason::CapabilityGloballyDisabled);
        }
        if !settings.enabled {
            return Err(DenyReason::CapabilityNotEnabled);
        }

        self.ledger
            .check(tenant, capability, settings, pending_cost_cents, today)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 14).unwrap()
    }

    #[test]
    fn test_global_flag_short_circuits_quota_checks() {
        let ledger = Arc::new(UsageLedger::new());
        let guard = UsageGuard::new(Arc::clone(&ledger));
        let tenant = TenantId::new_v4();

        let flags = GlobalFlags {
            assist_enabled: false,
        };
        let settings = AssistSettings {
            enabled: true,
            daily_limit: 10,
            monthly_cap_cents: None,
        };

        let result = guard.evaluate(
            &flags,
            tenant,
            Capability::AiDrafting,
            &settings,
            0,
            today(),
        );
        assert_eq!(result, Err(DenyReason::CapabilityGloballyDisabled));
    }

    #[test]
    fn test_opt_in_required() {
        let guard = UsageGuard::new(Arc::new(UsageLedger::new()));
        let tenant = TenantId::new_v4();

        let flags = GlobalFlags {
            assist_enabled: true,
        };
        let settings = AssistSettings::default();

        let result = guard.evaluate(
            &flags,
            tenant,
            Capability::AiDrafting,
            &settings,
            0,
            today(),
        );
        assert_eq!(result, Err(DenyReason::CapabilityNotEnabled));
    }

    #[test]
    fn test_deny_codes_are_stable() {
        assert_eq!(
            DenyReason::CapabilityGloballyDisabled.code(),
            "capability_globally_disabled"
        );
        assert_eq!(
            DenyReason::CapabilityNotEnabled.code(),
            "capability_not_enabled"
        );
        assert_eq!(DenyReason::DailyLimitReached.code(), "daily_limit_reached");
        assert_eq!(DenyReason::MonthlyCapReached.code(), "monthly_cap_reached");
    }
}
