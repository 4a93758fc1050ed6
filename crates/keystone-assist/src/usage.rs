//! Usage Ledger with Lazy Resets
//!
//! Per (tenant, capability) counters: a daily request count and a monthly
//! spend accumulator. Resets are boundary-crossing detections made at the
//! moment of use, not a scheduled job, and every read-modify-write happens
//! inside one per-account critical section so concurrent requests from the
//! same tenant cannot lose updates.

use crate::config::{AssistSettings, Capability};
use crate::guard::DenyReason;
use chrono::{Datelike, NaiveDate};
use dashmap::DashMap;
use keystone_common::TenantId;
use serde::{Deserialize, Serialize};

/// Counter state for one (tenant, capability) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageAccount {
    /// Requests recorded for the day `daily_reset_on` covers
    pub daily_count: u32,
    /// Day the daily counter currently covers
    pub daily_reset_on: NaiveDate,
    /// Spend recorded for the month `monthly_reset_on` covers
    pub monthly_spend_cents: u64,
    /// First day of the month the accumulator currently covers
    pub monthly_reset_on: NaiveDate,
}

impl UsageAccount {
    fn new(today: NaiveDate) -> Self {
        Self {
            daily_count: 0,
            daily_reset_on: today,
            monthly_spend_cents: 0,
            monthly_reset_on: first_of_month(today),
        }
    }

    /// Lazy reset: roll the counters over any day/month boundary crossed
    /// since the last guarded request. Counters only move forward between
    /// resets.
    fn roll_over(&mut self, today: NaiveDate) {
        if today > self.daily_reset_on {
            self.daily_count = 0;
            self.daily_reset_on = today;
        }
        let month_start = first_of_month(today);
        if month_start > self.monthly_reset_on {
            self.monthly_spend_cents = 0;
            self.monthly_reset_on = month_start;
        }
    }
}

fn first_of_month(day: NaiveDate) -> NaiveDate {
    // Day 1 exists in every month; the fallback is unreachable.
    day.with_day(1).unwrap_or(day)
}

/// Read-only counter view for the tenant-facing settings surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// Requests so far today
    pub daily_count: u32,
    /// Day the count covers
    pub daily_reset_on: NaiveDate,
    /// Spend so far this month, smallest currency unit
    pub monthly_spend_cents: u64,
    /// First day of the covered month
    pub monthly_reset_on: NaiveDate,
}

/// The usage ledger. Entry-level locking on the account map provides the
/// single-transaction semantics the reset and increment writes need.
pub struct UsageLedger {
    accounts: DashMap<(TenantId, Capability), UsageAccount>,
}

impl UsageLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
        }
    }

    /// Quota evaluation. Rolls the account over any crossed boundary first
    /// (the reset write precedes the limit check), then evaluates the
    /// limits. Never increments.
    ///
    /// `pending_cost_cents` is an optional pre-flight estimate; zero means
    /// the cap is checked only against spend already recorded.
    pub fn check(
        &self,
        tenant: TenantId,
        capability: Capability,
        settings: &AssistSettings,
        pending_cost_cents: u64,
        today: NaiveDate,
    ) -> Result<(), DenyReason> {
        let mut entry = self
            .accounts
            .entry((tenant, capability))
            .or_insert_with(|| UsageAccount::new(today));
        let account = entry.value_mut();
        account.roll_over(today);

        if account.daily_count >= settings.daily_limit {
            return Err(DenyReason::DailyLimitReached);
        }
        if let Some(cap) = settings.monthly_cap_cents {
            if account.monthly_spend_cents >= cap {
                return Err(DenyReason::MonthlyCapReached);
            }
            if pending_cost_cents > 0
                && account.monthly_spend_cents.saturating_add(pending_cost_cents) > cap
            {
                return Err(DenyReason::MonthlyCapReached);
            }
        }

        Ok(())
    }

    /// Post-success accounting: one more request today, `cost_cents` more
    /// this month. The roll-over and both increments share a single
    /// critical section.
    pub fn record_success(
        &self,
        tenant: TenantId,
        capability: Capability,
        cost_cents: u64,
        today: NaiveDate,
    ) {
        let mut entry = self
            .accounts
            .entry((tenant, capability))
            .or_insert_with(|| UsageAccount::new(today));
        let account = entry.value_mut();
        account.roll_over(today);

        account.daily_count += 1;
        account.monthly_spend_cents = account.monthly_spend_cents.saturating_add(cost_cents);
    }

    /// Read-only counters for the settings surface. Applies the same lazy
    /// roll-over so the numbers shown match what the guard would use.
    pub fn snapshot(
        &self,
        tenant: TenantId,
        capability: Capability,
        today: NaiveDate,
    ) -> UsageSnapshot {
        let mut entry = self
            .accounts
            .entry((tenant, capability))
            .or_insert_with(|| UsageAccount::new(today));
        let account = entry.value_mut();
        account.roll_over(today);

        UsageSnapshot {
            daily_count: account.daily_count,
            daily_reset_on: account.daily_reset_on,
            monthly_spend_cents: account.monthly_spend_cents,
            monthly_reset_on: account.monthly_reset_on,
        }
    }
}

impl Default for UsageLedger {
    fn default() -> Self {
        Self::new()
    }
}
