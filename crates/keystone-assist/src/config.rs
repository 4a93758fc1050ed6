//! Capability Flags and Tenant Settings

use serde::{Deserialize, Serialize};

/// Gated capabilities. One today; the guard and ledger key on this so new
/// capabilities get independent accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// AI-assisted text drafting
    AiDrafting,
}

impl Capability {
    /// Capability name for logs and error bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AiDrafting => "ai_drafting",
        }
    }
}

/// Process-wide switches. Injected per request rather than read from a
/// hidden global, so tests can flip them freely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalFlags {
    /// Master switch for the drafting capability
    pub assist_enabled: bool,
}

impl Default for GlobalFlags {
    fn default() -> Self {
        // Expensive capabilities ship dark.
        Self {
            assist_enabled: false,
        }
    }
}

/// Tenant-visible assist settings: the opt-in toggle and the quota knobs.
/// Usage counters are exposed read-only through [`crate::UsageLedger::snapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistSettings {
    /// Per-tenant opt-in
    pub enabled: bool,
    /// Requests allowed per calendar day
    pub daily_limit: u32,
    /// Optional monthly spending cap in the smallest currency unit
    pub monthly_cap_cents: Option<u64>,
}

impl Default for AssistSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            daily_limit: 25,
            monthly_cap_cents: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_disabled() {
        assert!(!GlobalFlags::default().assist_enabled);
        assert!(!AssistSettings::default().enabled);
    }
}
