//! Lifecycle State Manager
//!
//! Non-destructive state transitions stand in for deletion. The transition
//! table is a closed partial order: moving backwards is always an explicit
//! reactivation, never a fall-through.

use crate::model::OwnedRecord;
use chrono::{DateTime, Utc};
use keystone_common::ApiError;
use serde::{Deserialize, Serialize};

/// Closed set of lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Brought in by a bulk import; not yet part of the active workstream
    Imported,
    /// Normal working state
    Active,
    /// Temporarily out of the workstream, trivially reversible
    Inactive,
    /// Retired; row and history retained
    Archived,
}

impl LifecycleState {
    /// The transition table. Everything not listed is illegal.
    pub fn can_transition_to(self, to: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, to),
            (Imported, Active)
                | (Active, Archived)
                | (Archived, Active)
                | (Active, Inactive)
                | (Inactive, Active)
        )
    }

    /// Whether records in this state appear in default workstream views.
    /// Filtering is a read-time concern; the rows stay fully queryable.
    pub fn default_visible(self) -> bool {
        !matches!(self, Self::Imported | Self::Archived)
    }

    /// State name for errors and filters.
    pub fn name(self) -> &'static str {
        match self {
            Self::Imported => "imported",
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Archived => "archived",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Apply a transition to a record in place. Records the archival timestamp
/// on entry to `Archived` and clears it when the record leaves.
pub fn apply(
    record: &mut OwnedRecord,
    to: LifecycleState,
    now: DateTime<Utc>,
) -> Result<(), TransitionError> {
    if !record.state.can_transition_to(to) {
        return Err(TransitionError::Illegal {
            from: record.state,
            to,
        });
    }

    record.state = to;
    record.archived_at = if to == LifecycleState::Archived {
        Some(now)
    } else {
        None
    };
    record.updated_at = now;

    Ok(())
}

/// Structured rejection of an illegal transition.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransitionError {
    /// The pair is not in the transition table
    #[error("cannot move a {from} record to {to}")]
    Illegal {
        /// Current state
        from: LifecycleState,
        /// Requested state
        to: LifecycleState,
    },
}

impl ApiError for TransitionError {
    fn code(&self) -> &'static str {
        "invalid_transition"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceKind;
    use keystone_common::{ResourceId, TenantId};

    fn record(state: LifecycleState) -> OwnedRecord {
        OwnedRecord::new(
            ResourceId::new(1),
            TenantId::new_v4(),
            ResourceKind::Contact,
            "test",
            serde_json::Value::Null,
            state,
        )
    }

    #[test]
    fn test_transition_table() {
        use LifecycleState::*;

        assert!(Imported.can_transition_to(Active));
        assert!(Active.can_transition_to(Archived));
        assert!(Archived.can_transition_to(Active));
        assert!(Active.can_transition_to(Inactive));
        assert!(Inactive.can_transition_to(Active));

        // Not a fall-through: imported records must be activated first.
        assert!(!Imported.can_transition_to(Archived));
        assert!(!Archived.can_transition_to(Inactive));
        assert!(!Inactive.can_transition_to(Archived));
    }

    #[test]
    fn test_archive_sets_timestamp_and_reactivation_clears_it() {
        let mut rec = record(LifecycleState::Active);
        let now = Utc::now();

        apply(&mut rec, LifecycleState::Archived, now).unwrap();
        assert_eq!(rec.archived_at, Some(now));
        assert!(!rec.state.default_visible());

        apply(&mut rec, LifecycleState::Active, Utc::now()).unwrap();
        assert!(rec.archived_at.is_none());
        assert!(rec.state.default_visible());
    }

    #[test]
    fn test_illegal_transition_is_structured_error() {
        let mut rec = record(LifecycleState::Imported);

        let err = apply(&mut rec, LifecycleState::Archived, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            TransitionError::Illegal {
                from: LifecycleState::Imported,
                to: LifecycleState::Archived,
            }
        );
        assert_eq!(err.code(), "invalid_transition");
        // State untouched on rejection.
        assert_eq!(rec.state, LifecycleState::Imported);
    }

    #[test]
    fn test_default_visibility() {
        assert!(LifecycleState::Active.default_visible());
        assert!(LifecycleState::Inactive.default_visible());
        assert!(!LifecycleState::Imported.default_visible());
        assert!(!LifecycleState::Archived.default_visible());
    }
}
