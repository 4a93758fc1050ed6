//! Keystone Assist - Gated AI Drafting
//!
//! Governance for the one expensive capability in the system: AI-assisted
//! text generation. A request passes a layered gate before the upstream call
//! and is billed only after it succeeds.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  request ──► directive version ──► resource ownership ──► guard  │
//! │                                                            │     │
//! │     global flag ► tenant opt-in ► lazy resets ► limits ◄───┘     │
//! │                                                            │     │
//! │                upstream call (timeout-bounded) ◄───────────┘     │
//! │                        │                                         │
//! │        success ──► atomic accounting (daily +1, monthly +cost)   │
//! │        failure ──► nothing moves; caller may retry               │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The single most important invariant of this crate: failed or rejected
//! attempts are never billable.

#![warn(missing_docs)]
#![allow(dead_code)]

pub mod config;
pub mod guard;
pub mod service;
pub mod usage;

pub use config::{AssistSettings, Capability, GlobalFlags};
pub use guard::{DenyReason, UsageGuard};
pub use service::{AssistError, AssistService, BackendError, DraftBackend, DraftOutput, DraftRequest};
pub use usage::{UsageAccount, UsageLedger, UsageSnapshot};
