//! Keystone Tenant - Ownership and Access Control
//!
//! Root of the multi-tenant isolation layer: account holders, capability
//! tokens, and the single code path every operation uses to derive the
//! tenant that governs it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      OWNERSHIP RESOLVER                         │
//! │                                                                 │
//! │   authenticated session ──┐                                     │
//! │                           ├──► governing TenantId ──► scoped    │
//! │   capability token ───────┘                           queries   │
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌───────────────────────┐  │
//! │  │   Tenant     │  │   Token      │  │   Onboarding          │  │
//! │  │   Registry   │  │   Store      │  │   invites / resets    │  │
//! │  └──────────────┘  └──────────────┘  └───────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no code path that skips the resolver: administrative operations
//! (issuing invites, deactivating a tenant) are a distinct, narrow capability
//! set that never reads another tenant's owned-resource content.

#![warn(missing_docs)]
#![allow(dead_code)]

pub mod model;
pub mod onboarding;
pub mod registry;
pub mod resolver;
pub mod token;

pub use model::{Tenant, TenantRole, TenantStatus};
pub use onboarding::OnboardingService;
pub use registry::TenantRegistry;
pub use resolver::{OwnershipResolver, RequestContext, ResolveError};
pub use token::{CapabilityToken, IssuedToken, TokenError, TokenKind, TokenStore};
