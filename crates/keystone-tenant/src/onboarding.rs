//! Invite Acceptance and Credential Recovery
//!
//! The only flows that create tenants or touch credentials. Both run on
//! capability tokens; neither reads another tenant's owned-resource content.

use crate::model::{Tenant, TenantRole};
use crate::registry::{RegistryError, TenantRegistry};
use crate::token::{IssuedToken, TokenError, TokenKind, TokenStore};
use chrono::{DateTime, Utc};
use keystone_common::{ApiError, TenantId};
use std::sync::Arc;

/// Onboarding flows over the registry and token store.
pub struct OnboardingService {
    registry: Arc<TenantRegistry>,
    tokens: Arc<TokenStore>,
}

impl OnboardingService {
    /// Build the service.
    pub fn new(registry: Arc<TenantRegistry>, tokens: Arc<TokenStore>) -> Self {
        Self { registry, tokens }
    }

    /// Mint an invite. Only an active owner may issue one; the assigned role
    /// travels inside the token, never in the acceptance request.
    pub fn invite(
        &self,
        issued_by: TenantId,
        role: TenantRole,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, OnboardError> {
        let issuer = self
            .registry
            .get(&issued_by)
            .ok_or(OnboardError::NotAuthorized)?;
        if !issuer.is_active() || issuer.role != TenantRole::Owner {
            return Err(OnboardError::NotAuthorized);
        }

        Ok(self
            .tokens
            .issue(TokenKind::Invite { role }, issued_by, Some(issued_by), now))
    }

    /// Accept an invite, creating the tenant. The token is consumed only
    /// after the tenant row exists; if two acceptances race, the consumption
    /// loser's row is rolled back so it leaves no side effects.
    pub fn accept_invite(
        &self,
        raw_token: &str,
        email: &str,
        credential: &str,
        now: DateTime<Utc>,
    ) -> Result<Tenant, OnboardError> {
        let token = self.tokens.validate(raw_token, now)?;
        let TokenKind::Invite { role } = token.kind else {
            return Err(OnboardError::Token(TokenError::Invalid));
        };

        let tenant = Tenant::new(email, credential, role, now);
        let tenant_id = tenant.tenant_id;
        self.registry.insert(tenant.clone())?;

        if let Err(e) = self.tokens.consume(raw_token, now) {
            self.registry.discard(&tenant_id);
            return Err(OnboardError::Token(e));
        }

        tracing::info!(tenant_id = %tenant_id, "tenant created via invite");

        Ok(tenant)
    }

    /// Start credential recovery. Returns None when the email is unknown or
    /// the tenant is deactivated; callers show the same message either way.
    pub fn begin_password_reset(&self, email: &str, now: DateTime<Utc>) -> Option<IssuedToken> {
        let tenant = self.registry.find_by_email(email)?;
        if !tenant.is_active() {
            return None;
        }
        Some(
            self.tokens
                .issue(TokenKind::PasswordReset, tenant.tenant_id, None, now),
        )
    }

    /// Finish credential recovery. Reset tokens are strictly single use:
    /// consumption happens first, so an abandoned credential write still
    /// burns the link.
    pub fn complete_password_reset(
        &self,
        raw_token: &str,
        new_credential: &str,
        now: DateTime<Utc>,
    ) -> Result<(), OnboardError> {
        let token = self.tokens.consume(raw_token, now)?;
        if token.kind != TokenKind::PasswordReset {
            return Err(OnboardError::Token(TokenError::Invalid));
        }

        self.registry.set_credential(&token.tenant_id, new_credential)?;

        tracing::info!(tenant_id = %token.tenant_id, "credential reset completed");

        Ok(())
    }

    /// Deactivate a tenant. Owner-only administrative capability; the target
    /// row and everything it owns stay in place.
    pub fn deactivate_tenant(
        &self,
        acting: TenantId,
        target: TenantId,
        now: DateTime<Utc>,
    ) -> Result<(), OnboardError> {
        let actor = self
            .registry
            .get(&acting)
            .ok_or(OnboardError::NotAuthorized)?;
        if !actor.is_active() || actor.role != TenantRole::Owner {
            return Err(OnboardError::NotAuthorized);
        }

        self.registry.deactivate(&target, now)?;
        Ok(())
    }
}

/// Onboarding errors.
#[derive(Debug, thiserror::Error)]
pub enum OnboardError {
    /// Token missing, wrong kind, expired, or consumed
    #[error("link invalid or expired")]
    Token(#[from] TokenError),
    /// Registry rejected the write
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Acting tenant lacks the capability
    #[error("access denied")]
    NotAuthorized,
}

impl ApiError for OnboardError {
    fn code(&self) -> &'static str {
        match self {
            Self::Token(e) => e.code(),
            Self::Registry(e) => e.code(),
            Self::NotAuthorized => "access_denied",
        }
    }
}
