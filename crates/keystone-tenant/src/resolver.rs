//! Ownership Resolver
//!
//! The single place every inbound operation derives its governing tenant
//! from. Authenticated sessions resolve to the session-bound tenant;
//! token-bearing requests resolve to the token's target tenant, never to a
//! caller-supplied value.

use crate::registry::TenantRegistry;
use crate::token::{TokenError, TokenStore};
use chrono::{DateTime, Utc};
use keystone_common::{ApiError, TenantId};
use std::sync::Arc;

/// Inbound request context.
#[derive(Debug, Clone)]
pub enum RequestContext {
    /// Session bound to a tenant by prior authentication
    Authenticated {
        /// Tenant attached to the session
        tenant_id: TenantId,
    },
    /// Unauthenticated request bearing a capability token
    TokenBearing {
        /// Raw token from the link's path or query parameter
        raw_token: String,
    },
}

/// Resolves a request context to the tenant identifier that governs the
/// operation.
pub struct OwnershipResolver {
    registry: Arc<TenantRegistry>,
    tokens: Arc<TokenStore>,
}

impl OwnershipResolver {
    /// Build a resolver over the tenant registry and token store.
    pub fn new(registry: Arc<TenantRegistry>, tokens: Arc<TokenStore>) -> Self {
        Self { registry, tokens }
    }

    /// Derive the governing tenant. Resolution alone has no side effects,
    /// with one declared exception: consume-on-validate token kinds
    /// (password reset) are burned here, on successful validation.
    pub fn resolve_owner(
        &self,
        ctx: &RequestContext,
        now: DateTime<Utc>,
    ) -> Result<TenantId, ResolveError> {
        match ctx {
            RequestContext::Authenticated { tenant_id } => {
                let tenant = self
                    .registry
                    .get(tenant_id)
                    .ok_or(ResolveError::Denied)?;
                if !tenant.is_active() {
                    return Err(ResolveError::Denied);
                }
                Ok(tenant.tenant_id)
            }
            RequestContext::TokenBearing { raw_token } => {
                let token = self.tokens.validate(raw_token, now)?;

                if token.kind.consume_on_validate() {
                    self.tokens.consume(raw_token, now)?;
                }

                // The derived tenant must itself still be active.
                let tenant = self
                    .registry
                    .get(&token.tenant_id)
                    .ok_or(ResolveError::Denied)?;
                if !tenant.is_active() {
                    return Err(ResolveError::Denied);
                }

                Ok(token.tenant_id)
            }
        }
    }

    /// Burn the token behind a context after the downstream operation
    /// succeeded. No-op for authenticated contexts, multi-use kinds, and
    /// kinds already consumed at validation.
    pub fn fulfill(&self, ctx: &RequestContext, now: DateTime<Utc>) -> Result<(), ResolveError> {
        if let RequestContext::TokenBearing { raw_token } = ctx {
            let token = self.tokens.validate(raw_token, now)?;
            if token.kind.single_use() && !token.kind.consume_on_validate() {
                self.tokens.consume(raw_token, now)?;
            }
        }
        Ok(())
    }
}

/// Resolution failures. Deliberately uninformative: a caller learns nothing
/// about whether the tenant exists or why the token failed.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Session tenant missing or deactivated
    #[error("access denied")]
    Denied,
    /// Token missing, expired, revoked, or consumed
    #[error("link invalid or expired")]
    InvalidToken(#[from] TokenError),
}

impl ApiError for ResolveError {
    fn code(&self) -> &'static str {
        match self {
            Self::Denied => "access_denied",
            Self::InvalidToken(e) => e.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Tenant, TenantRole};
    use crate::token::TokenKind;

    fn setup() -> (Arc<TenantRegistry>, Arc<TokenStore>, OwnershipResolver) {
        let registry = Arc::new(TenantRegistry::new());
        let tokens = Arc::new(TokenStore::new());
        let resolver = OwnershipResolver::new(Arc::clone(&registry), Arc::clone(&tokens));
        (registry, tokens, resolver)
    }

    fn active_tenant(registry: &TenantRegistry, email: &str) -> TenantId {
        let tenant = Tenant::new(email, "pw", TenantRole::Owner, Utc::now());
        let id = tenant.tenant_id;
        registry.insert(tenant).unwrap();
        id
    }

    #[test]
    fn test_authenticated_resolution() {
        let (registry, _tokens, resolver) = setup();
        let id = active_tenant(&registry, "a@example.com");

        let ctx = RequestContext::Authenticated { tenant_id: id };
        assert_eq!(resolver.resolve_owner(&ctx, Utc::now()).unwrap(), id);
    }

    #[test]
    fn test_deactivated_tenant_denied() {
        let (registry, _tokens, resolver) = setup();
        let id = active_tenant(&registry, "a@example.com");
        registry.deactivate(&id, Utc::now()).unwrap();

        let ctx = RequestContext::Authenticated { tenant_id: id };
        assert!(matches!(
            resolver.resolve_owner(&ctx, Utc::now()),
            Err(ResolveError::Denied)
        ));
    }

    #[test]
    fn test_token_resolves_to_target_tenant() {
        let (registry, tokens, resolver) = setup();
        let owner = active_tenant(&registry, "a@example.com");
        let now = Utc::now();

        let issued = tokens.issue(TokenKind::PublicIntake, owner, Some(owner), now);
        let ctx = RequestContext::TokenBearing {
            raw_token: issued.raw,
        };

        assert_eq!(resolver.resolve_owner(&ctx, now).unwrap(), owner);
        // Multi-use: resolving again still works.
        assert_eq!(resolver.resolve_owner(&ctx, now).unwrap(), owner);
    }

    #[test]
    fn test_password_reset_consumed_on_validate() {
        let (registry, tokens, resolver) = setup();
        let owner = active_tenant(&registry, "a@example.com");
        let now = Utc::now();

        let issued = tokens.issue(TokenKind::PasswordReset, owner, None, now);
        let ctx = RequestContext::TokenBearing {
            raw_token: issued.raw,
        };

        assert!(resolver.resolve_owner(&ctx, now).is_ok());
        // Burned at validation; a second resolution fails.
        assert!(resolver.resolve_owner(&ctx, now).is_err());
    }

    #[test]
    fn test_invite_survives_resolution_until_fulfilled() {
        let (registry, tokens, resolver) = setup();
        let owner = active_tenant(&registry, "a@example.com");
        let now = Utc::now();

        let role = TenantRole::Invited;
        let issued = tokens.issue(TokenKind::Invite { role }, owner, Some(owner), now);
        let ctx = RequestContext::TokenBearing {
            raw_token: issued.raw,
        };

        assert!(resolver.resolve_owner(&ctx, now).is_ok());
        assert!(resolver.resolve_owner(&ctx, now).is_ok());

        resolver.fulfill(&ctx, now).unwrap();
        assert!(resolver.resolve_owner(&ctx, now).is_err());
    }
}
