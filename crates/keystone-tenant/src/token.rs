//! Capability Token Issuer/Validator
//!
//! Opaque, hashed, time-boxed credentials that grant one specific
//! unauthenticated action attributable to a derived tenant. Only the SHA-256
//! of a token is ever stored or logged; the raw value exists once, in the
//! outbound link.

use crate::model::TenantRole;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use keystone_common::{ApiError, TenantId};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Token identifier, safe to log.
pub type TokenId = Uuid;

/// What a token authorizes, and the consumption discipline for its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    /// Joins a new tenant to the account with the assigned role.
    Invite {
        /// Role the accepting tenant is created with
        role: TenantRole,
    },
    /// Credential recovery. Strictly single use: burned on successful
    /// validation regardless of downstream outcome, to keep the reset link
    /// rate-limit-safe.
    PasswordReset,
    /// Public intake link. Multi-use until expiry or revocation.
    PublicIntake,
}

impl TokenKind {
    /// Single-use kinds set `used_at` exactly once.
    pub fn single_use(&self) -> bool {
        !matches!(self, Self::PublicIntake)
    }

    /// Kinds consumed at validation time rather than after downstream
    /// success.
    pub fn consume_on_validate(&self) -> bool {
        matches!(self, Self::PasswordReset)
    }

    /// Time-box applied at issuance.
    pub fn default_ttl(&self) -> Duration {
        match self {
            Self::Invite { .. } => Duration::days(7),
            Self::PasswordReset => Duration::hours(1),
            Self::PublicIntake => Duration::days(90),
        }
    }

    /// Kind name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Invite { .. } => "invite",
            Self::PasswordReset => "password_reset",
            Self::PublicIntake => "public_intake",
        }
    }
}

/// Stored token row. Carries the hash, never the raw value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityToken {
    /// Loggable identifier
    pub token_id: TokenId,
    /// Kind and consumption discipline
    pub kind: TokenKind,
    /// Tenant every operation performed with this token is attributed to
    pub tenant_id: TenantId,
    /// Issuing tenant, when issued from an authenticated session
    pub issued_by: Option<TenantId>,
    /// Hard expiry
    pub expires_at: DateTime<Utc>,
    /// Consumption timestamp; set at most once
    pub used_at: Option<DateTime<Utc>>,
    /// Revocation timestamp
    pub revoked_at: Option<DateTime<Utc>>,
    /// Issuance timestamp
    pub created_at: DateTime<Utc>,
}

impl CapabilityToken {
    /// A token is usable only if not expired, not revoked, and (for
    /// single-use kinds) not yet consumed.
    pub fn usable_at(&self, now: DateTime<Utc>) -> bool {
        if self.revoked_at.is_some() || now >= self.expires_at {
            return false;
        }
        if self.kind.single_use() && self.used_at.is_some() {
            return false;
        }
        true
    }
}

/// Raw token handed to the outbound link. Dropped after the link is built.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Loggable identifier of the stored row
    pub token_id: TokenId,
    /// High-entropy raw value; never stored, never logged
    pub raw: String,
}

/// Token store keyed by hash. Per-entry locking gives the conditional-update
/// semantics a datastore would: exactly one consumer wins a redemption race.
pub struct TokenStore {
    by_hash: DashMap<String, CapabilityToken>,
}

impl TokenStore {
    /// Empty store.
    pub fn new() -> Self {
        Self {
            by_hash: DashMap::new(),
        }
    }

    /// Issue a new token targeting `tenant_id`. The raw value is returned
    /// exactly once.
    pub fn issue(
        &self,
        kind: TokenKind,
        tenant_id: TenantId,
        issued_by: Option<TenantId>,
        now: DateTime<Utc>,
    ) -> IssuedToken {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let raw = hex::encode(bytes);

        let token = CapabilityToken {
            token_id: Uuid::new_v4(),
            kind,
            tenant_id,
            issued_by,
            expires_at: now + kind.default_ttl(),
            used_at: None,
            revoked_at: None,
            created_at: now,
        };

        let token_id = token.token_id;
        self.by_hash.insert(hash_token(&raw), token);

        tracing::debug!(token_id = %token_id, kind = kind.name(), "issued capability token");

        IssuedToken { token_id, raw }
    }

    /// Validate a raw token without consuming it. Missing, expired, revoked
    /// and already-consumed all collapse into the same generic error.
    pub fn validate(&self, raw: &str, now: DateTime<Utc>) -> Result<CapabilityToken, TokenError> {
        let entry = self
            .by_hash
            .get(&hash_token(raw))
            .ok_or(TokenError::Invalid)?;

        if !entry.value().usable_at(now) {
            return Err(TokenError::Invalid);
        }

        Ok(entry.value().clone())
    }

    /// Consume a single-use token. The conditional write on `used_at` makes
    /// exactly one concurrent redeemer win; losers get `AlreadyUsed`.
    pub fn consume(&self, raw: &str, now: DateTime<Utc>) -> Result<CapabilityToken, TokenError> {
        let mut entry = self
            .by_hash
            .get_mut(&hash_token(raw))
            .ok_or(TokenError::Invalid)?;
        let token = entry.value_mut();

        if token.revoked_at.is_some() || now >= token.expires_at {
            return Err(TokenError::Invalid);
        }
        if token.used_at.is_some() {
            return Err(TokenError::AlreadyUsed);
        }

        token.used_at = Some(now);
        tracing::debug!(token_id = %token.token_id, kind = token.kind.name(), "consumed capability token");

        Ok(token.clone())
    }

    /// Revoke a token by its loggable id. Returns false if unknown.
    pub fn revoke(&self, token_id: &TokenId, now: DateTime<Utc>) -> bool {
        for mut entry in self.by_hash.iter_mut() {
            let token = entry.value_mut();
            if token.token_id == *token_id {
                token.revoked_at = Some(now);
                return true;
            }
        }
        false
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

fn hash_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// Token errors. Both render the same generic message so callers cannot
/// probe token state; the codes differ so a redemption-race loser can be
/// told apart in logs.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Missing, expired, revoked, or already consumed
    #[error("link invalid or expired")]
    Invalid,
    /// Lost a redemption race on a single-use token
    #[error("link invalid or expired")]
    AlreadyUsed,
}

impl ApiError for TokenError {
    fn code(&self) -> &'static str {
        match self {
            Self::Invalid => "invalid_token",
            Self::AlreadyUsed => "token_already_used",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_issue_and_validate() {
        let store = TokenStore::new();
        let tenant = TenantId::new_v4();
        let now = Utc::now();

        let issued = store.issue(TokenKind::PublicIntake, tenant, None, now);

        let token = store.validate(&issued.raw, now).unwrap();
        assert_eq!(token.tenant_id, tenant);
        assert_eq!(token.token_id, issued.token_id);
    }

    #[test]
    fn test_unknown_token_rejected() {
        let store = TokenStore::new();
        assert!(matches!(
            store.validate("deadbeef", Utc::now()),
            Err(TokenError::Invalid)
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let store = TokenStore::new();
        let now = Utc::now();
        let issued = store.issue(TokenKind::PasswordReset, TenantId::new_v4(), None, now);

        let later = now + Duration::hours(2);
        assert!(matches!(
            store.validate(&issued.raw, later),
            Err(TokenError::Invalid)
        ));
    }

    #[test]
    fn test_revoked_token_rejected() {
        let store = TokenStore::new();
        let now = Utc::now();
        let issued = store.issue(TokenKind::PublicIntake, TenantId::new_v4(), None, now);

        assert!(store.revoke(&issued.token_id, now));
        assert!(store.validate(&issued.raw, now).is_err());
    }

    #[test]
    fn test_single_use_consumption() {
        let store = TokenStore::new();
        let now = Utc::now();
        let role = TenantRole::Invited;
        let issued = store.issue(TokenKind::Invite { role }, TenantId::new_v4(), None, now);

        store.consume(&issued.raw, now).unwrap();

        // Consumed token fails both validation and re-consumption.
        assert!(store.validate(&issued.raw, now).is_err());
        assert!(matches!(
            store.consume(&issued.raw, now),
            Err(TokenError::AlreadyUsed)
        ));
    }

    #[test]
    fn test_multi_use_intake_token() {
        let store = TokenStore::new();
        let now = Utc::now();
        let issued = store.issue(TokenKind::PublicIntake, TenantId::new_v4(), None, now);

        store.validate(&issued.raw, now).unwrap();
        store.validate(&issued.raw, now).unwrap();
    }

    #[test]
    fn test_concurrent_consumption_has_one_winner() {
        let store = Arc::new(TokenStore::new());
        let now = Utc::now();
        let role = TenantRole::Invited;
        let issued = store.issue(TokenKind::Invite { role }, TenantId::new_v4(), None, now);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let raw = issued.raw.clone();
            handles.push(std::thread::spawn(move || store.consume(&raw, now).is_ok()));
        }

        let wins: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(wins, 1);
    }
}
