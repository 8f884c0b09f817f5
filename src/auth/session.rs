//! Session tokens: issuance, refresh rotation, and revocation.
//!
//! Raw tokens are 32 random bytes, URL-safe base64. The session store only
//! ever sees the SHA-256 hash; the raw value is returned to the caller once
//! and never persisted. Platform tokens live 24h, tenant tokens 8h — the
//! asymmetry is policy: platform sessions are administrative sessions
//! behind additional network-level controls, tenant sessions are
//! shorter-lived operational sessions.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::auth::principal::PrincipalClass;
use crate::error::{AuthError, AuthResult};
use crate::store::{Clock, SessionStore};

/// A minted session token. `raw` is handed to the caller exactly once.
#[derive(Clone, Debug)]
pub struct SessionToken {
    pub raw: String,
    pub principal_id: Uuid,
    pub principal_class: PrincipalClass,
    pub abilities: BTreeSet<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Server-side session state, keyed by token hash in the session store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRecord {
    pub principal_id: Uuid,
    pub principal_class: PrincipalClass,
    pub abilities: BTreeSet<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Create a new raw session token.
pub(crate) fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a session token so raw values never touch the store.
pub(crate) fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Expiry instant for a TTL, saturating at the calendar maximum instead
/// of overflowing on degenerate TTLs.
fn saturating_expiry(issued_at: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    i64::try_from(ttl.as_secs())
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|delta| issued_at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Mints, refreshes, and revokes session tokens with class-specific
/// lifetimes.
pub struct TokenIssuer<S: SessionStore> {
    sessions: S,
    clock: Arc<dyn Clock>,
    platform_ttl: Duration,
    tenant_ttl: Duration,
}

impl<S: SessionStore> TokenIssuer<S> {
    #[must_use]
    pub fn new(sessions: S, clock: Arc<dyn Clock>, platform_ttl: Duration, tenant_ttl: Duration) -> Self {
        Self {
            sessions,
            clock,
            platform_ttl,
            tenant_ttl,
        }
    }

    fn ttl_for(&self, class: PrincipalClass) -> Duration {
        match class {
            PrincipalClass::Platform => self.platform_ttl,
            PrincipalClass::Tenant => self.tenant_ttl,
        }
    }

    /// Mint a new token carrying the given capability set.
    pub async fn issue(
        &self,
        principal_id: Uuid,
        class: PrincipalClass,
        abilities: BTreeSet<String>,
    ) -> AuthResult<SessionToken> {
        let raw = generate_session_token()?;
        let issued_at = self.clock.now();
        let expires_at = saturating_expiry(issued_at, self.ttl_for(class));

        let record = SessionRecord {
            principal_id,
            principal_class: class,
            abilities: abilities.clone(),
            issued_at,
            expires_at,
        };
        self.sessions
            .insert(hash_session_token(&raw), record)
            .await?;

        Ok(SessionToken {
            raw,
            principal_id,
            principal_class: class,
            abilities,
            issued_at,
            expires_at,
        })
    }

    /// Resolve a raw token to its live session record, removing expired
    /// records on the way.
    pub async fn resolve(&self, raw_token: &str) -> AuthResult<Option<SessionRecord>> {
        let token_hash = hash_session_token(raw_token);
        let Some(record) = self.sessions.get(&token_hash).await? else {
            return Ok(None);
        };
        if record.expires_at <= self.clock.now() {
            self.sessions.remove(&token_hash).await?;
            return Ok(None);
        }
        Ok(Some(record))
    }

    /// Rotate a token: the old token is revoked before the new one is
    /// minted, so the old value can never outlive the refresh.
    pub async fn refresh(&self, raw_token: &str) -> AuthResult<SessionToken> {
        let Some(record) = self.resolve(raw_token).await? else {
            return Err(AuthError::InvalidCredentials);
        };
        self.sessions
            .remove(&hash_session_token(raw_token))
            .await?;
        self.issue(record.principal_id, record.principal_class, record.abilities)
            .await
    }

    /// Revoke a token. Idempotent: revoking an unknown or already-revoked
    /// token succeeds.
    pub async fn revoke(&self, raw_token: &str) -> AuthResult<()> {
        self.sessions
            .remove(&hash_session_token(raw_token))
            .await?;
        Ok(())
    }
}
