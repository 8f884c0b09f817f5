//! Two-factor enrollment and verification.
//!
//! Flow Overview:
//! 1) `setup` generates a TOTP secret, an otpauth provisioning URI, and a
//!    batch of single-use backup codes; re-enrollment supersedes, never
//!    mutates, the previous material.
//! 2) `verify` first checks the submitted value as a time-based code, then
//!    falls back to the unconsumed backup codes. A matching backup code is
//!    consumed atomically inside the same verification call.
//!
//! Security boundaries: the store holds the secret and peppered code
//! hashes; plaintext backup codes exist only in the `TwoFactorSetup`
//! returned to the caller at enrollment.

pub mod codes;

use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretBox, SecretString};
use serde_json::json;
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::store::{Clock, TwoFactorStore};
use codes::{verify_backup_code, BackupCodeBatch};

/// Enrollment material persisted by the two-factor store. The plaintext
/// backup codes are never part of this record.
#[derive(Clone)]
pub struct TwoFactorEnrollment {
    /// Base32-encoded TOTP secret.
    pub secret: SecretString,
    /// Argon2id hashes of the unconsumed backup codes.
    pub code_hashes: Vec<String>,
    /// Hashes of codes already redeemed. Kept so a replayed code fails
    /// with "already used" rather than "invalid".
    pub consumed_hashes: Vec<String>,
    pub enrolled_at: DateTime<Utc>,
}

/// Enrollment material returned to the principal exactly once.
#[derive(Clone, Debug)]
pub struct TwoFactorSetup {
    pub principal_id: Uuid,
    pub secret_base32: String,
    pub otpauth_uri: String,
    pub backup_codes: Vec<String>,
    pub instructions: String,
    pub app_name: String,
}

/// Result of one verification attempt.
#[derive(Clone, Debug)]
pub struct TwoFactorVerification {
    pub success: bool,
    pub message: String,
    pub used_backup_code: bool,
    pub metadata: Option<serde_json::Value>,
}

impl TwoFactorVerification {
    /// Convert into the error taxonomy for callers gating a challenge.
    pub fn require(&self) -> AuthResult<()> {
        if self.success {
            return Ok(());
        }
        if self.used_backup_code {
            Err(AuthError::BackupCodeAlreadyUsed)
        } else {
            Err(AuthError::TwoFactorInvalidCode)
        }
    }
}

/// Issues enrollment material and verifies submitted codes.
pub struct TwoFactorManager<T: TwoFactorStore> {
    store: T,
    clock: Arc<dyn Clock>,
    issuer: String,
    pepper: SecretBox<Vec<u8>>,
    backup_code_count: usize,
}

impl<T: TwoFactorStore> TwoFactorManager<T> {
    #[must_use]
    pub fn new(
        store: T,
        clock: Arc<dyn Clock>,
        issuer: impl Into<String>,
        pepper: Vec<u8>,
        backup_code_count: usize,
    ) -> Self {
        Self {
            store,
            clock,
            issuer: issuer.into(),
            pepper: SecretBox::new(Box::new(pepper)),
            backup_code_count: backup_code_count.max(1),
        }
    }

    fn totp_for(&self, secret_base32: &str, account_label: &str) -> AuthResult<TOTP> {
        let secret_bytes = Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .map_err(|e| AuthError::Store(anyhow!("invalid TOTP secret: {e}")))?;
        TOTP::new(
            Algorithm::SHA1,
            6,
            1,
            30,
            secret_bytes,
            Some(self.issuer.clone()),
            account_label.to_string(),
        )
        .map_err(|e| AuthError::Store(anyhow!("TOTP init error: {e}")))
    }

    /// Begin (or redo) enrollment for a principal. Supersedes any previous
    /// enrollment, invalidating its secret and remaining backup codes.
    pub async fn setup(&self, principal_id: Uuid, account_label: &str) -> AuthResult<TwoFactorSetup> {
        let secret_bytes = Secret::generate_secret()
            .to_bytes()
            .map_err(|e| AuthError::Store(anyhow!("secret generation error: {e}")))?;
        let totp = TOTP::new(
            Algorithm::SHA1,
            6,
            1,
            30,
            secret_bytes,
            Some(self.issuer.clone()),
            account_label.to_string(),
        )
        .map_err(|e| AuthError::Store(anyhow!("TOTP init error: {e}")))?;
        let secret_base32 = totp.get_secret_base32();
        let otpauth_uri = totp.get_url();

        let batch = BackupCodeBatch::generate(self.backup_code_count, self.pepper.expose_secret())?;

        let enrollment = TwoFactorEnrollment {
            secret: SecretString::from(secret_base32.clone()),
            code_hashes: batch.code_hashes,
            consumed_hashes: Vec::new(),
            enrolled_at: self.clock.now(),
        };
        self.store.put_enrollment(principal_id, enrollment).await?;

        info!(%principal_id, "two-factor enrollment material issued");
        Ok(TwoFactorSetup {
            principal_id,
            secret_base32,
            otpauth_uri,
            backup_codes: batch.codes,
            instructions: format!(
                "Scan the QR payload with an authenticator app, or enter the secret manually. \
                 Store the {} backup codes somewhere safe; each works exactly once.",
                self.backup_code_count
            ),
            app_name: self.issuer.clone(),
        })
    }

    /// Verify a submitted code: TOTP first, then unconsumed backup codes.
    pub async fn verify(&self, principal_id: Uuid, code: &str) -> AuthResult<TwoFactorVerification> {
        let Some(enrollment) = self.store.get_enrollment(principal_id).await? else {
            return Ok(TwoFactorVerification {
                success: false,
                message: "two-factor is not enrolled".to_string(),
                used_backup_code: false,
                metadata: None,
            });
        };

        let totp = self.totp_for(enrollment.secret.expose_secret(), "principal")?;
        if totp.check_current(code).unwrap_or(false) {
            return Ok(TwoFactorVerification {
                success: true,
                message: "code accepted".to_string(),
                used_backup_code: false,
                metadata: None,
            });
        }

        // Fall back to backup codes. Consumption is the atomic step: even
        // if two requests verify the same code concurrently, the store
        // hands out exactly one `true`.
        for hash in &enrollment.code_hashes {
            if verify_backup_code(code, hash, self.pepper.expose_secret())? {
                if self.store.consume_backup_code(principal_id, hash).await? {
                    let remaining = enrollment.code_hashes.len().saturating_sub(1);
                    info!(%principal_id, remaining, "backup code redeemed");
                    return Ok(TwoFactorVerification {
                        success: true,
                        message: "backup code accepted".to_string(),
                        used_backup_code: true,
                        metadata: Some(json!({ "remaining_backup_codes": remaining })),
                    });
                }
                // Lost the race: someone consumed this code first.
                warn!(%principal_id, "backup code replayed concurrently");
                return Ok(TwoFactorVerification {
                    success: false,
                    message: "backup code already used".to_string(),
                    used_backup_code: true,
                    metadata: None,
                });
            }
        }

        for hash in &enrollment.consumed_hashes {
            if verify_backup_code(code, hash, self.pepper.expose_secret())? {
                return Ok(TwoFactorVerification {
                    success: false,
                    message: "backup code already used".to_string(),
                    used_backup_code: true,
                    metadata: None,
                });
            }
        }

        Ok(TwoFactorVerification {
            success: false,
            message: "invalid two-factor code".to_string(),
            used_backup_code: false,
            metadata: None,
        })
    }
}
