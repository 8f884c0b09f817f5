//! Engine error taxonomy.
//!
//! Credential and enumeration-sensitive failures are flattened into the
//! generic [`AuthError::InvalidCredentials`] before they cross the service
//! boundary; a caller can never tell "no such account", "wrong password",
//! and "email registered under the other principal class" apart. Rate-limit
//! and inactivity errors stay specific since they only occur where no
//! enumeration risk exists.

use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Generic credential failure. Covers unknown email, wrong password,
    /// and cross-class email collisions.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Too many failed attempts for this principal class and origin.
    #[error("rate limited, retry in {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    /// The principal exists and the password matched, but the account is
    /// not active.
    #[error("principal is not active")]
    PrincipalInactive,

    /// Tenant principal whose tenant is suspended or whose subscription
    /// has expired.
    #[error("tenant is not operable")]
    TenantInoperable,

    /// Submitted two-factor code matched neither the TOTP window nor any
    /// unconsumed backup code.
    #[error("invalid two-factor code")]
    TwoFactorInvalidCode,

    /// Backup code was valid once but has already been consumed.
    #[error("backup code already used")]
    BackupCodeAlreadyUsed,

    /// Value-construction failure for anomaly severities. Programmer
    /// error, not user-facing.
    #[error("invalid severity: {0}")]
    InvalidSeverity(String),

    /// Value-construction failure for recommendation priorities.
    #[error("invalid priority: {0}")]
    InvalidPriority(String),

    /// A collaborator store failed. Carries full context for server-side
    /// logs; callers should not surface the message.
    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::AuthError;

    #[test]
    fn credential_errors_share_one_message() {
        // The generic message is part of the contract: enumeration attempts
        // must not learn anything from the error text.
        assert_eq!(AuthError::InvalidCredentials.to_string(), "invalid credentials");
    }

    #[test]
    fn rate_limited_reports_retry_after() {
        let err = AuthError::RateLimited {
            retry_after_seconds: 42,
        };
        assert_eq!(err.to_string(), "rate limited, retry in 42s");
    }
}
