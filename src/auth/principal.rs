//! Principal model and identifier helpers.
//!
//! `Principal` is a closed tagged union over the two principal classes.
//! Every branch point in the engine matches exhaustively on it, so adding
//! a class is a compile-time event rather than a runtime type check.
//!
//! Security boundaries: the same email resolving under both classes is an
//! account-takeover smell; the authenticator fails such logins generically
//! without disambiguating.

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The two structurally distinct principal classes sharing one login surface.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalClass {
    Platform,
    Tenant,
}

impl PrincipalClass {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Platform => "platform",
            Self::Tenant => "tenant",
        }
    }

    /// The class whose namespace must *not* contain the email being
    /// authenticated.
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::Platform => Self::Tenant,
            Self::Tenant => Self::Platform,
        }
    }
}

impl std::fmt::Display for PrincipalClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalStatus {
    Active,
    Inactive,
    Suspended,
}

/// Operational state of the tenant a tenant principal belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Active,
    Suspended,
    SubscriptionExpired,
}

#[derive(Clone, Debug)]
pub struct PlatformPrincipal {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub status: PrincipalStatus,
}

#[derive(Clone, Debug)]
pub struct TenantPrincipal {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub status: PrincipalStatus,
    pub tenant_id: Uuid,
    pub tenant_status: TenantStatus,
}

/// An authenticable identity, either platform-scoped or tenant-scoped.
#[derive(Clone, Debug)]
pub enum Principal {
    Platform(PlatformPrincipal),
    Tenant(TenantPrincipal),
}

impl Principal {
    #[must_use]
    pub fn id(&self) -> Uuid {
        match self {
            Self::Platform(p) => p.id,
            Self::Tenant(p) => p.id,
        }
    }

    #[must_use]
    pub fn email(&self) -> &str {
        match self {
            Self::Platform(p) => &p.email,
            Self::Tenant(p) => &p.email,
        }
    }

    #[must_use]
    pub fn password_hash(&self) -> &str {
        match self {
            Self::Platform(p) => &p.password_hash,
            Self::Tenant(p) => &p.password_hash,
        }
    }

    #[must_use]
    pub fn class(&self) -> PrincipalClass {
        match self {
            Self::Platform(_) => PrincipalClass::Platform,
            Self::Tenant(_) => PrincipalClass::Tenant,
        }
    }

    #[must_use]
    pub fn status(&self) -> PrincipalStatus {
        match self {
            Self::Platform(p) => p.status,
            Self::Tenant(p) => p.status,
        }
    }
}

/// Normalize an email for lookup and rate-limit keys.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Mask an email for server-side logs: keep the first character of the
/// local part and the full domain.
#[must_use]
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let head = local.chars().next().map(String::from).unwrap_or_default();
            format!("{head}***@{domain}")
        }
        None => "***".to_string(),
    }
}
