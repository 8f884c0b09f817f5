//! # Gardisto (Authentication & Login-Risk Engine)
//!
//! `gardisto` authenticates two mutually exclusive principal classes,
//! rate-limits credential failures, mints class-scoped session tokens, and
//! scores every login against the principal's historical behavior.
//!
//! ## Principal Model (Platform vs Tenant)
//!
//! Platform principals administer the deployment; tenant principals belong
//! to exactly one tenant. The two classes share nothing:
//!
//! - **Class Exclusivity:** An email that resolves in one class's namespace
//!   can never authenticate through the other; the attempt fails with the
//!   same generic error as a wrong password.
//! - **Explicit Tenant Context:** Tenant logins name their tenant up front;
//!   a mismatched tenant context is indistinguishable from bad credentials.
//! - **Token Scoping:** Platform tokens carry a fixed administrative
//!   ability set; tenant tokens aggregate role abilities plus a baseline
//!   tenant ability, and live for a shorter term.
//!
//! ## Credential Failures & Rate Limiting
//!
//! Failed credential checks count against a `(class, origin)` window; the
//! gate fails closed when its counter store errors. Unknown emails burn a
//! verification so response timing does not disclose account existence.
//!
//! ## Login Risk
//!
//! Successful logins feed a per-principal pattern (circular-mean hour,
//! common weekdays, cadence, known devices). New logins are checked for
//! hour, day, device, and frequency anomalies, scored additively, and
//! bucketed into risk levels with remediation recommendations. A background
//! sweep recomputes the fleet on a fixed cadence.
//!
//! ## Two-Factor
//!
//! TOTP enrollment (SHA-1, 6 digits, 30s step) plus single-use backup
//! codes stored as peppered Argon2id hashes. A replayed backup code is
//! reported as "already used", not "invalid".

pub mod auth;
pub mod config;
pub mod error;
pub mod risk;
pub mod store;
pub mod twofactor;

pub use auth::principal::{Principal, PrincipalClass, PrincipalStatus, TenantStatus};
pub use auth::rate_limit::{RateLimitDecision, RateLimitGate};
pub use auth::session::{SessionRecord, SessionToken, TokenIssuer};
pub use auth::{AuthOutcome, Authenticator, LoginInput};
pub use config::EngineConfig;
pub use error::{AuthError, AuthResult};
pub use risk::anomaly::{AnomalyType, SecurityAnomaly, SecurityAnomalyDetector, Severity};
pub use risk::pattern::{LoginPattern, LoginPatternAnalyzer};
pub use risk::score::{Priority, RiskLevel, RiskScorer, SecurityAnalysis, SecurityRecommendation};
pub use risk::RiskEngine;
pub use twofactor::{TwoFactorManager, TwoFactorSetup, TwoFactorVerification};
