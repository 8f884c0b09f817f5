//! Login orchestration for the two principal classes.
//!
//! Flow Overview:
//! 1) Reject emails that resolve in the *other* class's namespace, without
//!    disclosing the collision.
//! 2) Consult the rate-limit gate for the `(class, origin)` key.
//! 3) Resolve the principal and verify the password; unknown email and
//!    wrong password are indistinguishable in both timing and message.
//! 4) Check principal and tenant status; these errors are specific since
//!    they can only occur after the credential check.
//! 5) Clear the gate, assemble abilities, mint a class-scoped token, and
//!    run the inline risk analysis for the new login event.
//!
//! Security boundaries: tenant identity is explicit in [`LoginInput`] and
//! threaded through every call; nothing here keeps ambient per-request
//! state.

pub mod permissions;
pub mod principal;
pub mod rate_limit;
pub mod session;

use std::collections::BTreeSet;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{EngineConfig, PLATFORM_ABILITIES, TENANT_BASELINE_ABILITY};
use crate::error::{AuthError, AuthResult};
use crate::risk::evaluate_event;
use crate::risk::score::SecurityAnalysis;
use crate::store::{
    Clock, CounterStore, CredentialVerifier, LoginEvent, LoginHistoryStore, LoginOutcome,
    PrincipalDirectory, RoleStore, SessionStore,
};
use permissions::PermissionAggregator;
use principal::{mask_email, normalize_email, valid_email, Principal, PrincipalClass,
    PrincipalStatus, TenantStatus};
use rate_limit::{RateLimitDecision, RateLimitGate};
use session::{SessionToken, TokenIssuer};

/// One login attempt. Tenant logins carry their tenant context explicitly.
#[derive(Debug)]
pub struct LoginInput {
    pub class: PrincipalClass,
    pub tenant_id: Option<Uuid>,
    pub email: String,
    pub password: SecretString,
    pub origin: String,
    pub device_fingerprint: Option<String>,
}

/// Successful login: the minted token plus the inline risk analysis when
/// the login deviated from the principal's pattern.
#[derive(Debug)]
pub struct AuthOutcome {
    pub token: SessionToken,
    pub analysis: Option<SecurityAnalysis>,
}

/// Orchestrates one login attempt across the gate, directory, verifier,
/// role store, and token issuer. Generic over collaborator implementations
/// so the engine has no dependency on any storage crate.
pub struct Authenticator<D, V, C, R, S, H>
where
    D: PrincipalDirectory,
    V: CredentialVerifier,
    C: CounterStore,
    R: RoleStore,
    S: SessionStore,
    H: LoginHistoryStore,
{
    directory: D,
    verifier: V,
    gate: RateLimitGate<C>,
    roles: R,
    issuer: TokenIssuer<S>,
    history: Arc<H>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl<D, V, C, R, S, H> Authenticator<D, V, C, R, S, H>
where
    D: PrincipalDirectory,
    V: CredentialVerifier,
    C: CounterStore,
    R: RoleStore,
    S: SessionStore,
    H: LoginHistoryStore,
{
    #[must_use]
    pub fn new(
        directory: D,
        verifier: V,
        counters: C,
        roles: R,
        sessions: S,
        history: Arc<H>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let config = config.normalize();
        let gate = RateLimitGate::new(counters, config.max_failures(), config.failure_window());
        let issuer = TokenIssuer::new(
            sessions,
            Arc::clone(&clock),
            config.platform_token_ttl(),
            config.tenant_token_ttl(),
        );
        Self {
            directory,
            verifier,
            gate,
            roles,
            issuer,
            history,
            clock,
            config,
        }
    }

    /// Authenticate one login attempt against the requested principal
    /// class.
    pub async fn authenticate(&self, input: LoginInput) -> AuthResult<AuthOutcome> {
        let email = normalize_email(&input.email);
        let masked = mask_email(&email);
        let key = RateLimitGate::<C>::key(input.class, input.tenant_id, &input.origin);

        if !valid_email(&email) {
            warn!(class = %input.class, email = %masked, "login with malformed email");
            return Err(AuthError::InvalidCredentials);
        }

        // Class exclusivity: an email living in the other class's namespace
        // fails generically, with a failure recorded against this key.
        if self
            .directory
            .find_by_email(input.class.other(), &email)
            .await?
            .is_some()
        {
            warn!(class = %input.class, email = %masked, "cross-class login attempt");
            self.gate.record_failure(&key).await;
            self.verifier.burn(input.password.expose_secret());
            return Err(AuthError::InvalidCredentials);
        }

        if let RateLimitDecision::Blocked { retry_after } = self.gate.check(&key).await {
            info!(class = %input.class, email = %masked, "login rate limited");
            return Err(AuthError::RateLimited {
                retry_after_seconds: retry_after.as_secs().max(1),
            });
        }

        let Some(found) = self.directory.find_by_email(input.class, &email).await? else {
            // Unknown email costs one verification, like a wrong password.
            self.verifier.burn(input.password.expose_secret());
            self.gate.record_failure(&key).await;
            warn!(class = %input.class, email = %masked, "login for unknown principal");
            return Err(AuthError::InvalidCredentials);
        };

        // Tenant logins must name the tenant the principal belongs to.
        if let Principal::Tenant(tenant) = &found {
            if input.tenant_id != Some(tenant.tenant_id) {
                self.verifier.burn(input.password.expose_secret());
                self.gate.record_failure(&key).await;
                warn!(class = %input.class, email = %masked, "login with mismatched tenant");
                return Err(AuthError::InvalidCredentials);
            }
        }

        if !self
            .verifier
            .verify(input.password.expose_secret(), found.password_hash())
        {
            self.gate.record_failure(&key).await;
            self.append_event(&found, &input, LoginOutcome::Failure).await;
            warn!(class = %input.class, email = %masked, "login with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        // Post-credential status checks are specific: no enumeration risk
        // remains, and they do not count against the rate limit.
        match &found {
            Principal::Platform(platform) => {
                if platform.status != PrincipalStatus::Active {
                    self.append_event(&found, &input, LoginOutcome::Failure).await;
                    info!(class = %input.class, email = %masked, "login for inactive principal");
                    return Err(AuthError::PrincipalInactive);
                }
            }
            Principal::Tenant(tenant) => {
                if tenant.status != PrincipalStatus::Active {
                    self.append_event(&found, &input, LoginOutcome::Failure).await;
                    info!(class = %input.class, email = %masked, "login for inactive principal");
                    return Err(AuthError::PrincipalInactive);
                }
                if tenant.tenant_status != TenantStatus::Active {
                    self.append_event(&found, &input, LoginOutcome::Failure).await;
                    info!(
                        class = %input.class,
                        email = %masked,
                        tenant_id = %tenant.tenant_id,
                        "login for inoperable tenant"
                    );
                    return Err(AuthError::TenantInoperable);
                }
            }
        }

        self.gate.clear(&key).await;
        let abilities = self.abilities_for(&found).await?;

        let event = LoginEvent {
            principal_id: found.id(),
            timestamp: self.clock.now(),
            origin: input.origin.clone(),
            device_fingerprint: input.device_fingerprint.clone(),
            outcome: LoginOutcome::Success,
        };
        let analysis = self.inline_analysis(&event).await;
        self.append(event).await;

        let token = self
            .issuer
            .issue(found.id(), found.class(), abilities)
            .await?;
        info!(
            class = %input.class,
            email = %masked,
            principal_id = %found.id(),
            flagged = analysis.is_some(),
            "login succeeded"
        );
        Ok(AuthOutcome { token, analysis })
    }

    /// Rotate a session token; the old token is revoked first.
    pub async fn refresh(&self, raw_token: &str) -> AuthResult<SessionToken> {
        self.issuer.refresh(raw_token).await
    }

    /// Revoke a session token. Idempotent.
    pub async fn logout(&self, raw_token: &str) -> AuthResult<()> {
        self.issuer.revoke(raw_token).await
    }

    /// Resolve a raw token to its live session record.
    pub async fn resolve_session(
        &self,
        raw_token: &str,
    ) -> AuthResult<Option<session::SessionRecord>> {
        self.issuer.resolve(raw_token).await
    }

    async fn abilities_for(&self, principal: &Principal) -> AuthResult<BTreeSet<String>> {
        match principal {
            Principal::Platform(_) => Ok(PLATFORM_ABILITIES
                .iter()
                .map(ToString::to_string)
                .collect()),
            Principal::Tenant(tenant) => {
                let roles = self.roles.roles_for(tenant.id).await?;
                let mut abilities = PermissionAggregator::aggregate(&roles);
                abilities.insert(TENANT_BASELINE_ABILITY.to_string());
                Ok(abilities)
            }
        }
    }

    /// Per-login risk analysis against the history preceding this event.
    /// Returns `Some` only when the login was flagged.
    async fn inline_analysis(&self, event: &LoginEvent) -> Option<SecurityAnalysis> {
        let window_days = self.config.analysis_window_days();
        match self.history.query(event.principal_id, window_days).await {
            Ok(prior) => {
                let analysis = evaluate_event(
                    &self.config,
                    event.principal_id,
                    &prior,
                    event,
                    self.clock.now(),
                    window_days,
                );
                (!analysis.anomalies.is_empty()).then_some(analysis)
            }
            Err(err) => {
                warn!(
                    principal_id = %event.principal_id,
                    "inline risk analysis degraded: {err}"
                );
                None
            }
        }
    }

    async fn append_event(&self, principal: &Principal, input: &LoginInput, outcome: LoginOutcome) {
        self.append(LoginEvent {
            principal_id: principal.id(),
            timestamp: self.clock.now(),
            origin: input.origin.clone(),
            device_fingerprint: input.device_fingerprint.clone(),
            outcome,
        })
        .await;
    }

    /// History writes never fail a login; the event is advisory input to
    /// later analysis.
    async fn append(&self, event: LoginEvent) {
        if let Err(err) = self.history.append(event).await {
            warn!("failed to append login event: {err}");
        }
    }
}
