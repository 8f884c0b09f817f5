//! End-to-end engine tests wiring the authenticator, rate-limit gate,
//! token issuer, risk analysis, and two-factor manager through the
//! in-memory collaborator implementations.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use secrecy::SecretString;
use uuid::Uuid;

use gardisto::auth::permissions::Role;
use gardisto::risk::anomaly::AnomalyType;
use gardisto::risk::score::RiskLevel;
use gardisto::store::{
    LoginEvent, LoginHistoryStore, LoginOutcome, ManualClock, MemoryCounterStore, MemoryDirectory,
    MemoryLoginHistory, MemoryRoleStore, MemorySessionStore, MemoryTwoFactorStore,
    PrincipalDirectory, Sha256Verifier,
};
use gardisto::twofactor::TwoFactorManager;
use gardisto::{
    AuthError, Authenticator, EngineConfig, LoginInput, Principal, PrincipalClass, PrincipalStatus,
};
use gardisto::auth::principal::{PlatformPrincipal, TenantPrincipal, TenantStatus};

type TestAuthenticator = Authenticator<
    MemoryDirectory,
    Sha256Verifier,
    MemoryCounterStore,
    MemoryRoleStore,
    MemorySessionStore,
    MemoryLoginHistory,
>;

struct Harness {
    authenticator: TestAuthenticator,
    directory: MemoryDirectory,
    roles: MemoryRoleStore,
    history: MemoryLoginHistory,
    clock: ManualClock,
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn harness() -> Harness {
    init_tracing();
    // Monday, 09:00 UTC.
    let clock = ManualClock::starting_at(Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap());
    let directory = MemoryDirectory::new();
    let roles = MemoryRoleStore::new();
    let history = MemoryLoginHistory::new(Arc::new(clock.clone()));
    let authenticator = Authenticator::new(
        directory.clone(),
        Sha256Verifier,
        MemoryCounterStore::new(),
        roles.clone(),
        MemorySessionStore::new(),
        Arc::new(history.clone()),
        Arc::new(clock.clone()),
        EngineConfig::new(),
    );
    Harness {
        authenticator,
        directory,
        roles,
        history,
        clock,
    }
}

fn platform(email: &str, password: &str) -> Principal {
    Principal::Platform(PlatformPrincipal {
        id: Uuid::new_v4(),
        email: email.to_string(),
        password_hash: Sha256Verifier::hash(password),
        status: PrincipalStatus::Active,
    })
}

fn tenant(email: &str, password: &str, tenant_id: Uuid, tenant_status: TenantStatus) -> Principal {
    Principal::Tenant(TenantPrincipal {
        id: Uuid::new_v4(),
        email: email.to_string(),
        password_hash: Sha256Verifier::hash(password),
        status: PrincipalStatus::Active,
        tenant_id,
        tenant_status,
    })
}

fn login(class: PrincipalClass, tenant_id: Option<Uuid>, email: &str, password: &str) -> LoginInput {
    LoginInput {
        class,
        tenant_id,
        email: email.to_string(),
        password: SecretString::from(password.to_string()),
        origin: "203.0.113.7".to_string(),
        device_fingerprint: Some("laptop".to_string()),
    }
}

#[tokio::test]
async fn class_exclusivity_is_generic_in_both_directions() {
    let h = harness();
    let tenant_id = Uuid::new_v4();
    h.directory
        .insert(tenant("user@example.com", "hunter2", tenant_id, TenantStatus::Active))
        .await;
    h.directory.insert(platform("root@example.com", "hunter2")).await;

    let as_platform = h
        .authenticator
        .authenticate(login(PrincipalClass::Platform, None, "user@example.com", "hunter2"))
        .await;
    assert!(matches!(as_platform, Err(AuthError::InvalidCredentials)));

    let as_tenant = h
        .authenticator
        .authenticate(login(
            PrincipalClass::Tenant,
            Some(tenant_id),
            "root@example.com",
            "hunter2",
        ))
        .await;
    assert!(matches!(as_tenant, Err(AuthError::InvalidCredentials)));
}

#[tokio::test]
async fn sixth_attempt_is_rate_limited_even_with_the_right_password() {
    let h = harness();
    h.directory.insert(platform("root@example.com", "hunter2")).await;

    for _ in 0..5 {
        let result = h
            .authenticator
            .authenticate(login(PrincipalClass::Platform, None, "root@example.com", "wrong"))
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    let blocked = h
        .authenticator
        .authenticate(login(PrincipalClass::Platform, None, "root@example.com", "hunter2"))
        .await;
    match blocked {
        Err(AuthError::RateLimited { retry_after_seconds }) => {
            assert!(retry_after_seconds > 0);
        }
        other => panic!("expected rate limit, got {other:?}"),
    }
}

#[tokio::test]
async fn success_clears_the_failure_window() {
    let h = harness();
    h.directory.insert(platform("root@example.com", "hunter2")).await;

    for _ in 0..4 {
        let _ = h
            .authenticator
            .authenticate(login(PrincipalClass::Platform, None, "root@example.com", "wrong"))
            .await;
    }
    h.authenticator
        .authenticate(login(PrincipalClass::Platform, None, "root@example.com", "hunter2"))
        .await
        .unwrap();

    // The window restarted: four more failures still leave room.
    for _ in 0..4 {
        let _ = h
            .authenticator
            .authenticate(login(PrincipalClass::Platform, None, "root@example.com", "wrong"))
            .await;
    }
    h.authenticator
        .authenticate(login(PrincipalClass::Platform, None, "root@example.com", "hunter2"))
        .await
        .unwrap();
}

#[tokio::test]
async fn token_lifetimes_differ_by_class() {
    let h = harness();
    let tenant_id = Uuid::new_v4();
    h.directory.insert(platform("root@example.com", "hunter2")).await;
    h.directory
        .insert(tenant("user@example.com", "hunter2", tenant_id, TenantStatus::Active))
        .await;

    let platform_outcome = h
        .authenticator
        .authenticate(login(PrincipalClass::Platform, None, "root@example.com", "hunter2"))
        .await
        .unwrap();
    assert_eq!(
        platform_outcome.token.expires_at - platform_outcome.token.issued_at,
        Duration::seconds(86_400)
    );

    let tenant_outcome = h
        .authenticator
        .authenticate(login(
            PrincipalClass::Tenant,
            Some(tenant_id),
            "user@example.com",
            "hunter2",
        ))
        .await
        .unwrap();
    assert_eq!(
        tenant_outcome.token.expires_at - tenant_outcome.token.issued_at,
        Duration::seconds(28_800)
    );
}

#[tokio::test]
async fn tenant_abilities_aggregate_roles_plus_baseline() {
    let h = harness();
    let tenant_id = Uuid::new_v4();
    let principal = tenant("user@example.com", "hunter2", tenant_id, TenantStatus::Active);
    let principal_id = principal.id();
    h.directory.insert(principal).await;
    h.roles
        .attach(principal_id, Role::new("editor", ["docs:read", "docs:write"]))
        .await;
    h.roles
        .attach(principal_id, Role::new("viewer", ["docs:read", "reports:read"]))
        .await;

    let outcome = h
        .authenticator
        .authenticate(login(
            PrincipalClass::Tenant,
            Some(tenant_id),
            "user@example.com",
            "hunter2",
        ))
        .await
        .unwrap();

    let abilities: Vec<&str> = outcome.token.abilities.iter().map(String::as_str).collect();
    assert_eq!(
        abilities,
        ["docs:read", "docs:write", "reports:read", "tenant:access"]
    );
}

#[tokio::test]
async fn inoperable_tenant_is_specific_and_does_not_count_as_failure() {
    let h = harness();
    let tenant_id = Uuid::new_v4();
    h.directory
        .insert(tenant(
            "user@example.com",
            "hunter2",
            tenant_id,
            TenantStatus::SubscriptionExpired,
        ))
        .await;

    // Well past the failure limit; a status failure never trips the gate.
    for _ in 0..8 {
        let result = h
            .authenticator
            .authenticate(login(
                PrincipalClass::Tenant,
                Some(tenant_id),
                "user@example.com",
                "hunter2",
            ))
            .await;
        assert!(matches!(result, Err(AuthError::TenantInoperable)));
    }
}

#[tokio::test]
async fn suspended_principal_reports_inactive() {
    let h = harness();
    let tenant_id = Uuid::new_v4();
    let principal = Principal::Tenant(TenantPrincipal {
        id: Uuid::new_v4(),
        email: "user@example.com".to_string(),
        password_hash: Sha256Verifier::hash("hunter2"),
        status: PrincipalStatus::Suspended,
        tenant_id,
        tenant_status: TenantStatus::Active,
    });
    h.directory.insert(principal).await;

    let result = h
        .authenticator
        .authenticate(login(
            PrincipalClass::Tenant,
            Some(tenant_id),
            "user@example.com",
            "hunter2",
        ))
        .await;
    assert!(matches!(result, Err(AuthError::PrincipalInactive)));
}

async fn seed_daily_logins(history: &MemoryLoginHistory, principal_id: Uuid, days: i64) {
    let base = Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap();
    for i in 0..days {
        history
            .append(LoginEvent {
                principal_id,
                timestamp: base - Duration::days(days - i),
                origin: "203.0.113.7".to_string(),
                device_fingerprint: Some("laptop".to_string()),
                outcome: LoginOutcome::Success,
            })
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn off_hours_login_is_flagged_inline() {
    let h = harness();
    h.directory.insert(platform("root@example.com", "hunter2")).await;
    let principal = h
        .directory
        .find_by_email(PrincipalClass::Platform, "root@example.com")
        .await
        .unwrap()
        .unwrap();
    seed_daily_logins(&h.history, principal.id(), 6).await;

    // 22:00, thirteen hours off the 09:00 baseline.
    h.clock.advance(Duration::hours(13));
    let outcome = h
        .authenticator
        .authenticate(login(PrincipalClass::Platform, None, "root@example.com", "hunter2"))
        .await
        .unwrap();

    let analysis = outcome.analysis.expect("off-hours login should be flagged");
    assert!(analysis
        .anomalies
        .iter()
        .any(|anomaly| anomaly.anomaly_type == AnomalyType::UnusualHour));
    assert!(analysis.risk_level >= RiskLevel::Medium);
    assert!(analysis.risk_score >= 0.3);
    assert!(!analysis.recommendations.is_empty());
}

#[tokio::test]
async fn no_pattern_below_minimum_samples_means_no_flags() {
    let h = harness();
    h.directory.insert(platform("root@example.com", "hunter2")).await;
    let principal = h
        .directory
        .find_by_email(PrincipalClass::Platform, "root@example.com")
        .await
        .unwrap()
        .unwrap();
    // Three prior logins: below the five needed to establish a pattern.
    seed_daily_logins(&h.history, principal.id(), 3).await;

    h.clock.advance(Duration::hours(13));
    let outcome = h
        .authenticator
        .authenticate(login(PrincipalClass::Platform, None, "root@example.com", "hunter2"))
        .await
        .unwrap();
    assert!(outcome.analysis.is_none());
}

#[tokio::test]
async fn login_appends_history_for_later_analysis() {
    let h = harness();
    h.directory.insert(platform("root@example.com", "hunter2")).await;
    let principal = h
        .directory
        .find_by_email(PrincipalClass::Platform, "root@example.com")
        .await
        .unwrap()
        .unwrap();

    h.authenticator
        .authenticate(login(PrincipalClass::Platform, None, "root@example.com", "hunter2"))
        .await
        .unwrap();
    let _ = h
        .authenticator
        .authenticate(login(PrincipalClass::Platform, None, "root@example.com", "wrong"))
        .await;

    let events = h.history.query(principal.id(), 90).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].outcome, LoginOutcome::Success);
    assert_eq!(events[1].outcome, LoginOutcome::Failure);
}

#[tokio::test]
async fn refresh_rotates_and_logout_revokes() {
    let h = harness();
    h.directory.insert(platform("root@example.com", "hunter2")).await;

    let outcome = h
        .authenticator
        .authenticate(login(PrincipalClass::Platform, None, "root@example.com", "hunter2"))
        .await
        .unwrap();

    let refreshed = h.authenticator.refresh(&outcome.token.raw).await.unwrap();
    assert_ne!(refreshed.raw, outcome.token.raw);
    assert!(h
        .authenticator
        .resolve_session(&outcome.token.raw)
        .await
        .unwrap()
        .is_none());
    assert_eq!(refreshed.abilities, outcome.token.abilities);

    h.authenticator.logout(&refreshed.raw).await.unwrap();
    assert!(h
        .authenticator
        .resolve_session(&refreshed.raw)
        .await
        .unwrap()
        .is_none());
    assert!(matches!(
        h.authenticator.refresh(&refreshed.raw).await,
        Err(AuthError::InvalidCredentials)
    ));
}

#[tokio::test]
async fn concurrent_backup_code_redemption_succeeds_exactly_once() {
    let clock = ManualClock::starting_at(Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap());
    let manager = Arc::new(TwoFactorManager::new(
        MemoryTwoFactorStore::new(),
        Arc::new(clock),
        "gardisto",
        b"integration-pepper".to_vec(),
        10,
    ));
    let principal_id = Uuid::new_v4();
    let setup = manager.setup(principal_id, "root@example.com").await.unwrap();
    let code = setup.backup_codes.first().unwrap().clone();

    let a = tokio::spawn({
        let manager = Arc::clone(&manager);
        let code = code.clone();
        async move { manager.verify(principal_id, &code).await.unwrap() }
    });
    let b = tokio::spawn({
        let manager = Arc::clone(&manager);
        let code = code.clone();
        async move { manager.verify(principal_id, &code).await.unwrap() }
    });

    let (first, second) = (a.await.unwrap(), b.await.unwrap());
    let successes = usize::from(first.success) + usize::from(second.success);
    assert_eq!(successes, 1);
    // The loser sees "already used", not "invalid".
    let loser = if first.success { &second } else { &first };
    assert!(loser.used_backup_code);

    // A third attempt replays against the consumed list.
    let replay = manager.verify(principal_id, &code).await.unwrap();
    assert!(!replay.success);
    assert!(replay.used_backup_code);
}
