//! Collaborator interfaces consumed by the engine.
//!
//! Persistence is external: the engine only sees these traits. Production
//! deployments back them with a shared database or key-value store so the
//! invariants hold across service instances; the `Memory*` implementations
//! here are reference implementations used by the integration tests.
//!
//! Two operations are contractually atomic read-modify-writes:
//! [`CounterStore::increment_with_expiry`] and
//! [`TwoFactorStore::consume_backup_code`]. Without that, two concurrent
//! logins can both observe "not yet blocked", and a backup code can be
//! redeemed twice.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::auth::permissions::Role;
use crate::auth::principal::{Principal, PrincipalClass};
use crate::auth::session::SessionRecord;
use crate::twofactor::TwoFactorEnrollment;

/// Outcome of one login attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginOutcome {
    Success,
    Failure,
}

/// One append-only login attempt record, owned by the external history
/// store and read-only to this engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoginEvent {
    pub principal_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub origin: String,
    pub device_fingerprint: Option<String>,
    pub outcome: LoginOutcome,
}

/// Resolves principals by class and normalized email.
pub trait PrincipalDirectory: Send + Sync {
    fn find_by_email(
        &self,
        class: PrincipalClass,
        email: &str,
    ) -> impl Future<Output = Result<Option<Principal>>> + Send;
}

/// Provides the eagerly-loaded role list for a principal.
pub trait RoleStore: Send + Sync {
    fn roles_for(&self, principal_id: Uuid) -> impl Future<Output = Result<Vec<Role>>> + Send;
}

/// Atomic windowed counters backing the rate-limit gate.
pub trait CounterStore: Send + Sync {
    /// Atomically increment `key`, starting a fresh window with the given
    /// expiry if the key is absent or expired. Returns the new count.
    fn increment_with_expiry(
        &self,
        key: &str,
        window: Duration,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Current count for `key`, 0 if absent or expired.
    fn get(&self, key: &str) -> impl Future<Output = Result<u64>> + Send;

    /// Remaining lifetime of the current window, if any.
    fn ttl(&self, key: &str) -> impl Future<Output = Result<Option<Duration>>> + Send;

    fn clear(&self, key: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Append-only login history, queried over a bounded rolling window.
pub trait LoginHistoryStore: Send + Sync {
    fn append(&self, event: LoginEvent) -> impl Future<Output = Result<()>> + Send;

    fn query(
        &self,
        principal_id: Uuid,
        window_days: u32,
    ) -> impl Future<Output = Result<Vec<LoginEvent>>> + Send;

    /// All principals with recorded history; used by the background risk
    /// sweep to enumerate the fleet.
    fn principal_ids(&self) -> impl Future<Output = Result<Vec<Uuid>>> + Send;
}

/// Server-side session state keyed by token hash. Raw tokens never reach
/// the store.
pub trait SessionStore: Send + Sync {
    fn insert(
        &self,
        token_hash: Vec<u8>,
        record: SessionRecord,
    ) -> impl Future<Output = Result<()>> + Send;

    fn get(
        &self,
        token_hash: &[u8],
    ) -> impl Future<Output = Result<Option<SessionRecord>>> + Send;

    /// Remove a session; returns whether a record existed.
    fn remove(&self, token_hash: &[u8]) -> impl Future<Output = Result<bool>> + Send;
}

/// Two-factor enrollment material and single-use backup-code state.
pub trait TwoFactorStore: Send + Sync {
    /// Store enrollment material, superseding any previous enrollment.
    fn put_enrollment(
        &self,
        principal_id: Uuid,
        enrollment: TwoFactorEnrollment,
    ) -> impl Future<Output = Result<()>> + Send;

    fn get_enrollment(
        &self,
        principal_id: Uuid,
    ) -> impl Future<Output = Result<Option<TwoFactorEnrollment>>> + Send;

    /// Atomically mark a backup-code hash consumed. Returns `true` exactly
    /// once per hash, even under concurrent verification attempts.
    fn consume_backup_code(
        &self,
        principal_id: Uuid,
        code_hash: &str,
    ) -> impl Future<Output = Result<bool>> + Send;
}

/// External constant-time password verifier. Hash algorithm selection is
/// the collaborator's concern.
pub trait CredentialVerifier: Send + Sync {
    /// Constant-time comparison of `password` against `stored_hash`.
    /// Must tolerate malformed hashes without panicking.
    fn verify(&self, password: &str, stored_hash: &str) -> bool;

    /// Run a throwaway verification so unknown-principal failures take as
    /// long as wrong-password failures.
    fn burn(&self, password: &str) {
        let _ = self.verify(password, "");
    }
}

/// Reference verifier comparing SHA-256 digests in constant time. Real
/// deployments supply their own password-hash scheme behind this trait.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256Verifier;

impl Sha256Verifier {
    /// Produce a stored hash for seeding directories in tests.
    #[must_use]
    pub fn hash(password: &str) -> String {
        use base64::Engine;
        use sha2::{Digest, Sha256};
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(Sha256::digest(password.as_bytes()))
    }
}

impl CredentialVerifier for Sha256Verifier {
    fn verify(&self, password: &str, stored_hash: &str) -> bool {
        use base64::Engine;
        use sha2::{Digest, Sha256};
        let computed = Sha256::digest(password.as_bytes());
        let Ok(expected) =
            base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(stored_hash.as_bytes())
        else {
            // Burn through the digest anyway so malformed hashes cost the
            // same as mismatches.
            let _ = computed.iter().fold(0u8, |acc, byte| acc | byte);
            return false;
        };
        if expected.len() != computed.len() {
            return false;
        }
        let mut diff = 0u8;
        for (a, b) in computed.iter().zip(expected.iter()) {
            diff |= a ^ b;
        }
        diff == 0
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock driven by explicit `advance` calls.
#[derive(Clone, Debug)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    #[must_use]
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start.timestamp_millis())),
        }
    }

    pub fn advance(&self, delta: chrono::Duration) {
        self.millis
            .fetch_add(delta.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.millis.load(Ordering::SeqCst);
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or_default()
    }
}

/// In-memory principal directory.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    principals: Arc<Mutex<Vec<Principal>>>,
}

impl MemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, principal: Principal) {
        self.principals.lock().await.push(principal);
    }
}

impl PrincipalDirectory for MemoryDirectory {
    async fn find_by_email(&self, class: PrincipalClass, email: &str) -> Result<Option<Principal>> {
        let principals = self.principals.lock().await;
        Ok(principals
            .iter()
            .find(|principal| principal.class() == class && principal.email() == email)
            .cloned())
    }
}

/// In-memory role store.
#[derive(Clone, Default)]
pub struct MemoryRoleStore {
    roles: Arc<Mutex<HashMap<Uuid, Vec<Role>>>>,
}

impl MemoryRoleStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn attach(&self, principal_id: Uuid, role: Role) {
        self.roles
            .lock()
            .await
            .entry(principal_id)
            .or_default()
            .push(role);
    }
}

impl RoleStore for MemoryRoleStore {
    async fn roles_for(&self, principal_id: Uuid) -> Result<Vec<Role>> {
        Ok(self
            .roles
            .lock()
            .await
            .get(&principal_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// In-memory counter store. The whole read-modify-write happens under one
/// lock, matching the atomicity the production store must provide.
#[derive(Clone, Default)]
pub struct MemoryCounterStore {
    counters: Arc<Mutex<HashMap<String, CounterEntry>>>,
}

struct CounterEntry {
    count: u64,
    expires_at: Instant,
}

impl MemoryCounterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for MemoryCounterStore {
    async fn increment_with_expiry(&self, key: &str, window: Duration) -> Result<u64> {
        let mut counters = self.counters.lock().await;
        let now = Instant::now();
        let entry = counters
            .entry(key.to_string())
            .and_modify(|entry| {
                if entry.expires_at <= now {
                    entry.count = 0;
                    entry.expires_at = now + window;
                }
                entry.count += 1;
            })
            .or_insert_with(|| CounterEntry {
                count: 1,
                expires_at: now + window,
            });
        Ok(entry.count)
    }

    async fn get(&self, key: &str) -> Result<u64> {
        let counters = self.counters.lock().await;
        Ok(counters
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map_or(0, |entry| entry.count))
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let counters = self.counters.lock().await;
        Ok(counters
            .get(key)
            .and_then(|entry| entry.expires_at.checked_duration_since(Instant::now())))
    }

    async fn clear(&self, key: &str) -> Result<()> {
        self.counters.lock().await.remove(key);
        Ok(())
    }
}

/// In-memory login history keyed by principal.
#[derive(Clone)]
pub struct MemoryLoginHistory {
    events: Arc<Mutex<HashMap<Uuid, Vec<LoginEvent>>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryLoginHistory {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            events: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }
}

impl LoginHistoryStore for MemoryLoginHistory {
    async fn append(&self, event: LoginEvent) -> Result<()> {
        self.events
            .lock()
            .await
            .entry(event.principal_id)
            .or_default()
            .push(event);
        Ok(())
    }

    async fn query(&self, principal_id: Uuid, window_days: u32) -> Result<Vec<LoginEvent>> {
        let cutoff = self.clock.now() - chrono::Duration::days(i64::from(window_days));
        let events = self.events.lock().await;
        Ok(events
            .get(&principal_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|event| event.timestamp >= cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn principal_ids(&self) -> Result<Vec<Uuid>> {
        Ok(self.events.lock().await.keys().copied().collect())
    }
}

/// In-memory session store keyed by token hash.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<Mutex<HashMap<Vec<u8>, SessionRecord>>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    async fn insert(&self, token_hash: Vec<u8>, record: SessionRecord) -> Result<()> {
        self.sessions.lock().await.insert(token_hash, record);
        Ok(())
    }

    async fn get(&self, token_hash: &[u8]) -> Result<Option<SessionRecord>> {
        Ok(self.sessions.lock().await.get(token_hash).cloned())
    }

    async fn remove(&self, token_hash: &[u8]) -> Result<bool> {
        Ok(self.sessions.lock().await.remove(token_hash).is_some())
    }
}

/// In-memory two-factor store. Backup-code consumption moves the hash from
/// the active list to the consumed list under one lock.
#[derive(Clone, Default)]
pub struct MemoryTwoFactorStore {
    enrollments: Arc<Mutex<HashMap<Uuid, TwoFactorEnrollment>>>,
}

impl MemoryTwoFactorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TwoFactorStore for MemoryTwoFactorStore {
    async fn put_enrollment(&self, principal_id: Uuid, enrollment: TwoFactorEnrollment) -> Result<()> {
        self.enrollments.lock().await.insert(principal_id, enrollment);
        Ok(())
    }

    async fn get_enrollment(&self, principal_id: Uuid) -> Result<Option<TwoFactorEnrollment>> {
        Ok(self.enrollments.lock().await.get(&principal_id).cloned())
    }

    async fn consume_backup_code(&self, principal_id: Uuid, code_hash: &str) -> Result<bool> {
        let mut enrollments = self.enrollments.lock().await;
        let Some(enrollment) = enrollments.get_mut(&principal_id) else {
            return Ok(false);
        };
        let Some(index) = enrollment
            .code_hashes
            .iter()
            .position(|hash| hash == code_hash)
        else {
            return Ok(false);
        };
        let consumed = enrollment.code_hashes.remove(index);
        enrollment.consumed_hashes.push(consumed);
        Ok(true)
    }
}
