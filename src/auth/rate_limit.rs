//! Brute-force protection for the login surface.
//!
//! Flow Overview:
//! 1) `check` reads the current window count for the `(class, origin)` key.
//! 2) `record_failure` performs the store's atomic increment-with-expiry.
//! 3) A successful authentication clears the key.
//!
//! Tenant keys embed the tenant id so one tenant's brute-force activity
//! never throttles another tenant's logins from the same origin. Store
//! failures fail closed: an unreachable counter store blocks the attempt
//! rather than waving it through.

use std::time::Duration;

use tracing::error;
use uuid::Uuid;

use crate::auth::principal::PrincipalClass;
use crate::store::CounterStore;

/// Result of consulting the gate before an attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RateLimitDecision {
    Allowed,
    Blocked { retry_after: Duration },
}

/// Windowed attempt counter keyed by principal class and origin.
pub struct RateLimitGate<C: CounterStore> {
    counters: C,
    max_failures: u64,
    window: Duration,
}

impl<C: CounterStore> RateLimitGate<C> {
    #[must_use]
    pub fn new(counters: C, max_failures: u64, window: Duration) -> Self {
        Self {
            counters,
            max_failures,
            window,
        }
    }

    /// Rate-limit key for one login attempt. Tenant logins are isolated
    /// per tenant; platform logins share one namespace per origin.
    #[must_use]
    pub fn key(class: PrincipalClass, tenant_id: Option<Uuid>, origin: &str) -> String {
        match (class, tenant_id) {
            (PrincipalClass::Tenant, Some(tenant_id)) => {
                format!("{}:{tenant_id}:{origin}", class.as_str())
            }
            _ => format!("{}:{origin}", class.as_str()),
        }
    }

    /// Consult the gate without recording an attempt.
    pub async fn check(&self, key: &str) -> RateLimitDecision {
        let count = match self.counters.get(key).await {
            Ok(count) => count,
            Err(err) => {
                error!(key, "rate limit counter read failed: {err}");
                return RateLimitDecision::Blocked {
                    retry_after: self.window,
                };
            }
        };
        if count < self.max_failures {
            return RateLimitDecision::Allowed;
        }
        let retry_after = match self.counters.ttl(key).await {
            Ok(Some(ttl)) => ttl,
            Ok(None) => Duration::ZERO,
            Err(err) => {
                error!(key, "rate limit ttl read failed: {err}");
                self.window
            }
        };
        RateLimitDecision::Blocked { retry_after }
    }

    /// Record one failed attempt. Returns the new count within the window.
    pub async fn record_failure(&self, key: &str) -> u64 {
        match self.counters.increment_with_expiry(key, self.window).await {
            Ok(count) => count,
            Err(err) => {
                // Fail closed: report the limit as reached.
                error!(key, "rate limit increment failed: {err}");
                self.max_failures
            }
        }
    }

    /// Clear the window after a successful authentication.
    pub async fn clear(&self, key: &str) {
        if let Err(err) = self.counters.clear(key).await {
            error!(key, "rate limit clear failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RateLimitDecision, RateLimitGate};
    use crate::auth::principal::PrincipalClass;
    use crate::store::MemoryCounterStore;
    use std::time::Duration;
    use uuid::Uuid;

    fn gate() -> RateLimitGate<MemoryCounterStore> {
        RateLimitGate::new(MemoryCounterStore::new(), 5, Duration::from_secs(60))
    }

    #[test]
    fn tenant_keys_embed_tenant_id() {
        let tenant_id = Uuid::new_v4();
        let key = RateLimitGate::<MemoryCounterStore>::key(
            PrincipalClass::Tenant,
            Some(tenant_id),
            "10.0.0.1",
        );
        assert_eq!(key, format!("tenant:{tenant_id}:10.0.0.1"));

        let key =
            RateLimitGate::<MemoryCounterStore>::key(PrincipalClass::Platform, None, "10.0.0.1");
        assert_eq!(key, "platform:10.0.0.1");
    }

    #[tokio::test]
    async fn blocks_after_max_failures() {
        let gate = gate();
        let key = "platform:10.0.0.1";
        for _ in 0..5 {
            assert_eq!(gate.check(key).await, RateLimitDecision::Allowed);
            gate.record_failure(key).await;
        }
        match gate.check(key).await {
            RateLimitDecision::Blocked { retry_after } => assert!(retry_after.as_secs() > 0),
            RateLimitDecision::Allowed => panic!("expected block after 5 failures"),
        }
    }

    #[tokio::test]
    async fn clear_resets_the_window() {
        let gate = gate();
        let key = "platform:10.0.0.2";
        for _ in 0..5 {
            gate.record_failure(key).await;
        }
        gate.clear(key).await;
        assert_eq!(gate.check(key).await, RateLimitDecision::Allowed);
    }

    #[tokio::test]
    async fn tenants_do_not_share_windows() {
        let gate = gate();
        let a = format!("tenant:{}:10.0.0.3", Uuid::new_v4());
        let b = format!("tenant:{}:10.0.0.3", Uuid::new_v4());
        for _ in 0..5 {
            gate.record_failure(&a).await;
        }
        assert!(matches!(
            gate.check(&a).await,
            RateLimitDecision::Blocked { .. }
        ));
        assert_eq!(gate.check(&b).await, RateLimitDecision::Allowed);
    }
}
