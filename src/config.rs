//! Engine configuration.
//!
//! Rate-limit policy and token lifetimes are contractual defaults; the
//! anomaly thresholds and severity weights are tunable reconstructions and
//! should be adjusted against observed login traffic rather than treated as
//! fixed. `normalize()` clamps degenerate values so a bad override cannot
//! disable brute-force protection or produce out-of-range risk scores.

use std::time::Duration;

use crate::risk::anomaly::Severity;

/// Fixed administrative abilities carried by every platform session token.
pub const PLATFORM_ABILITIES: &[&str] = &[
    "platform:admin",
    "platform:tenants:manage",
    "platform:principals:manage",
];

/// Baseline ability carried by every tenant session token in addition to
/// the aggregated role abilities.
pub const TENANT_BASELINE_ABILITY: &str = "tenant:access";

#[derive(Clone, Debug)]
pub struct EngineConfig {
    max_failures: u64,
    failure_window: Duration,
    platform_token_ttl: Duration,
    tenant_token_ttl: Duration,
    analysis_window_days: u32,
    min_pattern_samples: usize,
    unusual_hour_threshold: f64,
    common_day_count: usize,
    frequency_low_ratio: f64,
    frequency_high_ratio: f64,
    weight_low: f64,
    weight_medium: f64,
    weight_high: f64,
    weight_critical: f64,
    backup_code_count: usize,
    totp_issuer: String,
}

impl EngineConfig {
    /// Default policy: 5 failures per 60s window, 24h platform sessions,
    /// 8h tenant sessions, pattern established at 5 successful logins.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_failures: 5,
            failure_window: Duration::from_secs(60),
            platform_token_ttl: Duration::from_secs(86_400),
            tenant_token_ttl: Duration::from_secs(28_800),
            analysis_window_days: 90,
            min_pattern_samples: 5,
            unusual_hour_threshold: 4.0,
            common_day_count: 3,
            frequency_low_ratio: 0.1,
            frequency_high_ratio: 5.0,
            weight_low: 0.1,
            weight_medium: 0.3,
            weight_high: 0.6,
            weight_critical: 1.0,
            backup_code_count: 10,
            totp_issuer: "gardisto".to_string(),
        }
    }

    #[must_use]
    pub fn with_max_failures(mut self, max_failures: u64) -> Self {
        self.max_failures = max_failures;
        self
    }

    #[must_use]
    pub fn with_failure_window_seconds(mut self, seconds: u64) -> Self {
        self.failure_window = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_platform_token_ttl_seconds(mut self, seconds: u64) -> Self {
        self.platform_token_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_tenant_token_ttl_seconds(mut self, seconds: u64) -> Self {
        self.tenant_token_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_analysis_window_days(mut self, days: u32) -> Self {
        self.analysis_window_days = days;
        self
    }

    #[must_use]
    pub fn with_min_pattern_samples(mut self, samples: usize) -> Self {
        self.min_pattern_samples = samples;
        self
    }

    #[must_use]
    pub fn with_unusual_hour_threshold(mut self, hours: f64) -> Self {
        self.unusual_hour_threshold = hours;
        self
    }

    #[must_use]
    pub fn with_common_day_count(mut self, count: usize) -> Self {
        self.common_day_count = count;
        self
    }

    #[must_use]
    pub fn with_frequency_ratios(mut self, low: f64, high: f64) -> Self {
        self.frequency_low_ratio = low;
        self.frequency_high_ratio = high;
        self
    }

    #[must_use]
    pub fn with_severity_weights(mut self, low: f64, medium: f64, high: f64, critical: f64) -> Self {
        self.weight_low = low;
        self.weight_medium = medium;
        self.weight_high = high;
        self.weight_critical = critical;
        self
    }

    #[must_use]
    pub fn with_backup_code_count(mut self, count: usize) -> Self {
        self.backup_code_count = count;
        self
    }

    #[must_use]
    pub fn with_totp_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.totp_issuer = issuer.into();
        self
    }

    /// Clamp degenerate overrides to safe values.
    #[must_use]
    pub fn normalize(mut self) -> Self {
        self.max_failures = self.max_failures.max(1);
        if self.failure_window.is_zero() {
            self.failure_window = Duration::from_secs(1);
        }
        if self.platform_token_ttl.is_zero() {
            self.platform_token_ttl = Duration::from_secs(86_400);
        }
        if self.tenant_token_ttl.is_zero() {
            self.tenant_token_ttl = Duration::from_secs(28_800);
        }
        self.analysis_window_days = self.analysis_window_days.max(1);
        self.min_pattern_samples = self.min_pattern_samples.max(1);
        self.unusual_hour_threshold = self.unusual_hour_threshold.clamp(0.0, 12.0);
        self.common_day_count = self.common_day_count.clamp(1, 7);
        self.frequency_low_ratio = self.frequency_low_ratio.clamp(0.0, 1.0);
        if self.frequency_high_ratio < 1.0 {
            self.frequency_high_ratio = 1.0;
        }
        self.weight_low = self.weight_low.clamp(0.0, 1.0);
        self.weight_medium = self.weight_medium.clamp(0.0, 1.0);
        self.weight_high = self.weight_high.clamp(0.0, 1.0);
        self.weight_critical = self.weight_critical.clamp(0.0, 1.0);
        self.backup_code_count = self.backup_code_count.max(1);
        if self.totp_issuer.is_empty() {
            self.totp_issuer = "gardisto".to_string();
        }
        self
    }

    #[must_use]
    pub fn max_failures(&self) -> u64 {
        self.max_failures
    }

    #[must_use]
    pub fn failure_window(&self) -> Duration {
        self.failure_window
    }

    #[must_use]
    pub fn platform_token_ttl(&self) -> Duration {
        self.platform_token_ttl
    }

    #[must_use]
    pub fn tenant_token_ttl(&self) -> Duration {
        self.tenant_token_ttl
    }

    #[must_use]
    pub fn analysis_window_days(&self) -> u32 {
        self.analysis_window_days
    }

    #[must_use]
    pub fn min_pattern_samples(&self) -> usize {
        self.min_pattern_samples
    }

    #[must_use]
    pub fn unusual_hour_threshold(&self) -> f64 {
        self.unusual_hour_threshold
    }

    #[must_use]
    pub fn common_day_count(&self) -> usize {
        self.common_day_count
    }

    #[must_use]
    pub fn frequency_low_ratio(&self) -> f64 {
        self.frequency_low_ratio
    }

    #[must_use]
    pub fn frequency_high_ratio(&self) -> f64 {
        self.frequency_high_ratio
    }

    #[must_use]
    pub fn backup_code_count(&self) -> usize {
        self.backup_code_count
    }

    #[must_use]
    pub fn totp_issuer(&self) -> &str {
        &self.totp_issuer
    }

    /// Additive risk weight contributed by one anomaly of the given severity.
    #[must_use]
    pub fn severity_weight(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Low => self.weight_low,
            Severity::Medium => self.weight_medium,
            Severity::High => self.weight_high,
            Severity::Critical => self.weight_critical,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::EngineConfig;
    use crate::risk::anomaly::Severity;

    #[test]
    fn defaults_match_policy() {
        let config = EngineConfig::new();
        assert_eq!(config.max_failures(), 5);
        assert_eq!(config.failure_window().as_secs(), 60);
        assert_eq!(config.platform_token_ttl().as_secs(), 86_400);
        assert_eq!(config.tenant_token_ttl().as_secs(), 28_800);
        assert_eq!(config.min_pattern_samples(), 5);
    }

    #[test]
    fn normalize_clamps_degenerate_values() {
        let config = EngineConfig::new()
            .with_max_failures(0)
            .with_failure_window_seconds(0)
            .with_common_day_count(0)
            .with_frequency_ratios(-1.0, 0.5)
            .with_severity_weights(-0.5, 2.0, 0.6, 1.0)
            .normalize();
        assert_eq!(config.max_failures(), 1);
        assert_eq!(config.failure_window().as_secs(), 1);
        assert_eq!(config.common_day_count(), 1);
        assert_eq!(config.frequency_low_ratio(), 0.0);
        assert_eq!(config.frequency_high_ratio(), 1.0);
        assert_eq!(config.severity_weight(Severity::Low), 0.0);
        assert_eq!(config.severity_weight(Severity::Medium), 1.0);
    }

    #[test]
    fn severity_weights_have_default_policy_values() {
        let config = EngineConfig::new();
        assert_eq!(config.severity_weight(Severity::Low), 0.1);
        assert_eq!(config.severity_weight(Severity::Medium), 0.3);
        assert_eq!(config.severity_weight(Severity::High), 0.6);
        assert_eq!(config.severity_weight(Severity::Critical), 1.0);
    }
}
