//! Typed, severity-graded login anomalies and their detector.
//!
//! Detection only runs against an established pattern; a new account with
//! thin history produces zero anomalies no matter how unusual the login
//! looks.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::EngineConfig;
use crate::error::AuthError;
use crate::risk::pattern::{circular_hour_distance, fractional_hour, LoginPattern};
use crate::store::LoginEvent;

/// Closed severity scale. External inputs go through `FromStr`, which
/// rejects anything outside the scale.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = AuthError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(AuthError::InvalidSeverity(other.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    UnusualHour,
    UnusualDay,
    NewDevice,
    FrequencyAnomaly,
}

impl AnomalyType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnusualHour => "unusual_hour",
            Self::UnusualDay => "unusual_day",
            Self::NewDevice => "new_device",
            Self::FrequencyAnomaly => "frequency_anomaly",
        }
    }
}

/// A detected deviation between a login event and the principal's
/// established behavioral pattern.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecurityAnomaly {
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

/// Compares a login event against a behavioral pattern.
pub struct SecurityAnomalyDetector {
    unusual_hour_threshold: f64,
    common_day_count: usize,
    frequency_low_ratio: f64,
    frequency_high_ratio: f64,
}

impl SecurityAnomalyDetector {
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            unusual_hour_threshold: config.unusual_hour_threshold(),
            common_day_count: config.common_day_count(),
            frequency_low_ratio: config.frequency_low_ratio(),
            frequency_high_ratio: config.frequency_high_ratio(),
        }
    }

    /// Emit zero or more anomalies for `event` against `pattern`.
    #[must_use]
    pub fn detect(&self, pattern: &LoginPattern, event: &LoginEvent) -> Vec<SecurityAnomaly> {
        if !pattern.has_established_pattern() {
            return Vec::new();
        }

        let mut anomalies = Vec::new();

        if let Some(average_hour) = pattern.average_hour {
            let hour = fractional_hour(event.timestamp);
            let deviation = circular_hour_distance(hour, average_hour);
            if deviation > self.unusual_hour_threshold {
                anomalies.push(SecurityAnomaly {
                    anomaly_type: AnomalyType::UnusualHour,
                    severity: Severity::Medium,
                    description: format!(
                        "login at hour {hour:.1} deviates {deviation:.1}h from typical hour {average_hour:.1}"
                    ),
                    timestamp: event.timestamp,
                    metadata: Some(json!({
                        "expected_hour": average_hour,
                        "actual_hour": hour,
                        "deviation_hours": deviation,
                    })),
                });
            }
        }

        if !pattern.common_days.is_empty() {
            let top = pattern
                .common_days
                .iter()
                .take(self.common_day_count)
                .collect::<Vec<_>>();
            let weekday = event.timestamp.weekday();
            if !top.contains(&&weekday) {
                anomalies.push(SecurityAnomaly {
                    anomaly_type: AnomalyType::UnusualDay,
                    severity: Severity::Low,
                    description: format!("login on {weekday} is outside the usual days"),
                    timestamp: event.timestamp,
                    metadata: Some(json!({ "weekday": weekday.to_string() })),
                });
            }
        }

        // A new device is a stronger signal than time or day drift.
        if let Some(fingerprint) = &event.device_fingerprint {
            if !pattern.device_pattern.is_empty()
                && !pattern.device_pattern.contains_key(fingerprint)
            {
                anomalies.push(SecurityAnomaly {
                    anomaly_type: AnomalyType::NewDevice,
                    severity: Severity::High,
                    description: "login from a device not seen before".to_string(),
                    timestamp: event.timestamp,
                    metadata: Some(json!({ "device_fingerprint": fingerprint })),
                });
            }
        }

        if let (Some(average), Some(last_login_at)) =
            (pattern.average_frequency_hours, pattern.last_login_at)
        {
            if average > 0.0 {
                let gap_hours =
                    (event.timestamp - last_login_at).num_seconds() as f64 / 3600.0;
                if gap_hours >= 0.0
                    && (gap_hours < average * self.frequency_low_ratio
                        || gap_hours > average * self.frequency_high_ratio)
                {
                    anomalies.push(SecurityAnomaly {
                        anomaly_type: AnomalyType::FrequencyAnomaly,
                        severity: Severity::Medium,
                        description: format!(
                            "interval of {gap_hours:.1}h since last login deviates from the typical {average:.1}h"
                        ),
                        timestamp: event.timestamp,
                        metadata: Some(json!({
                            "gap_hours": gap_hours,
                            "average_hours": average,
                        })),
                    });
                }
            }
        }

        anomalies
    }
}
