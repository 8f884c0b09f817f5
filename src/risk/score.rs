//! Risk aggregation: bounded score, level buckets, and recommendations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::AuthError;
use crate::risk::anomaly::{AnomalyType, SecurityAnomaly, Severity};

/// Risk level derived from the bounded score.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Bucket boundaries: `>=0.8` critical, `>=0.6` high, `>=0.3` medium,
    /// `>0` low, `0` none.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::Critical
        } else if score >= 0.6 {
            Self::High
        } else if score >= 0.3 {
            Self::Medium
        } else if score > 0.0 {
            Self::Low
        } else {
            Self::None
        }
    }
}

/// Recommendation priority; mirrors the severity of the anomaly it
/// addresses.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl From<Severity> for Priority {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Low => Self::Low,
            Severity::Medium => Self::Medium,
            Severity::High => Self::High,
            Severity::Critical => Self::Critical,
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = AuthError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(AuthError::InvalidPriority(other.to_string())),
        }
    }
}

/// An actionable security recommendation generated from detected anomalies.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecurityRecommendation {
    pub recommendation_type: String,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    pub actions: Vec<String>,
}

/// The derived analysis result. Recomputed per request, never an entity of
/// record; callers may cache it with a short TTL.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecurityAnalysis {
    pub principal_id: Uuid,
    pub anomalies: Vec<SecurityAnomaly>,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub recommendations: Vec<SecurityRecommendation>,
    pub analyzed_at: DateTime<Utc>,
    pub window_days: u32,
}

impl SecurityAnalysis {
    /// Analysis with no findings; also the degraded result when history is
    /// unavailable.
    #[must_use]
    pub fn empty(principal_id: Uuid, analyzed_at: DateTime<Utc>, window_days: u32) -> Self {
        Self {
            principal_id,
            anomalies: Vec::new(),
            risk_score: 0.0,
            risk_level: RiskLevel::None,
            recommendations: Vec::new(),
            analyzed_at,
            window_days,
        }
    }
}

/// Aggregates anomalies into a bounded score plus recommendations.
pub struct RiskScorer {
    config: EngineConfig,
}

impl RiskScorer {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Additive severity weights, clamped into `[0, 1]`. Monotonic: adding
    /// an anomaly never lowers the score.
    #[must_use]
    pub fn risk_score(&self, anomalies: &[SecurityAnomaly]) -> f64 {
        let total: f64 = anomalies
            .iter()
            .map(|anomaly| self.config.severity_weight(anomaly.severity))
            .sum();
        total.clamp(0.0, 1.0)
    }

    #[must_use]
    pub fn score(
        &self,
        principal_id: Uuid,
        anomalies: Vec<SecurityAnomaly>,
        analyzed_at: DateTime<Utc>,
        window_days: u32,
    ) -> SecurityAnalysis {
        let risk_score = self.risk_score(&anomalies);
        let recommendations = recommendations_for(&anomalies);
        SecurityAnalysis {
            principal_id,
            risk_level: RiskLevel::from_score(risk_score),
            risk_score,
            anomalies,
            recommendations,
            analyzed_at,
            window_days,
        }
    }
}

/// One recommendation per anomaly type present, keeping the highest
/// priority when a type occurs more than once.
fn recommendations_for(anomalies: &[SecurityAnomaly]) -> Vec<SecurityRecommendation> {
    let mut recommendations: Vec<SecurityRecommendation> = Vec::new();
    for anomaly in anomalies {
        let candidate = recommendation_for(anomaly);
        match recommendations
            .iter_mut()
            .find(|existing| existing.recommendation_type == candidate.recommendation_type)
        {
            Some(existing) => {
                if candidate.priority > existing.priority {
                    *existing = candidate;
                }
            }
            None => recommendations.push(candidate),
        }
    }
    recommendations.sort_by(|a, b| b.priority.cmp(&a.priority));
    recommendations
}

fn recommendation_for(anomaly: &SecurityAnomaly) -> SecurityRecommendation {
    let priority = Priority::from(anomaly.severity);
    match anomaly.anomaly_type {
        AnomalyType::UnusualHour => SecurityRecommendation {
            recommendation_type: "verify_signin_time".to_string(),
            priority,
            title: "Review sign-in time".to_string(),
            description: "A login happened well outside this account's typical hours.".to_string(),
            actions: vec![
                "Confirm the sign-in was yours".to_string(),
                "Rotate the password if it was not".to_string(),
            ],
        },
        AnomalyType::UnusualDay => SecurityRecommendation {
            recommendation_type: "verify_signin_day".to_string(),
            priority,
            title: "Review sign-in day".to_string(),
            description: "A login happened on a day this account rarely signs in.".to_string(),
            actions: vec!["Confirm the sign-in was yours".to_string()],
        },
        AnomalyType::NewDevice => SecurityRecommendation {
            recommendation_type: "verify_device".to_string(),
            priority,
            title: "Verify new device".to_string(),
            description: "A login came from a device this account has never used.".to_string(),
            actions: vec![
                "Verify the new device".to_string(),
                "Enable two-factor authentication".to_string(),
                "Revoke unrecognized sessions".to_string(),
            ],
        },
        AnomalyType::FrequencyAnomaly => SecurityRecommendation {
            recommendation_type: "review_activity".to_string(),
            priority,
            title: "Review recent activity".to_string(),
            description: "Login frequency deviates sharply from this account's baseline."
                .to_string(),
            actions: vec![
                "Review recent account activity".to_string(),
                "Check for automated access".to_string(),
            ],
        },
    }
}
