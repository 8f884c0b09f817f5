//! Behavioral login-pattern extraction.
//!
//! The pattern is ephemeral: recomputed from the rolling history window on
//! every analysis, never persisted. Below the minimum sample count the
//! pattern is not "established" and all derived fields stay empty, which
//! suppresses anomaly detection for new accounts.

use std::collections::HashMap;
use std::f64::consts::TAU;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthResult;
use crate::store::{LoginEvent, LoginHistoryStore, LoginOutcome};

/// Statistical profile of a principal's successful logins.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoginPattern {
    pub principal_id: Uuid,
    /// Successful events observed within the window.
    pub sample_count: usize,
    /// Circular mean of login hour-of-day, in `[0, 24)`. Circular rather
    /// than linear so 23:00 and 01:00 average to midnight, not noon.
    pub average_hour: Option<f64>,
    /// Weekdays ordered by descending login frequency.
    pub common_days: Vec<Weekday>,
    /// Mean interval between consecutive successful logins, in hours.
    pub average_frequency_hours: Option<f64>,
    /// Device fingerprint frequency map.
    pub device_pattern: HashMap<String, usize>,
    /// Timestamp of the most recent successful login.
    pub last_login_at: Option<DateTime<Utc>>,
    min_samples: usize,
}

impl LoginPattern {
    /// Empty pattern for a principal without enough history.
    #[must_use]
    pub fn empty(principal_id: Uuid, min_samples: usize) -> Self {
        Self {
            principal_id,
            sample_count: 0,
            average_hour: None,
            common_days: Vec::new(),
            average_frequency_hours: None,
            device_pattern: HashMap::new(),
            last_login_at: None,
            min_samples,
        }
    }

    /// True once the minimum sample count has been observed. Anomaly
    /// detection is suppressed below this threshold.
    #[must_use]
    pub fn has_established_pattern(&self) -> bool {
        self.sample_count >= self.min_samples
    }
}

/// Fractional hour-of-day for a timestamp, e.g. 9.5 for 09:30.
#[must_use]
pub(crate) fn fractional_hour(timestamp: DateTime<Utc>) -> f64 {
    f64::from(timestamp.hour()) + f64::from(timestamp.minute()) / 60.0
}

/// Shortest distance between two hours on the 24h circle.
#[must_use]
pub(crate) fn circular_hour_distance(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(24.0);
    diff.min(24.0 - diff)
}

fn circular_mean_hour(hours: &[f64]) -> Option<f64> {
    if hours.is_empty() {
        return None;
    }
    let (sin_sum, cos_sum) = hours.iter().fold((0.0_f64, 0.0_f64), |(s, c), hour| {
        let angle = hour / 24.0 * TAU;
        (s + angle.sin(), c + angle.cos())
    });
    let mean_angle = sin_sum.atan2(cos_sum);
    Some((mean_angle / TAU * 24.0).rem_euclid(24.0))
}

/// Build a pattern from a window of events. Only successful events
/// contribute; failures carry no behavioral signal worth modeling here.
#[must_use]
pub fn build_pattern(principal_id: Uuid, events: &[LoginEvent], min_samples: usize) -> LoginPattern {
    let mut successes: Vec<&LoginEvent> = events
        .iter()
        .filter(|event| event.outcome == LoginOutcome::Success)
        .collect();
    successes.sort_by_key(|event| event.timestamp);

    if successes.len() < min_samples {
        let mut pattern = LoginPattern::empty(principal_id, min_samples);
        pattern.sample_count = successes.len();
        return pattern;
    }

    let hours: Vec<f64> = successes
        .iter()
        .map(|event| fractional_hour(event.timestamp))
        .collect();

    let mut day_counts: HashMap<Weekday, usize> = HashMap::new();
    for event in &successes {
        *day_counts.entry(event.timestamp.weekday()).or_default() += 1;
    }
    let mut common_days: Vec<(Weekday, usize)> = day_counts.into_iter().collect();
    // Descending frequency; weekday number breaks ties deterministically.
    common_days.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| a.0.num_days_from_monday().cmp(&b.0.num_days_from_monday()))
    });
    let common_days: Vec<Weekday> = common_days.into_iter().map(|(day, _)| day).collect();

    let gaps: Vec<f64> = successes
        .windows(2)
        .map(|pair| {
            let delta = pair[1].timestamp - pair[0].timestamp;
            delta.num_seconds() as f64 / 3600.0
        })
        .collect();
    let average_frequency_hours = if gaps.is_empty() {
        None
    } else {
        Some(gaps.iter().sum::<f64>() / gaps.len() as f64)
    };

    let mut device_pattern: HashMap<String, usize> = HashMap::new();
    for event in &successes {
        if let Some(fingerprint) = &event.device_fingerprint {
            *device_pattern.entry(fingerprint.clone()).or_default() += 1;
        }
    }

    LoginPattern {
        principal_id,
        sample_count: successes.len(),
        average_hour: circular_mean_hour(&hours),
        common_days,
        average_frequency_hours,
        device_pattern,
        last_login_at: successes.last().map(|event| event.timestamp),
        min_samples,
    }
}

/// Derives [`LoginPattern`]s from the external login-history reader.
pub struct LoginPatternAnalyzer<H: LoginHistoryStore> {
    history: Arc<H>,
    min_samples: usize,
}

impl<H: LoginHistoryStore> LoginPatternAnalyzer<H> {
    #[must_use]
    pub fn new(history: Arc<H>, min_samples: usize) -> Self {
        Self {
            history,
            min_samples,
        }
    }

    pub async fn analyze(&self, principal_id: Uuid, window_days: u32) -> AuthResult<LoginPattern> {
        let events = self.history.query(principal_id, window_days).await?;
        Ok(build_pattern(principal_id, &events, self.min_samples))
    }
}
