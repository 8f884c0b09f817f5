//! Login-risk analysis: pattern extraction, anomaly detection, scoring.
//!
//! Flow Overview: history window → [`pattern::LoginPatternAnalyzer`] →
//! [`anomaly::SecurityAnomalyDetector`] → [`score::RiskScorer`] →
//! [`score::SecurityAnalysis`]. Per-login analysis runs inline on the
//! login path; fleet-wide sweeps run as an independently scheduled
//! background task ([`sweep`]).

pub mod anomaly;
pub mod pattern;
pub mod score;
pub mod sweep;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::AuthResult;
use crate::store::{Clock, LoginEvent, LoginHistoryStore};
use anomaly::SecurityAnomalyDetector;
use pattern::build_pattern;
use score::{RiskScorer, SecurityAnalysis};

/// Evaluate one probe event against the pattern built from the events
/// preceding it.
#[must_use]
pub(crate) fn evaluate_event(
    config: &EngineConfig,
    principal_id: Uuid,
    prior_events: &[LoginEvent],
    probe: &LoginEvent,
    analyzed_at: DateTime<Utc>,
    window_days: u32,
) -> SecurityAnalysis {
    let pattern = build_pattern(principal_id, prior_events, config.min_pattern_samples());
    let anomalies = SecurityAnomalyDetector::from_config(config).detect(&pattern, probe);
    RiskScorer::new(config.clone()).score(principal_id, anomalies, analyzed_at, window_days)
}

/// On-demand and sweep-driven risk analysis over the login history.
pub struct RiskEngine<H: LoginHistoryStore> {
    history: Arc<H>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
}

impl<H: LoginHistoryStore> RiskEngine<H> {
    #[must_use]
    pub fn new(history: Arc<H>, config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            history,
            config: config.normalize(),
            clock,
        }
    }

    /// Principals eligible for a fleet-wide sweep.
    pub async fn sweep_targets(&self) -> AuthResult<Vec<Uuid>> {
        Ok(self.history.principal_ids().await?)
    }

    /// Analyze the principal's most recent login against the pattern of
    /// the logins before it. Fails if the history store is unavailable.
    pub async fn try_analyze(
        &self,
        principal_id: Uuid,
        window_days: u32,
    ) -> AuthResult<SecurityAnalysis> {
        let analyzed_at = self.clock.now();
        let mut events = self.history.query(principal_id, window_days).await?;
        events.sort_by_key(|event| event.timestamp);

        let Some(probe) = events.pop() else {
            return Ok(SecurityAnalysis::empty(principal_id, analyzed_at, window_days));
        };
        Ok(evaluate_event(
            &self.config,
            principal_id,
            &events,
            &probe,
            analyzed_at,
            window_days,
        ))
    }

    /// Like [`Self::try_analyze`], but degrades to an empty analysis when
    /// history is unavailable instead of blocking the caller.
    pub async fn analyze_login_security(
        &self,
        principal_id: Uuid,
        window_days: u32,
    ) -> SecurityAnalysis {
        match self.try_analyze(principal_id, window_days).await {
            Ok(analysis) => analysis,
            Err(err) => {
                warn!(%principal_id, "risk analysis degraded to empty: {err}");
                SecurityAnalysis::empty(principal_id, self.clock.now(), window_days)
            }
        }
    }
}
