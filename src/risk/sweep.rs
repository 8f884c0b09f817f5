//! Background fleet-wide risk sweep.
//!
//! Flow Overview:
//! 1) On a fixed cadence, enumerate principals with login history.
//! 2) Recompute each principal's `SecurityAnalysis`, retrying history
//!    failures with exponential backoff and jitter.
//! 3) Publish completed analyses to an [`AnalysisSink`].
//!
//! The sweep runs on its own task so analysis latency never couples to the
//! login request path. Shutdown is cooperative via a watch channel; only
//! complete analyses ever reach the sink, so cancellation cannot leave
//! partial artifacts behind.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info};

use crate::risk::score::SecurityAnalysis;
use crate::risk::RiskEngine;
use crate::store::LoginHistoryStore;

/// Destination for sweep results. Implementations may persist, alert, or
/// forward to a queue.
pub trait AnalysisSink: Send + Sync {
    /// Publish one completed analysis or return an error to have it
    /// logged and dropped.
    fn publish(&self, analysis: &SecurityAnalysis) -> Result<()>;
}

/// Default sink that logs the analysis summary.
#[derive(Clone, Debug)]
pub struct LogAnalysisSink;

impl AnalysisSink for LogAnalysisSink {
    fn publish(&self, analysis: &SecurityAnalysis) -> Result<()> {
        info!(
            principal_id = %analysis.principal_id,
            risk_score = analysis.risk_score,
            risk_level = ?analysis.risk_level,
            anomalies = analysis.anomalies.len(),
            "risk sweep analysis"
        );
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SweepConfig {
    interval: Duration,
    window_days: u32,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl SweepConfig {
    /// Default sweep: hourly, 90-day window, 3 attempts per principal,
    /// 2s->60s backoff with jitter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            window_days: 90,
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
            backoff_max: Duration::from_secs(60),
        }
    }

    #[must_use]
    pub fn with_interval_seconds(mut self, seconds: u64) -> Self {
        self.interval = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_window_days(mut self, days: u32) -> Self {
        self.window_days = days;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_backoff_seconds(mut self, base: u64, max: u64) -> Self {
        self.backoff_base = Duration::from_secs(base);
        self.backoff_max = Duration::from_secs(max);
        self
    }

    #[must_use]
    pub fn normalize(mut self) -> Self {
        if self.interval.is_zero() {
            self.interval = Duration::from_secs(1);
        }
        self.window_days = self.window_days.max(1);
        self.max_attempts = self.max_attempts.max(1);
        if self.backoff_base.is_zero() {
            self.backoff_base = Duration::from_secs(1);
        }
        if self.backoff_max < self.backoff_base {
            self.backoff_max = self.backoff_base;
        }
        self
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn the background sweep task. Send `true` on the watch channel to
/// stop it.
pub fn spawn_risk_sweep<H>(
    engine: Arc<RiskEngine<H>>,
    sink: Arc<dyn AnalysisSink>,
    config: SweepConfig,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()>
where
    H: LoginHistoryStore + 'static,
{
    tokio::spawn(async move {
        let config = config.normalize();
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    // A dropped sender means no stop signal can ever
                    // arrive; treat the closed channel as shutdown.
                    if changed.is_err() || *shutdown.borrow() {
                        info!("risk sweep shutting down");
                        return;
                    }
                }
                () = sleep(config.interval) => {
                    run_sweep(&engine, sink.as_ref(), &config, &mut shutdown).await;
                }
            }
        }
    })
}

/// One full pass over the fleet. Checks the shutdown flag between
/// principals so a stop request never waits on a long sweep.
pub async fn run_sweep<H: LoginHistoryStore>(
    engine: &RiskEngine<H>,
    sink: &dyn AnalysisSink,
    config: &SweepConfig,
    shutdown: &mut watch::Receiver<bool>,
) {
    let targets = match engine.sweep_targets().await {
        Ok(targets) => targets,
        Err(err) => {
            error!("risk sweep could not enumerate principals: {err}");
            return;
        }
    };

    for principal_id in targets {
        if *shutdown.borrow() {
            info!("risk sweep interrupted by shutdown");
            return;
        }
        let analysis = analyze_with_retry(engine, principal_id, config, shutdown).await;
        if let Err(err) = sink.publish(&analysis) {
            error!(%principal_id, "risk sweep sink rejected analysis: {err}");
        }
    }
}

async fn analyze_with_retry<H: LoginHistoryStore>(
    engine: &RiskEngine<H>,
    principal_id: uuid::Uuid,
    config: &SweepConfig,
    shutdown: &mut watch::Receiver<bool>,
) -> SecurityAnalysis {
    for attempt in 1..=config.max_attempts {
        match engine.try_analyze(principal_id, config.window_days).await {
            Ok(analysis) => return analysis,
            Err(err) => {
                error!(
                    %principal_id,
                    attempt,
                    "risk sweep analysis attempt failed: {err}"
                );
                if attempt == config.max_attempts {
                    break;
                }
                let delay = backoff_delay(config, attempt);
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    () = sleep(delay) => {}
                }
            }
        }
    }
    // Degrade rather than block: the sweep moves on with an empty result.
    engine.analyze_login_security(principal_id, config.window_days).await
}

fn backoff_delay(config: &SweepConfig, attempt: u32) -> Duration {
    let exp = config
        .backoff_base
        .saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)));
    let capped = exp.min(config.backoff_max);
    let jitter_ms = rand::thread_rng().gen_range(0..=capped.as_millis().max(1) / 4);
    capped + Duration::from_millis(jitter_ms as u64)
}
