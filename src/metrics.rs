//! C10 — metrics and state persistence. EMA-smoothed latency/drift
//! counters, a failure-reason histogram, and atomic (write-to-temp-then-
//! rename) JSON snapshots for both the metrics stream and the reputation/
//! controller state.

use std::path::Path;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{info, warn};

use crate::controller::ControllerState;
use crate::error::FailureReason;
use crate::reputation::ReputationGate;

const EMA_ALPHA: f64 = 0.2;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailureReasonCounts {
    pub preflight: u64,
    pub execution: u64,
    pub post_trade: u64,
    pub hedge: u64,
    pub unknown: u64,
}

impl FailureReasonCounts {
    fn increment(&mut self, reason: FailureReason) {
        match reason {
            FailureReason::Preflight => self.preflight += 1,
            FailureReason::Execution => self.execution += 1,
            FailureReason::PostTrade => self.post_trade += 1,
            FailureReason::Hedge => self.hedge += 1,
            FailureReason::Unknown => self.unknown += 1,
        }
    }
}

/// Process-wide metrics (§3 "Metrics"), flushed to disk subject to a
/// throttle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub failure_reasons: FailureReasonCounts,
    pub ema_preflight_ms: f64,
    pub ema_exec_ms: f64,
    pub ema_total_ms: f64,
    pub ema_post_trade_drift_bps: f64,
    pub post_trade_alerts: u64,
    pub soft_blocks: u64,
    pub last_error: Option<String>,
    #[serde(skip)]
    last_flush_ms: i64,
}

fn ema(current: f64, sample: f64) -> f64 {
    if current == 0.0 {
        sample
    } else {
        EMA_ALPHA * sample + (1.0 - EMA_ALPHA) * current
    }
}

impl Metrics {
    pub fn record_attempt_start(&mut self) {
        self.attempts += 1;
    }

    pub fn record_success(&mut self) {
        self.successes += 1;
    }

    pub fn record_failure(&mut self, reason: FailureReason, message: &str) {
        self.failures += 1;
        self.failure_reasons.increment(reason);
        self.last_error = Some(message.to_string());
        if message.contains("soft block") {
            self.soft_blocks += 1;
        }
    }

    pub fn record_preflight_latency_ms(&mut self, ms: f64) {
        self.ema_preflight_ms = ema(self.ema_preflight_ms, ms);
    }

    pub fn record_exec_latency_ms(&mut self, ms: f64) {
        self.ema_exec_ms = ema(self.ema_exec_ms, ms);
    }

    pub fn record_total_latency_ms(&mut self, ms: f64) {
        self.ema_total_ms = ema(self.ema_total_ms, ms);
    }

    pub fn record_post_trade_drift_bps(&mut self, bps: f64) {
        self.ema_post_trade_drift_bps = ema(self.ema_post_trade_drift_bps, bps);
    }

    pub fn record_post_trade_alert(&mut self) {
        self.post_trade_alerts += 1;
    }

    /// Whether `metrics_flush_ms` has elapsed since the last flush.
    pub fn due_for_flush(&self, now_ms: i64, flush_interval_ms: u64) -> bool {
        now_ms - self.last_flush_ms > flush_interval_ms as i64
    }

    pub fn mark_flushed(&mut self, now_ms: i64) {
        self.last_flush_ms = now_ms;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub version: u32,
    pub ts: i64,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub version: u32,
    pub ts: i64,
    pub controller: ControllerState,
    pub reputation: ReputationGate,
}

/// Writes `value` to `path` atomically: serialise to pretty JSON, write to a
/// `.tmp` sibling file, then rename over the real path so readers never see
/// a torn write.
pub fn save_atomic<T: Serialize>(path: impl AsRef<Path>, value: &T) -> anyhow::Result<()> {
    let path = path.as_ref();
    let content = serde_json::to_string_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Reads and deserialises `path` if it exists; returns `None` if the file
/// is absent, and logs (without failing) if it exists but is unreadable or
/// malformed.
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Option<T> {
    let path = path.as_ref();
    if !path.exists() {
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to parse persisted state, starting fresh");
                None
            }
        },
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to read persisted state, starting fresh");
            None
        }
    }
}

/// Flushes metrics and state snapshots if due, clamping any restored
/// controller scalar that fell outside its bound and dropping expired
/// blocks — called on startup and after every attempt.
pub fn flush_if_due(
    metrics_path: &str,
    state_path: &str,
    metrics: &mut Metrics,
    controller: &ControllerState,
    reputation: &ReputationGate,
    now_ms: i64,
    flush_interval_ms: u64,
) {
    if !metrics.due_for_flush(now_ms, flush_interval_ms) {
        return;
    }
    let metrics_snapshot = MetricsSnapshot {
        version: 1,
        ts: now_ms,
        metrics: metrics.clone(),
    };
    if let Err(err) = save_atomic(metrics_path, &metrics_snapshot) {
        warn!(error = %err, "failed to flush metrics snapshot");
    }

    let state_snapshot = StateSnapshot {
        version: 1,
        ts: now_ms,
        controller: controller.clone(),
        reputation: reputation.clone(),
    };
    if let Err(err) = save_atomic(state_path, &state_snapshot) {
        warn!(error = %err, "failed to flush state snapshot");
    }

    metrics.mark_flushed(now_ms);
    info!(path = metrics_path, "metrics flushed");
}

/// Restores controller/reputation state from disk if present. Any scalar
/// outside its configured bound is clamped; entries are otherwise trusted
/// as-is since `ReputationGate`'s own accessors (`token_score`, gate checks
/// against `*_until_ms`) are naturally tolerant of already-expired
/// deadlines.
pub fn restore_state(state_path: &str, cfg: &crate::config::RouterConfig) -> Option<(ControllerState, ReputationGate)> {
    let snapshot: StateSnapshot = load_json(state_path)?;
    let mut controller = snapshot.controller;
    controller.chunk_factor = controller.chunk_factor.clamp(cfg.chunk.chunk_factor_min, cfg.chunk.chunk_factor_max);
    controller.retry_factor = controller.retry_factor.clamp(cfg.retry.retry_factor_min, cfg.retry.retry_factor_max);
    controller.quality_score = controller.quality_score.clamp(cfg.reputation.auto_tune_min_factor, cfg.reputation.auto_tune_max_factor);
    controller.depth_ratio_penalty = controller.depth_ratio_penalty.clamp(0.0, cfg.reputation.depth_ratio_penalty_max);
    if !controller.chunk_factor.is_finite() {
        controller.chunk_factor = cfg.chunk.chunk_factor_max;
    }
    Some((controller, snapshot.reputation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn ema_seeds_from_first_sample() {
        let mut m = Metrics::default();
        m.record_preflight_latency_ms(40.0);
        assert_eq!(m.ema_preflight_ms, 40.0);
        m.record_preflight_latency_ms(60.0);
        assert!((m.ema_preflight_ms - 44.0).abs() < 1e-9);
    }

    #[test]
    fn atomic_write_then_read_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        let snapshot = MetricsSnapshot { version: 1, ts: 123, metrics: Metrics::default() };
        save_atomic(&path, &snapshot).unwrap();
        let restored: MetricsSnapshot = load_json(&path).unwrap();
        assert_eq!(restored.ts, 123);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn load_json_returns_none_for_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let restored: Option<Metrics> = load_json(&path);
        assert!(restored.is_none());
    }

    #[test]
    fn due_for_flush_respects_interval() {
        let mut m = Metrics::default();
        assert!(m.due_for_flush(1_000, 500));
        m.mark_flushed(1_000);
        assert!(!m.due_for_flush(1_200, 500));
        assert!(m.due_for_flush(1_600, 500));
    }

    #[test]
    fn restore_state_clamps_out_of_bound_scalars() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let cfg = crate::config::RouterConfig::default();
        let mut controller = ControllerState::new(&cfg);
        controller.chunk_factor = 99.0;
        let snapshot = StateSnapshot { version: 1, ts: 0, controller, reputation: ReputationGate::new() };
        save_atomic(&path, &snapshot).unwrap();
        let (restored, _) = restore_state(path.to_str().unwrap(), &cfg).unwrap();
        assert!(restored.chunk_factor <= cfg.chunk.chunk_factor_max);
    }
}
