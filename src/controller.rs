//! C9 — self-tuning controller. Every scalar here is process-wide, bounded,
//! and moves toward its relaxed bound on success and its tight bound on
//! failure. Quality score is the master modulator most preflight bps
//! thresholds scale by.

use serde::{Deserialize, Serialize};

use crate::config::RouterConfig;
use crate::error::FailureReason;

/// A bump that grows by a fixed step on failure (capped) and decays by a
/// geometric recover factor on success.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FailureBump {
    pub value: f64,
}

impl FailureBump {
    fn bump(&mut self, step: f64, max: f64) {
        self.value = (self.value + step).min(max);
    }

    fn recover(&mut self, recover_factor: f64) {
        self.value *= recover_factor;
        if self.value < 1e-6 {
            self.value = 0.0;
        }
    }
}

/// Process-wide controller scalars (§3 "Controller state"). All fields stay
/// within their configured bounds by construction — every mutator clamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerState {
    pub chunk_factor: f64,
    pub chunk_delay_ms: f64,
    pub retry_factor: f64,
    pub slippage_bps_dynamic: f64,
    pub stability_bps_dynamic: f64,
    pub retry_delay_ms_dynamic: f64,
    pub profit_bps_bump: FailureBump,
    pub profit_usd_bump: FailureBump,
    pub depth_usd_bump: FailureBump,
    pub min_notional_usd_bump: FailureBump,
    pub depth_ratio_penalty: f64,
    pub quality_score: f64,
    pub net_risk_tighten_factor: f64,
}

impl ControllerState {
    pub fn new(cfg: &RouterConfig) -> Self {
        Self {
            chunk_factor: cfg.chunk.chunk_factor_max,
            chunk_delay_ms: cfg.chunk.chunk_delay_ms as f64,
            retry_factor: cfg.retry.retry_factor_max,
            slippage_bps_dynamic: cfg.preflight.slippage_bps,
            stability_bps_dynamic: cfg.preflight.stability_bps,
            retry_delay_ms_dynamic: cfg.retry.retry_delay_ms as f64,
            profit_bps_bump: FailureBump::default(),
            profit_usd_bump: FailureBump::default(),
            depth_usd_bump: FailureBump::default(),
            min_notional_usd_bump: FailureBump::default(),
            depth_ratio_penalty: 0.0,
            quality_score: cfg.reputation.auto_tune_max_factor,
            net_risk_tighten_factor: cfg.net_risk.net_risk_max_factor,
        }
    }

    /// The effective depth-ratio soft threshold, widened by the current
    /// penalty (§4.9: `baseSoft × (1 + penalty)`).
    pub fn effective_depth_ratio_soft(&self, base_soft: f64) -> f64 {
        base_soft * (1.0 + self.depth_ratio_penalty)
    }

    pub fn on_success(&mut self, cfg: &RouterConfig) {
        let c = &cfg.chunk;
        self.chunk_factor = (self.chunk_factor + c.chunk_factor_up).min(c.chunk_factor_max);
        self.chunk_delay_ms = (self.chunk_delay_ms - c.chunk_delay_down_ms as f64).max(c.chunk_delay_min_ms as f64);

        let r = &cfg.retry;
        self.retry_factor = (self.retry_factor + r.retry_factor_up).min(r.retry_factor_max);

        let a = &cfg.auto_tune;
        self.slippage_bps_dynamic = (self.slippage_bps_dynamic - a.slippage_step_down_bps).max(cfg.preflight.slippage_floor_bps);
        self.stability_bps_dynamic = (self.stability_bps_dynamic - a.stability_step_down_bps).max(a.stability_floor_bps);
        self.retry_delay_ms_dynamic = (self.retry_delay_ms_dynamic - a.retry_delay_step_down_ms as f64).max(a.retry_delay_floor_ms as f64);

        self.profit_bps_bump.recover(a.profit_bps_bump_recover);
        self.profit_usd_bump.recover(a.profit_usd_bump_recover);
        self.depth_usd_bump.recover(a.depth_usd_bump_recover);
        self.min_notional_usd_bump.recover(a.min_notional_usd_bump_recover);

        let rep = &cfg.reputation;
        self.depth_ratio_penalty = (self.depth_ratio_penalty - rep.depth_ratio_penalty_down).max(0.0);
        self.quality_score = (self.quality_score + rep.auto_tune_up).min(rep.auto_tune_max_factor);

        let nr = &cfg.net_risk;
        self.net_risk_tighten_factor = (self.net_risk_tighten_factor + nr.net_risk_relax_on_success).min(nr.net_risk_max_factor);
    }

    /// `reason` selects the per-reason quality penalty multiplier (§4.9).
    pub fn on_failure(&mut self, cfg: &RouterConfig, reason: FailureReason) {
        let c = &cfg.chunk;
        self.chunk_factor = (self.chunk_factor * (1.0 - c.chunk_factor_down)).max(c.chunk_factor_min);
        self.chunk_delay_ms = (self.chunk_delay_ms + c.chunk_delay_up_ms as f64).min(c.chunk_delay_max_ms as f64);

        let r = &cfg.retry;
        self.retry_factor = (self.retry_factor - r.retry_factor_down).max(r.retry_factor_min);

        let a = &cfg.auto_tune;
        self.slippage_bps_dynamic = (self.slippage_bps_dynamic + a.slippage_step_up_bps).min(cfg.preflight.slippage_ceil_bps);
        self.stability_bps_dynamic = (self.stability_bps_dynamic + a.stability_step_up_bps).min(a.stability_ceil_bps);
        self.retry_delay_ms_dynamic = (self.retry_delay_ms_dynamic + a.retry_delay_step_up_ms as f64).min(a.retry_delay_ceil_ms as f64);

        self.profit_bps_bump.bump(a.profit_bps_bump_step, a.profit_bps_bump_max);
        self.profit_usd_bump.bump(a.profit_usd_bump_step, a.profit_usd_bump_max);
        self.depth_usd_bump.bump(a.depth_usd_bump_step, a.depth_usd_bump_max);
        self.min_notional_usd_bump.bump(a.min_notional_usd_bump_step, a.min_notional_usd_bump_max);

        let rep = &cfg.reputation;
        self.depth_ratio_penalty = (self.depth_ratio_penalty + rep.depth_ratio_penalty_up).min(rep.depth_ratio_penalty_max);

        let weight = match reason {
            FailureReason::Preflight => rep.reason_preflight_penalty,
            FailureReason::Execution => rep.reason_execution_penalty,
            FailureReason::PostTrade => rep.reason_post_trade_penalty,
            FailureReason::Hedge => rep.reason_hedge_penalty,
            FailureReason::Unknown => 1.0,
        };
        self.quality_score = (self.quality_score - rep.auto_tune_down * weight).max(rep.auto_tune_min_factor);

        let nr = &cfg.net_risk;
        if nr.net_risk_auto_tighten {
            self.net_risk_tighten_factor = (self.net_risk_tighten_factor - nr.net_risk_tighten_on_failure).max(nr.net_risk_min_factor);
        }
    }

    pub fn assert_bounds(&self, cfg: &RouterConfig) {
        debug_assert!(self.chunk_factor >= cfg.chunk.chunk_factor_min && self.chunk_factor <= cfg.chunk.chunk_factor_max);
        debug_assert!(self.retry_factor >= cfg.retry.retry_factor_min && self.retry_factor <= cfg.retry.retry_factor_max);
        debug_assert!(self.quality_score >= cfg.reputation.auto_tune_min_factor && self.quality_score <= cfg.reputation.auto_tune_max_factor);
        debug_assert!(self.depth_ratio_penalty >= 0.0 && self.depth_ratio_penalty <= cfg.reputation.depth_ratio_penalty_max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_hold_after_many_failures_and_one_success() {
        let cfg = RouterConfig::default();
        let mut state = ControllerState::new(&cfg);
        for _ in 0..200 {
            state.on_failure(&cfg, FailureReason::Execution);
        }
        state.assert_bounds(&cfg);
        state.on_success(&cfg);
        state.assert_bounds(&cfg);
        assert!(state.chunk_factor >= cfg.chunk.chunk_factor_min);
        assert!(state.chunk_factor <= cfg.chunk.chunk_factor_max);
    }

    #[test]
    fn bounds_hold_after_many_successes() {
        let cfg = RouterConfig::default();
        let mut state = ControllerState::new(&cfg);
        for _ in 0..200 {
            state.on_success(&cfg);
        }
        state.assert_bounds(&cfg);
    }

    #[test]
    fn depth_ratio_penalty_widens_soft_threshold() {
        let cfg = RouterConfig::default();
        let mut state = ControllerState::new(&cfg);
        let base = state.effective_depth_ratio_soft(cfg.preflight.leg_depth_ratio_soft);
        state.on_failure(&cfg, FailureReason::Preflight);
        let widened = state.effective_depth_ratio_soft(cfg.preflight.leg_depth_ratio_soft);
        assert!(widened >= base);
    }

    #[test]
    fn failure_then_success_never_escapes_bounds() {
        let cfg = RouterConfig::default();
        let mut state = ControllerState::new(&cfg);
        state.on_failure(&cfg, FailureReason::PostTrade);
        state.on_success(&cfg);
        state.assert_bounds(&cfg);
    }
}
