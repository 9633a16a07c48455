//! Router configuration surface. Grouped into sub-configs along the same
//! lines as `spec.md` §6, each with its own `Default`, mirroring a
//! struct-of-structs configuration layout.

use serde::{Deserialize, Serialize};

use crate::venue::OrderType;

/// The AUTO/SEQUENTIAL/SINGLE_LEG execution mode, chosen per attempt unless
/// pinned here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    Auto,
    Sequential,
    SingleLeg,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightConfig {
    /// Max VWAP deviation cap in bps; the dynamic band is
    /// `[slippage_floor_bps, slippage_ceil_bps]` and is tuned by C9.
    pub slippage_bps: f64,
    pub slippage_floor_bps: f64,
    pub slippage_ceil_bps: f64,
    /// Top-of-book drift cap in bps.
    pub price_drift_bps: f64,
    pub stability_samples: u32,
    pub stability_interval_ms: u64,
    pub stability_bps: f64,
    pub consistency_samples: u32,
    pub consistency_interval_ms: u64,
    pub consistency_vwap_bps: f64,
    pub consistency_vwap_drift_bps: f64,
    pub consistency_depth_ratio_min: f64,
    pub consistency_depth_ratio_drift: f64,
    pub leg_min_depth_usd: f64,
    pub leg_depth_usage_max: f64,
    pub leg_depth_ratio_min: f64,
    pub leg_depth_ratio_soft: f64,
    pub leg_depth_ratio_shrink_min_factor: f64,
    pub leg_deviation_soft_bps: f64,
    pub leg_deviation_spread_bps: f64,
    pub leg_drift_spread_bps: f64,
    pub leg_vwap_deviation_bps: f64,
    /// bps threshold of observed deviation/drift that triggers a re-check
    /// with a fresh snapshot (stage 9).
    pub recheck_trigger_bps: f64,
    pub recheck_ms: u64,
    pub max_vwap_levels: u32,
    pub depth_levels: u32,
    pub base_fee_bps: f64,
    pub fee_curve_rate: f64,
    pub fee_curve_exponent: f64,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            slippage_bps: 50.0,
            slippage_floor_bps: 30.0,
            slippage_ceil_bps: 120.0,
            price_drift_bps: 40.0,
            stability_samples: 3,
            stability_interval_ms: 150,
            stability_bps: 50.0,
            consistency_samples: 2,
            consistency_interval_ms: 200,
            consistency_vwap_bps: 60.0,
            consistency_vwap_drift_bps: 25.0,
            consistency_depth_ratio_min: 0.5,
            consistency_depth_ratio_drift: 0.1,
            leg_min_depth_usd: 20.0,
            leg_depth_usage_max: 0.6,
            leg_depth_ratio_min: 0.3,
            leg_depth_ratio_soft: 0.6,
            leg_depth_ratio_shrink_min_factor: 0.4,
            leg_deviation_soft_bps: 40.0,
            leg_deviation_spread_bps: 30.0,
            leg_drift_spread_bps: 30.0,
            leg_vwap_deviation_bps: 50.0,
            recheck_trigger_bps: 45.0,
            recheck_ms: 250,
            max_vwap_levels: 5,
            depth_levels: 10,
            base_fee_bps: 100.0,
            fee_curve_rate: 0.0,
            fee_curve_exponent: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    pub adaptive_size: bool,
    pub depth_usage: f64,
    pub min_depth_shares: f64,
    pub max_shares: f64,
    pub max_notional: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            adaptive_size: true,
            depth_usage: 0.5,
            min_depth_shares: 1.0,
            max_shares: 100_000.0,
            max_notional: 50_000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub order_type: OrderType,
    pub order_type_fallback: Vec<OrderType>,
    /// Pins every attempt to this mode, bypassing the attempt-index/degrade/
    /// circuit derivation in §4.5. `None` (the default) lets the dispatcher
    /// derive the mode per attempt.
    pub forced_mode: Option<ExecutionMode>,
    pub fallback_mode: ExecutionMode,
    pub parallel_submit: bool,
    pub use_fok: bool,
    pub limit_orders: bool,
    pub batch_orders: bool,
    pub batch_max: u32,
    pub cancel_open_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            order_type: OrderType::Fok,
            order_type_fallback: vec![OrderType::Fak, OrderType::Gtc],
            forced_mode: None,
            fallback_mode: ExecutionMode::Auto,
            parallel_submit: true,
            use_fok: true,
            limit_orders: true,
            batch_orders: false,
            batch_max: 1,
            cancel_open_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfitConfig {
    pub min_notional_usd: f64,
    pub min_profit_usd: f64,
    pub min_profit_bps: f64,
    pub min_profit_impact_mult: f64,
    pub missing_vwap_penalty_bps: f64,
    pub transfer_cost: f64,
    pub quality_profit_mult: f64,
    pub quality_profit_max: f64,
}

impl Default for ProfitConfig {
    fn default() -> Self {
        Self {
            min_notional_usd: 5.0,
            min_profit_usd: 0.50,
            min_profit_bps: 20.0,
            min_profit_impact_mult: 1.0,
            missing_vwap_penalty_bps: 15.0,
            transfer_cost: 0.0,
            quality_profit_mult: 1.0,
            quality_profit_max: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub retry_size_factor: f64,
    pub retry_aggressive_bps: f64,
    pub retry_factor_min: f64,
    pub retry_factor_max: f64,
    pub retry_factor_up: f64,
    pub retry_factor_down: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 500,
            retry_size_factor: 0.9,
            retry_aggressive_bps: 5.0,
            retry_factor_min: 0.5,
            retry_factor_max: 1.0,
            retry_factor_up: 0.05,
            retry_factor_down: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitConfig {
    pub circuit_max_failures: u32,
    pub circuit_window_ms: u64,
    pub circuit_cooldown_ms: u64,
    pub token_max_failures: u32,
    pub token_failure_window_ms: u64,
    pub token_cooldown_ms: u64,
    pub token_min_score: i32,
    pub venue_max_failures: u32,
    pub venue_failure_window_ms: u64,
    pub venue_cooldown_ms: u64,
    pub venue_min_score: i32,
    pub global_min_quality: f64,
    pub global_cooldown_ms: u64,
    pub failure_pause_ms: u64,
    pub failure_pause_max_ms: u64,
    pub failure_pause_backoff: f64,
    pub abort_post_trade_drift_bps: f64,
    pub abort_cooldown_ms: u64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            circuit_max_failures: 3,
            circuit_window_ms: 60_000,
            circuit_cooldown_ms: 30_000,
            token_max_failures: 3,
            token_failure_window_ms: 60_000,
            token_cooldown_ms: 30_000,
            token_min_score: 20,
            venue_max_failures: 3,
            venue_failure_window_ms: 60_000,
            venue_cooldown_ms: 30_000,
            venue_min_score: 20,
            global_min_quality: 0.5,
            global_cooldown_ms: 30_000,
            failure_pause_ms: 200,
            failure_pause_max_ms: 10_000,
            failure_pause_backoff: 2.0,
            abort_post_trade_drift_bps: 80.0,
            abort_cooldown_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostTradeConfig {
    pub post_trade_drift_bps: f64,
    pub post_fill_check: bool,
    pub fill_check_ms: u64,
    pub hedge_on_failure: bool,
    pub hedge_predict_only: bool,
    pub hedge_slippage_bps: f64,
    pub hedge_min_profit_usd: f64,
    pub hedge_min_edge: f64,
    pub hedge_force_on_partial: bool,
    pub post_trade_hedge: bool,
    pub post_trade_net_hedge: bool,
    pub post_trade_hedge_force: bool,
    pub post_trade_hedge_predict_only: bool,
    pub post_trade_hedge_slippage_bps: f64,
    pub post_trade_hedge_min_profit_usd: f64,
    pub post_trade_hedge_max_shares: f64,
}

impl Default for PostTradeConfig {
    fn default() -> Self {
        Self {
            post_trade_drift_bps: 60.0,
            post_fill_check: true,
            fill_check_ms: 1_000,
            hedge_on_failure: true,
            hedge_predict_only: false,
            hedge_slippage_bps: 50.0,
            hedge_min_profit_usd: 0.25,
            hedge_min_edge: 0.001,
            hedge_force_on_partial: false,
            post_trade_hedge: true,
            post_trade_net_hedge: true,
            post_trade_hedge_force: false,
            post_trade_hedge_predict_only: false,
            post_trade_hedge_slippage_bps: 50.0,
            post_trade_hedge_min_profit_usd: 0.25,
            post_trade_hedge_max_shares: 100_000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    pub chunk_max_shares: f64,
    pub chunk_max_notional: f64,
    pub chunk_delay_ms: u64,
    pub chunk_preflight: bool,
    pub chunk_auto_tune: bool,
    pub chunk_factor_min: f64,
    pub chunk_factor_max: f64,
    pub chunk_factor_up: f64,
    pub chunk_factor_down: f64,
    pub chunk_delay_min_ms: u64,
    pub chunk_delay_max_ms: u64,
    pub chunk_delay_up_ms: u64,
    pub chunk_delay_down_ms: u64,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_max_shares: 1_000.0,
            chunk_max_notional: 2_000.0,
            chunk_delay_ms: 250,
            chunk_preflight: true,
            chunk_auto_tune: true,
            chunk_factor_min: 0.2,
            chunk_factor_max: 1.0,
            chunk_factor_up: 0.05,
            chunk_factor_down: 0.2,
            chunk_delay_min_ms: 100,
            chunk_delay_max_ms: 5_000,
            chunk_delay_up_ms: 500,
            chunk_delay_down_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradeConfig {
    pub degrade_ms: u64,
    pub degrade_exit_ms: u64,
    pub degrade_exit_successes: u32,
    pub degrade_force_sequential: bool,
    pub degrade_disable_batch: bool,
    pub degrade_limit_orders: bool,
    pub degrade_use_fok: bool,
    pub degrade_order_type: OrderType,
    pub degrade_chunk_factor: f64,
    pub degrade_chunk_delay_ms: u64,
    pub degrade_slippage_bps: f64,
    pub degrade_stability_bps: f64,
    pub consistency_fail_limit: u32,
    pub consistency_fail_window_ms: u64,
    pub consistency_degrade_ms: u64,
    pub consistency_penalty: f64,
    pub consistency_use_degrade_profile: bool,
    pub consistency_order_type: OrderType,
    pub consistency_template_enabled: bool,
    pub consistency_template_slippage_bps: f64,
    pub consistency_template_max_vwap_levels: u32,
    pub consistency_template_depth_usage: f64,
    pub consistency_template_window_ms: u64,
}

impl Default for DegradeConfig {
    fn default() -> Self {
        Self {
            degrade_ms: 60_000,
            degrade_exit_ms: 60_000,
            degrade_exit_successes: 2,
            degrade_force_sequential: true,
            degrade_disable_batch: true,
            degrade_limit_orders: true,
            degrade_use_fok: true,
            degrade_order_type: OrderType::Fok,
            degrade_chunk_factor: 0.3,
            degrade_chunk_delay_ms: 500,
            degrade_slippage_bps: 30.0,
            degrade_stability_bps: 30.0,
            consistency_fail_limit: 2,
            consistency_fail_window_ms: 60_000,
            consistency_degrade_ms: 60_000,
            consistency_penalty: 0.1,
            consistency_use_degrade_profile: true,
            consistency_order_type: OrderType::Fok,
            consistency_template_enabled: true,
            consistency_template_slippage_bps: 25.0,
            consistency_template_max_vwap_levels: 2,
            consistency_template_depth_usage: 0.3,
            consistency_template_window_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationConfig {
    pub token_score_on_success: i32,
    pub token_score_on_failure: i32,
    pub token_score_on_volatility: i32,
    pub token_score_on_post_trade: i32,
    pub venue_score_on_success: i32,
    pub venue_score_on_failure: i32,
    pub venue_score_on_volatility: i32,
    pub venue_score_on_post_trade: i32,
    pub venue_score_on_spread: i32,
    pub auto_blocklist: bool,
    pub auto_blocklist_cooldown_ms: u64,
    pub auto_blocklist_score: i32,
    pub auto_tune_up: f64,
    pub auto_tune_down: f64,
    pub auto_tune_min_factor: f64,
    pub auto_tune_max_factor: f64,
    pub depth_ratio_penalty_up: f64,
    pub depth_ratio_penalty_down: f64,
    pub depth_ratio_penalty_max: f64,
    pub reason_preflight_penalty: f64,
    pub reason_execution_penalty: f64,
    pub reason_post_trade_penalty: f64,
    pub reason_hedge_penalty: f64,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            token_score_on_success: 1,
            token_score_on_failure: 5,
            token_score_on_volatility: 3,
            token_score_on_post_trade: 4,
            venue_score_on_success: 1,
            venue_score_on_failure: 5,
            venue_score_on_volatility: 3,
            venue_score_on_post_trade: 4,
            venue_score_on_spread: 2,
            auto_blocklist: true,
            auto_blocklist_cooldown_ms: 300_000,
            auto_blocklist_score: 10,
            auto_tune_up: 0.02,
            auto_tune_down: 0.08,
            auto_tune_min_factor: 0.3,
            auto_tune_max_factor: 1.0,
            depth_ratio_penalty_up: 0.05,
            depth_ratio_penalty_down: 0.02,
            depth_ratio_penalty_max: 0.5,
            reason_preflight_penalty: 1.0,
            reason_execution_penalty: 1.5,
            reason_post_trade_penalty: 1.2,
            reason_hedge_penalty: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetRiskConfig {
    pub net_risk_usd: f64,
    pub net_risk_usd_per_token: f64,
    pub net_risk_min_factor: f64,
    pub net_risk_max_factor: f64,
    pub net_risk_degrade_factor: f64,
    pub net_risk_scale_on_quality: bool,
    pub net_risk_auto_tighten: bool,
    pub net_risk_tighten_on_failure: f64,
    pub net_risk_relax_on_success: f64,
}

impl Default for NetRiskConfig {
    fn default() -> Self {
        Self {
            net_risk_usd: 10_000.0,
            net_risk_usd_per_token: 2_500.0,
            net_risk_min_factor: 0.3,
            net_risk_max_factor: 1.0,
            net_risk_degrade_factor: 0.5,
            net_risk_scale_on_quality: true,
            net_risk_auto_tighten: true,
            net_risk_tighten_on_failure: 0.15,
            net_risk_relax_on_success: 0.05,
        }
    }
}

/// Stepping parameters for the self-tuning controller's dynamic bps/ms
/// scalars and the four failure bumps (§4.9), grouped separately from
/// `PreflightConfig`/`RetryConfig` since they describe *how the controller
/// moves* rather than the static bound the dynamic value lives within.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoTuneConfig {
    pub slippage_step_up_bps: f64,
    pub slippage_step_down_bps: f64,
    pub stability_floor_bps: f64,
    pub stability_ceil_bps: f64,
    pub stability_step_up_bps: f64,
    pub stability_step_down_bps: f64,
    pub retry_delay_floor_ms: u64,
    pub retry_delay_ceil_ms: u64,
    pub retry_delay_step_up_ms: u64,
    pub retry_delay_step_down_ms: u64,
    pub profit_bps_bump_max: f64,
    pub profit_bps_bump_step: f64,
    pub profit_bps_bump_recover: f64,
    pub profit_usd_bump_max: f64,
    pub profit_usd_bump_step: f64,
    pub profit_usd_bump_recover: f64,
    pub depth_usd_bump_max: f64,
    pub depth_usd_bump_step: f64,
    pub depth_usd_bump_recover: f64,
    pub min_notional_usd_bump_max: f64,
    pub min_notional_usd_bump_step: f64,
    pub min_notional_usd_bump_recover: f64,
}

impl Default for AutoTuneConfig {
    fn default() -> Self {
        Self {
            slippage_step_up_bps: 2.0,
            slippage_step_down_bps: 5.0,
            stability_floor_bps: 20.0,
            stability_ceil_bps: 100.0,
            stability_step_up_bps: 2.0,
            stability_step_down_bps: 5.0,
            retry_delay_floor_ms: 200,
            retry_delay_ceil_ms: 5_000,
            retry_delay_step_up_ms: 0,
            retry_delay_step_down_ms: 200,
            profit_bps_bump_max: 40.0,
            profit_bps_bump_step: 5.0,
            profit_bps_bump_recover: 0.5,
            profit_usd_bump_max: 1.0,
            profit_usd_bump_step: 0.1,
            profit_usd_bump_recover: 0.5,
            depth_usd_bump_max: 20.0,
            depth_usd_bump_step: 2.0,
            depth_usd_bump_recover: 0.5,
            min_notional_usd_bump_max: 10.0,
            min_notional_usd_bump_step: 1.0,
            min_notional_usd_bump_recover: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub state_path: String,
    pub metrics_path: String,
    pub metrics_flush_ms: u64,
    pub metrics_log_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            state_path: "router_state.json".to_string(),
            metrics_path: "router_metrics.json".to_string(),
            metrics_flush_ms: 5_000,
            metrics_log_ms: 60_000,
        }
    }
}

/// Top-level configuration surface, grouped exactly along the bullet list
/// in the configuration surface specification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterConfig {
    pub preflight: PreflightConfig,
    pub sizing: SizingConfig,
    pub execution: ExecutionConfig,
    pub profit: ProfitConfig,
    pub retry: RetryConfig,
    pub circuit: CircuitConfig,
    pub post_trade: PostTradeConfig,
    pub chunk: ChunkConfig,
    pub degrade: DegradeConfig,
    pub reputation: ReputationConfig,
    pub net_risk: NetRiskConfig,
    pub persistence: PersistenceConfig,
    pub auto_tune: AutoTuneConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_bounds() {
        let cfg = RouterConfig::default();
        assert!(cfg.preflight.slippage_floor_bps < cfg.preflight.slippage_ceil_bps);
        assert!(cfg.retry.retry_factor_min < cfg.retry.retry_factor_max);
        assert!(cfg.chunk.chunk_factor_min < cfg.chunk.chunk_factor_max);
        assert!(cfg.reputation.auto_tune_min_factor < cfg.reputation.auto_tune_max_factor);
    }

    #[test]
    fn config_roundtrips_through_json() {
        let cfg = RouterConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let restored: RouterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.circuit.circuit_max_failures, cfg.circuit.circuit_max_failures);
    }
}
