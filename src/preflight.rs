//! C3 — preflight engine. Eleven ordered stages; the first failure aborts
//! the attempt with a typed reason. Consumes C1 (book cache) and C2 (VWAP)
//! and calls into C4 (adaptive sizer) as stage 3.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::book_cache::BookCache;
use crate::config::RouterConfig;
use crate::controller::ControllerState;
use crate::error::{
    ErrorKind, PreflightDeviationKind, PreflightDepthKind, PreflightDriftKind, PreflightProfitKind, RouterError,
};
use crate::reputation::{now_ms, ReputationGate};
use crate::sizer;
use crate::types::{Book, Leg, LegKey, Side};
use crate::venue::VenueAdapter;
use crate::vwap;

pub struct PreflightOutcome {
    pub legs: Vec<Leg>,
    pub max_deviation_bps: f64,
    pub max_drift_bps: f64,
}

type AdapterMap = HashMap<crate::types::Venue, Arc<dyn VenueAdapter>>;

fn adapter_for<'a>(adapters: &'a AdapterMap, venue: crate::types::Venue) -> Result<&'a Arc<dyn VenueAdapter>, RouterError> {
    adapters.get(&venue).ok_or_else(|| {
        RouterError::new(ErrorKind::PreflightDepth(PreflightDepthKind::MissingOrderbook {
            key: LegKey { venue, token_id: String::new(), side: Side::Buy },
        }))
    })
}

async fn fetch_all_books(legs: &[Leg], adapters: &AdapterMap, cache: &mut BookCache) -> Result<HashMap<LegKey, Book>, RouterError> {
    let mut out = HashMap::new();
    for leg in legs {
        let adapter = adapter_for(adapters, leg.venue)?;
        let book = cache.fetch(adapter.as_ref(), &leg.token_id).await;
        let book = book.ok_or_else(|| {
            RouterError::new(ErrorKind::PreflightDepth(PreflightDepthKind::MissingOrderbook { key: leg.key() }))
        })?;
        out.insert(leg.key(), book);
    }
    Ok(out)
}

/// Stage 2: sample the reference price N times with an inter-sample delay;
/// fail if any later sample has drifted from the first beyond the cap. N
/// and interval are bumped when the circuit has failed recently.
async fn check_stability(
    legs: &[Leg],
    adapters: &AdapterMap,
    cfg: &RouterConfig,
    controller: &ControllerState,
    circuit_has_recent_failures: bool,
) -> Result<(), RouterError> {
    let samples = if circuit_has_recent_failures {
        cfg.preflight.stability_samples + 2
    } else {
        cfg.preflight.stability_samples
    };
    let interval_ms = if circuit_has_recent_failures {
        cfg.preflight.stability_interval_ms * 2
    } else {
        cfg.preflight.stability_interval_ms
    };

    for leg in legs {
        let adapter = adapter_for(adapters, leg.venue)?;
        let mut baseline: Option<f64> = None;
        for i in 0..samples {
            if i > 0 {
                sleep(Duration::from_millis(interval_ms)).await;
            }
            let book = adapter
                .fetch_book(&leg.token_id)
                .await
                .ok()
                .flatten()
                .ok_or_else(|| RouterError::new(ErrorKind::PreflightDepth(PreflightDepthKind::MissingOrderbook { key: leg.key() })))?;
            let Some(price) = book.reference_price(leg.side) else {
                continue;
            };
            match baseline {
                None => baseline = Some(price),
                Some(base) => {
                    let drift_bps = (price - base).abs() / base * 10_000.0;
                    let cap = cfg.preflight.stability_bps * controller.quality_score;
                    if drift_bps > cap {
                        return Err(RouterError::new(ErrorKind::PreflightDrift(PreflightDriftKind::StabilityBreach {
                            key: leg.key(),
                            drift_bps,
                            cap_bps: cap,
                        })));
                    }
                }
            }
        }
    }
    Ok(())
}

/// Per-leg depth floor: fails if a leg's side-depth, valued in USD at the
/// book's own reference price, falls below `legMinDepthUsd`.
fn check_min_leg_depth(legs: &[Leg], books: &HashMap<LegKey, Book>, cfg: &RouterConfig) -> Result<(), RouterError> {
    for leg in legs {
        let book = &books[&leg.key()];
        let reference = book.reference_price(leg.side).unwrap_or(leg.limit_price);
        let depth_usd = book.depth(leg.side) * reference;
        if depth_usd < cfg.preflight.leg_min_depth_usd {
            return Err(RouterError::new(ErrorKind::PreflightDepth(PreflightDepthKind::DepthBelowMinLegUsd {
                key: leg.key(),
                depth_usd,
                min_usd: cfg.preflight.leg_min_depth_usd,
            })));
        }
    }
    Ok(())
}

/// Stage 4: shrinks all legs uniformly when the cross-leg depth ratio falls
/// below the effective soft threshold.
fn depth_ratio_shrink(legs: &[Leg], books: &HashMap<LegKey, Book>, cfg: &RouterConfig, controller: &ControllerState) -> Result<Vec<Leg>, RouterError> {
    let depths: Vec<f64> = legs.iter().map(|l| books[&l.key()].depth(l.side)).collect();
    let min_depth = depths.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_depth = depths.iter().cloned().fold(0.0, f64::max);
    if max_depth <= 0.0 {
        return Ok(legs.to_vec());
    }
    let ratio = min_depth / max_depth;

    if ratio < cfg.preflight.leg_depth_ratio_min {
        return Err(RouterError::new(ErrorKind::PreflightDepth(PreflightDepthKind::DepthRatioTooAsymmetric {
            ratio,
            min_ratio: cfg.preflight.leg_depth_ratio_min,
        })));
    }

    let soft = controller.effective_depth_ratio_soft(cfg.preflight.leg_depth_ratio_soft);
    if ratio < soft {
        let factor = (ratio / soft).max(cfg.preflight.leg_depth_ratio_shrink_min_factor);
        let new_shares = legs[0].target_shares * factor;
        return Ok(sizer::apply_uniform_size(legs, new_shares));
    }
    Ok(legs.to_vec())
}

/// Stage 5: shrinks all legs uniformly when any leg would consume more than
/// `legDepthUsageMax × qualityFactor` of its side depth.
fn usage_cap_shrink(legs: &[Leg], books: &HashMap<LegKey, Book>, cfg: &RouterConfig, controller: &ControllerState) -> Vec<Leg> {
    let cap = cfg.preflight.leg_depth_usage_max * controller.quality_score;
    let max_fraction = legs
        .iter()
        .map(|l| {
            let depth = books[&l.key()].depth(l.side);
            if depth <= 0.0 { f64::INFINITY } else { l.target_shares / depth }
        })
        .fold(0.0_f64, f64::max);

    if max_fraction > cap && max_fraction.is_finite() {
        let factor = cap / max_fraction;
        let new_shares = legs[0].target_shares * factor;
        return sizer::apply_uniform_size(legs, new_shares);
    }
    legs.to_vec()
}

/// Stage 6: scales every leg proportionally so total notional never exceeds
/// `maxNotional`.
fn notional_cap_shrink(legs: &[Leg], max_notional: f64) -> Vec<Leg> {
    let total: f64 = legs.iter().map(|l| l.target_shares * l.limit_price).sum();
    if total > max_notional && total > 0.0 {
        let factor = max_notional / total;
        let new_shares = legs[0].target_shares * factor;
        return sizer::apply_uniform_size(legs, new_shares);
    }
    legs.to_vec()
}

struct LegVwap {
    deviation_bps: f64,
    price_drift_bps: f64,
    levels_used: u32,
    fit: Option<vwap::VwapFill>,
}

fn compute_leg_vwap(leg: &Leg, book: &Book, cfg: &RouterConfig) -> LegVwap {
    let levels = book.fill_side(leg.side);
    let fit = vwap::estimate(
        levels,
        leg.target_shares,
        leg.side,
        cfg.preflight.base_fee_bps,
        cfg.preflight.fee_curve_rate,
        cfg.preflight.fee_curve_exponent,
        0.0,
    );
    let deviation_bps = match fit {
        Some(f) => match leg.side {
            Side::Buy => (f.avg_all_in_price - leg.limit_price) / leg.limit_price * 10_000.0,
            Side::Sell => (leg.limit_price - f.avg_all_in_price) / leg.limit_price * 10_000.0,
        },
        None => f64::INFINITY,
    };
    let best = book.reference_price(leg.side).unwrap_or(leg.limit_price);
    let price_drift_bps = (best - leg.limit_price).abs() / leg.limit_price * 10_000.0;
    LegVwap {
        deviation_bps,
        price_drift_bps,
        levels_used: fit.map(|f| f.levels_used).unwrap_or(0),
        fit,
    }
}

/// Stage 8 (and its stage-9 re-run): the main VWAP/drift check across all
/// legs against one book snapshot.
fn check_main_vwap(legs: &[Leg], books: &HashMap<LegKey, Book>, cfg: &RouterConfig, controller: &ControllerState) -> Result<(f64, f64), RouterError> {
    let mut computed = Vec::with_capacity(legs.len());
    for leg in legs {
        computed.push((leg, compute_leg_vwap(leg, &books[&leg.key()], cfg)));
    }

    let slippage_cap = controller.slippage_bps_dynamic * controller.quality_score;
    for (leg, v) in &computed {
        if v.fit.is_none() {
            return Err(RouterError::new(ErrorKind::PreflightDepth(PreflightDepthKind::InsufficientDepth {
                available: 0.0,
                required: leg.target_shares,
            })));
        }
        if v.deviation_bps > slippage_cap {
            return Err(RouterError::new(ErrorKind::PreflightDeviation(PreflightDeviationKind::VwapDeviationExceeded {
                key: leg.key(),
                deviation_bps: v.deviation_bps,
                cap_bps: slippage_cap,
            })));
        }
        if v.levels_used > cfg.preflight.max_vwap_levels {
            return Err(RouterError::new(ErrorKind::PreflightDeviation(PreflightDeviationKind::TooManyVwapLevels {
                key: leg.key(),
                levels: v.levels_used,
                max: cfg.preflight.max_vwap_levels,
            })));
        }
        if v.price_drift_bps > cfg.preflight.price_drift_bps {
            return Err(RouterError::new(ErrorKind::PreflightDrift(PreflightDriftKind::PriceDriftExceeded {
                key: leg.key(),
                drift_bps: v.price_drift_bps,
                cap_bps: cfg.preflight.price_drift_bps,
            })));
        }
        if v.deviation_bps > cfg.preflight.leg_deviation_soft_bps {
            warn!(leg = %leg.key(), deviation_bps = v.deviation_bps, "soft block: deviation above soft threshold");
            return Err(RouterError::new(ErrorKind::PreflightDeviation(PreflightDeviationKind::SoftBlock {
                key: leg.key(),
                deviation_bps: v.deviation_bps,
                soft_bps: cfg.preflight.leg_deviation_soft_bps,
            })));
        }
    }

    let max_dev = computed.iter().map(|(_, v)| v.deviation_bps).fold(f64::MIN, f64::max);
    let min_dev = computed.iter().map(|(_, v)| v.deviation_bps).fold(f64::MAX, f64::min);
    let dev_spread = max_dev - min_dev;
    if dev_spread > cfg.preflight.leg_deviation_spread_bps {
        return Err(RouterError::new(ErrorKind::PreflightDeviation(
            PreflightDeviationKind::LegDeviationSpreadExceeded { spread_bps: dev_spread, cap_bps: cfg.preflight.leg_deviation_spread_bps },
        )));
    }

    let max_drift = computed.iter().map(|(_, v)| v.price_drift_bps).fold(f64::MIN, f64::max);
    let min_drift = computed.iter().map(|(_, v)| v.price_drift_bps).fold(f64::MAX, f64::min);
    let drift_spread = max_drift - min_drift;
    if drift_spread > cfg.preflight.leg_drift_spread_bps {
        return Err(RouterError::new(ErrorKind::PreflightDrift(PreflightDriftKind::ConsistencyDrift {
            metric: "legDriftSpread",
            drift_bps: drift_spread,
            cap_bps: cfg.preflight.leg_drift_spread_bps,
        })));
    }

    Ok((max_dev, max_drift))
}

/// Stage 7: repeats the VWAP/depth-ratio computation K times with an
/// interval; fails if either drifts more than the configured bps between
/// samples.
async fn check_consistency(
    legs: &[Leg],
    adapters: &AdapterMap,
    cfg: &RouterConfig,
    gate: &mut ReputationGate,
) -> Result<(), RouterError> {
    let mut deviations = Vec::new();
    let mut ratios = Vec::new();

    for i in 0..cfg.preflight.consistency_samples {
        if i > 0 {
            sleep(Duration::from_millis(cfg.preflight.consistency_interval_ms)).await;
        }
        let mut books = HashMap::new();
        for leg in legs {
            let adapter = adapter_for(adapters, leg.venue)?;
            let book = adapter.fetch_book(&leg.token_id).await.ok().flatten().ok_or_else(|| {
                RouterError::new(ErrorKind::PreflightDepth(PreflightDepthKind::MissingOrderbook { key: leg.key() }))
            })?;
            books.insert(leg.key(), book);
        }
        let sample_devs: Vec<f64> = legs.iter().map(|l| compute_leg_vwap(l, &books[&l.key()], cfg).deviation_bps).collect();
        let avg_dev = sample_devs.iter().sum::<f64>() / sample_devs.len().max(1) as f64;
        deviations.push(avg_dev);

        let depths: Vec<f64> = legs.iter().map(|l| books[&l.key()].depth(l.side)).collect();
        let min_d = depths.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_d = depths.iter().cloned().fold(0.0, f64::max);
        ratios.push(if max_d > 0.0 { min_d / max_d } else { 1.0 });
    }

    let dev_spread = deviations.iter().cloned().fold(f64::MIN, f64::max) - deviations.iter().cloned().fold(f64::MAX, f64::min);
    let ratio_spread = ratios.iter().cloned().fold(f64::MIN, f64::max) - ratios.iter().cloned().fold(f64::MAX, f64::min);

    let min_ratio = ratios.iter().cloned().fold(f64::MAX, f64::min);

    let failed = dev_spread > cfg.preflight.consistency_vwap_drift_bps
        || ratio_spread > cfg.preflight.consistency_depth_ratio_drift
        || min_ratio < cfg.preflight.consistency_depth_ratio_min;

    if failed {
        let now = now_ms();
        let reached_limit = gate.record_consistency_failure(
            now,
            cfg.degrade.consistency_fail_window_ms,
            cfg.degrade.consistency_fail_limit,
            "consistency drift",
        );
        if reached_limit {
            if cfg.degrade.consistency_use_degrade_profile {
                gate.engage_degrade(now, "consistency drift", cfg.degrade.consistency_degrade_ms);
            } else {
                gate.engage_consistency_override(now, cfg.degrade.consistency_degrade_ms);
            }
            if cfg.degrade.consistency_template_enabled {
                gate.engage_consistency_template(now, cfg.degrade.consistency_template_window_ms);
            }
        }
        return Err(RouterError::new(ErrorKind::PreflightDrift(PreflightDriftKind::ConsistencyDrift {
            metric: "consistencyVwapOrDepthRatio",
            drift_bps: dev_spread.max(ratio_spread * 10_000.0),
            cap_bps: cfg.preflight.consistency_vwap_drift_bps,
        })));
    }
    Ok(())
}

/// Stage 10: net risk budget, scaled by quality and the controller's
/// tightening factor.
fn check_net_risk(legs: &[Leg], cfg: &RouterConfig, controller: &ControllerState, degraded: bool) -> Result<(), RouterError> {
    let mut per_token: HashMap<String, f64> = HashMap::new();
    for leg in legs {
        let signed = match leg.side {
            Side::Buy => leg.target_shares * leg.limit_price,
            Side::Sell => -(leg.target_shares * leg.limit_price),
        };
        *per_token.entry(leg.token_id.clone()).or_insert(0.0) += signed;
    }

    let mut factor = controller.net_risk_tighten_factor;
    if cfg.net_risk.net_risk_scale_on_quality {
        factor *= controller.quality_score;
    }
    if degraded {
        factor *= cfg.net_risk.net_risk_degrade_factor;
    }
    factor = factor.clamp(cfg.net_risk.net_risk_min_factor, cfg.net_risk.net_risk_max_factor);

    let per_token_budget = cfg.net_risk.net_risk_usd_per_token * factor;
    for (token, net) in &per_token {
        if net.abs() > per_token_budget {
            return Err(RouterError::new(ErrorKind::PreflightProfit(PreflightProfitKind::NetRiskBudgetExceeded {
                scope: "perToken",
                notional: net.abs(),
                budget: per_token_budget,
            })));
        }
        let _ = token;
    }

    let aggregate: f64 = legs.iter().map(|l| l.target_shares * l.limit_price).sum();
    let aggregate_budget = cfg.net_risk.net_risk_usd * factor;
    if aggregate > aggregate_budget {
        return Err(RouterError::new(ErrorKind::PreflightProfit(PreflightProfitKind::NetRiskBudgetExceeded {
            scope: "aggregate",
            notional: aggregate,
            budget: aggregate_budget,
        })));
    }
    Ok(())
}

/// Per-share profit estimate for a leg that has no VWAP fit (stage 11
/// fallback): `price + fee + price*slippage` (buys), its sell counterpart.
fn per_share_estimate(leg: &Leg, cfg: &RouterConfig) -> f64 {
    let fee = vwap::per_share_fee(leg.limit_price, cfg.preflight.base_fee_bps, cfg.preflight.fee_curve_rate, cfg.preflight.fee_curve_exponent);
    let slip = leg.limit_price * cfg.preflight.slippage_bps / 10_000.0;
    match leg.side {
        Side::Buy => leg.limit_price + fee + slip,
        Side::Sell => leg.limit_price - fee - slip,
    }
}

/// Stage 11: expected profit vs the required minimum, including dynamic
/// failure bumps, impact, and the quality profit multiplier.
fn check_min_notional_and_profit(legs: &[Leg], books: &HashMap<LegKey, Book>, cfg: &RouterConfig, controller: &ControllerState) -> Result<(), RouterError> {
    let notional: f64 = legs.iter().map(|l| l.target_shares * l.limit_price).sum();
    if notional < cfg.profit.min_notional_usd + controller.min_notional_usd_bump.value {
        return Err(RouterError::new(ErrorKind::PreflightProfit(PreflightProfitKind::NotionalBelowMin {
            notional,
            min_notional: cfg.profit.min_notional_usd + controller.min_notional_usd_bump.value,
        })));
    }

    let mut missing_vwap = false;
    let mut proceeds = 0.0;
    let mut cost = 0.0;
    for leg in legs {
        let book = &books[&leg.key()];
        let fit = vwap::estimate(book.fill_side(leg.side), leg.target_shares, leg.side, cfg.preflight.base_fee_bps, cfg.preflight.fee_curve_rate, cfg.preflight.fee_curve_exponent, 0.0);
        let all_in = match fit {
            Some(f) => f.avg_all_in_price,
            None => {
                missing_vwap = true;
                per_share_estimate(leg, cfg)
            }
        };
        match leg.side {
            Side::Buy => cost += all_in * leg.target_shares,
            Side::Sell => proceeds += all_in * leg.target_shares,
        }
    }

    let profit = proceeds - cost - cfg.profit.transfer_cost;

    let quality_profit_factor = (1.0 + (1.0 - controller.quality_score) * cfg.profit.quality_profit_mult).min(cfg.profit.quality_profit_max);
    let impact_bps = cfg.preflight.leg_deviation_soft_bps;
    let mut required = cfg.profit.min_profit_usd
        + controller.profit_usd_bump.value
        + notional * ((cfg.profit.min_profit_bps + controller.profit_bps_bump.value) / 10_000.0)
        + notional * impact_bps * cfg.profit.min_profit_impact_mult / 10_000.0;
    required *= quality_profit_factor;
    if missing_vwap {
        required += notional * cfg.profit.missing_vwap_penalty_bps / 10_000.0;
    }

    if profit < required {
        return Err(RouterError::new(ErrorKind::PreflightProfit(PreflightProfitKind::ProfitBelowMin { profit, required })));
    }
    Ok(())
}

/// Runs the full 11-stage pipeline. Returns the adjusted leg-set on
/// success, ready for chunking.
pub async fn run(
    legs: &[Leg],
    adapters: &AdapterMap,
    cache: &mut BookCache,
    gate: &mut ReputationGate,
    controller: &ControllerState,
    cfg: &RouterConfig,
) -> Result<PreflightOutcome, RouterError> {
    let now = now_ms();

    // Stage 1.
    gate.check_gates(legs, now, &cfg.circuit, &cfg.reputation)?;

    let degraded = gate.is_degraded(now, cfg.degrade.degrade_exit_ms, cfg.degrade.degrade_exit_successes);

    // Stage 2.
    check_stability(legs, adapters, cfg, controller, gate.circuit_failures() > 0).await?;

    let mut books = fetch_all_books(legs, adapters, cache).await?;

    check_min_leg_depth(legs, &books, cfg)?;

    // Stage 3 (C4).
    let mut working = legs.to_vec();
    if cfg.sizing.adaptive_size {
        let sized = sizer::compute_adaptive_size(
            &working,
            &books,
            controller.slippage_bps_dynamic * controller.quality_score,
            cfg.sizing.depth_usage,
            controller.quality_score,
            cfg.sizing.max_shares,
            cfg.sizing.min_depth_shares,
            cfg.preflight.base_fee_bps,
            cfg.preflight.fee_curve_rate,
            cfg.preflight.fee_curve_exponent,
            0.0,
        )?;
        working = sizer::apply_uniform_size(&working, sized);
    }

    // Stage 4.
    working = depth_ratio_shrink(&working, &books, cfg, controller)?;

    // Stage 5.
    working = usage_cap_shrink(&working, &books, cfg, controller);

    // Stage 6.
    working = notional_cap_shrink(&working, cfg.sizing.max_notional);

    // Stage 7.
    check_consistency(&working, adapters, cfg, gate).await?;

    // Stage 8.
    let (mut max_dev, mut max_drift) = check_main_vwap(&working, &books, cfg, controller)?;

    // Stage 9.
    if max_dev > cfg.preflight.recheck_trigger_bps || max_drift > cfg.preflight.recheck_trigger_bps {
        sleep(Duration::from_millis(cfg.preflight.recheck_ms)).await;
        books = fetch_all_books(&working, adapters, cache).await?;
        let (d, r) = check_main_vwap(&working, &books, cfg, controller)?;
        max_dev = d;
        max_drift = r;
        debug!(max_dev, max_drift, "preflight re-check completed");
    }

    // Stage 10.
    check_net_risk(&working, cfg, controller, degraded)?;

    // Stage 11.
    check_min_notional_and_profit(&working, &books, cfg, controller)?;

    Ok(PreflightOutcome { legs: working, max_deviation_bps: max_dev, max_drift_bps: max_drift })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BookLevel, Venue};

    #[test]
    fn depth_ratio_shrink_scales_down_on_asymmetry() {
        let cfg = RouterConfig::default();
        let controller = ControllerState::new(&cfg);
        let legs = vec![
            Leg::new(Venue::Predict, "T1", Side::Buy, 0.40, 50.0),
            Leg::new(Venue::Polymarket, "T1p", Side::Sell, 0.55, 50.0),
        ];
        let mut books = HashMap::new();
        books.insert(legs[0].key(), Book { bids: vec![], asks: vec![BookLevel { price: 0.40, size: 100.0 }] });
        books.insert(legs[1].key(), Book { bids: vec![BookLevel { price: 0.55, size: 10.0 }], asks: vec![] });
        let shrunk = depth_ratio_shrink(&legs, &books, &cfg, &controller).unwrap();
        assert!(shrunk[0].target_shares <= legs[0].target_shares);
    }

    #[test]
    fn notional_cap_scales_down_when_exceeded() {
        let legs = vec![
            Leg::new(Venue::Predict, "T1", Side::Buy, 0.40, 1000.0),
            Leg::new(Venue::Polymarket, "T1p", Side::Sell, 0.55, 1000.0),
        ];
        let shrunk = notional_cap_shrink(&legs, 100.0);
        let total: f64 = shrunk.iter().map(|l| l.target_shares * l.limit_price).sum();
        assert!(total <= 100.0 + 1e-6);
    }

    #[test]
    fn min_leg_depth_rejects_thin_book() {
        let cfg = RouterConfig { preflight: crate::config::PreflightConfig { leg_min_depth_usd: 100.0, ..Default::default() }, ..Default::default() };
        let leg = Leg::new(Venue::Predict, "T1", Side::Buy, 0.40, 5.0);
        let mut books = HashMap::new();
        books.insert(leg.key(), Book { bids: vec![], asks: vec![BookLevel { price: 0.40, size: 10.0 }] });
        let err = check_min_leg_depth(&[leg], &books, &cfg).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::PreflightDepth(PreflightDepthKind::DepthBelowMinLegUsd { .. })));
    }

    #[test]
    fn net_risk_budget_rejects_oversized_aggregate() {
        let cfg = RouterConfig { net_risk: crate::config::NetRiskConfig { net_risk_usd: 10.0, ..Default::default() }, ..Default::default() };
        let controller = ControllerState::new(&cfg);
        let legs = vec![Leg::new(Venue::Predict, "T1", Side::Buy, 0.40, 1000.0)];
        let err = check_net_risk(&legs, &cfg, &controller, false).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::PreflightProfit(PreflightProfitKind::NetRiskBudgetExceeded { .. })));
    }
}
