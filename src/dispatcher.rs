//! C5 — execution dispatcher. Owns the attempt loop: per-attempt size/price
//! scaling, mode and order-type derivation, venue-group fan-out, and the
//! partial-success cancel/hedge response.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::warn;

use crate::config::{ExecutionMode, RouterConfig};
use crate::controller::ControllerState;
use crate::error::{ErrorKind, RouterError};
use crate::posttrade;
use crate::reputation::ReputationGate;
use crate::types::{ExecutionResult, Leg, Side, Venue};
use crate::venue::{ExecutionOptions, OrderType, VenueAdapter};

type AdapterMap = HashMap<Venue, Arc<dyn VenueAdapter>>;

/// Scales every leg's size by `retryFactor × retrySizeFactor^attempt` and
/// bumps its limit price in the attempt's favour direction by
/// `retryAggressiveBps × attempt`, clamped to the open interval (0, 1).
pub fn scale_for_attempt(legs: &[Leg], attempt: u32, cfg: &RouterConfig, controller: &ControllerState) -> Vec<Leg> {
    let size_scale = controller.retry_factor * cfg.retry.retry_size_factor.powi(attempt as i32);
    let price_bump_bps = cfg.retry.retry_aggressive_bps * attempt as f64;

    legs.iter()
        .map(|leg| {
            let shares = leg.target_shares * size_scale;
            let bump = leg.limit_price * price_bump_bps / 10_000.0;
            let price = match leg.side {
                Side::Buy => leg.limit_price + bump,
                Side::Sell => leg.limit_price - bump,
            };
            let price = price.clamp(f64::EPSILON, 1.0 - f64::EPSILON);
            leg.with_limit_price(price).with_shares(shares)
        })
        .collect()
}

/// Derives the AUTO/SEQUENTIAL/SINGLE_LEG mode for this attempt.
pub fn derive_mode(attempt: u32, cfg: &RouterConfig, controller: &ControllerState, gate: &ReputationGate, now: i64) -> ExecutionMode {
    if let Some(forced) = cfg.execution.forced_mode {
        return forced;
    }
    if attempt == 0 {
        return ExecutionMode::Auto;
    }
    if gate.circuit_failures() > 0 {
        return ExecutionMode::Sequential;
    }
    let degraded = gate.is_degraded(now, cfg.degrade.degrade_exit_ms, cfg.degrade.degrade_exit_successes);
    if degraded {
        if controller.quality_score >= cfg.circuit.global_min_quality {
            return ExecutionMode::Sequential;
        }
        return ExecutionMode::SingleLeg;
    }
    if attempt > 1 {
        return ExecutionMode::SingleLeg;
    }
    ExecutionMode::Auto
}

/// Derives the order type from the priority chain: consistency override,
/// consistency template, degrade, retry fallback sequence, configured
/// default.
pub fn derive_order_type(attempt: u32, cfg: &RouterConfig, gate: &ReputationGate, now: i64) -> OrderType {
    if gate.consistency_override_active(now) {
        return cfg.degrade.consistency_order_type;
    }
    if gate.consistency_template_active(now) {
        return OrderType::Fok;
    }
    let degraded = gate.is_degraded(now, cfg.degrade.degrade_exit_ms, cfg.degrade.degrade_exit_successes);
    if degraded {
        return cfg.degrade.degrade_order_type;
    }
    if attempt > 0 {
        if let Some(fallback) = cfg.execution.order_type_fallback.get((attempt - 1) as usize) {
            return *fallback;
        }
    }
    cfg.execution.order_type
}

/// Derives `useLimit`/`useFok`/`batch`, overridable by degrade or the
/// consistency template.
pub fn derive_options(attempt: u32, order_type: OrderType, cfg: &RouterConfig, gate: &ReputationGate, now: i64) -> ExecutionOptions {
    let degraded = gate.is_degraded(now, cfg.degrade.degrade_exit_ms, cfg.degrade.degrade_exit_successes);
    let template = gate.consistency_template_active(now);

    let use_limit = if template {
        true
    } else if degraded {
        cfg.degrade.degrade_limit_orders
    } else {
        cfg.execution.limit_orders
    };

    let use_fok = if template {
        true
    } else if degraded {
        cfg.degrade.degrade_use_fok
    } else {
        cfg.execution.use_fok
    };

    let batch = if degraded && cfg.degrade.degrade_disable_batch {
        false
    } else {
        cfg.execution.batch_orders
    };

    let _ = attempt;
    ExecutionOptions {
        use_fok: Some(use_fok),
        use_limit: Some(use_limit),
        order_type: Some(order_type),
        batch: Some(batch),
    }
}

/// Composite quality score for a leg: token score, venue score, and a
/// liquidity contribution, weighted per §4.5's SINGLE_LEG leg selection.
fn composite_quality(leg: &Leg, gate: &ReputationGate) -> f64 {
    let token = gate.token_score(&leg.token_id) as f64;
    let venue = gate.venue_score(leg.venue) as f64;
    let liquidity_score = 1.0;
    token * 0.6 + venue * 0.3 + liquidity_score * 10.0
}

fn group_by_venue(legs: &[Leg]) -> Vec<(Venue, Vec<Leg>)> {
    let mut groups: Vec<(Venue, Vec<Leg>)> = Vec::new();
    for leg in legs {
        if let Some(entry) = groups.iter_mut().find(|(v, _)| *v == leg.venue) {
            entry.1.push(leg.clone());
        } else {
            groups.push((leg.venue, vec![leg.clone()]));
        }
    }
    groups
}

fn group_quality(group: &[Leg], gate: &ReputationGate) -> f64 {
    group.iter().map(|l| composite_quality(l, gate)).sum::<f64>() / group.len().max(1) as f64
}

async fn submit_group(adapter: &Arc<dyn VenueAdapter>, legs: &[Leg], options: &ExecutionOptions) -> anyhow::Result<ExecutionResult> {
    adapter.execute(legs, options).await
}

/// Best-effort cancellation of every order id across already-submitted
/// groups. Runs to completion even if individual cancels fail.
async fn cancel_all(adapters: &AdapterMap, results: &[ExecutionResult]) {
    for result in results {
        if result.order_ids.is_empty() {
            continue;
        }
        if let Some(adapter) = adapters.get(&result.venue) {
            if let Err(err) = adapter.cancel_orders(&result.order_ids).await {
                warn!(venue = %result.venue, error = %err, "cancel failed during partial-success unwind");
            }
        }
    }
}

/// Outcome of one dispatch call: either every venue group succeeded, or at
/// least one failed (carrying whatever groups did succeed, for cancel and
/// hedge).
pub struct DispatchOutcome {
    pub successes: Vec<ExecutionResult>,
    pub failure: Option<RouterError>,
}

/// Groups `legs` by venue and dispatches them per the derived mode. On any
/// group failure, cancels all previously-submitted groups in this attempt
/// and, if `hedgeOnFailure` is configured, hedges their filled legs before
/// returning.
pub async fn dispatch(
    legs: &[Leg],
    mode: ExecutionMode,
    options: &ExecutionOptions,
    adapters: &AdapterMap,
    gate: &ReputationGate,
    cfg: &RouterConfig,
) -> DispatchOutcome {
    let mut groups = group_by_venue(legs);

    match mode {
        ExecutionMode::Auto => {
            let futures: Vec<_> = groups
                .iter()
                .filter_map(|(venue, group)| adapters.get(venue).map(|a| (a.clone(), group.clone())))
                .map(|(adapter, group)| async move {
                    let venue = adapter.venue();
                    let result = submit_group(&adapter, &group, options).await;
                    (venue, result)
                })
                .collect();
            let results = join_all(futures).await;

            let mut successes = Vec::new();
            let mut failure = None;
            for (venue, result) in results {
                match result {
                    Ok(exec) => successes.push(exec),
                    Err(err) => {
                        warn!(%venue, error = %err, "venue group failed");
                        failure = Some(RouterError::new(ErrorKind::ExecutionVenueFailure {
                            venue: venue.to_string(),
                            message: err.to_string(),
                        }));
                    }
                }
            }
            // Concurrent submission means a failing group can appear before a
            // succeeding sibling in `results` (group order follows leg
            // appearance order, not completion order), so `had_success` can
            // only be decided once every group has been accounted for.
            if let Some(failure) = &mut failure {
                failure.had_success = !successes.is_empty();
                cancel_all(adapters, &successes).await;
                posttrade::hedge_on_execution_failure(&successes, adapters, cfg).await;
            }
            DispatchOutcome { successes, failure }
        }
        ExecutionMode::Sequential | ExecutionMode::SingleLeg => {
            if mode == ExecutionMode::SingleLeg {
                groups.sort_by(|a, b| group_quality(&b.1, gate).partial_cmp(&group_quality(&a.1, gate)).unwrap());
                if let Some(best) = groups.first().cloned() {
                    groups = vec![best];
                }
            } else {
                groups.sort_by(|a, b| group_quality(&b.1, gate).partial_cmp(&group_quality(&a.1, gate)).unwrap());
            }

            let mut successes = Vec::new();
            let mut failure = None;
            for (venue, group) in &groups {
                let Some(adapter) = adapters.get(venue) else { continue };
                match submit_group(adapter, group, options).await {
                    Ok(exec) => successes.push(exec),
                    Err(err) => {
                        warn!(%venue, error = %err, "venue group failed (sequential)");
                        failure = Some(RouterError::with_had_success(
                            ErrorKind::ExecutionVenueFailure { venue: venue.to_string(), message: err.to_string() },
                            !successes.is_empty(),
                        ));
                        break;
                    }
                }
            }
            if failure.is_some() {
                cancel_all(adapters, &successes).await;
                posttrade::hedge_on_execution_failure(&successes, adapters, cfg).await;
            }
            DispatchOutcome { successes, failure }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_for_attempt_zero_is_identity_in_size() {
        let cfg = RouterConfig::default();
        let controller = ControllerState::new(&cfg);
        let legs = vec![Leg::new(Venue::Predict, "T1", Side::Buy, 0.40, 50.0)];
        let scaled = scale_for_attempt(&legs, 0, &cfg, &controller);
        assert!((scaled[0].target_shares - 50.0 * controller.retry_factor).abs() < 1e-9);
        assert_eq!(scaled[0].limit_price, 0.40);
    }

    #[test]
    fn scale_for_attempt_bumps_buy_price_up_and_sell_price_down() {
        let cfg = RouterConfig::default();
        let controller = ControllerState::new(&cfg);
        let legs = vec![
            Leg::new(Venue::Predict, "T1", Side::Buy, 0.40, 50.0),
            Leg::new(Venue::Polymarket, "T1p", Side::Sell, 0.55, 50.0),
        ];
        let scaled = scale_for_attempt(&legs, 2, &cfg, &controller);
        assert!(scaled[0].limit_price > 0.40);
        assert!(scaled[1].limit_price < 0.55);
    }

    #[test]
    fn derive_mode_first_attempt_is_auto() {
        let cfg = RouterConfig::default();
        let controller = ControllerState::new(&cfg);
        let gate = ReputationGate::new();
        assert_eq!(derive_mode(0, &cfg, &controller, &gate, 0), ExecutionMode::Auto);
    }

    #[test]
    fn derive_mode_sequential_when_circuit_has_failures() {
        let cfg = RouterConfig::default();
        let controller = ControllerState::new(&cfg);
        let mut gate = ReputationGate::new();
        gate.record_attempt_outcome(false, 0, &cfg.circuit);
        assert_eq!(derive_mode(1, &cfg, &controller, &gate, 0), ExecutionMode::Sequential);
    }

    #[test]
    fn derive_order_type_falls_back_to_sequence() {
        let cfg = RouterConfig::default();
        let gate = ReputationGate::new();
        let ot = derive_order_type(1, &cfg, &gate, 0);
        assert_eq!(ot, cfg.execution.order_type_fallback[0]);
    }
}
