//! C7 — post-trade monitor. Re-fetches books after a group completes,
//! measures drift, flags penalised/spread-penalised legs, checks for
//! residual open orders, and runs the hedge passes.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::RouterConfig;
use crate::error::{ErrorKind, RouterError};
use crate::reputation::ReputationGate;
use crate::types::{ExecutionResult, Leg, Venue};
use crate::venue::{opposite_side, VenueAdapter};

type AdapterMap = HashMap<Venue, Arc<dyn VenueAdapter>>;

/// Per-leg drift measurement produced by re-fetching its book immediately
/// after submission.
pub struct LegDrift {
    pub leg: Leg,
    pub drift_bps: f64,
    pub penalised: bool,
    pub spread_penalised: bool,
}

/// Outcome of one post-trade pass: per-leg drift, the max observed, and any
/// hedge results actually submitted.
pub struct PostTradeOutcome {
    pub drifts: Vec<LegDrift>,
    pub max_drift_bps: f64,
    pub hedges: Vec<ExecutionResult>,
}

async fn fetch_reference_price(adapter: &Arc<dyn VenueAdapter>, leg: &Leg) -> Option<f64> {
    let book = adapter.fetch_book(&leg.token_id).await.ok().flatten()?;
    book.reference_price(leg.side)
}

/// Computes drift for every leg, marking penalised and spread-penalised
/// legs per §4.7.
async fn measure_drift(legs: &[Leg], adapters: &AdapterMap, cfg: &RouterConfig) -> Vec<LegDrift> {
    let mut drifts = Vec::with_capacity(legs.len());
    for leg in legs {
        let drift_bps = match adapters.get(&leg.venue) {
            Some(adapter) => match fetch_reference_price(adapter, leg).await {
                Some(ref_price) => (ref_price - leg.limit_price).abs() / leg.limit_price * 10_000.0,
                None => 0.0,
            },
            None => 0.0,
        };
        let penalised = drift_bps >= cfg.post_trade.post_trade_drift_bps;
        drifts.push(LegDrift { leg: leg.clone(), drift_bps, penalised, spread_penalised: false });
    }

    let max_drift = drifts.iter().map(|d| d.drift_bps).fold(f64::MIN, f64::max);
    let min_drift = drifts.iter().map(|d| d.drift_bps).fold(f64::MAX, f64::min);
    let spread = max_drift - min_drift;
    if spread > cfg.preflight.leg_drift_spread_bps {
        let threshold = max_drift - cfg.preflight.leg_drift_spread_bps / 2.0;
        for d in &mut drifts {
            if d.drift_bps >= threshold {
                d.spread_penalised = true;
            }
        }
    }
    for d in &mut drifts {
        if d.drift_bps >= cfg.preflight.leg_vwap_deviation_bps {
            d.spread_penalised = true;
        }
    }
    drifts
}

/// Checks every submitted order id against the venue's open-order query,
/// cancelling any still-open one. Returns the ids that were found open.
async fn check_and_cancel_residual(results: &[ExecutionResult], adapters: &AdapterMap) -> Vec<String> {
    let mut residual = Vec::new();
    for result in results {
        let Some(adapter) = adapters.get(&result.venue) else { continue };
        if result.order_ids.is_empty() {
            continue;
        }
        match adapter.check_open_orders(&result.order_ids).await {
            Ok(still_open) if !still_open.is_empty() => {
                warn!(venue = %result.venue, count = still_open.len(), "residual open orders after fill check");
                if let Err(err) = adapter.cancel_orders(&still_open).await {
                    warn!(venue = %result.venue, error = %err, "failed to cancel residual orders");
                }
                residual.extend(still_open);
            }
            Ok(_) => {}
            Err(err) => warn!(venue = %result.venue, error = %err, "failed to query open orders"),
        }
    }
    residual
}

/// Submits an opposite-side hedge for one leg at the venue's best quote ±
/// slippage, gated by the computed edge against `min_profit_usd`/`min_edge`
/// unless `force` is set.
pub(crate) async fn hedge_leg(adapter: &Arc<dyn VenueAdapter>, leg: &Leg, slippage_bps: f64, min_profit_usd: f64, min_edge: f64, force: bool) -> Option<ExecutionResult> {
    let reference = fetch_reference_price(adapter, leg).await?;
    let hedge_side = opposite_side(leg.side);
    let slip = reference * slippage_bps / 10_000.0;
    let hedge_price = match hedge_side {
        crate::types::Side::Buy => reference + slip,
        crate::types::Side::Sell => reference - slip,
    };

    let edge = (leg.limit_price - hedge_price).abs() / leg.limit_price;
    let profit_usd = edge * leg.limit_price * leg.target_shares;
    if !force && (profit_usd < min_profit_usd || edge < min_edge) {
        return None;
    }

    let hedge_leg = Leg::new(leg.venue, leg.token_id.clone(), hedge_side, hedge_price, leg.target_shares);
    match adapter.hedge_legs(std::slice::from_ref(&hedge_leg), slippage_bps).await {
        Ok(result) => {
            info!(venue = %leg.venue, token = leg.token_id.as_str(), "hedge submitted");
            Some(result)
        }
        Err(err) => {
            warn!(venue = %leg.venue, error = %err, "hedge submission failed");
            None
        }
    }
}

/// Hedges every leg from the groups that *did* submit successfully before a
/// sibling group's failure aborts the attempt (§4.5, seed test S5). Gated by
/// `hedgeOnFailure`; `hedgePredictOnly` restricts hedging to Predict legs;
/// `hedgeForceOnPartial` bypasses the min-profit/min-edge gate `hedge_leg`
/// otherwise applies.
pub async fn hedge_on_execution_failure(successes: &[ExecutionResult], adapters: &AdapterMap, cfg: &RouterConfig) -> Vec<ExecutionResult> {
    if !cfg.post_trade.hedge_on_failure {
        return Vec::new();
    }
    let mut hedges = Vec::new();
    for result in successes {
        for leg in &result.legs {
            if cfg.post_trade.hedge_predict_only && leg.venue != Venue::Predict {
                continue;
            }
            let Some(adapter) = adapters.get(&leg.venue) else { continue };
            if let Some(hedge) = hedge_leg(
                adapter,
                leg,
                cfg.post_trade.hedge_slippage_bps,
                cfg.post_trade.hedge_min_profit_usd,
                cfg.post_trade.hedge_min_edge,
                cfg.post_trade.hedge_force_on_partial,
            )
            .await
            {
                hedges.push(hedge);
            }
        }
    }
    hedges
}

/// Runs the full post-trade pass for a completed attempt: drift
/// measurement, reputation penalties, residual check, and both hedge
/// passes (per-leg then net), each independently gated by its own enable
/// flag.
pub async fn run(
    legs: &[Leg],
    results: &[ExecutionResult],
    adapters: &AdapterMap,
    gate: &mut ReputationGate,
    cfg: &RouterConfig,
    now: i64,
) -> Result<PostTradeOutcome, RouterError> {
    let drifts = measure_drift(legs, adapters, cfg).await;
    let max_drift_bps = drifts.iter().map(|d| d.drift_bps).fold(0.0, f64::max);

    for d in &drifts {
        if d.penalised {
            gate.record_post_trade_penalty(&d.leg, now, &cfg.reputation);
        }
        if d.spread_penalised {
            gate.record_spread_penalty(&d.leg, now, &cfg.reputation);
        }
    }

    if cfg.post_trade.post_fill_check {
        let residual = check_and_cancel_residual(results, adapters).await;
        if !residual.is_empty() {
            return Err(RouterError::with_had_success(
                ErrorKind::PostTradeResidual { remaining_order_ids: residual },
                true,
            ));
        }
    }

    let mut hedges = Vec::new();
    if cfg.post_trade.post_trade_hedge {
        for d in &drifts {
            if !d.penalised && !d.spread_penalised {
                continue;
            }
            if cfg.post_trade.post_trade_hedge_predict_only && d.leg.venue != Venue::Predict {
                continue;
            }
            if let Some(adapter) = adapters.get(&d.leg.venue) {
                if let Some(hedge) = hedge_leg(
                    adapter,
                    &d.leg,
                    cfg.post_trade.post_trade_hedge_slippage_bps,
                    cfg.post_trade.post_trade_hedge_min_profit_usd,
                    cfg.post_trade.hedge_min_edge,
                    cfg.post_trade.post_trade_hedge_force,
                )
                .await
                {
                    hedges.push(hedge);
                }
            }
        }
    }

    if cfg.post_trade.post_trade_net_hedge {
        let mut per_token: HashMap<String, f64> = HashMap::new();
        for leg in legs {
            let signed = match leg.side {
                crate::types::Side::Buy => leg.target_shares,
                crate::types::Side::Sell => -leg.target_shares,
            };
            *per_token.entry(leg.token_id.clone()).or_insert(0.0) += signed;
        }
        for leg in legs {
            let net = *per_token.get(&leg.token_id).unwrap_or(&0.0);
            if net.abs() < 1e-9 {
                continue;
            }
            let residual_shares = net.abs().min(cfg.post_trade.post_trade_hedge_max_shares);
            let residual_leg = leg.with_shares(residual_shares);
            if let Some(adapter) = adapters.get(&leg.venue) {
                if let Some(hedge) = hedge_leg(
                    adapter,
                    &residual_leg,
                    cfg.post_trade.post_trade_hedge_slippage_bps,
                    cfg.post_trade.post_trade_hedge_min_profit_usd,
                    cfg.post_trade.hedge_min_edge,
                    cfg.post_trade.post_trade_hedge_force,
                )
                .await
                {
                    hedges.push(hedge);
                }
            }
            per_token.insert(leg.token_id.clone(), 0.0);
        }
    }

    if max_drift_bps >= cfg.circuit.abort_post_trade_drift_bps {
        gate.set_global_cooldown(now, cfg.circuit.abort_cooldown_ms);
        return Err(RouterError::with_had_success(
            ErrorKind::PostTradeDrift { drift_bps: max_drift_bps, threshold_bps: cfg.circuit.abort_post_trade_drift_bps },
            true,
        ));
    }

    Ok(PostTradeOutcome { drifts, max_drift_bps, hedges })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Book, BookLevel, Side};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StubAdapter {
        venue: Venue,
        book: Mutex<Option<Book>>,
    }

    #[async_trait]
    impl VenueAdapter for StubAdapter {
        fn venue(&self) -> Venue {
            self.venue
        }

        async fn execute(&self, legs: &[Leg], _options: &crate::venue::ExecutionOptions) -> anyhow::Result<ExecutionResult> {
            Ok(ExecutionResult { venue: self.venue, order_ids: vec!["o1".into()], legs: legs.to_vec() })
        }

        async fn fetch_book(&self, _token_id: &str) -> anyhow::Result<Option<Book>> {
            Ok(self.book.lock().unwrap().clone())
        }
    }

    fn adapters_with(venue: Venue, book: Book) -> AdapterMap {
        let mut m = HashMap::new();
        m.insert(venue, Arc::new(StubAdapter { venue, book: Mutex::new(Some(book)) }) as Arc<dyn VenueAdapter>);
        m
    }

    #[tokio::test]
    async fn measure_drift_flags_penalised_leg_above_threshold() {
        let cfg = RouterConfig::default();
        let leg = Leg::new(Venue::Predict, "T1", Side::Buy, 0.40, 50.0);
        let book = Book { bids: vec![], asks: vec![BookLevel { price: 0.46, size: 50.0 }] };
        let adapters = adapters_with(Venue::Predict, book);
        let drifts = measure_drift(&[leg], &adapters, &cfg).await;
        assert!(drifts[0].penalised);
    }

    #[tokio::test]
    async fn run_aborts_and_sets_cooldown_on_large_drift() {
        let cfg = RouterConfig { circuit: crate::config::CircuitConfig { abort_post_trade_drift_bps: 10.0, ..Default::default() }, ..Default::default() };
        let leg = Leg::new(Venue::Predict, "T1", Side::Buy, 0.40, 50.0);
        let book = Book { bids: vec![], asks: vec![BookLevel { price: 0.50, size: 50.0 }] };
        let adapters = adapters_with(Venue::Predict, book);
        let mut gate = ReputationGate::new();
        let results = vec![ExecutionResult { venue: Venue::Predict, order_ids: vec![], legs: vec![leg.clone()] }];
        let err = run(&[leg], &results, &adapters, &mut gate, &cfg, 1_000).await.unwrap_err();
        assert!(matches!(err.kind, ErrorKind::PostTradeDrift { .. }));
        assert!(err.had_success);
        assert!(gate.global_cooldown_until_ms > 1_000);
    }
}
