//! The `Router`: owns all C1-C10 state and wires the attempt loop
//! (§4.5/§4.6) into a single `execute(legs)` entry point.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::book_cache::BookCache;
use crate::config::RouterConfig;
use crate::controller::ControllerState;
use crate::dispatcher;
use crate::error::RouterError;
use crate::metrics::{self, Metrics};
use crate::reputation::{now_ms, ReputationGate};
use crate::types::{AttemptContext, ExecutionResult, Leg, Venue};
use crate::venue::VenueAdapter;
use crate::{chunker, posttrade};

/// Outcome of one successful `execute` call.
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub results: Vec<ExecutionResult>,
    pub attempts: u32,
    pub max_post_trade_drift_bps: f64,
}

/// The Cross-Platform Execution Router. Single-tenant: one `execute` call
/// runs to completion before the next begins, so all internal state
/// mutation is read-modify-write safe without extra locking beyond the
/// primitives chosen for their own access patterns (see `config.rs`'s
/// concurrency note).
pub struct Router {
    adapters: HashMap<Venue, Arc<dyn VenueAdapter>>,
    cfg: RouterConfig,
    controller: ControllerState,
    gate: ReputationGate,
    metrics: Metrics,
}

impl Router {
    /// Builds a router with fresh state, restoring controller/reputation
    /// state from `cfg.persistence.state_path` if present.
    pub fn new(adapters: HashMap<Venue, Arc<dyn VenueAdapter>>, cfg: RouterConfig) -> Self {
        let restored = metrics::restore_state(&cfg.persistence.state_path, &cfg);
        let (controller, gate) = match restored {
            Some((controller, gate)) => {
                info!("restored router state from disk");
                (controller, gate)
            }
            None => (ControllerState::new(&cfg), ReputationGate::new()),
        };
        let loaded_metrics: Option<metrics::MetricsSnapshot> = metrics::load_json(&cfg.persistence.metrics_path);
        let metrics = loaded_metrics.map(|s| s.metrics).unwrap_or_default();

        Self { adapters, cfg, controller, gate, metrics }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.cfg
    }

    pub fn controller(&self) -> &ControllerState {
        &self.controller
    }

    pub fn reputation(&self) -> &ReputationGate {
        &self.gate
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    fn flush(&mut self) {
        let now = now_ms();
        metrics::flush_if_due(
            &self.cfg.persistence.metrics_path,
            &self.cfg.persistence.state_path,
            &mut self.metrics,
            &self.controller,
            &self.gate,
            now,
            self.cfg.persistence.metrics_flush_ms,
        );
    }

    /// Entry point: owns the attempt loop of §4.5. Retries up to
    /// `maxRetries` only while no group has yet succeeded (`hadSuccess`);
    /// a `hadSuccess=true` failure terminates the call immediately.
    pub async fn execute(&mut self, legs: &[Leg]) -> Result<ExecutionOutcome, RouterError> {
        self.metrics.record_attempt_start();
        let mut last_err: Option<RouterError> = None;

        for attempt in 0..=self.cfg.retry.max_retries {
            let mut ctx = AttemptContext::new(attempt);
            let attempt_start = std::time::Instant::now();
            let now = now_ms();
            let scaled = dispatcher::scale_for_attempt(legs, attempt, &self.cfg, &self.controller);

            let mode = dispatcher::derive_mode(attempt, &self.cfg, &self.controller, &self.gate, now);
            let order_type = dispatcher::derive_order_type(attempt, &self.cfg, &self.gate, now);
            let options = dispatcher::derive_options(attempt, order_type, &self.cfg, &self.gate, now);

            let mut cache = BookCache::new();

            ctx.preflight_start = Some(std::time::Instant::now());
            let preflight_result = crate::preflight::run(&scaled, &self.adapters, &mut cache, &mut self.gate, &self.controller, &self.cfg).await;
            self.metrics.record_preflight_latency_ms(ctx.preflight_start.unwrap().elapsed().as_secs_f64() * 1000.0);
            let outcome = match preflight_result {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(attempt, error = %err, "preflight rejected attempt");
                    self.on_attempt_failure(&err);
                    self.metrics.record_total_latency_ms(attempt_start.elapsed().as_secs_f64() * 1000.0);
                    if err.had_success {
                        self.flush();
                        return Err(err);
                    }
                    last_err = Some(err);
                    if attempt < self.cfg.retry.max_retries {
                        sleep(Duration::from_millis(self.controller.retry_delay_ms_dynamic as u64)).await;
                    }
                    continue;
                }
            };

            ctx.exec_start = Some(std::time::Instant::now());
            let run_result = chunker::run(&outcome.legs, mode, &options, &self.adapters, &mut cache, &mut self.gate, &self.controller, &self.cfg).await;
            self.metrics.record_exec_latency_ms(ctx.exec_start.unwrap().elapsed().as_secs_f64() * 1000.0);
            match run_result {
                Ok(run_outcome) => {
                    self.on_attempt_success(&run_outcome.last_legs);
                    self.metrics.record_post_trade_drift_bps(run_outcome.max_post_trade_drift_bps);
                    if run_outcome.max_post_trade_drift_bps >= self.cfg.post_trade.post_trade_drift_bps {
                        self.metrics.record_post_trade_alert();
                    }
                    self.metrics.record_total_latency_ms(attempt_start.elapsed().as_secs_f64() * 1000.0);
                    self.flush();
                    return Ok(ExecutionOutcome {
                        results: run_outcome.results,
                        attempts: attempt + 1,
                        max_post_trade_drift_bps: run_outcome.max_post_trade_drift_bps,
                    });
                }
                Err(err) => {
                    error!(attempt, error = %err, "attempt failed");
                    self.on_attempt_failure(&err);
                    self.metrics.record_total_latency_ms(attempt_start.elapsed().as_secs_f64() * 1000.0);
                    if err.had_success {
                        self.flush();
                        return Err(err);
                    }
                    last_err = Some(err);
                }
            }

            if attempt < self.cfg.retry.max_retries {
                sleep(Duration::from_millis(self.controller.retry_delay_ms_dynamic as u64)).await;
            }
        }

        self.flush();
        Err(last_err.unwrap_or_else(|| RouterError::new(crate::error::ErrorKind::ExecutionVenueFailure {
            venue: "unknown".to_string(),
            message: "exhausted retries with no recorded error".to_string(),
        })))
    }

    fn on_attempt_success(&mut self, legs: &[Leg]) {
        let now = now_ms();
        for leg in legs {
            self.gate.record_leg_success(leg, now, &self.cfg.reputation);
        }
        self.gate.record_attempt_outcome(true, now, &self.cfg.circuit);
        self.controller.on_success(&self.cfg);
        self.metrics.record_success();
    }

    fn on_attempt_failure(&mut self, err: &RouterError) {
        let now = now_ms();
        self.gate.record_attempt_outcome(false, now, &self.cfg.circuit);
        self.controller.on_failure(&self.cfg, err.reason());
        self.metrics.record_failure(err.reason(), &err.to_string());
        if err.is_soft_block() {
            info!("soft block recorded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Book, BookLevel, Side};
    use crate::venue::ExecutionOptions;
    use async_trait::async_trait;

    struct HappyAdapter {
        venue: Venue,
        book: Book,
    }

    #[async_trait]
    impl VenueAdapter for HappyAdapter {
        fn venue(&self) -> Venue {
            self.venue
        }

        async fn execute(&self, legs: &[Leg], _options: &ExecutionOptions) -> anyhow::Result<ExecutionResult> {
            Ok(ExecutionResult { venue: self.venue, order_ids: vec!["o1".into()], legs: legs.to_vec() })
        }

        async fn fetch_book(&self, _token_id: &str) -> anyhow::Result<Option<Book>> {
            Ok(Some(self.book.clone()))
        }
    }

    fn happy_router() -> Router {
        let mut adapters: HashMap<Venue, Arc<dyn VenueAdapter>> = HashMap::new();
        adapters.insert(
            Venue::Predict,
            Arc::new(HappyAdapter {
                venue: Venue::Predict,
                book: Book { bids: vec![], asks: vec![BookLevel { price: 0.40, size: 80.0 }] },
            }),
        );
        adapters.insert(
            Venue::Polymarket,
            Arc::new(HappyAdapter {
                venue: Venue::Polymarket,
                book: Book { bids: vec![BookLevel { price: 0.55, size: 80.0 }], asks: vec![] },
            }),
        );
        let mut cfg = RouterConfig::default();
        cfg.preflight.base_fee_bps = 100.0;
        cfg.post_trade.post_fill_check = false;
        cfg.post_trade.post_trade_hedge = false;
        cfg.post_trade.post_trade_net_hedge = false;
        cfg.persistence.state_path = "/tmp/router-test-state-happy.json".to_string();
        cfg.persistence.metrics_path = "/tmp/router-test-metrics-happy.json".to_string();
        Router::new(adapters, cfg)
    }

    #[tokio::test]
    async fn happy_path_single_chunk_succeeds() {
        let mut router = happy_router();
        let legs = vec![
            Leg::new(Venue::Predict, "T1", Side::Buy, 0.40, 50.0),
            Leg::new(Venue::Polymarket, "T1p", Side::Sell, 0.55, 50.0),
        ];
        let outcome = router.execute(&legs).await.unwrap();
        assert_eq!(outcome.attempts, 1);
        assert_eq!(router.metrics().successes, 1);
    }
}
