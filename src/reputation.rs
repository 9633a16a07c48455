//! C8 — reputation & gating. Token/venue score windows, allow/blocklists,
//! cooldowns, the circuit breaker, global cooldown, and the failure-pause
//! exponential backoff. All timestamps are epoch-milliseconds so this state
//! round-trips cleanly through the persisted JSON snapshot.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{CircuitConfig, ReputationConfig};
use crate::error::{ErrorKind, GateKind, RouterError};
use crate::types::{Leg, Venue};

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub score: i32,
    pub last_seen_ms: i64,
}

impl ScoreEntry {
    fn fresh(now: i64) -> Self {
        Self { score: 100, last_seen_ms: now }
    }

    fn apply_delta(&mut self, delta: i32, now: i64) {
        self.score = (self.score + delta).clamp(0, 100);
        self.last_seen_ms = now;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FailureWindow {
    count: u32,
    window_start_ms: i64,
    cooldown_until_ms: i64,
}

impl FailureWindow {
    fn record_failure(&mut self, now: i64, window_ms: u64, max_failures: u32, cooldown_ms: u64) {
        if self.count == 0 || now - self.window_start_ms > window_ms as i64 {
            self.window_start_ms = now;
            self.count = 0;
        }
        self.count += 1;
        if self.count >= max_failures {
            self.cooldown_until_ms = now + cooldown_ms as i64;
        }
    }

    fn record_success(&mut self) {
        self.count = 0;
    }

    fn cooldown_active(&self, now: i64) -> bool {
        now < self.cooldown_until_ms
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CircuitState {
    pub consecutive_failures: u32,
    pub opened_at_ms: Option<i64>,
    pub last_success_ms: Option<i64>,
}

impl CircuitState {
    fn is_open(&self, now: i64, cooldown_ms: u64) -> bool {
        match self.opened_at_ms {
            Some(opened_at) => now < opened_at + cooldown_ms as i64,
            None => false,
        }
    }

    fn record_failure(&mut self, now: i64, cfg: &CircuitConfig) {
        if let Some(last_success) = self.last_success_ms {
            if now - last_success > cfg.circuit_window_ms as i64 {
                self.consecutive_failures = 0;
            }
        }
        self.consecutive_failures += 1;
        if self.consecutive_failures >= cfg.circuit_max_failures && self.opened_at_ms.is_none() {
            self.opened_at_ms = Some(now);
            warn!(failures = self.consecutive_failures, "circuit breaker opened");
        }
    }

    fn record_success(&mut self, now: i64) {
        self.consecutive_failures = 0;
        self.opened_at_ms = None;
        self.last_success_ms = Some(now);
    }

    /// Resets the counter once the cooldown window has elapsed, as if the
    /// breaker had tripped back to a fresh closed state.
    fn reset_if_cooled_down(&mut self, now: i64, cooldown_ms: u64) {
        if let Some(opened_at) = self.opened_at_ms {
            if now >= opened_at + cooldown_ms as i64 {
                self.opened_at_ms = None;
                self.consecutive_failures = 0;
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DegradeState {
    pub degraded_until_ms: Option<i64>,
    pub degrade_reason: Option<String>,
    pub degrade_at_ms: Option<i64>,
    pub consecutive_successes: u32,
}

impl DegradeState {
    /// Whether degrade mode is currently forcing conservative execution
    /// options: the deadline hasn't passed, or it has but the exit
    /// condition (elapsed + consecutive successes) hasn't yet been met.
    pub fn active(&self, now: i64, degrade_exit_ms: u64, degrade_exit_successes: u32) -> bool {
        let Some(until) = self.degraded_until_ms else { return false };
        let Some(at) = self.degrade_at_ms else { return now < until };
        let elapsed = now - at;
        if now < until {
            return true;
        }
        !(elapsed >= degrade_exit_ms as i64 && self.consecutive_successes >= degrade_exit_successes)
    }

    fn enter(&mut self, now: i64, reason: &str, degrade_ms: u64) {
        self.degraded_until_ms = Some(now + degrade_ms as i64);
        self.degrade_reason = Some(reason.to_string());
        self.degrade_at_ms = Some(now);
        self.consecutive_successes = 0;
    }

    fn record_success(&mut self) {
        self.consecutive_successes += 1;
    }

    fn record_failure(&mut self) {
        self.consecutive_successes = 0;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConsistencyFailures {
    count: u32,
    window_start_ms: i64,
}

impl ConsistencyFailures {
    fn record(&mut self, now: i64, window_ms: u64) -> u32 {
        if self.count == 0 || now - self.window_start_ms > window_ms as i64 {
            self.window_start_ms = now;
            self.count = 0;
        }
        self.count += 1;
        self.count
    }
}

/// Process-wide reputation and gating state, mutated synchronously on each
/// attempt outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReputationGate {
    token_scores: HashMap<String, ScoreEntry>,
    venue_scores: HashMap<Venue, ScoreEntry>,
    token_failures: HashMap<String, FailureWindow>,
    venue_failures: HashMap<Venue, FailureWindow>,
    blocked_tokens: HashMap<String, i64>,
    blocked_venues: HashMap<Venue, i64>,
    circuit: CircuitState,
    degrade: DegradeState,
    consistency_failures: ConsistencyFailures,
    pub consistency_override_until_ms: Option<i64>,
    pub consistency_template_active_until_ms: Option<i64>,
    pub last_consistency_failure_at_ms: Option<i64>,
    pub last_consistency_failure_reason: Option<String>,
    pub global_cooldown_until_ms: i64,
    pub failure_pause_until_ms: i64,
    pub failure_pause_ms: u64,
}

impl ReputationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token_score(&self, token_id: &str) -> i32 {
        self.token_scores.get(token_id).map(|e| e.score).unwrap_or(100)
    }

    pub fn venue_score(&self, venue: Venue) -> i32 {
        self.venue_scores.get(&venue).map(|e| e.score).unwrap_or(100)
    }

    pub fn is_degraded(&self, now: i64, degrade_exit_ms: u64, degrade_exit_successes: u32) -> bool {
        self.degrade.active(now, degrade_exit_ms, degrade_exit_successes)
    }

    pub fn circuit_failures(&self) -> u32 {
        self.circuit.consecutive_failures
    }

    /// Runs the fixed-order gate checks of §5: circuit -> global cooldown ->
    /// failure pause -> allow/blocklist -> per-token cooldown -> per-venue
    /// cooldown -> score floors.
    pub fn check_gates(&mut self, legs: &[Leg], now: i64, circuit_cfg: &CircuitConfig, rep_cfg: &ReputationConfig) -> Result<(), RouterError> {
        self.circuit.reset_if_cooled_down(now, circuit_cfg.circuit_cooldown_ms);
        if self.circuit.is_open(now, circuit_cfg.circuit_cooldown_ms) {
            return Err(RouterError::new(ErrorKind::Gate(GateKind::CircuitOpen)));
        }
        if now < self.global_cooldown_until_ms {
            return Err(RouterError::new(ErrorKind::Gate(GateKind::GlobalCooldown)));
        }
        if now < self.failure_pause_until_ms {
            return Err(RouterError::new(ErrorKind::Gate(GateKind::FailurePause)));
        }
        for leg in legs {
            if let Some(until) = self.blocked_tokens.get(&leg.token_id) {
                if now < *until {
                    return Err(RouterError::new(ErrorKind::Gate(GateKind::AllowBlocklistViolation {
                        venue_or_token: leg.token_id.clone(),
                    })));
                }
            }
            if let Some(until) = self.blocked_venues.get(&leg.venue) {
                if now < *until {
                    return Err(RouterError::new(ErrorKind::Gate(GateKind::AllowBlocklistViolation {
                        venue_or_token: leg.venue.to_string(),
                    })));
                }
            }
        }
        for leg in legs {
            if let Some(fw) = self.token_failures.get(&leg.token_id) {
                if fw.cooldown_active(now) {
                    return Err(RouterError::new(ErrorKind::Gate(GateKind::TokenCooldown {
                        token_id: leg.token_id.clone(),
                    })));
                }
            }
        }
        for leg in legs {
            if let Some(fw) = self.venue_failures.get(&leg.venue) {
                if fw.cooldown_active(now) {
                    return Err(RouterError::new(ErrorKind::Gate(GateKind::VenueCooldown {
                        venue: leg.venue.to_string(),
                    })));
                }
            }
        }
        for leg in legs {
            let score = self.token_score(&leg.token_id);
            if score < circuit_cfg.token_min_score {
                return Err(RouterError::new(ErrorKind::Gate(GateKind::TokenScoreBelowFloor {
                    token_id: leg.token_id.clone(),
                    score,
                })));
            }
            let vscore = self.venue_score(leg.venue);
            if vscore < circuit_cfg.venue_min_score {
                return Err(RouterError::new(ErrorKind::Gate(GateKind::VenueScoreBelowFloor {
                    venue: leg.venue.to_string(),
                    score: vscore,
                })));
            }
        }
        let _ = rep_cfg;
        Ok(())
    }

    /// Applies a success outcome for one leg: clears failure windows, bumps
    /// scores (never decreasing), resets the failure pause and circuit.
    pub fn record_leg_success(&mut self, leg: &Leg, now: i64, cfg: &ReputationConfig) {
        self.token_failures.entry(leg.token_id.clone()).or_default().record_success();
        self.venue_failures.entry(leg.venue).or_default().record_success();

        let entry = self.token_scores.entry(leg.token_id.clone()).or_insert_with(|| ScoreEntry::fresh(now));
        entry.apply_delta(cfg.token_score_on_success, now);

        let entry = self.venue_scores.entry(leg.venue).or_insert_with(|| ScoreEntry::fresh(now));
        entry.apply_delta(cfg.venue_score_on_success, now);

        self.degrade.record_success();
    }

    /// Applies a failure outcome for one leg: increments failure windows
    /// (possibly opening a cooldown), decrements scores, and may auto-
    /// blocklist if the score drops low enough.
    pub fn record_leg_failure(&mut self, leg: &Leg, now: i64, circuit_cfg: &CircuitConfig, rep_cfg: &ReputationConfig) {
        self.token_failures.entry(leg.token_id.clone()).or_default().record_failure(
            now,
            circuit_cfg.token_failure_window_ms,
            circuit_cfg.token_max_failures,
            circuit_cfg.token_cooldown_ms,
        );
        self.venue_failures.entry(leg.venue).or_default().record_failure(
            now,
            circuit_cfg.venue_failure_window_ms,
            circuit_cfg.venue_max_failures,
            circuit_cfg.venue_cooldown_ms,
        );

        let entry = self.token_scores.entry(leg.token_id.clone()).or_insert_with(|| ScoreEntry::fresh(now));
        entry.apply_delta(-rep_cfg.token_score_on_failure, now);
        let token_score = entry.score;

        let entry = self.venue_scores.entry(leg.venue).or_insert_with(|| ScoreEntry::fresh(now));
        entry.apply_delta(-rep_cfg.venue_score_on_failure, now);
        let venue_score = entry.score;

        if rep_cfg.auto_blocklist {
            if token_score <= rep_cfg.auto_blocklist_score {
                self.blocked_tokens.insert(leg.token_id.clone(), now + rep_cfg.auto_blocklist_cooldown_ms as i64);
                info!(token = leg.token_id.as_str(), score = token_score, "token auto-blocklisted");
            }
            if venue_score <= rep_cfg.auto_blocklist_score {
                self.blocked_venues.insert(leg.venue, now + rep_cfg.auto_blocklist_cooldown_ms as i64);
                info!(venue = %leg.venue, score = venue_score, "venue auto-blocklisted");
            }
        }

        self.degrade.record_failure();
    }

    /// Penalises a leg for post-trade drift: token and venue scores
    /// decremented by the post-trade delta.
    pub fn record_post_trade_penalty(&mut self, leg: &Leg, now: i64, cfg: &ReputationConfig) {
        let entry = self.token_scores.entry(leg.token_id.clone()).or_insert_with(|| ScoreEntry::fresh(now));
        entry.apply_delta(-cfg.token_score_on_post_trade, now);
        let entry = self.venue_scores.entry(leg.venue).or_insert_with(|| ScoreEntry::fresh(now));
        entry.apply_delta(-cfg.venue_score_on_post_trade, now);
    }

    /// Penalises a leg for a spread-penalised breach (venue only, per
    /// §4.7's `venueScoreOnSpread`).
    pub fn record_spread_penalty(&mut self, leg: &Leg, now: i64, cfg: &ReputationConfig) {
        let entry = self.venue_scores.entry(leg.venue).or_insert_with(|| ScoreEntry::fresh(now));
        entry.apply_delta(-cfg.venue_score_on_spread, now);
    }

    pub fn record_volatility_penalty(&mut self, leg: &Leg, now: i64, cfg: &ReputationConfig) {
        let entry = self.token_scores.entry(leg.token_id.clone()).or_insert_with(|| ScoreEntry::fresh(now));
        entry.apply_delta(-cfg.token_score_on_volatility, now);
        let entry = self.venue_scores.entry(leg.venue).or_insert_with(|| ScoreEntry::fresh(now));
        entry.apply_delta(-cfg.venue_score_on_volatility, now);
    }

    /// Records a circuit-relevant attempt outcome (separate from per-leg
    /// scoring, since the circuit is process-wide, not per-token/venue).
    pub fn record_attempt_outcome(&mut self, success: bool, now: i64, cfg: &CircuitConfig) {
        if success {
            self.circuit.record_success(now);
            self.failure_pause_ms = 0;
            self.failure_pause_until_ms = 0;
        } else {
            self.circuit.record_failure(now, cfg);
            self.failure_pause_ms = if self.failure_pause_ms == 0 {
                cfg.failure_pause_ms
            } else {
                ((self.failure_pause_ms as f64 * cfg.failure_pause_backoff).round() as u64)
                    .max(cfg.failure_pause_ms)
                    .min(cfg.failure_pause_max_ms)
            };
            self.failure_pause_until_ms = now + self.failure_pause_ms as i64;
        }
    }

    /// Sets the global cooldown, e.g. when quality drops below its floor or
    /// a post-trade abort fires.
    pub fn set_global_cooldown(&mut self, now: i64, duration_ms: u64) {
        self.global_cooldown_until_ms = now + duration_ms as i64;
    }

    /// Records a consistency-check failure; returns whether the
    /// accumulated count within the window has reached the configured
    /// limit (the caller then engages degrade/override per §4.8).
    pub fn record_consistency_failure(&mut self, now: i64, window_ms: u64, limit: u32, reason: &str) -> bool {
        let count = self.consistency_failures.record(now, window_ms);
        self.last_consistency_failure_at_ms = Some(now);
        self.last_consistency_failure_reason = Some(reason.to_string());
        count >= limit
    }

    pub fn engage_degrade(&mut self, now: i64, reason: &str, degrade_ms: u64) {
        self.degrade.enter(now, reason, degrade_ms);
    }

    pub fn engage_consistency_override(&mut self, now: i64, duration_ms: u64) {
        self.consistency_override_until_ms = Some(now + duration_ms as i64);
    }

    pub fn engage_consistency_template(&mut self, now: i64, duration_ms: u64) {
        self.consistency_template_active_until_ms = Some(now + duration_ms as i64);
    }

    pub fn consistency_override_active(&self, now: i64) -> bool {
        self.consistency_override_until_ms.map_or(false, |u| now < u)
    }

    pub fn consistency_template_active(&self, now: i64) -> bool {
        self.consistency_template_active_until_ms.map_or(false, |u| now < u)
    }

    pub fn degrade_reason(&self) -> Option<&str> {
        self.degrade.degrade_reason.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Side, Venue};

    fn leg() -> Leg {
        Leg::new(Venue::Predict, "T1", Side::Buy, 0.4, 10.0)
    }

    #[test]
    fn score_never_exceeds_bounds() {
        let mut gate = ReputationGate::new();
        let cfg = ReputationConfig::default();
        for _ in 0..1000 {
            gate.record_leg_success(&leg(), 0, &cfg);
        }
        assert!(gate.token_score("T1") <= 100);
    }

    #[test]
    fn failure_never_drops_score_below_zero() {
        let mut gate = ReputationGate::new();
        let cfg = ReputationConfig::default();
        let circuit_cfg = CircuitConfig::default();
        for _ in 0..1000 {
            gate.record_leg_failure(&leg(), 0, &circuit_cfg, &cfg);
        }
        assert!(gate.token_score("T1") >= 0);
    }

    #[test]
    fn circuit_opens_on_nth_consecutive_failure_not_earlier() {
        let mut gate = ReputationGate::new();
        let cfg = CircuitConfig { circuit_max_failures: 3, ..Default::default() };
        gate.record_attempt_outcome(false, 0, &cfg);
        assert_eq!(gate.circuit_failures(), 1);
        assert!(!gate.circuit.is_open(0, cfg.circuit_cooldown_ms));
        gate.record_attempt_outcome(false, 1, &cfg);
        assert!(!gate.circuit.is_open(1, cfg.circuit_cooldown_ms));
        gate.record_attempt_outcome(false, 2, &cfg);
        assert!(gate.circuit.is_open(2, cfg.circuit_cooldown_ms));
    }

    #[test]
    fn failure_pause_first_failure_is_base_then_geometric() {
        let mut gate = ReputationGate::new();
        let cfg = CircuitConfig { failure_pause_ms: 200, failure_pause_backoff: 2.0, failure_pause_max_ms: 10_000, ..Default::default() };
        gate.record_attempt_outcome(false, 0, &cfg);
        assert_eq!(gate.failure_pause_ms, 200);
        gate.record_attempt_outcome(false, 0, &cfg);
        assert_eq!(gate.failure_pause_ms, 400);
        gate.record_attempt_outcome(false, 0, &cfg);
        assert_eq!(gate.failure_pause_ms, 800);
    }

    #[test]
    fn failure_pause_cleared_on_success() {
        let mut gate = ReputationGate::new();
        let cfg = CircuitConfig::default();
        gate.record_attempt_outcome(false, 0, &cfg);
        assert!(gate.failure_pause_ms > 0);
        gate.record_attempt_outcome(true, 1, &cfg);
        assert_eq!(gate.failure_pause_ms, 0);
        assert_eq!(gate.failure_pause_until_ms, 0);
    }

    #[test]
    fn gate_precedence_circuit_before_global_cooldown() {
        let mut gate = ReputationGate::new();
        let circuit_cfg = CircuitConfig { circuit_max_failures: 1, ..Default::default() };
        let rep_cfg = ReputationConfig::default();
        gate.record_attempt_outcome(false, 0, &circuit_cfg);
        gate.set_global_cooldown(0, 10_000);
        let err = gate.check_gates(&[leg()], 0, &circuit_cfg, &rep_cfg).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Gate(GateKind::CircuitOpen)));
    }
}
