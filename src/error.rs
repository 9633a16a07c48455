//! Typed error taxonomy for the router. Hand-rolled enum with a manual
//! `Display` + `std::error::Error` impl rather than a derive macro, matching
//! the internal error types used elsewhere in this codebase.

use std::fmt;

use crate::types::LegKey;

/// Which bucket a failed attempt's reason belongs to, for the metrics
/// histogram and `lastError` classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureReason {
    Preflight,
    Execution,
    PostTrade,
    Hedge,
    Unknown,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::Preflight => "preflight",
            FailureReason::Execution => "execution",
            FailureReason::PostTrade => "postTrade",
            FailureReason::Hedge => "hedge",
            FailureReason::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Gate-level rejections: checked in a fixed order before any network call,
/// never retried within `execute`.
#[derive(Debug, Clone)]
pub enum GateKind {
    CircuitOpen,
    GlobalCooldown,
    FailurePause,
    AllowBlocklistViolation { venue_or_token: String },
    TokenCooldown { token_id: String },
    VenueCooldown { venue: String },
    TokenScoreBelowFloor { token_id: String, score: i32 },
    VenueScoreBelowFloor { venue: String, score: i32 },
}

/// Depth-related preflight rejections.
#[derive(Debug, Clone)]
pub enum PreflightDepthKind {
    MissingOrderbook { key: LegKey },
    InsufficientDepth { available: f64, required: f64 },
    DepthBelowMinLegUsd { key: LegKey, depth_usd: f64, min_usd: f64 },
    DepthRatioTooAsymmetric { ratio: f64, min_ratio: f64 },
    UsageCapExceeded { key: LegKey, fraction: f64, cap: f64 },
}

/// Deviation-related preflight rejections.
#[derive(Debug, Clone)]
pub enum PreflightDeviationKind {
    VwapDeviationExceeded { key: LegKey, deviation_bps: f64, cap_bps: f64 },
    TooManyVwapLevels { key: LegKey, levels: u32, max: u32 },
    LegDeviationSpreadExceeded { spread_bps: f64, cap_bps: f64 },
    SoftBlock { key: LegKey, deviation_bps: f64, soft_bps: f64 },
}

/// Drift-related preflight rejections.
#[derive(Debug, Clone)]
pub enum PreflightDriftKind {
    PriceDriftExceeded { key: LegKey, drift_bps: f64, cap_bps: f64 },
    StabilityBreach { key: LegKey, drift_bps: f64, cap_bps: f64 },
    ConsistencyDrift { metric: &'static str, drift_bps: f64, cap_bps: f64 },
}

/// Profit-related preflight rejections.
#[derive(Debug, Clone)]
pub enum PreflightProfitKind {
    NotionalBelowMin { notional: f64, min_notional: f64 },
    ProfitBelowMin { profit: f64, required: f64 },
    NetRiskBudgetExceeded { scope: &'static str, notional: f64, budget: f64 },
}

/// Top-level classification of why an attempt failed.
#[derive(Debug, Clone)]
pub enum ErrorKind {
    Gate(GateKind),
    PreflightDepth(PreflightDepthKind),
    PreflightDeviation(PreflightDeviationKind),
    PreflightDrift(PreflightDriftKind),
    PreflightProfit(PreflightProfitKind),
    ExecutionVenueFailure { venue: String, message: String },
    PostTradeDrift { drift_bps: f64, threshold_bps: f64 },
    PostTradeResidual { remaining_order_ids: Vec<String> },
    HedgeFailure { message: String },
}

/// The router's error type. `had_success` is the retry gate: a `true` value
/// means at least one venue group already submitted orders, so the attempt
/// loop must not retry (retrying after partial submission risks double
/// exposure).
#[derive(Debug, Clone)]
pub struct RouterError {
    pub kind: ErrorKind,
    pub had_success: bool,
}

impl RouterError {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, had_success: false }
    }

    pub fn with_had_success(kind: ErrorKind, had_success: bool) -> Self {
        Self { kind, had_success }
    }

    /// Maps this error's kind to the metrics reason histogram bucket.
    pub fn reason(&self) -> FailureReason {
        match &self.kind {
            ErrorKind::Gate(_) => FailureReason::Unknown,
            ErrorKind::PreflightDepth(_)
            | ErrorKind::PreflightDeviation(_)
            | ErrorKind::PreflightDrift(_)
            | ErrorKind::PreflightProfit(_) => FailureReason::Preflight,
            ErrorKind::ExecutionVenueFailure { .. } => FailureReason::Execution,
            ErrorKind::PostTradeDrift { .. } | ErrorKind::PostTradeResidual { .. } => FailureReason::PostTrade,
            ErrorKind::HedgeFailure { .. } => FailureReason::Hedge,
        }
    }

    /// Whether the message this error renders to should count toward the
    /// `softBlocks` metric (a bound was crossed but by a soft, not hard,
    /// threshold).
    pub fn is_soft_block(&self) -> bool {
        matches!(
            &self.kind,
            ErrorKind::PreflightDeviation(PreflightDeviationKind::SoftBlock { .. })
        )
    }
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::Gate(g) => match g {
                GateKind::CircuitOpen => write!(f, "circuit breaker open"),
                GateKind::GlobalCooldown => write!(f, "global cooldown active"),
                GateKind::FailurePause => write!(f, "failure pause active"),
                GateKind::AllowBlocklistViolation { venue_or_token } => {
                    write!(f, "blocklist violation for {venue_or_token}")
                }
                GateKind::TokenCooldown { token_id } => write!(f, "token {token_id} in cooldown"),
                GateKind::VenueCooldown { venue } => write!(f, "venue {venue} in cooldown"),
                GateKind::TokenScoreBelowFloor { token_id, score } => {
                    write!(f, "token {token_id} score {score} below floor")
                }
                GateKind::VenueScoreBelowFloor { venue, score } => {
                    write!(f, "venue {venue} score {score} below floor")
                }
            },
            ErrorKind::PreflightDepth(d) => match d {
                PreflightDepthKind::MissingOrderbook { key } => write!(f, "missing orderbook for {key}"),
                PreflightDepthKind::InsufficientDepth { available, required } => {
                    write!(f, "insufficient depth: available {available}, required {required}")
                }
                PreflightDepthKind::DepthBelowMinLegUsd { key, depth_usd, min_usd } => {
                    write!(f, "depth {depth_usd} below min {min_usd} usd for {key}")
                }
                PreflightDepthKind::DepthRatioTooAsymmetric { ratio, min_ratio } => {
                    write!(f, "depth ratio {ratio} below min {min_ratio}")
                }
                PreflightDepthKind::UsageCapExceeded { key, fraction, cap } => {
                    write!(f, "usage cap exceeded for {key}: {fraction} > {cap}")
                }
            },
            ErrorKind::PreflightDeviation(d) => match d {
                PreflightDeviationKind::VwapDeviationExceeded { key, deviation_bps, cap_bps } => {
                    write!(f, "vwap deviation {deviation_bps}bps exceeds cap {cap_bps}bps for {key}")
                }
                PreflightDeviationKind::TooManyVwapLevels { key, levels, max } => {
                    write!(f, "vwap levels {levels} exceed max {max} for {key}")
                }
                PreflightDeviationKind::LegDeviationSpreadExceeded { spread_bps, cap_bps } => {
                    write!(f, "leg deviation spread {spread_bps}bps exceeds cap {cap_bps}bps")
                }
                PreflightDeviationKind::SoftBlock { key, deviation_bps, soft_bps } => {
                    write!(f, "soft block: deviation {deviation_bps}bps exceeds soft {soft_bps}bps for {key}")
                }
            },
            ErrorKind::PreflightDrift(d) => match d {
                PreflightDriftKind::PriceDriftExceeded { key, drift_bps, cap_bps } => {
                    write!(f, "price drift {drift_bps}bps exceeds cap {cap_bps}bps for {key}")
                }
                PreflightDriftKind::StabilityBreach { key, drift_bps, cap_bps } => {
                    write!(f, "stability breach {drift_bps}bps exceeds cap {cap_bps}bps for {key}")
                }
                PreflightDriftKind::ConsistencyDrift { metric, drift_bps, cap_bps } => {
                    write!(f, "consistency drift on {metric}: {drift_bps}bps exceeds cap {cap_bps}bps")
                }
            },
            ErrorKind::PreflightProfit(d) => match d {
                PreflightProfitKind::NotionalBelowMin { notional, min_notional } => {
                    write!(f, "notional {notional} below min {min_notional}")
                }
                PreflightProfitKind::ProfitBelowMin { profit, required } => {
                    write!(f, "profit {profit} below required {required}")
                }
                PreflightProfitKind::NetRiskBudgetExceeded { scope, notional, budget } => {
                    write!(f, "net risk budget exceeded ({scope}): {notional} > {budget}")
                }
            },
            ErrorKind::ExecutionVenueFailure { venue, message } => {
                write!(f, "venue {venue} execution failed: {message}")
            }
            ErrorKind::PostTradeDrift { drift_bps, threshold_bps } => {
                write!(f, "post-trade drift {drift_bps}bps exceeds threshold {threshold_bps}bps")
            }
            ErrorKind::PostTradeResidual { remaining_order_ids } => {
                write!(f, "open orders remain after fill check: {remaining_order_ids:?}")
            }
            ErrorKind::HedgeFailure { message } => write!(f, "hedge failed: {message}"),
        }
    }
}

impl std::error::Error for RouterError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_classifies_preflight_variants() {
        let err = RouterError::new(ErrorKind::PreflightDepth(PreflightDepthKind::InsufficientDepth {
            available: 10.0,
            required: 20.0,
        }));
        assert_eq!(err.reason(), FailureReason::Preflight);
    }

    #[test]
    fn soft_block_only_flagged_for_soft_block_kind() {
        let key = LegKey { venue: crate::types::Venue::Predict, token_id: "T1".into(), side: crate::types::Side::Buy };
        let soft = RouterError::new(ErrorKind::PreflightDeviation(PreflightDeviationKind::SoftBlock {
            key: key.clone(),
            deviation_bps: 10.0,
            soft_bps: 5.0,
        }));
        assert!(soft.is_soft_block());

        let hard = RouterError::new(ErrorKind::PreflightDeviation(PreflightDeviationKind::VwapDeviationExceeded {
            key,
            deviation_bps: 50.0,
            cap_bps: 30.0,
        }));
        assert!(!hard.is_soft_block());
    }

    #[test]
    fn had_success_defaults_false() {
        let err = RouterError::new(ErrorKind::Gate(GateKind::CircuitOpen));
        assert!(!err.had_success);
    }
}
