//! Cross-Platform Execution Router
//!
//! Multi-stage preflight, adaptive sizing, chunked dispatch across venue
//! executors, post-trade drift monitoring and hedging, reputation/gating,
//! a self-tuning controller, and metrics/state persistence for arbitrage
//! legs across Predict, Polymarket, and Opinion.

pub mod book_cache;
pub mod chunker;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod posttrade;
pub mod preflight;
pub mod reputation;
pub mod router;
pub mod sizer;
pub mod types;
pub mod venue;
pub mod vwap;

pub use config::{ExecutionMode, RouterConfig};
pub use error::{ErrorKind, FailureReason, RouterError};
pub use router::{ExecutionOutcome, Router};
pub use types::{Book, BookLevel, ExecutionResult, Leg, LegKey, Side, Venue};
pub use venue::{ExecutionOptions, OrderType, VenueAdapter};
