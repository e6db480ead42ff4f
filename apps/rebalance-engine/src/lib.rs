// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Rebalance Engine - Core Library
//!
//! Turns a target portfolio into broker orders and verifies what actually
//! happened. One run is a straight pipeline:
//!
//! 1. **Resolution** (`resolution`): map each universe asset to a tradable
//!    broker contract via ISIN, ticker variations, then fuzzy name search,
//!    backed by a TTL cache.
//! 2. **Diff** (`diff`): compare target quantities against live positions
//!    and emit market orders, sells before buys.
//! 3. **Submission** (`submit`): place orders one at a time with pacing,
//!    tracking each through its broker lifecycle.
//! 4. **Reconciliation** (`reconcile`): after a settle window, pull the
//!    broker's ledgers and classify every order's true outcome.
//!
//! Broker connectivity (`broker`) runs through a pool of session actors
//! with automatic backoff reconnection; a simulated venue implements the
//! same connector trait for paper runs and tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

pub mod broker;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod models;
pub mod reconcile;
pub mod resolution;
pub mod submit;
pub mod telemetry;

pub use engine::{RebalanceEngine, RunOutcome};
pub use error::EngineError;
