//! Intraday trading engine: an event-sourced ledger of cash and holdings,
//! a recommendation engine, and a broker order lifecycle that keeps both
//! sides honest.
//!
//! Layout:
//! - `domain::entities` and `domain::value_objects`: accounts, events,
//!   holdings, orders, positions.
//! - `domain::services`: the ledger core, scoring and sizing, execution,
//!   exit monitoring, and drift reconciliation.
//! - `domain::repositories`: ports for the brokerage gateway, prices, and
//!   the prediction model.
//! - `application`: the per-account actor and the polling loops.
//!
//! The ledger is the source of truth: every cash or holding change is an
//! appended event, and replaying the stream reproduces the account
//! exactly. Broker fills enter the ledger only through reconciliation, so
//! crashes and duplicate status reports cannot double-book a trade.

pub mod application;
pub mod config;
pub mod domain;

use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber, honoring `RUST_LOG`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}
