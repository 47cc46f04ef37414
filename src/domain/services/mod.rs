//! Domain services: the ledger core, the recommendation engine, order
//! execution, exit monitoring, and drift reconciliation.

pub mod ledger;
pub mod market_hours;
pub mod order_executor;
pub mod position_monitor;
pub mod recommendation;
pub mod reconciliation;

pub use ledger::{apply, replay, AccountBook, HoldingChange, LedgerOutcome, LedgerSnapshot};
pub use order_executor::{
    abort_submission, apply_simulated_entry, apply_simulated_exit, prepare_entry, prepare_exit,
    reconcile_order, record_submitted, stale_orders, SubmissionTicket,
};
pub use position_monitor::PositionMonitor;
pub use recommendation::{RecommendationEngine, TradeCandidate};
pub use reconciliation::{DriftFinding, ReconciliationReport, ReconciliationSweep};
