//! Domain entities.

pub mod account;
pub mod audit;
pub mod broker_order;
pub mod holding;
pub mod ledger_event;
pub mod position;

pub use account::Account;
pub use audit::{AuditOperation, AuditRecord, AuditScope};
pub use broker_order::{BrokerOrder, BrokerOrderStatus, OrderSide};
pub use holding::{Holding, HOLDING_EPSILON};
pub use ledger_event::{LedgerEvent, LedgerEventKind};
pub use position::{DayTradePosition, ExitReason, PositionStatus};
