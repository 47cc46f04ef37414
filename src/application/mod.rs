//! Application layer: the account actor and the scheduled loops around it.

pub mod account_actor;
pub mod executors;
pub mod monitor_sweep;
pub mod order_sweep;
pub mod trading_session;

pub use account_actor::{AccountActor, AccountHandle, AccountSnapshot, ActorError};
pub use executors::{BrokeredExecutor, OrderExecutor, SimulatedExecutor};
pub use monitor_sweep::MonitorSweep;
pub use order_sweep::OrderSweep;
pub use trading_session::MorningSession;
