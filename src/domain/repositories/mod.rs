//! Ports to the outside world: brokerage gateways, market data, models.

pub mod brokerage;
pub mod predictor;
pub mod price_source;

pub use brokerage::{BrokerageConnector, BrokerageResult, BrokerReportedStatus, OrderStatusReport};
pub use predictor::{Prediction, Predictor};
pub use price_source::PriceSource;
