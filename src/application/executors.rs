//! Entry and exit submission against an account actor.
//!
//! The actor only ever runs short state transitions; the slow part of a
//! submission, the brokerage call, happens here, between two mailbox
//! messages. `BrokeredExecutor` reserves through `prepare_entry` /
//! `prepare_exit`, makes the gateway call on its own time, then records
//! the outcome; deposits and settlements queued behind the submission are
//! served in the meantime. `SimulatedExecutor` has no gateway and resolves
//! in a single message.

use crate::application::account_actor::{AccountHandle, ActorError};
use crate::domain::entities::{ExitReason, OrderSide};
use crate::domain::errors::{ExecutionError, LedgerError};
use crate::domain::repositories::{BrokerageConnector, PriceSource};
use crate::domain::services::order_executor::SubmissionTicket;
use crate::domain::services::recommendation::TradeCandidate;
use crate::domain::value_objects::Price;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Places entries and exits for one account.
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    /// Opens a position for a sized candidate. Returns the position id.
    async fn submit_entry(
        &self,
        account: &AccountHandle,
        candidate: &TradeCandidate,
        trade_date: NaiveDate,
    ) -> Result<String, ActorError>;

    /// Closes an OPEN position. `reference_price` is the price that
    /// triggered the exit; brokered exits submit a market order and may
    /// fill elsewhere.
    async fn submit_exit(
        &self,
        account: &AccountHandle,
        position_id: &str,
        reason: ExitReason,
        reference_price: Price,
    ) -> Result<(), ActorError>;
}

/// Executor that routes orders through a brokerage gateway.
pub struct BrokeredExecutor {
    connector: Arc<dyn BrokerageConnector>,
    call_timeout: Duration,
}

impl BrokeredExecutor {
    pub fn new(connector: Arc<dyn BrokerageConnector>, call_timeout: Duration) -> Self {
        Self {
            connector,
            call_timeout,
        }
    }

    async fn call<T, F>(&self, fut: F) -> Result<T, ExecutionError>
    where
        F: Future<Output = Result<T, ExecutionError>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ExecutionError::Timeout(self.call_timeout.as_millis() as u64)),
        }
    }

    /// Submits a prepared ticket and records the outcome on the account.
    async fn submit_ticket(
        &self,
        account: &AccountHandle,
        ticket: &SubmissionTicket,
    ) -> Result<(), ActorError> {
        let submitted = self
            .call(self.connector.submit_market_order(
                &ticket.symbol,
                ticket.side,
                ticket.quantity,
            ))
            .await;
        match submitted {
            Ok(broker_order_id) => {
                info!(
                    order = %ticket.client_order_id,
                    broker_order = %broker_order_id,
                    symbol = %ticket.symbol,
                    side = %ticket.side,
                    "Order submitted"
                );
                account
                    .record_submitted(&ticket.client_order_id, broker_order_id)
                    .await
            }
            Err(err) => {
                warn!(order = %ticket.client_order_id, error = %err, "Submission failed");
                account
                    .abort_submission(&ticket.client_order_id, &err.to_string())
                    .await?;
                Err(ActorError::Execution(err))
            }
        }
    }
}

#[async_trait]
impl OrderExecutor for BrokeredExecutor {
    async fn submit_entry(
        &self,
        account: &AccountHandle,
        candidate: &TradeCandidate,
        trade_date: NaiveDate,
    ) -> Result<String, ActorError> {
        let ticket = account.prepare_entry(candidate.clone(), trade_date).await?;
        debug_assert_eq!(ticket.side, OrderSide::Buy);
        self.submit_ticket(account, &ticket).await?;
        Ok(ticket.position_id)
    }

    async fn submit_exit(
        &self,
        account: &AccountHandle,
        position_id: &str,
        reason: ExitReason,
        _reference_price: Price,
    ) -> Result<(), ActorError> {
        let ticket = account.prepare_exit(position_id, reason).await?;
        self.submit_ticket(account, &ticket).await
    }
}

/// Executor for paper accounts: fills immediately at the reference price,
/// no gateway involved.
pub struct SimulatedExecutor {
    price_source: Arc<dyn PriceSource>,
}

impl SimulatedExecutor {
    pub fn new(price_source: Arc<dyn PriceSource>) -> Self {
        Self { price_source }
    }
}

#[async_trait]
impl OrderExecutor for SimulatedExecutor {
    async fn submit_entry(
        &self,
        account: &AccountHandle,
        candidate: &TradeCandidate,
        trade_date: NaiveDate,
    ) -> Result<String, ActorError> {
        // The price lookup is I/O too; it happens out here.
        let fill_price = match self.price_source.live_price(&candidate.symbol).await {
            Some(price) => price,
            None => Price::new(candidate.entry_price)
                .map_err(LedgerError::Validation)
                .map_err(ExecutionError::from)?,
        };
        account
            .simulated_entry(candidate.clone(), fill_price, trade_date)
            .await
    }

    async fn submit_exit(
        &self,
        account: &AccountHandle,
        position_id: &str,
        reason: ExitReason,
        reference_price: Price,
    ) -> Result<(), ActorError> {
        account
            .simulated_exit(position_id, reason, reference_price)
            .await
    }
}
