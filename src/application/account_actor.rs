//! Single-writer actor owning all mutable state of one account.
//!
//! Every mutation (ledger events, submission bookkeeping, settlements,
//! corrections) flows through this actor's mailbox, which serializes them
//! without locks. No command handler performs I/O: the executors and the
//! polling loops talk to the brokerage and price sources on their own time
//! and only send short state transitions here, so the account is never
//! held across a slow network call.

use crate::domain::entities::{
    AuditRecord, DayTradePosition, ExitReason, Holding, LedgerEvent,
};
use crate::domain::errors::{ExecutionError, LedgerError, ReconciliationError};
use crate::domain::repositories::OrderStatusReport;
use crate::domain::services::ledger::AccountBook;
use crate::domain::services::order_executor::{
    abort_submission, apply_simulated_entry, apply_simulated_exit, prepare_entry, prepare_exit,
    reconcile_order, record_submitted, stale_orders, SubmissionTicket,
};
use crate::domain::services::recommendation::TradeCandidate;
use crate::domain::services::reconciliation::{ReconciliationReport, ReconciliationSweep};
use crate::domain::value_objects::Price;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Errors surfaced by `AccountHandle` calls.
#[derive(Debug, Error)]
pub enum ActorError {
    #[error("account actor is no longer running")]
    Closed,
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Reconciliation(#[from] ReconciliationError),
}

/// Read-only view of the account for reporting and session planning.
#[derive(Debug, Clone)]
pub struct AccountSnapshot {
    pub account_id: String,
    pub cash_balance: Decimal,
    pub holdings: Vec<Holding>,
}

#[derive(Debug)]
pub enum AccountCommand {
    Deposit {
        amount: Decimal,
        trade_date: NaiveDate,
        reply: mpsc::Sender<Result<AuditRecord, LedgerError>>,
    },
    Withdraw {
        amount: Decimal,
        trade_date: NaiveDate,
        reply: mpsc::Sender<Result<AuditRecord, LedgerError>>,
    },
    PrepareEntry {
        candidate: TradeCandidate,
        trade_date: NaiveDate,
        reply: mpsc::Sender<Result<SubmissionTicket, ExecutionError>>,
    },
    PrepareExit {
        position_id: String,
        reason: ExitReason,
        reply: mpsc::Sender<Result<SubmissionTicket, ExecutionError>>,
    },
    RecordSubmitted {
        client_order_id: String,
        broker_order_id: String,
        reply: mpsc::Sender<Result<(), ExecutionError>>,
    },
    AbortSubmission {
        client_order_id: String,
        reason: String,
        reply: mpsc::Sender<Result<(), ExecutionError>>,
    },
    SimulatedEntry {
        candidate: TradeCandidate,
        fill_price: Price,
        trade_date: NaiveDate,
        reply: mpsc::Sender<Result<String, ExecutionError>>,
    },
    SimulatedExit {
        position_id: String,
        reason: ExitReason,
        fill_price: Price,
        reply: mpsc::Sender<Result<(), ExecutionError>>,
    },
    ReconcileOrder {
        client_order_id: String,
        report: OrderStatusReport,
        now: DateTime<Utc>,
        reply: mpsc::Sender<Result<(), ExecutionError>>,
    },
    ActiveOrders {
        reply: mpsc::Sender<Vec<(String, String)>>,
    },
    StaleOrders {
        now: DateTime<Utc>,
        timeout: Duration,
        reply: mpsc::Sender<Vec<(String, String)>>,
    },
    OpenPositions {
        reply: mpsc::Sender<Vec<DayTradePosition>>,
    },
    Snapshot {
        reply: mpsc::Sender<AccountSnapshot>,
    },
    Reconcile {
        approve_corrections: bool,
        reply: mpsc::Sender<Result<ReconciliationReport, ReconciliationError>>,
    },
}

pub struct AccountActor {
    receiver: mpsc::Receiver<AccountCommand>,
    book: AccountBook,
}

impl AccountActor {
    /// Starts the actor and returns the handle used to talk to it.
    pub fn spawn(book: AccountBook) -> AccountHandle {
        let (sender, receiver) = mpsc::channel(64);
        let actor = AccountActor { receiver, book };
        tokio::spawn(actor.run());
        AccountHandle { sender }
    }

    async fn run(mut self) {
        info!(account = %self.book.account.id, "Account actor started");
        while let Some(command) = self.receiver.recv().await {
            self.handle(command).await;
        }
        info!(account = %self.book.account.id, "Account actor stopped");
    }

    async fn handle(&mut self, command: AccountCommand) {
        match command {
            AccountCommand::Deposit {
                amount,
                trade_date,
                reply,
            } => {
                let result = self.apply_cash_event(amount, trade_date, true);
                let _ = reply.send(result).await;
            }
            AccountCommand::Withdraw {
                amount,
                trade_date,
                reply,
            } => {
                let result = self.apply_cash_event(amount, trade_date, false);
                let _ = reply.send(result).await;
            }
            AccountCommand::PrepareEntry {
                candidate,
                trade_date,
                reply,
            } => {
                let result = prepare_entry(&mut self.book, &candidate, trade_date);
                let _ = reply.send(result).await;
            }
            AccountCommand::PrepareExit {
                position_id,
                reason,
                reply,
            } => {
                let result = prepare_exit(&mut self.book, &position_id, reason);
                if let Err(err) = &result {
                    warn!(position = %position_id, error = %err, "Exit preparation failed");
                }
                let _ = reply.send(result).await;
            }
            AccountCommand::RecordSubmitted {
                client_order_id,
                broker_order_id,
                reply,
            } => {
                let result =
                    record_submitted(&mut self.book, &client_order_id, broker_order_id, Utc::now());
                let _ = reply.send(result).await;
            }
            AccountCommand::AbortSubmission {
                client_order_id,
                reason,
                reply,
            } => {
                let result = abort_submission(&mut self.book, &client_order_id, &reason, Utc::now());
                let _ = reply.send(result).await;
            }
            AccountCommand::SimulatedEntry {
                candidate,
                fill_price,
                trade_date,
                reply,
            } => {
                let result = apply_simulated_entry(&mut self.book, &candidate, fill_price, trade_date);
                let _ = reply.send(result).await;
            }
            AccountCommand::SimulatedExit {
                position_id,
                reason,
                fill_price,
                reply,
            } => {
                let result = apply_simulated_exit(&mut self.book, &position_id, reason, fill_price);
                let _ = reply.send(result).await;
            }
            AccountCommand::ReconcileOrder {
                client_order_id,
                report,
                now,
                reply,
            } => {
                let result = reconcile_order(&mut self.book, &client_order_id, &report, now);
                if let Err(err) = &result {
                    error!(order = %client_order_id, error = %err, "Settlement failed");
                }
                let _ = reply.send(result).await;
            }
            AccountCommand::ActiveOrders { reply } => {
                let active = self
                    .book
                    .active_orders()
                    .into_iter()
                    .filter_map(|o| {
                        o.broker_order_id
                            .as_ref()
                            .map(|b| (o.client_order_id.clone(), b.clone()))
                    })
                    .collect();
                let _ = reply.send(active).await;
            }
            AccountCommand::StaleOrders { now, timeout, reply } => {
                let _ = reply.send(stale_orders(&self.book, now, timeout)).await;
            }
            AccountCommand::OpenPositions { reply } => {
                let open = self.book.open_positions().into_iter().cloned().collect();
                let _ = reply.send(open).await;
            }
            AccountCommand::Snapshot { reply } => {
                let snapshot = AccountSnapshot {
                    account_id: self.book.account.id.clone(),
                    cash_balance: self.book.account.cash_balance,
                    holdings: self.book.holdings.values().cloned().collect(),
                };
                let _ = reply.send(snapshot).await;
            }
            AccountCommand::Reconcile {
                approve_corrections,
                reply,
            } => {
                let sweep = if approve_corrections {
                    ReconciliationSweep::with_corrections_approved()
                } else {
                    ReconciliationSweep::default()
                };
                let _ = reply.send(sweep.sweep(&mut self.book)).await;
            }
        }
    }

    fn apply_cash_event(
        &mut self,
        amount: Decimal,
        trade_date: NaiveDate,
        deposit: bool,
    ) -> Result<AuditRecord, LedgerError> {
        let sequence = self.book.next_sequence();
        let event = if deposit {
            LedgerEvent::deposit(amount, trade_date, sequence)?
        } else {
            LedgerEvent::withdrawal(amount, trade_date, sequence)?
        };
        self.book.apply_event(event)
    }
}

/// Clonable handle to one account actor.
#[derive(Clone)]
pub struct AccountHandle {
    sender: mpsc::Sender<AccountCommand>,
}

impl AccountHandle {
    async fn request<T>(
        &self,
        command: AccountCommand,
        mut receiver: mpsc::Receiver<T>,
    ) -> Result<T, ActorError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| ActorError::Closed)?;
        receiver.recv().await.ok_or(ActorError::Closed)
    }

    pub async fn deposit(
        &self,
        amount: Decimal,
        trade_date: NaiveDate,
    ) -> Result<AuditRecord, ActorError> {
        let (reply, receiver) = mpsc::channel(1);
        let result = self
            .request(
                AccountCommand::Deposit {
                    amount,
                    trade_date,
                    reply,
                },
                receiver,
            )
            .await?;
        Ok(result?)
    }

    pub async fn withdraw(
        &self,
        amount: Decimal,
        trade_date: NaiveDate,
    ) -> Result<AuditRecord, ActorError> {
        let (reply, receiver) = mpsc::channel(1);
        let result = self
            .request(
                AccountCommand::Withdraw {
                    amount,
                    trade_date,
                    reply,
                },
                receiver,
            )
            .await?;
        Ok(result?)
    }

    /// Reserves cash and records intent for an entry; the caller owns the
    /// brokerage call and must follow up with `record_submitted` or
    /// `abort_submission`.
    pub async fn prepare_entry(
        &self,
        candidate: TradeCandidate,
        trade_date: NaiveDate,
    ) -> Result<SubmissionTicket, ActorError> {
        let (reply, receiver) = mpsc::channel(1);
        let result = self
            .request(
                AccountCommand::PrepareEntry {
                    candidate,
                    trade_date,
                    reply,
                },
                receiver,
            )
            .await?;
        Ok(result?)
    }

    pub async fn prepare_exit(
        &self,
        position_id: &str,
        reason: ExitReason,
    ) -> Result<SubmissionTicket, ActorError> {
        let (reply, receiver) = mpsc::channel(1);
        let result = self
            .request(
                AccountCommand::PrepareExit {
                    position_id: position_id.to_string(),
                    reason,
                    reply,
                },
                receiver,
            )
            .await?;
        Ok(result?)
    }

    pub async fn record_submitted(
        &self,
        client_order_id: &str,
        broker_order_id: String,
    ) -> Result<(), ActorError> {
        let (reply, receiver) = mpsc::channel(1);
        let result = self
            .request(
                AccountCommand::RecordSubmitted {
                    client_order_id: client_order_id.to_string(),
                    broker_order_id,
                    reply,
                },
                receiver,
            )
            .await?;
        Ok(result?)
    }

    pub async fn abort_submission(
        &self,
        client_order_id: &str,
        reason: &str,
    ) -> Result<(), ActorError> {
        let (reply, receiver) = mpsc::channel(1);
        let result = self
            .request(
                AccountCommand::AbortSubmission {
                    client_order_id: client_order_id.to_string(),
                    reason: reason.to_string(),
                    reply,
                },
                receiver,
            )
            .await?;
        Ok(result?)
    }

    pub async fn simulated_entry(
        &self,
        candidate: TradeCandidate,
        fill_price: Price,
        trade_date: NaiveDate,
    ) -> Result<String, ActorError> {
        let (reply, receiver) = mpsc::channel(1);
        let result = self
            .request(
                AccountCommand::SimulatedEntry {
                    candidate,
                    fill_price,
                    trade_date,
                    reply,
                },
                receiver,
            )
            .await?;
        Ok(result?)
    }

    pub async fn simulated_exit(
        &self,
        position_id: &str,
        reason: ExitReason,
        fill_price: Price,
    ) -> Result<(), ActorError> {
        let (reply, receiver) = mpsc::channel(1);
        let result = self
            .request(
                AccountCommand::SimulatedExit {
                    position_id: position_id.to_string(),
                    reason,
                    fill_price,
                    reply,
                },
                receiver,
            )
            .await?;
        Ok(result?)
    }

    pub async fn reconcile_order(
        &self,
        client_order_id: &str,
        report: OrderStatusReport,
        now: DateTime<Utc>,
    ) -> Result<(), ActorError> {
        let (reply, receiver) = mpsc::channel(1);
        let result = self
            .request(
                AccountCommand::ReconcileOrder {
                    client_order_id: client_order_id.to_string(),
                    report,
                    now,
                    reply,
                },
                receiver,
            )
            .await?;
        Ok(result?)
    }

    pub async fn active_orders(&self) -> Result<Vec<(String, String)>, ActorError> {
        let (reply, receiver) = mpsc::channel(1);
        self.request(AccountCommand::ActiveOrders { reply }, receiver)
            .await
    }

    pub async fn stale_orders(
        &self,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<Vec<(String, String)>, ActorError> {
        let (reply, receiver) = mpsc::channel(1);
        self.request(AccountCommand::StaleOrders { now, timeout, reply }, receiver)
            .await
    }

    pub async fn open_positions(&self) -> Result<Vec<DayTradePosition>, ActorError> {
        let (reply, receiver) = mpsc::channel(1);
        self.request(AccountCommand::OpenPositions { reply }, receiver)
            .await
    }

    pub async fn snapshot(&self) -> Result<AccountSnapshot, ActorError> {
        let (reply, receiver) = mpsc::channel(1);
        self.request(AccountCommand::Snapshot { reply }, receiver)
            .await
    }

    pub async fn reconcile(
        &self,
        approve_corrections: bool,
    ) -> Result<ReconciliationReport, ActorError> {
        let (reply, receiver) = mpsc::channel(1);
        let result = self
            .request(
                AccountCommand::Reconcile {
                    approve_corrections,
                    reply,
                },
                receiver,
            )
            .await?;
        Ok(result?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::executors::{OrderExecutor, SimulatedExecutor};
    use crate::domain::entities::Account;
    use crate::domain::repositories::PriceSource;
    use crate::domain::services::recommendation::estimated_entry_cost;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    struct NoPrices;

    #[async_trait]
    impl PriceSource for NoPrices {
        async fn live_price(&self, _symbol: &str) -> Option<Price> {
            None
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
    }

    fn spawn(cash: Decimal) -> AccountHandle {
        AccountActor::spawn(AccountBook::new(Account::new("acct-1", cash).unwrap()))
    }

    fn simulated() -> SimulatedExecutor {
        SimulatedExecutor::new(Arc::new(NoPrices))
    }

    fn candidate(symbol: &str, shares: Decimal, entry: Decimal) -> TradeCandidate {
        TradeCandidate {
            symbol: symbol.to_string(),
            confidence_score: 80.0,
            predicted_return: 0.01,
            entry_price: entry,
            target_price: entry * dec!(1.02),
            stop_price: entry * dec!(0.99),
            shares,
            estimated_cost: estimated_entry_cost(shares, entry),
        }
    }

    #[tokio::test]
    async fn deposits_and_withdrawals_flow_through_the_ledger() {
        let handle = spawn(dec!(0));
        handle.deposit(dec!(10000), day()).await.unwrap();
        handle.withdraw(dec!(400), day()).await.unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.cash_balance, dec!(9600));
    }

    #[tokio::test]
    async fn overdrawn_withdrawal_is_rejected() {
        let handle = spawn(dec!(100));
        let err = handle.withdraw(dec!(500), day()).await.unwrap_err();
        assert!(matches!(
            err,
            ActorError::Ledger(LedgerError::InsufficientFunds { .. })
        ));
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.cash_balance, dec!(100));
    }

    #[tokio::test]
    async fn entries_open_positions_and_duplicates_are_rejected() {
        let handle = spawn(dec!(10000));
        let executor = simulated();
        executor
            .submit_entry(&handle, &candidate("AAPL", dec!(10), dec!(100)), day())
            .await
            .unwrap();

        let again = executor
            .submit_entry(&handle, &candidate("AAPL", dec!(10), dec!(100)), day())
            .await;
        assert!(matches!(
            again,
            Err(ActorError::Execution(ExecutionError::DuplicatePosition(_)))
        ));

        let open = handle.open_positions().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].symbol, "AAPL");
    }

    #[tokio::test]
    async fn close_realizes_the_exit() {
        let handle = spawn(dec!(10000));
        let executor = simulated();
        let position_id = executor
            .submit_entry(&handle, &candidate("AAPL", dec!(10), dec!(100)), day())
            .await
            .unwrap();

        executor
            .submit_exit(
                &handle,
                &position_id,
                ExitReason::TargetHit,
                Price::new(dec!(102)).unwrap(),
            )
            .await
            .unwrap();

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.cash_balance, dec!(10020));
        assert!(snapshot.holdings.is_empty());
        assert!(handle.open_positions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reconcile_reports_clean_after_simulated_trading() {
        let handle = spawn(dec!(0));
        handle.deposit(dec!(10000), day()).await.unwrap();
        simulated()
            .submit_entry(&handle, &candidate("AAPL", dec!(10), dec!(100)), day())
            .await
            .unwrap();
        let report = handle.reconcile(false).await.unwrap();
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn concurrent_commands_serialize_without_loss() {
        let handle = spawn(dec!(0));
        let mut tasks = Vec::new();
        for _ in 0..20 {
            let h = handle.clone();
            tasks.push(tokio::spawn(async move { h.deposit(dec!(10), day()).await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.cash_balance, dec!(200));
    }
}
