//! Order execution state transitions: submission bookkeeping and the
//! settlement of broker status reports into the ledger.
//!
//! Everything here is a synchronous transition over one `AccountBook`; no
//! function in this module performs I/O. Submission is split into three
//! steps so the network call can happen without holding the account:
//! `prepare_entry`/`prepare_exit` reserve and record intent,
//! `record_submitted` attaches the broker's id once the order went out,
//! and `abort_submission` unwinds a submission that never reached the
//! brokerage. Simulated accounts skip the round trip entirely through
//! `apply_simulated_entry`/`apply_simulated_exit`.

use crate::domain::entities::{
    BrokerOrder, BrokerOrderStatus, DayTradePosition, ExitReason, LedgerEvent, OrderSide,
    PositionStatus,
};
use crate::domain::errors::{ExecutionError, LedgerError};
use crate::domain::repositories::{BrokerReportedStatus, OrderStatusReport};
use crate::domain::services::ledger::AccountBook;
use crate::domain::services::recommendation::TradeCandidate;
use crate::domain::value_objects::{Price, Quantity};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What a prepared submission hands to whoever talks to the brokerage.
#[derive(Debug, Clone)]
pub struct SubmissionTicket {
    pub client_order_id: String,
    pub position_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Quantity,
}

fn next_order_id(book: &AccountBook) -> String {
    format!("ord-{}-{}", book.account.id, book.orders.len() + 1)
}

fn next_position_id(book: &AccountBook) -> String {
    format!("pos-{}-{}", book.account.id, book.positions.len() + 1)
}

/// One position per symbol per trade date, however it ended, except a
/// cancelled entry which never got in.
fn ensure_new_position(
    book: &AccountBook,
    symbol: &str,
    trade_date: NaiveDate,
) -> Result<(), ExecutionError> {
    let duplicate = book.positions.values().any(|p| {
        p.symbol == symbol && p.trade_date == trade_date && p.status != PositionStatus::Cancelled
    });
    if duplicate {
        info!(%symbol, "Skipped, already traded today");
        return Err(ExecutionError::DuplicatePosition(symbol.to_string()));
    }
    Ok(())
}

/// Reserves cash for a sized candidate and records a PENDING order and
/// position. The brokerage has not seen anything yet; the caller submits
/// the returned ticket and then reports back with `record_submitted` or
/// `abort_submission`.
pub fn prepare_entry(
    book: &mut AccountBook,
    candidate: &TradeCandidate,
    trade_date: NaiveDate,
) -> Result<SubmissionTicket, ExecutionError> {
    ensure_new_position(book, &candidate.symbol, trade_date)?;
    let quantity = Quantity::new(candidate.shares).map_err(LedgerError::Validation)?;

    // Funds check and reservation happen before the gateway sees the
    // order; an underfunded candidate never leaves the process.
    book.account.reserve_cash(candidate.estimated_cost)?;

    let order_id = next_order_id(book);
    let position_id = next_position_id(book);
    let mut order = BrokerOrder::new(
        &order_id,
        &book.account.id,
        &candidate.symbol,
        OrderSide::Buy,
        candidate.shares,
    );
    order.reserved_cash = candidate.estimated_cost;
    order.position_id = Some(position_id.clone());
    book.orders.insert(order_id.clone(), order);

    book.positions.insert(
        position_id.clone(),
        DayTradePosition {
            id: position_id.clone(),
            account_id: book.account.id.clone(),
            symbol: candidate.symbol.clone(),
            trade_date,
            status: PositionStatus::Pending,
            shares: candidate.shares,
            entry_price: candidate.entry_price,
            target_price: candidate.target_price,
            stop_price: candidate.stop_price,
            exit_price: None,
            exit_reason: None,
            confidence_score: candidate.confidence_score,
            predicted_return: candidate.predicted_return,
            opened_at: None,
            closed_at: None,
        },
    );
    info!(
        order = %order_id,
        symbol = %candidate.symbol,
        shares = %candidate.shares,
        reserved = %candidate.estimated_cost,
        "Entry prepared"
    );
    Ok(SubmissionTicket {
        client_order_id: order_id,
        position_id,
        symbol: candidate.symbol.clone(),
        side: OrderSide::Buy,
        quantity,
    })
}

/// Marks an OPEN position CLOSING and records a PENDING sell order for its
/// full size. Settled like any other order once the brokerage reports.
pub fn prepare_exit(
    book: &mut AccountBook,
    position_id: &str,
    reason: ExitReason,
) -> Result<SubmissionTicket, ExecutionError> {
    let position = book
        .positions
        .get(position_id)
        .ok_or_else(|| ExecutionError::PositionNotFound(position_id.to_string()))?;
    if position.status != PositionStatus::Open {
        return Err(ExecutionError::InvalidPositionState {
            id: position_id.to_string(),
            status: position.status.to_string(),
            expected: PositionStatus::Open.to_string(),
        });
    }
    let symbol = position.symbol.clone();
    let shares = position.shares;
    let quantity = Quantity::new(shares).map_err(LedgerError::Validation)?;

    let order_id = next_order_id(book);
    let mut order = BrokerOrder::new(&order_id, &book.account.id, &symbol, OrderSide::Sell, shares);
    order.position_id = Some(position_id.to_string());
    book.orders.insert(order_id.clone(), order);

    if let Some(position) = book.positions.get_mut(position_id) {
        position.status = PositionStatus::Closing;
        position.exit_reason = Some(reason);
    }
    info!(order = %order_id, %symbol, %reason, "Exit prepared");
    Ok(SubmissionTicket {
        client_order_id: order_id,
        position_id: position_id.to_string(),
        symbol,
        side: OrderSide::Sell,
        quantity,
    })
}

/// Attaches the broker's id to a prepared order and marks it SUBMITTED.
pub fn record_submitted(
    book: &mut AccountBook,
    client_order_id: &str,
    broker_order_id: String,
    now: DateTime<Utc>,
) -> Result<(), ExecutionError> {
    let order = book
        .orders
        .get_mut(client_order_id)
        .ok_or_else(|| ExecutionError::OrderNotFound(client_order_id.to_string()))?;
    if order.status != BrokerOrderStatus::Pending {
        warn!(order = %client_order_id, status = %order.status, "Not pending, submission record ignored");
        return Ok(());
    }
    info!(order = %client_order_id, broker_order = %broker_order_id, "Order submitted");
    order.broker_order_id = Some(broker_order_id);
    order.status = BrokerOrderStatus::Submitted;
    order.submitted_at = Some(now);
    Ok(())
}

/// Unwinds a prepared order whose submission never made it to the
/// brokerage: the reservation is refunded and the attached position is
/// cancelled (entries) or reopened (exits).
pub fn abort_submission(
    book: &mut AccountBook,
    client_order_id: &str,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<(), ExecutionError> {
    let order = book
        .orders
        .get(client_order_id)
        .ok_or_else(|| ExecutionError::OrderNotFound(client_order_id.to_string()))?
        .clone();
    if order.status != BrokerOrderStatus::Pending {
        warn!(order = %client_order_id, status = %order.status, "Not pending, abort ignored");
        return Ok(());
    }
    warn!(order = %client_order_id, %reason, "Submission aborted");
    settle_unfilled(
        book,
        order,
        BrokerOrderStatus::Rejected,
        Some(reason.to_string()),
        now,
    );
    Ok(())
}

/// Immediate entry for a paper account: ledger the buy at `fill_price` and
/// open the position, no brokerage round trip.
pub fn apply_simulated_entry(
    book: &mut AccountBook,
    candidate: &TradeCandidate,
    fill_price: Price,
    trade_date: NaiveDate,
) -> Result<String, ExecutionError> {
    ensure_new_position(book, &candidate.symbol, trade_date)?;
    let quantity = Quantity::new(candidate.shares).map_err(LedgerError::Validation)?;

    let position_id = next_position_id(book);
    let sequence = book.next_sequence();
    let event = LedgerEvent::buy(&candidate.symbol, quantity, fill_price, trade_date, sequence)
        .map_err(LedgerError::Validation)?
        .with_note(format!("simulated entry {}", position_id));
    book.apply_event(event)?;

    book.positions.insert(
        position_id.clone(),
        DayTradePosition {
            id: position_id.clone(),
            account_id: book.account.id.clone(),
            symbol: candidate.symbol.clone(),
            trade_date,
            status: PositionStatus::Open,
            shares: candidate.shares,
            entry_price: fill_price.value(),
            target_price: candidate.target_price,
            stop_price: candidate.stop_price,
            exit_price: None,
            exit_reason: None,
            confidence_score: candidate.confidence_score,
            predicted_return: candidate.predicted_return,
            opened_at: Some(Utc::now()),
            closed_at: None,
        },
    );
    info!(position = %position_id, symbol = %candidate.symbol, price = %fill_price, "Simulated entry filled");
    Ok(position_id)
}

/// Immediate exit for a paper account, at the price that triggered it.
pub fn apply_simulated_exit(
    book: &mut AccountBook,
    position_id: &str,
    reason: ExitReason,
    fill_price: Price,
) -> Result<(), ExecutionError> {
    let position = book
        .positions
        .get(position_id)
        .ok_or_else(|| ExecutionError::PositionNotFound(position_id.to_string()))?;
    if position.status != PositionStatus::Open {
        return Err(ExecutionError::InvalidPositionState {
            id: position_id.to_string(),
            status: position.status.to_string(),
            expected: PositionStatus::Open.to_string(),
        });
    }
    let symbol = position.symbol.clone();
    let shares = position.shares;
    let trade_date = position.trade_date;
    let quantity = Quantity::new(shares).map_err(LedgerError::Validation)?;

    let sequence = book.next_sequence();
    let event = LedgerEvent::sell(&symbol, quantity, fill_price, trade_date, sequence)
        .map_err(LedgerError::Validation)?
        .with_note(format!("simulated exit {} ({})", position_id, reason));
    book.apply_event(event)?;

    if let Some(position) = book.positions.get_mut(position_id) {
        position.status = PositionStatus::Closed;
        position.exit_price = Some(fill_price.value());
        position.exit_reason = Some(reason);
        position.closed_at = Some(Utc::now());
    }
    info!(position = %position_id, %symbol, price = %fill_price, %reason, "Simulated exit filled");
    Ok(())
}

/// Settles one broker status report into the account book.
///
/// Idempotent: a report for an order already in a terminal state is a
/// no-op, so the sweep can safely process the same fill twice. All
/// mutations happen after validation; a settlement that cannot be ledgered
/// leaves the book untouched and returns the error.
pub fn reconcile_order(
    book: &mut AccountBook,
    client_order_id: &str,
    report: &OrderStatusReport,
    now: DateTime<Utc>,
) -> Result<(), ExecutionError> {
    let order = book
        .orders
        .get(client_order_id)
        .ok_or_else(|| ExecutionError::OrderNotFound(client_order_id.to_string()))?
        .clone();

    if order.status.is_terminal() {
        debug!(order = %client_order_id, status = %order.status, "Already terminal, report ignored");
        return Ok(());
    }

    match &report.status {
        BrokerReportedStatus::Submitted => Ok(()),
        BrokerReportedStatus::PartiallyFilled => {
            if !order.status.can_transition_to(BrokerOrderStatus::PartiallyFilled) {
                warn!(order = %client_order_id, from = %order.status, "Illegal transition to PARTIALLY_FILLED, ignored");
                return Ok(());
            }
            let mut updated = order;
            updated.status = BrokerOrderStatus::PartiallyFilled;
            updated.filled_quantity = report.filled_quantity;
            updated.avg_fill_price = Some(report.avg_fill_price);
            updated.commission = report.commission;
            info!(
                order = %client_order_id,
                filled = %report.filled_quantity,
                of = %updated.quantity,
                "Partial fill"
            );
            book.orders.insert(client_order_id.to_string(), updated);
            Ok(())
        }
        BrokerReportedStatus::Filled => {
            if !order.status.can_transition_to(BrokerOrderStatus::Filled) {
                warn!(order = %client_order_id, from = %order.status, "Illegal transition to FILLED, ignored");
                return Ok(());
            }
            if report.filled_quantity <= Decimal::ZERO || report.avg_fill_price <= Decimal::ZERO {
                warn!(
                    order = %client_order_id,
                    quantity = %report.filled_quantity,
                    price = %report.avg_fill_price,
                    "Fill report without usable fill data, will retry next sweep"
                );
                return Ok(());
            }
            settle_fill(
                book,
                order,
                report.filled_quantity,
                report.avg_fill_price,
                report.commission,
                BrokerOrderStatus::Filled,
                now,
            )
        }
        BrokerReportedStatus::Cancelled => {
            // A cancel can still carry partial fills; settle those first so
            // the ledger reflects what actually executed.
            let filled = report.filled_quantity.max(order.filled_quantity);
            if filled > Decimal::ZERO {
                let price = if report.avg_fill_price > Decimal::ZERO {
                    report.avg_fill_price
                } else {
                    order.avg_fill_price.unwrap_or(Decimal::ZERO)
                };
                if price > Decimal::ZERO {
                    let commission = report.commission.max(order.commission);
                    return settle_fill(
                        book,
                        order,
                        filled,
                        price,
                        commission,
                        BrokerOrderStatus::Cancelled,
                        now,
                    );
                }
                warn!(order = %client_order_id, "Cancelled with fills but no fill price, refunding in full");
            }
            settle_unfilled(book, order, BrokerOrderStatus::Cancelled, None, now);
            Ok(())
        }
        BrokerReportedStatus::Rejected => {
            settle_unfilled(
                book,
                order,
                BrokerOrderStatus::Rejected,
                Some("rejected by brokerage".to_string()),
                now,
            );
            Ok(())
        }
        BrokerReportedStatus::Unknown(raw) => {
            warn!(order = %client_order_id, status = %raw, "Unrecognized broker status, no transition");
            if let Some(stored) = book.orders.get_mut(client_order_id) {
                stored.status_message = Some(raw.clone());
            }
            Ok(())
        }
    }
}

/// Terminal settlement with fills: ledger the trade, settle the
/// reservation, move the position along.
fn settle_fill(
    book: &mut AccountBook,
    order: BrokerOrder,
    filled_quantity: Decimal,
    fill_price: Decimal,
    commission: Decimal,
    terminal: BrokerOrderStatus,
    now: DateTime<Utc>,
) -> Result<(), ExecutionError> {
    let quantity = Quantity::new(filled_quantity).map_err(LedgerError::Validation)?;
    let price = Price::new(fill_price).map_err(LedgerError::Validation)?;
    let trade_date = now.date_naive();

    match order.side {
        OrderSide::Buy => {
            let actual_cost = filled_quantity * fill_price + commission;
            let available = book.account.cash_balance + order.reserved_cash;
            // Checked up front so the release + apply below cannot half-run.
            if actual_cost > available {
                return Err(ExecutionError::Ledger(LedgerError::InsufficientFunds {
                    required: actual_cost,
                    available,
                }));
            }
            // Net effect: cash moves by (reserved - actual cost), the
            // refund of the estimate against reality.
            book.account.release_cash(order.reserved_cash);
            let sequence = book.next_sequence();
            let event = LedgerEvent::buy(&order.symbol, quantity, price, trade_date, sequence)
                .map_err(LedgerError::Validation)?
                .with_note(format!("fill {}", order.client_order_id));
            book.apply_event(event)?;
            settle_commission(book, &order, commission, trade_date)?;
            info!(
                order = %order.client_order_id,
                cost = %actual_cost,
                refunded = %(order.reserved_cash - actual_cost),
                "Buy fill settled"
            );
        }
        OrderSide::Sell => {
            let sequence = book.next_sequence();
            let event = LedgerEvent::sell(&order.symbol, quantity, price, trade_date, sequence)
                .map_err(LedgerError::Validation)?
                .with_note(format!("fill {}", order.client_order_id));
            book.apply_event(event)?;
            settle_commission(book, &order, commission, trade_date)?;
            info!(
                order = %order.client_order_id,
                proceeds = %(filled_quantity * fill_price),
                "Sell fill settled"
            );
        }
    }

    let mut updated = order;
    updated.status = terminal;
    updated.filled_quantity = filled_quantity;
    updated.avg_fill_price = Some(fill_price);
    updated.commission = commission;
    updated.reserved_cash = Decimal::ZERO;
    updated.completed_at = Some(now);
    let side = updated.side;
    let position_id = updated.position_id.clone();
    book.orders.insert(updated.client_order_id.clone(), updated);

    if let Some(position) = position_id.and_then(|id| book.positions.get_mut(&id)) {
        match side {
            OrderSide::Buy => {
                position.status = PositionStatus::Open;
                position.shares = filled_quantity;
                position.entry_price = fill_price;
                position.opened_at = Some(now);
            }
            OrderSide::Sell => {
                let remainder = position.shares - filled_quantity;
                if terminal == BrokerOrderStatus::Cancelled && remainder > Decimal::ZERO {
                    // The exit died with shares still held; hand the
                    // remainder back to the monitor.
                    position.shares = remainder;
                    position.status = PositionStatus::Open;
                    position.exit_reason = None;
                } else {
                    position.status = PositionStatus::Closed;
                    position.exit_price = Some(fill_price);
                    position.closed_at = Some(now);
                }
            }
        }
    }
    Ok(())
}

/// Commission is booked as its own ledger event so a full replay still
/// reproduces the cash balance to the cent.
fn settle_commission(
    book: &mut AccountBook,
    order: &BrokerOrder,
    commission: Decimal,
    trade_date: NaiveDate,
) -> Result<(), ExecutionError> {
    if commission <= Decimal::ZERO {
        return Ok(());
    }
    let sequence = book.next_sequence();
    let event = LedgerEvent::withdrawal(commission, trade_date, sequence)
        .map_err(LedgerError::Validation)?
        .with_note(format!("commission {}", order.client_order_id));
    book.apply_event(event)?;
    Ok(())
}

/// Terminal settlement without fills: refund the reservation, park the
/// order, unwind the position.
fn settle_unfilled(
    book: &mut AccountBook,
    order: BrokerOrder,
    terminal: BrokerOrderStatus,
    message: Option<String>,
    now: DateTime<Utc>,
) {
    if order.reserved_cash > Decimal::ZERO {
        book.account.release_cash(order.reserved_cash);
    }
    info!(
        order = %order.client_order_id,
        status = %terminal,
        refunded = %order.reserved_cash,
        "Order closed without fills"
    );

    let mut updated = order;
    updated.status = terminal;
    updated.reserved_cash = Decimal::ZERO;
    updated.status_message = message;
    updated.completed_at = Some(now);
    let side = updated.side;
    let position_id = updated.position_id.clone();
    book.orders.insert(updated.client_order_id.clone(), updated);

    if let Some(position) = position_id.and_then(|id| book.positions.get_mut(&id)) {
        match side {
            // An entry that never filled leaves nothing to manage.
            OrderSide::Buy => {
                if position.status == PositionStatus::Pending {
                    position.status = PositionStatus::Cancelled;
                    position.closed_at = Some(now);
                }
            }
            OrderSide::Sell => {
                if position.status == PositionStatus::Closing {
                    position.status = PositionStatus::Open;
                    position.exit_reason = None;
                }
            }
        }
    }
}

/// Orders submitted longer than `timeout` ago and still not terminal.
/// Returned as `(client_order_id, broker_order_id)` pairs for the sweep to
/// cancel through the normal path.
pub fn stale_orders(
    book: &AccountBook,
    now: DateTime<Utc>,
    timeout: Duration,
) -> Vec<(String, String)> {
    let cutoff = now - chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::zero());
    book.orders
        .values()
        .filter(|order| order.status.is_active())
        .filter(|order| matches!(order.submitted_at, Some(at) if at < cutoff))
        .filter_map(|order| {
            order
                .broker_order_id
                .as_ref()
                .map(|broker_id| (order.client_order_id.clone(), broker_id.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Account;
    use crate::domain::services::ledger::replay;
    use crate::domain::services::recommendation::estimated_entry_cost;
    use rust_decimal_macros::dec;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
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

    fn funded_book(cash: Decimal) -> AccountBook {
        let mut book = AccountBook::new(Account::new("acct-1", dec!(0)).unwrap());
        book.apply_event(LedgerEvent::deposit(cash, day(), 0).unwrap())
            .unwrap();
        book
    }

    /// Prepares and records an entry as a successful submission would.
    fn submitted_entry(book: &mut AccountBook, cand: &TradeCandidate) -> SubmissionTicket {
        let ticket = prepare_entry(book, cand, day()).unwrap();
        record_submitted(book, &ticket.client_order_id, "B-1".to_string(), Utc::now()).unwrap();
        ticket
    }

    #[test]
    fn prepared_entry_reserves_estimate_and_tracks_pending_position() {
        let mut book = funded_book(dec!(10000));
        let cand = candidate("AAPL", dec!(10), dec!(100));

        let ticket = prepare_entry(&mut book, &cand, day()).unwrap();

        assert_eq!(book.account.cash_balance, dec!(10000) - cand.estimated_cost);
        let order = &book.orders[&ticket.client_order_id];
        assert_eq!(order.status, BrokerOrderStatus::Pending);
        assert!(order.broker_order_id.is_none());
        assert_eq!(order.reserved_cash, cand.estimated_cost);
        assert_eq!(book.positions[&ticket.position_id].status, PositionStatus::Pending);

        record_submitted(&mut book, &ticket.client_order_id, "B-1".to_string(), Utc::now())
            .unwrap();
        let order = &book.orders[&ticket.client_order_id];
        assert_eq!(order.status, BrokerOrderStatus::Submitted);
        assert_eq!(order.broker_order_id.as_deref(), Some("B-1"));
    }

    #[test]
    fn underfunded_entry_is_rejected_before_anything_is_recorded() {
        let mut book = funded_book(dec!(4000));
        let cand = candidate("AAPL", dec!(50), dec!(100)); // ~$5000

        let err = prepare_entry(&mut book, &cand, day()).unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Ledger(LedgerError::InsufficientFunds { .. })
        ));
        assert_eq!(book.account.cash_balance, dec!(4000));
        assert!(book.orders.is_empty());
        assert!(book.positions.is_empty());
    }

    #[test]
    fn second_entry_for_the_same_symbol_and_day_is_rejected() {
        let mut book = funded_book(dec!(10000));
        let cand = candidate("AAPL", dec!(10), dec!(100));
        submitted_entry(&mut book, &cand);

        let err = prepare_entry(&mut book, &cand, day()).unwrap_err();
        assert!(matches!(err, ExecutionError::DuplicatePosition(_)));
        assert_eq!(book.positions.len(), 1);
    }

    #[test]
    fn aborted_submission_refunds_the_reservation() {
        let mut book = funded_book(dec!(10000));
        let cand = candidate("AAPL", dec!(10), dec!(100));
        let ticket = prepare_entry(&mut book, &cand, day()).unwrap();

        abort_submission(&mut book, &ticket.client_order_id, "margin check failed", Utc::now())
            .unwrap();

        assert_eq!(book.account.cash_balance, dec!(10000));
        let order = &book.orders[&ticket.client_order_id];
        assert_eq!(order.status, BrokerOrderStatus::Rejected);
        assert_eq!(order.reserved_cash, Decimal::ZERO);
        assert_eq!(
            book.positions[&ticket.position_id].status,
            PositionStatus::Cancelled
        );
    }

    #[test]
    fn fill_settles_at_actual_cost_and_refunds_the_difference() {
        let mut book = funded_book(dec!(2000));
        let cand = candidate("AAPL", dec!(10), dec!(100));
        let ticket = submitted_entry(&mut book, &cand);

        // Filled below the estimate: 10 @ 99.50 + 0.35 commission.
        let report = OrderStatusReport::filled(dec!(10), dec!(99.50), dec!(0.35));
        reconcile_order(&mut book, &ticket.client_order_id, &report, Utc::now()).unwrap();

        assert_eq!(book.account.cash_balance, dec!(2000) - dec!(995.35));
        assert_eq!(
            book.orders[&ticket.client_order_id].status,
            BrokerOrderStatus::Filled
        );
        assert_eq!(book.orders[&ticket.client_order_id].reserved_cash, Decimal::ZERO);
        let position = &book.positions[&ticket.position_id];
        assert_eq!(position.status, PositionStatus::Open);
        assert_eq!(position.entry_price, dec!(99.50));
        assert_eq!(position.shares, dec!(10));
        assert_eq!(book.holdings["AAPL"].quantity, dec!(10));
        assert_eq!(book.holdings["AAPL"].average_cost, dec!(99.50));

        // The event stream alone reproduces the balance.
        let snapshot = replay("acct-1", &book.events).unwrap();
        assert_eq!(snapshot.cash_balance, book.account.cash_balance);
    }

    #[test]
    fn duplicate_fill_report_is_a_no_op() {
        let mut book = funded_book(dec!(2000));
        let ticket = submitted_entry(&mut book, &candidate("AAPL", dec!(10), dec!(100)));

        let report = OrderStatusReport::filled(dec!(10), dec!(99.50), dec!(0.35));
        reconcile_order(&mut book, &ticket.client_order_id, &report, Utc::now()).unwrap();
        let cash_after_first = book.account.cash_balance;
        let events_after_first = book.events.len();

        reconcile_order(&mut book, &ticket.client_order_id, &report, Utc::now()).unwrap();
        assert_eq!(book.account.cash_balance, cash_after_first);
        assert_eq!(book.events.len(), events_after_first);
        assert_eq!(book.holdings["AAPL"].quantity, dec!(10));
    }

    #[test]
    fn cancel_refunds_in_full_and_cancels_the_position() {
        let mut book = funded_book(dec!(2000));
        let ticket = submitted_entry(&mut book, &candidate("AAPL", dec!(10), dec!(100)));

        reconcile_order(
            &mut book,
            &ticket.client_order_id,
            &OrderStatusReport::cancelled(),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(book.account.cash_balance, dec!(2000));
        assert_eq!(
            book.orders[&ticket.client_order_id].status,
            BrokerOrderStatus::Cancelled
        );
        assert_eq!(
            book.positions[&ticket.position_id].status,
            PositionStatus::Cancelled
        );
        assert!(book.holdings.is_empty());
    }

    #[test]
    fn partial_fill_updates_the_order_without_touching_the_ledger() {
        let mut book = funded_book(dec!(2000));
        let ticket = submitted_entry(&mut book, &candidate("AAPL", dec!(10), dec!(100)));
        let cash_after_submit = book.account.cash_balance;

        let report = OrderStatusReport {
            status: BrokerReportedStatus::PartiallyFilled,
            filled_quantity: dec!(4),
            avg_fill_price: dec!(99.75),
            commission: dec!(0.35),
        };
        reconcile_order(&mut book, &ticket.client_order_id, &report, Utc::now()).unwrap();

        let order = &book.orders[&ticket.client_order_id];
        assert_eq!(order.status, BrokerOrderStatus::PartiallyFilled);
        assert_eq!(order.filled_quantity, dec!(4));
        assert_eq!(order.remaining_quantity(), dec!(6));
        assert_eq!(book.account.cash_balance, cash_after_submit);
        assert!(book.holdings.is_empty());
    }

    #[test]
    fn cancel_after_partial_fill_ledgers_the_filled_portion() {
        let mut book = funded_book(dec!(2000));
        let ticket = submitted_entry(&mut book, &candidate("AAPL", dec!(10), dec!(100)));

        let report = OrderStatusReport {
            status: BrokerReportedStatus::Cancelled,
            filled_quantity: dec!(4),
            avg_fill_price: dec!(99.75),
            commission: dec!(0.35),
        };
        reconcile_order(&mut book, &ticket.client_order_id, &report, Utc::now()).unwrap();

        // 4 @ 99.75 + 0.35 actually spent; the rest of the reservation back.
        assert_eq!(book.account.cash_balance, dec!(2000) - dec!(399.35));
        assert_eq!(book.holdings["AAPL"].quantity, dec!(4));
        assert_eq!(
            book.orders[&ticket.client_order_id].status,
            BrokerOrderStatus::Cancelled
        );
        let position = &book.positions[&ticket.position_id];
        assert_eq!(position.status, PositionStatus::Open);
        assert_eq!(position.shares, dec!(4));
    }

    #[test]
    fn unknown_status_changes_nothing_but_the_message() {
        let mut book = funded_book(dec!(2000));
        let ticket = submitted_entry(&mut book, &candidate("AAPL", dec!(10), dec!(100)));
        let cash_before = book.account.cash_balance;

        let report = OrderStatusReport {
            status: BrokerReportedStatus::Unknown("ApiPending".to_string()),
            filled_quantity: Decimal::ZERO,
            avg_fill_price: Decimal::ZERO,
            commission: Decimal::ZERO,
        };
        reconcile_order(&mut book, &ticket.client_order_id, &report, Utc::now()).unwrap();

        let order = &book.orders[&ticket.client_order_id];
        assert_eq!(order.status, BrokerOrderStatus::Submitted);
        assert_eq!(order.status_message.as_deref(), Some("ApiPending"));
        assert_eq!(book.account.cash_balance, cash_before);
    }

    /// Opens a filled position the long way: prepare, submit, fill.
    fn open_position(book: &mut AccountBook, cand: &TradeCandidate, fill: OrderStatusReport) -> String {
        let ticket = submitted_entry(book, cand);
        reconcile_order(book, &ticket.client_order_id, &fill, Utc::now()).unwrap();
        ticket.position_id
    }

    #[test]
    fn exit_flow_closes_the_position_and_deletes_the_holding() {
        let mut book = funded_book(dec!(2000));
        let position_id = open_position(
            &mut book,
            &candidate("AAPL", dec!(10), dec!(100)),
            OrderStatusReport::filled(dec!(10), dec!(100), dec!(0.35)),
        );

        let exit = prepare_exit(&mut book, &position_id, ExitReason::TargetHit).unwrap();
        record_submitted(&mut book, &exit.client_order_id, "B-2".to_string(), Utc::now()).unwrap();
        assert_eq!(book.positions[&position_id].status, PositionStatus::Closing);

        let exit_fill = OrderStatusReport::filled(dec!(10), dec!(102.10), dec!(0.35));
        reconcile_order(&mut book, &exit.client_order_id, &exit_fill, Utc::now()).unwrap();

        let position = &book.positions[&position_id];
        assert_eq!(position.status, PositionStatus::Closed);
        assert_eq!(position.exit_price, Some(dec!(102.10)));
        assert_eq!(position.exit_reason, Some(ExitReason::TargetHit));
        assert!(book.holdings.is_empty());
        // 2000 - (1000 + 0.35) + (1021 - 0.35)
        assert_eq!(book.account.cash_balance, dec!(2020.30));

        let snapshot = replay("acct-1", &book.events).unwrap();
        assert_eq!(snapshot.cash_balance, book.account.cash_balance);
        assert!(snapshot.holdings.is_empty());
    }

    #[test]
    fn cancelled_exit_order_reopens_the_position() {
        let mut book = funded_book(dec!(2000));
        let position_id = open_position(
            &mut book,
            &candidate("AAPL", dec!(10), dec!(100)),
            OrderStatusReport::filled(dec!(10), dec!(100), Decimal::ZERO),
        );
        let exit = prepare_exit(&mut book, &position_id, ExitReason::StopHit).unwrap();
        record_submitted(&mut book, &exit.client_order_id, "B-2".to_string(), Utc::now()).unwrap();

        reconcile_order(
            &mut book,
            &exit.client_order_id,
            &OrderStatusReport::cancelled(),
            Utc::now(),
        )
        .unwrap();

        let position = &book.positions[&position_id];
        assert_eq!(position.status, PositionStatus::Open);
        assert_eq!(position.exit_reason, None);
        assert_eq!(book.holdings["AAPL"].quantity, dec!(10));
    }

    #[test]
    fn exit_cancelled_after_partial_fill_reopens_the_remainder() {
        let mut book = funded_book(dec!(2000));
        let position_id = open_position(
            &mut book,
            &candidate("AAPL", dec!(10), dec!(100)),
            OrderStatusReport::filled(dec!(10), dec!(100), Decimal::ZERO),
        );
        let exit = prepare_exit(&mut book, &position_id, ExitReason::StopHit).unwrap();
        record_submitted(&mut book, &exit.client_order_id, "B-2".to_string(), Utc::now()).unwrap();

        // 4 of 10 sold before the cancel landed.
        let report = OrderStatusReport {
            status: BrokerReportedStatus::Cancelled,
            filled_quantity: dec!(4),
            avg_fill_price: dec!(99),
            commission: dec!(0.35),
        };
        reconcile_order(&mut book, &exit.client_order_id, &report, Utc::now()).unwrap();

        // The filled portion is ledgered, the remainder stays managed.
        let position = &book.positions[&position_id];
        assert_eq!(position.status, PositionStatus::Open);
        assert_eq!(position.shares, dec!(6));
        assert_eq!(position.exit_reason, None);
        assert_eq!(position.exit_price, None);
        assert_eq!(book.holdings["AAPL"].quantity, dec!(6));
        // 2000 - 1000 + (4 * 99) - 0.35
        assert_eq!(book.account.cash_balance, dec!(1395.65));
        let snapshot = replay("acct-1", &book.events).unwrap();
        assert_eq!(snapshot.cash_balance, book.account.cash_balance);
    }

    #[test]
    fn simulated_entry_and_exit_converge_with_the_ledger() {
        let mut book = funded_book(dec!(2000));
        let cand = candidate("AAPL", dec!(10), dec!(100));

        let position_id =
            apply_simulated_entry(&mut book, &cand, Price::new(dec!(100)).unwrap(), day()).unwrap();
        assert_eq!(book.positions[&position_id].status, PositionStatus::Open);
        assert_eq!(book.account.cash_balance, dec!(1000));
        assert_eq!(book.holdings["AAPL"].quantity, dec!(10));

        apply_simulated_exit(
            &mut book,
            &position_id,
            ExitReason::SessionClose,
            Price::new(dec!(101)).unwrap(),
        )
        .unwrap();
        let position = &book.positions[&position_id];
        assert_eq!(position.status, PositionStatus::Closed);
        assert_eq!(position.realized_pnl(), Some(dec!(10)));
        assert_eq!(book.account.cash_balance, dec!(2010));
        assert!(book.holdings.is_empty());

        let snapshot = replay("acct-1", &book.events).unwrap();
        assert_eq!(snapshot.cash_balance, dec!(2010));
    }

    #[test]
    fn stale_orders_are_found_by_age() {
        let mut book = funded_book(dec!(10000));
        submitted_entry(&mut book, &candidate("AAPL", dec!(10), dec!(100)));

        let now = Utc::now();
        assert!(stale_orders(&book, now, Duration::from_secs(600)).is_empty());

        let later = now + chrono::Duration::minutes(11);
        let stale = stale_orders(&book, later, Duration::from_secs(600));
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].1, "B-1");
    }
}
