//! Background monitoring of open positions.
//!
//! Each pass snapshots the open positions, fetches prices outside the
//! actor, evaluates the exit rules, and submits exits through the
//! executor for whatever triggered.

use crate::application::account_actor::{AccountHandle, ActorError};
use crate::application::executors::OrderExecutor;
use crate::domain::entities::ExitReason;
use crate::domain::repositories::PriceSource;
use crate::domain::services::market_hours;
use crate::domain::services::position_monitor::PositionMonitor;
use crate::domain::value_objects::Price;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct MonitorSweep {
    handle: AccountHandle,
    executor: Arc<dyn OrderExecutor>,
    price_source: Arc<dyn PriceSource>,
    monitor: PositionMonitor,
    interval: Duration,
}

impl MonitorSweep {
    pub fn new(
        handle: AccountHandle,
        executor: Arc<dyn OrderExecutor>,
        price_source: Arc<dyn PriceSource>,
        monitor: PositionMonitor,
        interval: Duration,
    ) -> Self {
        Self {
            handle,
            executor,
            price_source,
            monitor,
            interval,
        }
    }

    /// One pass over the open positions. Returns how many exits were
    /// submitted.
    pub async fn run_once(&self) -> Result<usize, ActorError> {
        let now = Utc::now();
        if !market_hours::is_market_open(now) {
            debug!("Market closed, monitor idle");
            return Ok(0);
        }

        let positions = self.handle.open_positions().await?;
        let mut exits = 0;
        for position in positions {
            let Some(price) = self.price_source.live_price(&position.symbol).await else {
                warn!(symbol = %position.symbol, "No live price, position unmanaged this pass");
                continue;
            };
            let Some(reason) = self.monitor.evaluate(&position, price, now) else {
                continue;
            };
            info!(position = %position.id, symbol = %position.symbol, %reason, %price, "Exit triggered");
            match self
                .executor
                .submit_exit(&self.handle, &position.id, reason, price)
                .await
            {
                Ok(()) => exits += 1,
                Err(ActorError::Closed) => return Err(ActorError::Closed),
                // Exit submission can fail transiently; the position stays
                // OPEN and the next pass tries again.
                Err(err) => warn!(position = %position.id, error = %err, "Exit failed"),
            }
        }
        Ok(exits)
    }

    /// Flatten every remaining open position, regardless of target or
    /// stop. Used at end of session. Positions without a live price are
    /// closed against their entry price.
    pub async fn close_all(&self) -> Result<usize, ActorError> {
        let positions = self.handle.open_positions().await?;
        let mut exits = 0;
        for position in positions {
            let reference = match self.price_source.live_price(&position.symbol).await {
                Some(price) => price,
                None => match Price::new(position.entry_price) {
                    Ok(price) => price,
                    Err(err) => {
                        error!(position = %position.id, error = %err, "Unusable entry price, position left open");
                        continue;
                    }
                },
            };
            match self
                .executor
                .submit_exit(&self.handle, &position.id, ExitReason::SessionClose, reference)
                .await
            {
                Ok(()) => exits += 1,
                Err(ActorError::Closed) => return Err(ActorError::Closed),
                Err(err) => warn!(position = %position.id, error = %err, "Session-close exit failed"),
            }
        }
        info!(exits, "Session close pass finished");
        Ok(exits)
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match self.run_once().await {
                Ok(_) => {}
                Err(ActorError::Closed) => {
                    info!("Account actor gone, monitor stopping");
                    return;
                }
                Err(err) => error!(error = %err, "Monitor pass failed"),
            }
        }
    }
}
