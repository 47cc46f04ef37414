//! Background reconciliation of in-flight broker orders.
//!
//! The sweep polls the gateway on its own schedule, then feeds each status
//! report into the account actor. All network traffic happens here, outside
//! the actor, so a slow or hung gateway can delay settlements but never
//! block the account.

use crate::application::account_actor::{AccountHandle, ActorError};
use crate::config::EngineConfig;
use crate::domain::errors::ExecutionError;
use crate::domain::repositories::BrokerageConnector;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct OrderSweep {
    handle: AccountHandle,
    connector: Arc<dyn BrokerageConnector>,
    config: EngineConfig,
}

impl OrderSweep {
    pub fn new(
        handle: AccountHandle,
        connector: Arc<dyn BrokerageConnector>,
        config: EngineConfig,
    ) -> Self {
        Self {
            handle,
            connector,
            config,
        }
    }

    async fn call<T, F>(&self, fut: F) -> Result<T, ExecutionError>
    where
        F: Future<Output = Result<T, ExecutionError>>,
    {
        let timeout = Duration::from_millis(self.config.broker_call_timeout_ms);
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ExecutionError::Timeout(self.config.broker_call_timeout_ms)),
        }
    }

    /// One pass: poll every active order, settle what came back, then ask
    /// the gateway to cancel anything stale. Returns the number of reports
    /// settled.
    pub async fn run_once(&self) -> Result<usize, ActorError> {
        let active = self.handle.active_orders().await?;
        if active.is_empty() {
            debug!(gateway = self.connector.name(), "No active orders");
            return Ok(0);
        }

        if let Err(err) = self.call(self.connector.connect()).await {
            warn!(gateway = self.connector.name(), error = %err, "Connect failed, sweep skipped");
            return Ok(0);
        }

        let now = Utc::now();
        let mut settled = 0;
        for (client_order_id, broker_order_id) in &active {
            match self.call(self.connector.order_status(broker_order_id)).await {
                Ok(report) => {
                    match self
                        .handle
                        .reconcile_order(client_order_id, report, now)
                        .await
                    {
                        Ok(()) => settled += 1,
                        // Settlement failures are logged and retried on the
                        // next pass; one bad order must not stop the rest.
                        Err(err) => {
                            error!(order = %client_order_id, error = %err, "Settlement failed")
                        }
                    }
                }
                Err(err) => {
                    warn!(order = %client_order_id, error = %err, "Status poll failed");
                }
            }
        }

        self.cancel_stale(now).await?;
        self.connector.disconnect().await;
        info!(polled = active.len(), settled, "Order sweep finished");
        Ok(settled)
    }

    /// Asks the gateway to cancel orders that outlived the staleness
    /// timeout. The CANCELLED (or late FILLED) state comes back through a
    /// later status poll; nothing is forced locally.
    async fn cancel_stale(&self, now: chrono::DateTime<Utc>) -> Result<(), ActorError> {
        let timeout = Duration::from_secs(self.config.stale_order_timeout_secs);
        let stale = self.handle.stale_orders(now, timeout).await?;
        for (client_order_id, broker_order_id) in stale {
            match self.call(self.connector.cancel_order(&broker_order_id)).await {
                Ok(true) => {
                    info!(order = %client_order_id, "Stale order cancel requested");
                }
                Ok(false) => {
                    warn!(order = %client_order_id, "Gateway declined the cancel request");
                }
                Err(err) => {
                    warn!(order = %client_order_id, error = %err, "Cancel request failed");
                }
            }
        }
        Ok(())
    }

    /// Runs forever at the configured interval. Exits when the account
    /// actor goes away.
    pub async fn run(self) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.order_sweep_interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            match self.run_once().await {
                Ok(_) => {}
                Err(ActorError::Closed) => {
                    info!("Account actor gone, order sweep stopping");
                    return;
                }
                Err(err) => error!(error = %err, "Order sweep pass failed"),
            }
        }
    }
}
