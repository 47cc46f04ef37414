//! Morning session: predictions in, entries out.

use crate::application::account_actor::{AccountHandle, ActorError};
use crate::application::executors::OrderExecutor;
use crate::config::MarketRegime;
use crate::domain::errors::ExecutionError;
use crate::domain::repositories::{Prediction, Predictor};
use crate::domain::services::recommendation::RecommendationEngine;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

pub struct MorningSession {
    handle: AccountHandle,
    executor: Arc<dyn OrderExecutor>,
    predictor: Arc<dyn Predictor>,
    engine: RecommendationEngine,
}

impl MorningSession {
    pub fn new(
        handle: AccountHandle,
        executor: Arc<dyn OrderExecutor>,
        predictor: Arc<dyn Predictor>,
        engine: RecommendationEngine,
    ) -> Self {
        Self {
            handle,
            executor,
            predictor,
            engine,
        }
    }

    /// Generates candidates for the trade date from the given universe and
    /// submits them one at a time. Returns the position ids of entries that
    /// went in.
    pub async fn run(
        &self,
        trade_date: NaiveDate,
        universe: &[String],
        regime: Option<MarketRegime>,
    ) -> Result<Vec<String>, ActorError> {
        let snapshot = self.handle.snapshot().await?;
        if snapshot.cash_balance <= Decimal::ZERO {
            info!(account = %snapshot.account_id, "No cash, session skipped");
            return Ok(Vec::new());
        }

        let mut predictions: Vec<(String, Prediction)> = Vec::with_capacity(universe.len());
        for symbol in universe {
            match self.predictor.predict(symbol, trade_date).await {
                Some(prediction) => predictions.push((symbol.clone(), prediction)),
                None => warn!(%symbol, "No prediction, excluded from session"),
            }
        }

        let candidates = self
            .engine
            .generate(snapshot.cash_balance, &predictions, regime);
        if candidates.is_empty() {
            info!(account = %snapshot.account_id, "Nothing cleared the bar today");
            return Ok(Vec::new());
        }
        info!(
            account = %snapshot.account_id,
            candidates = candidates.len(),
            "Submitting session candidates"
        );

        let mut opened = Vec::new();
        for candidate in candidates {
            match self
                .executor
                .submit_entry(&self.handle, &candidate, trade_date)
                .await
            {
                Ok(position_id) => opened.push(position_id),
                Err(ActorError::Execution(ExecutionError::DuplicatePosition(symbol))) => {
                    info!(%symbol, "Already positioned, skipped")
                }
                Err(ActorError::Closed) => return Err(ActorError::Closed),
                Err(err) => warn!(symbol = %candidate.symbol, error = %err, "Entry failed"),
            }
        }
        Ok(opened)
    }
}
