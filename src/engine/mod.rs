//! Core engine: the fetch → sell → buy → sleep loop.
//!
//! Each tick re-reads the config row, so nothing but the store carries
//! state from one tick to the next. Feed failures skip the tick; store
//! failures end the loop with an error.

pub mod decision;

use chrono::Utc;
use rust_decimal::Decimal;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::EngineSettings;
use crate::feed::{FeedError, PriceFeed};
use crate::storage::{LedgerStore, NewLot, StoreError};
use crate::types::{Scaled, SettlementMode, TickOutcome};

/// Tunables for one engine instance.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub market: String,
    pub tick_interval: Duration,
    pub feed_timeout: Duration,
    pub fee_rate: Decimal,
    pub settlement: SettlementMode,
}

impl From<&EngineSettings> for EngineOptions {
    fn from(s: &EngineSettings) -> Self {
        Self {
            market: s.market.clone(),
            tick_interval: s.tick_interval(),
            feed_timeout: s.feed_timeout(),
            fee_rate: s.fee_rate,
            settlement: s.settlement,
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&EngineSettings::default())
    }
}

/// Counters for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub feed_errors: u64,
    pub sell_signals: u64,
    pub buy_signals: u64,
}

impl RunSummary {
    fn record(&mut self, outcome: &TickOutcome) {
        self.ticks += 1;
        match outcome {
            TickOutcome::FeedUnavailable { .. } => self.feed_errors += 1,
            TickOutcome::Evaluated { sell, buy, .. } => {
                self.sell_signals += u64::from(sell.is_some());
                self.buy_signals += u64::from(buy.is_some());
            }
        }
    }
}

pub struct Engine {
    feed: Box<dyn PriceFeed>,
    store: Box<dyn LedgerStore>,
    options: EngineOptions,
}

impl Engine {
    pub fn new(
        feed: Box<dyn PriceFeed>,
        store: Box<dyn LedgerStore>,
        options: EngineOptions,
    ) -> Self {
        Self {
            feed,
            store,
            options,
        }
    }

    /// Fetch the last price, bounded by the feed timeout, and scale it.
    async fn fetch_price(&self) -> Result<Scaled, FeedError> {
        let timeout = self.options.feed_timeout;
        let last = tokio::time::timeout(timeout, self.feed.last_price(&self.options.market))
            .await
            .map_err(|_| FeedError::Timeout(timeout))??;

        Scaled::from_decimal(last).ok_or(FeedError::InvalidPrice(last))
    }

    /// Run one evaluation: fetch, sell match, buy ratchet.
    pub async fn tick(&self) -> Result<TickOutcome, StoreError> {
        let price = match self.fetch_price().await {
            Ok(price) => price,
            Err(e) => {
                warn!(
                    market = %self.options.market,
                    error = %e,
                    "Price feed unavailable, skipping tick"
                );
                return Ok(TickOutcome::FeedUnavailable {
                    reason: e.to_string(),
                });
            }
        };

        let mut config = self.store.load_config().await?;
        info!(
            market = %self.options.market,
            price = %price,
            buyrate = %config.buy_threshold,
            "Last price"
        );

        // -- Sell ----------------------------------------------------------

        let ceiling = decision::sell_ceiling(price, &config);
        let sell = match self.store.cheapest_lot_at_or_below(ceiling).await? {
            Some(lot) => Some(decision::sell_signal(price, lot, self.options.fee_rate)),
            None => None,
        };

        if let Some(signal) = &sell {
            info!(
                id = signal.lot.id,
                amount = %signal.lot.amount,
                rate = %signal.lot.rate,
                price = %price,
                fee = %signal.fee,
                profit = %signal.profit,
                "Going to sell"
            );
            if self.options.settlement == SettlementMode::Simulate {
                config = self.store.settle_sale(signal.lot.id, signal.profit).await?;
                info!(id = signal.lot.id, balance = %config.cash_balance, "Sale settled");
            }
        } else {
            debug!(ceiling = %ceiling, "No lot to sell");
        }

        // -- Buy -----------------------------------------------------------

        let buy = decision::buy_signal(price, &config);
        if let Some(signal) = &buy {
            info!(
                price = %price,
                previous_buyrate = %signal.previous_threshold,
                "Going to buy at rate"
            );
            let lot = (self.options.settlement == SettlementMode::Simulate).then(|| NewLot {
                rate: price,
                amount: config.lot_margin,
                acquired_at: Utc::now(),
            });
            if let Some(lot) = self.store.record_buy(signal.new_threshold(), lot).await? {
                info!(id = lot.id, rate = %lot.rate, "Lot recorded");
            }
        }

        Ok(TickOutcome::Evaluated {
            price,
            sell,
            buy,
            settlement: self.options.settlement,
        })
    }

    /// Tick until `shutdown` resolves, `max_ticks` is reached, or the store
    /// fails. The interval is applied after each tick completes.
    pub async fn run<S>(
        &self,
        shutdown: S,
        max_ticks: Option<u64>,
    ) -> Result<RunSummary, StoreError>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut summary = RunSummary::default();

        info!(
            market = %self.options.market,
            interval_secs = self.options.tick_interval.as_secs(),
            settlement = %self.options.settlement,
            "Entering main loop"
        );

        loop {
            // Cancellation is checked before a tick starts, never during one,
            // so a tick's store writes always complete.
            let cancelled = tokio::select! {
                biased;
                _ = &mut shutdown => true,
                _ = std::future::ready(()) => false,
            };
            if cancelled {
                info!("Shutdown signal received");
                break;
            }
            if max_ticks.is_some_and(|max| summary.ticks >= max) {
                break;
            }

            let outcome = self.tick().await?;
            summary.record(&outcome);

            if max_ticks.is_some_and(|max| summary.ticks >= max) {
                break;
            }

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = tokio::time::sleep(self.options.tick_interval) => {}
            }
        }

        info!(
            ticks = summary.ticks,
            feed_errors = summary.feed_errors,
            sells = summary.sell_signals,
            buys = summary.buy_signals,
            "Engine stopped"
        );
        Ok(summary)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
