//! Market price feeds.
//!
//! Defines the `PriceFeed` trait the engine polls each tick, and the
//! Bittrex ticker client that implements it.

pub mod bittrex;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;

/// Errors from a price feed. All of them are recoverable: the engine logs
/// the error and skips the tick.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("exchange rejected request: {0}")]
    Api(String),

    #[error("malformed ticker response: {0}")]
    Malformed(String),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("invalid last price {0}")]
    InvalidPrice(Decimal),

    #[error("could not sign request: {0}")]
    Signing(String),
}

/// Source of the last traded price for a market.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Fetch the last traded price for `market` (e.g. `USD-BTC`).
    async fn last_price(&self, market: &str) -> Result<Decimal, FeedError>;
}
