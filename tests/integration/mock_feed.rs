//! Mock price feed for integration testing.
//!
//! Replays a fixed script of prices and failures, one entry per call,
//! repeating the last entry once the script runs out.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};

use btcbot::feed::{FeedError, PriceFeed};

#[derive(Debug, Clone)]
pub enum Step {
    Price(Decimal),
    Fail(&'static str),
}

/// A deterministic `PriceFeed` driven by a script.
#[derive(Clone)]
pub struct ScriptedFeed {
    script: Arc<Vec<Step>>,
    calls: Arc<Mutex<usize>>,
    markets: Arc<Mutex<Vec<String>>>,
}

impl ScriptedFeed {
    pub fn new(script: Vec<Step>) -> Self {
        assert!(!script.is_empty(), "script needs at least one step");
        Self {
            script: Arc::new(script),
            calls: Arc::new(Mutex::new(0)),
            markets: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn prices(prices: &[Decimal]) -> Self {
        Self::new(prices.iter().copied().map(Step::Price).collect())
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    /// Market symbols requested so far.
    pub fn markets(&self) -> Vec<String> {
        self.markets.lock().unwrap().clone()
    }
}

#[async_trait]
impl PriceFeed for ScriptedFeed {
    async fn last_price(&self, market: &str) -> Result<Decimal, FeedError> {
        self.markets.lock().unwrap().push(market.to_string());

        let mut calls = self.calls.lock().unwrap();
        let step = self.script[(*calls).min(self.script.len() - 1)].clone();
        *calls += 1;

        match step {
            Step::Price(p) => Ok(p),
            Step::Fail(msg) => Err(FeedError::Api(msg.to_string())),
        }
    }
}
