//! Shared types for the BTCBOT agent.
//!
//! These types form the data model used across all modules: the
//! fixed-point money value, the persisted lot and configuration rows,
//! and the per-tick decision records produced by the engine.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fmt;
use std::ops::{Add, Sub};

// ---------------------------------------------------------------------------
// Fixed-point money
// ---------------------------------------------------------------------------

/// Number of scaled units per whole unit of quoted currency.
pub const SCALE: i64 = 1000;

/// A monetary value stored as an integer count of 1/1000 currency units.
///
/// This is the only representation of money the engine and the store use.
/// Decimal values from the price feed cross into it through
/// [`Scaled::from_decimal`] and nowhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Scaled(pub i64);

impl Scaled {
    /// Convert a decimal currency amount into scaled units, truncating
    /// toward zero. Returns `None` for negative or out-of-range input.
    pub fn from_decimal(value: Decimal) -> Option<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return None;
        }
        let scaled = value.checked_mul(Decimal::from(SCALE))?.trunc();
        scaled.to_i64().map(Scaled)
    }

    pub fn raw(self) -> i64 {
        self.0
    }

    /// Apply a fractional rate (e.g. a fee of 0.0015) to this value,
    /// truncating the result toward zero.
    pub fn apply_rate(self, rate: Decimal) -> Scaled {
        let product = (Decimal::from(self.0) * rate).trunc();
        Scaled(product.to_i64().unwrap_or(0))
    }
}

impl Add for Scaled {
    type Output = Scaled;

    fn add(self, rhs: Scaled) -> Scaled {
        Scaled(self.0 + rhs.0)
    }
}

impl Sub for Scaled {
    type Output = Scaled;

    fn sub(self, rhs: Scaled) -> Scaled {
        Scaled(self.0 - rhs.0)
    }
}

impl fmt::Display for Scaled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:03}", abs / SCALE as u64, abs % SCALE as u64)
    }
}

/// Flat exchange fee deducted from sale proceeds.
pub const DEFAULT_FEE_RATE: Decimal = dec!(0.0015);

// ---------------------------------------------------------------------------
// Persisted rows
// ---------------------------------------------------------------------------

/// A single simulated acquisition held in the `btcprice` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lot {
    pub id: i64,
    /// Acquisition price.
    pub rate: Scaled,
    /// Margin/size parameter recorded with the lot.
    pub amount: Scaled,
    pub acquired_at: DateTime<Utc>,
}

/// The single mutable row of the `config` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradingConfig {
    pub cash_balance: Scaled,
    /// Only ever lowered by the engine.
    pub buy_threshold: Scaled,
    pub lot_margin: Scaled,
    /// Hours. Loaded and persisted, not consumed by any decision.
    pub stagnant_window: i64,
}

impl Default for TradingConfig {
    /// The row seeded into a freshly created store.
    fn default() -> Self {
        Self {
            cash_balance: Scaled(1_000_000),
            buy_threshold: Scaled(9_200_000),
            lot_margin: Scaled(100_000),
            stagnant_window: 24,
        }
    }
}

impl fmt::Display for TradingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "usdbalance = {}, buyrate = {}, amount = {}, stagnantwait = {}h",
            self.cash_balance, self.buy_threshold, self.lot_margin, self.stagnant_window,
        )
    }
}

// ---------------------------------------------------------------------------
// Settlement mode
// ---------------------------------------------------------------------------

/// Whether decisions mutate the ledger or are only reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SettlementMode {
    /// Sales and buys are logged; only the buy threshold is persisted.
    #[default]
    ReportOnly,
    /// Sales delete the lot and credit the balance; buys insert a lot.
    Simulate,
}

impl fmt::Display for SettlementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettlementMode::ReportOnly => write!(f, "report-only"),
            SettlementMode::Simulate => write!(f, "simulate"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tick decisions
// ---------------------------------------------------------------------------

/// A matched lot that can be sold at the current price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SellSignal {
    pub lot: Lot,
    pub price: Scaled,
    pub fee: Scaled,
    pub profit: Scaled,
}

/// The price dropped far enough below the threshold to buy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuySignal {
    pub price: Scaled,
    pub previous_threshold: Scaled,
}

/// What happened during one tick of the engine loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The feed failed; nothing was evaluated.
    FeedUnavailable { reason: String },
    /// A price was obtained and both evaluations ran.
    Evaluated {
        price: Scaled,
        sell: Option<SellSignal>,
        buy: Option<BuySignal>,
        /// How the signals were applied to the ledger.
        settlement: SettlementMode,
    },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
