//! Sell-match and buy-threshold rules.
//!
//! Pure functions over scaled prices; the engine feeds them the current
//! price, the config row, and the candidate lot from the store.

use rust_decimal::Decimal;

use crate::types::{BuySignal, Lot, Scaled, SellSignal, TradingConfig};

/// Highest lot rate that can be sold at `price`.
pub fn sell_ceiling(price: Scaled, config: &TradingConfig) -> Scaled {
    price - config.lot_margin
}

/// Fee charged on a sale at `price`, truncated toward zero.
pub fn sale_fee(price: Scaled, fee_rate: Decimal) -> Scaled {
    price.apply_rate(fee_rate)
}

/// Price the sale of `lot` at `price`: proceeds minus cost minus fee.
pub fn sell_signal(price: Scaled, lot: Lot, fee_rate: Decimal) -> SellSignal {
    let fee = sale_fee(price, fee_rate);
    let profit = price - lot.rate - fee;
    SellSignal {
        lot,
        price,
        fee,
        profit,
    }
}

/// Price at or below which a buy fires.
pub fn buy_trigger(config: &TradingConfig) -> Scaled {
    config.buy_threshold - config.lot_margin
}

/// A buy fires when `price <= buy_threshold - lot_margin`.
pub fn buy_signal(price: Scaled, config: &TradingConfig) -> Option<BuySignal> {
    (price <= buy_trigger(config)).then_some(BuySignal {
        price,
        previous_threshold: config.buy_threshold,
    })
}

impl BuySignal {
    /// Threshold to persist after this buy. Never above the previous one,
    /// even if a hand-edited negative margin puts the trigger above it.
    pub fn new_threshold(&self) -> Scaled {
        self.price.min(self.previous_threshold)
    }
}
