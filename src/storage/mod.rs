//! Persistence layer.
//!
//! The engine talks to the ledger only through [`LedgerStore`]. Two
//! implementations exist:
//!
//! - [`sqlite::SqliteStore`]: the real store, a local SQLite file with the
//!   `btcprice` and `config` tables.
//! - `memory::MemoryStore` (test builds only): an in-process fake with
//!   failure injection, used to unit-test the decision logic.
//!
//! Every store error is fatal to the engine; nothing here retries.

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{Lot, Scaled, TradingConfig};

#[cfg(test)]
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Errors raised by a ledger store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("config table has no row")]
    MissingConfig,

    #[error("lot {0} not found")]
    LotNotFound(i64),

    #[error("invalid row in {table}: {reason}")]
    InvalidRow { table: &'static str, reason: String },
}

/// A lot about to be inserted; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLot {
    pub rate: Scaled,
    pub amount: Scaled,
    pub acquired_at: DateTime<Utc>,
}

/// Abstraction over the persisted lot ledger and trading configuration.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Read the single configuration row.
    async fn load_config(&self) -> Result<TradingConfig, StoreError>;

    /// Overwrite the single configuration row.
    async fn save_config(&self, config: &TradingConfig) -> Result<(), StoreError>;

    /// The lot with the lowest rate at or below `ceiling`, lowest id first
    /// among equal rates.
    async fn cheapest_lot_at_or_below(&self, ceiling: Scaled) -> Result<Option<Lot>, StoreError>;

    /// All lots, ordered by id.
    async fn list_lots(&self) -> Result<Vec<Lot>, StoreError>;

    /// Append a lot to the ledger.
    async fn insert_lot(&self, lot: NewLot) -> Result<Lot, StoreError>;

    /// Atomically delete the lot and add `credit` to the cash balance.
    /// Fails with [`StoreError::LotNotFound`] if the lot is already gone.
    async fn settle_sale(&self, lot_id: i64, credit: Scaled) -> Result<TradingConfig, StoreError>;

    /// Atomically lower the buy threshold to `new_threshold` and, if given,
    /// insert the acquired lot.
    async fn record_buy(
        &self,
        new_threshold: Scaled,
        lot: Option<NewLot>,
    ) -> Result<Option<Lot>, StoreError>;
}
