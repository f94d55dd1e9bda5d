//! SQLite ledger store.
//!
//! Schema (created on first open):
//!
//! - `btcprice(id, rate, amount, buytime)`, indexed on `rate`
//! - `config(id, usdbalance, buyrate, amount, stagnantwait)`, one row
//!
//! All money columns hold values scaled by 1000.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use super::{LedgerStore, NewLot, StoreError};
use crate::types::{Lot, Scaled, TradingConfig};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS btcprice (id INTEGER NOT NULL PRIMARY KEY, rate INTEGER, amount INTEGER, buytime DATETIME)",
    "CREATE INDEX IF NOT EXISTS btcprice_rate ON btcprice (rate)",
    "CREATE TABLE IF NOT EXISTS config (id INTEGER NOT NULL PRIMARY KEY, usdbalance INTEGER, buyrate INTEGER, amount INTEGER, stagnantwait INTEGER)",
];

// When more than one config row exists, the engine owns the lowest id.
const SELECT_CONFIG: &str =
    "SELECT usdbalance, buyrate, amount, stagnantwait FROM config ORDER BY id LIMIT 1";
const UPDATE_CONFIG: &str = "UPDATE config SET usdbalance = ?, buyrate = ?, amount = ?, stagnantwait = ? \
     WHERE id = (SELECT id FROM config ORDER BY id LIMIT 1)";
const CREDIT_BALANCE: &str = "UPDATE config SET usdbalance = usdbalance + ? \
     WHERE id = (SELECT id FROM config ORDER BY id LIMIT 1)";
const UPDATE_THRESHOLD: &str =
    "UPDATE config SET buyrate = ? WHERE id = (SELECT id FROM config ORDER BY id LIMIT 1)";
const INSERT_LOT: &str = "INSERT INTO btcprice (rate, amount, buytime) VALUES (?, ?, ?)";

/// SQLite-backed [`LedgerStore`].
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database file at `path`.
    ///
    /// Returns the store and whether the file was freshly created, so the
    /// caller can show the seeded defaults before trading starts.
    pub async fn open(path: &str) -> Result<(Self, bool), StoreError> {
        let fresh = !Path::new(path).is_file();

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.initialize().await?;

        info!(path, fresh, "Ledger store opened");
        Ok((store, fresh))
    }

    /// Open a private in-memory database. Used by tests.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        // A single connection that never recycles, otherwise the
        // in-memory database vanishes with it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Create the schema and seed the default config row if the table is empty.
    async fn initialize(&self) -> Result<(), StoreError> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&self.pool).await?;
        }

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM config")
            .fetch_one(&self.pool)
            .await?;

        if rows == 0 {
            let seed = TradingConfig::default();
            sqlx::query(
                "INSERT INTO config (usdbalance, buyrate, amount, stagnantwait) VALUES (?, ?, ?, ?)",
            )
            .bind(seed.cash_balance.raw())
            .bind(seed.buy_threshold.raw())
            .bind(seed.lot_margin.raw())
            .bind(seed.stagnant_window)
            .execute(&self.pool)
            .await?;
            info!(config = %seed, "Seeded default trading config");
        }

        Ok(())
    }

    /// Close the pool, flushing the WAL.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn row_to_lot(row: &SqliteRow) -> Result<Lot, StoreError> {
        let id: i64 = row.try_get("id")?;
        let rate: Option<i64> = row.try_get("rate")?;
        let amount: Option<i64> = row.try_get("amount")?;
        let acquired_at: Option<DateTime<Utc>> = row.try_get("buytime")?;

        let rate = rate.ok_or_else(|| StoreError::InvalidRow {
            table: "btcprice",
            reason: format!("lot {id} has no rate"),
        })?;

        Ok(Lot {
            id,
            rate: Scaled(rate),
            amount: Scaled(amount.unwrap_or(0)),
            acquired_at: acquired_at.unwrap_or_default(),
        })
    }

    fn row_to_config(row: &SqliteRow) -> Result<TradingConfig, StoreError> {
        let column = |name: &str| -> Result<i64, StoreError> {
            let value: Option<i64> = row.try_get(name)?;
            value.ok_or_else(|| StoreError::InvalidRow {
                table: "config",
                reason: format!("{name} is NULL"),
            })
        };

        Ok(TradingConfig {
            cash_balance: Scaled(column("usdbalance")?),
            buy_threshold: Scaled(column("buyrate")?),
            lot_margin: Scaled(column("amount")?),
            stagnant_window: column("stagnantwait")?,
        })
    }
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn load_config(&self) -> Result<TradingConfig, StoreError> {
        let row = sqlx::query(SELECT_CONFIG)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::MissingConfig)?;

        Self::row_to_config(&row)
    }

    async fn save_config(&self, config: &TradingConfig) -> Result<(), StoreError> {
        let updated = sqlx::query(UPDATE_CONFIG)
            .bind(config.cash_balance.raw())
            .bind(config.buy_threshold.raw())
            .bind(config.lot_margin.raw())
            .bind(config.stagnant_window)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if updated == 0 {
            return Err(StoreError::MissingConfig);
        }

        debug!(config = %config, "Config saved");
        Ok(())
    }

    async fn cheapest_lot_at_or_below(&self, ceiling: Scaled) -> Result<Option<Lot>, StoreError> {
        let row = sqlx::query(
            "SELECT id, rate, amount, buytime FROM btcprice WHERE rate <= ? ORDER BY rate ASC, id ASC LIMIT 1",
        )
        .bind(ceiling.raw())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_lot).transpose()
    }

    async fn list_lots(&self) -> Result<Vec<Lot>, StoreError> {
        let rows = sqlx::query("SELECT id, rate, amount, buytime FROM btcprice ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_lot).collect()
    }

    async fn insert_lot(&self, lot: NewLot) -> Result<Lot, StoreError> {
        let id = sqlx::query(INSERT_LOT)
            .bind(lot.rate.raw())
            .bind(lot.amount.raw())
            .bind(lot.acquired_at)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        debug!(id, rate = %lot.rate, "Lot inserted");
        Ok(Lot {
            id,
            rate: lot.rate,
            amount: lot.amount,
            acquired_at: lot.acquired_at,
        })
    }

    async fn settle_sale(&self, lot_id: i64, credit: Scaled) -> Result<TradingConfig, StoreError> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM btcprice WHERE id = ?")
            .bind(lot_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            // Dropping the transaction rolls it back.
            return Err(StoreError::LotNotFound(lot_id));
        }

        let updated = sqlx::query(CREDIT_BALANCE)
            .bind(credit.raw())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if updated == 0 {
            return Err(StoreError::MissingConfig);
        }

        let row = sqlx::query(SELECT_CONFIG).fetch_one(&mut *tx).await?;
        let config = Self::row_to_config(&row)?;

        tx.commit().await?;

        debug!(lot_id, credit = %credit, balance = %config.cash_balance, "Sale settled");
        Ok(config)
    }

    async fn record_buy(
        &self,
        new_threshold: Scaled,
        lot: Option<NewLot>,
    ) -> Result<Option<Lot>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(UPDATE_THRESHOLD)
            .bind(new_threshold.raw())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if updated == 0 {
            return Err(StoreError::MissingConfig);
        }

        let inserted = match lot {
            Some(lot) => {
                let id = sqlx::query(INSERT_LOT)
                    .bind(lot.rate.raw())
                    .bind(lot.amount.raw())
                    .bind(lot.acquired_at)
                    .execute(&mut *tx)
                    .await?
                    .last_insert_rowid();
                Some(Lot {
                    id,
                    rate: lot.rate,
                    amount: lot.amount,
                    acquired_at: lot.acquired_at,
                })
            }
            None => None,
        };

        tx.commit().await?;

        debug!(threshold = %new_threshold, lot = ?inserted.as_ref().map(|l| l.id), "Buy recorded");
        Ok(inserted)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
