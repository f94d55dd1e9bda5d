//! End-to-end engine tests against a real (in-memory) SQLite ledger.

mod mock_feed;

use chrono::Utc;
use rust_decimal_macros::dec;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

use btcbot::engine::{Engine, EngineOptions};
use btcbot::storage::{LedgerStore, NewLot, SqliteStore, StoreError};
use btcbot::types::{Scaled, SettlementMode, TickOutcome, TradingConfig};

use mock_feed::{ScriptedFeed, Step};

fn options(settlement: SettlementMode) -> EngineOptions {
    EngineOptions {
        settlement,
        tick_interval: Duration::from_millis(1),
        ..EngineOptions::default()
    }
}

async fn store_with_lots(margin: i64, rates: &[i64]) -> SqliteStore {
    let store = SqliteStore::in_memory().await.unwrap();
    let cfg = TradingConfig {
        lot_margin: Scaled(margin),
        ..store.load_config().await.unwrap()
    };
    store.save_config(&cfg).await.unwrap();

    for &rate in rates {
        store
            .insert_lot(NewLot {
                rate: Scaled(rate),
                amount: Scaled(margin),
                acquired_at: Utc::now(),
            })
            .await
            .unwrap();
    }
    store
}

#[tokio::test]
async fn test_fresh_store_returns_seed_row() {
    let store = SqliteStore::in_memory().await.unwrap();
    let cfg = store.load_config().await.unwrap();

    assert_eq!(cfg.cash_balance, Scaled(1_000_000));
    assert_eq!(cfg.buy_threshold, Scaled(9_200_000));
    assert_eq!(cfg.lot_margin, Scaled(100_000));
    assert_eq!(cfg.stagnant_window, 24);
}

#[tokio::test]
async fn test_sell_picks_lowest_qualifying_lot() {
    let store = store_with_lots(50_000, &[9_000_000, 9_050_000, 9_100_000]).await;
    let feed = ScriptedFeed::prices(&[dec!(9200)]);
    let engine = Engine::new(
        Box::new(feed.clone()),
        Box::new(store.clone()),
        options(SettlementMode::ReportOnly),
    );

    match engine.tick().await.unwrap() {
        TickOutcome::Evaluated { sell: Some(signal), .. } => {
            assert_eq!(signal.lot.rate, Scaled(9_000_000));
        }
        other => panic!("expected a sell signal, got {other:?}"),
    }
    assert_eq!(feed.markets(), vec!["USD-BTC".to_string()]);

    // Nothing deleted in report-only mode.
    assert_eq!(store.list_lots().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_profit_reported_for_match() {
    let store = store_with_lots(100_000, &[9_000_000]).await;
    let engine = Engine::new(
        Box::new(ScriptedFeed::prices(&[dec!(9300)])),
        Box::new(store.clone()),
        options(SettlementMode::ReportOnly),
    );

    match engine.tick().await.unwrap() {
        TickOutcome::Evaluated { sell: Some(signal), .. } => {
            assert_eq!(signal.fee, Scaled(13_950));
            assert_eq!(signal.profit, Scaled(286_050));
        }
        other => panic!("expected a sell signal, got {other:?}"),
    }
}

#[tokio::test]
async fn test_threshold_is_non_increasing() {
    let store = SqliteStore::in_memory().await.unwrap();
    let script = [
        dec!(9300),
        dec!(9100.001),
        dec!(9100),
        dec!(9150),
        dec!(8999.999),
        dec!(9500),
        dec!(8800),
        dec!(8750),
    ];
    let feed = ScriptedFeed::prices(&script);
    let engine = Engine::new(
        Box::new(feed),
        Box::new(store.clone()),
        options(SettlementMode::ReportOnly),
    );

    let mut last = store.load_config().await.unwrap().buy_threshold;
    for _ in 0..script.len() {
        assert_ok!(engine.tick().await);
        let now = store.load_config().await.unwrap().buy_threshold;
        assert!(now <= last, "threshold rose from {last} to {now}");
        last = now;
    }
    // 9100 fires, 8999.999 fires, 8800 fires, 8750 does not (8800 - 100).
    assert_eq!(last, Scaled(8_800_000));
}

#[tokio::test]
async fn test_feed_failure_leaves_ledger_unchanged() {
    let store = store_with_lots(100_000, &[8_000_000]).await;
    let before = (store.load_config().await.unwrap(), store.list_lots().await.unwrap());

    let engine = Engine::new(
        Box::new(ScriptedFeed::new(vec![Step::Fail("APIKEY_INVALID")])),
        Box::new(store.clone()),
        options(SettlementMode::Simulate),
    );

    let outcome = engine.tick().await.unwrap();
    assert!(matches!(outcome, TickOutcome::FeedUnavailable { .. }));

    let after = (store.load_config().await.unwrap(), store.list_lots().await.unwrap());
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_simulated_buy_then_sell_round_trip() {
    let store = SqliteStore::in_memory().await.unwrap();
    let feed = ScriptedFeed::new(vec![
        Step::Price(dec!(9000)),
        Step::Fail("timeout"),
        Step::Price(dec!(9300)),
        Step::Price(dec!(9300)),
    ]);
    let engine = Engine::new(
        Box::new(feed.clone()),
        Box::new(store.clone()),
        options(SettlementMode::Simulate),
    );

    let summary = engine.run(std::future::pending(), Some(4)).await.unwrap();
    assert_eq!(summary.ticks, 4);
    assert_eq!(summary.feed_errors, 1);
    assert_eq!(summary.buy_signals, 1);
    // The lot is sold once; the fourth tick finds nothing left.
    assert_eq!(summary.sell_signals, 1);
    assert_eq!(feed.calls(), 4);

    let cfg = store.load_config().await.unwrap();
    assert_eq!(cfg.buy_threshold, Scaled(9_000_000));
    assert_eq!(cfg.cash_balance, Scaled(1_000_000 + 286_050));
    assert!(store.list_lots().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_closed_store_is_fatal() {
    let store = SqliteStore::in_memory().await.unwrap();
    let engine = Engine::new(
        Box::new(ScriptedFeed::prices(&[dec!(9150)])),
        Box::new(store.clone()),
        options(SettlementMode::ReportOnly),
    );

    assert_ok!(engine.tick().await);
    store.close().await;

    let result = engine.run(std::future::pending(), None).await;
    let err = assert_err!(result);
    assert!(matches!(err, StoreError::Database(_)));
}
