//! BTCBOT — single-market threshold trading agent
//!
//! Entry point. Resolves configuration, initialises structured logging,
//! opens (or creates and seeds) the ledger database, and runs the
//! fetch→sell→buy loop until Ctrl+C or a ledger failure.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use btcbot::config::{AppConfig, Cli, Credentials};
use btcbot::engine::{Engine, EngineOptions};
use btcbot::feed::bittrex::BittrexClient;
use btcbot::storage::{LedgerStore, SqliteStore};

const BANNER: &str = r#"
 ____ _____ ____ ____   ___ _____
| __ )_   _/ ___| __ ) / _ \_   _|
|  _ \ | || |   |  _ \| | | || |
| |_) || || |___| |_) | |_| || |
|____/ |_| \____|____/ \___/ |_|

  Threshold trader, v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    init_logging();

    println!("{BANNER}");

    let cfg = AppConfig::load(&cli).context("Could not resolve configuration")?;

    // -- Ledger ----------------------------------------------------------

    let (store, fresh) = SqliteStore::open(&cfg.database)
        .await
        .with_context(|| format!("Failed to open database {}", cfg.database))?;

    let trading = store
        .load_config()
        .await
        .context("Failed to read trading config")?;
    info!(
        usdbalance = %trading.cash_balance,
        buyrate = %trading.buy_threshold,
        amount = %trading.lot_margin,
        stagnantwait_hours = trading.stagnant_window,
        "Trading config loaded"
    );

    if fresh {
        info!(
            database = %cfg.database,
            config = %trading,
            "The database has been created with default values"
        );
        if cfg.confirm_new_database {
            wait_for_confirmation().await?;
        }
    }

    // -- Feed and engine -------------------------------------------------

    let Credentials {
        api_key,
        api_secret,
    } = cfg.credentials;
    let feed = BittrexClient::with_base_url(
        &cfg.settings.feed_base_url,
        api_key,
        api_secret,
        cfg.settings.feed_timeout(),
    )
    .context("Failed to build price feed client")?;

    let engine = Engine::new(
        Box::new(feed),
        Box::new(store.clone()),
        EngineOptions::from(&cfg.settings),
    );

    info!("Press Ctrl+C to stop.");
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    let result = engine.run(shutdown, None).await;
    store.close().await;

    match result {
        Ok(summary) => {
            info!(
                ticks = summary.ticks,
                sells = summary.sell_signals,
                buys = summary.buy_signals,
                "BTCBOT shut down cleanly."
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Ledger store failed, stopping");
            Err(e).context("Ledger store failure")
        }
    }
}

/// Block until the operator presses Enter. Ctrl+C aborts the process so
/// the seeded row can be edited by hand first.
async fn wait_for_confirmation() -> Result<()> {
    println!("Press Enter to continue with these values; press Ctrl+C to change the values in the database yourself.");

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read confirmation from stdin")?;
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("btcbot=info"));

    let json_logging = std::env::var("BTCBOT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
