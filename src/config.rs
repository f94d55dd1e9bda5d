//! Configuration loading.
//!
//! Three values are required before the engine can start: the database
//! path and the Bittrex key and secret. Each is resolved in the order
//! explicit flag > `{PREFIX}` environment variable > empty default, and an
//! empty result is a startup error.
//!
//! Engine tunables (market, tick interval, feed timeout, fee rate,
//! settlement mode) come from a TOML file. An explicit `--settings` path
//! must exist; otherwise `btcbot.toml` is read when present and defaults
//! apply when it is not.

use clap::Parser;
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::feed::bittrex::DEFAULT_BASE_URL;
use crate::types::{SettlementMode, DEFAULT_FEE_RATE};

/// Command-line flags.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "btcbot")]
#[command(about = "Watches the BTC price and ratchets a buy threshold against a SQLite ledger")]
#[command(version)]
pub struct Cli {
    /// A prefix for the environment variables.
    #[arg(short, long, default_value = "")]
    pub prefix: String,

    /// SQLite database to store progress in. Env: {PREFIX}DATABASE
    #[arg(short, long)]
    pub database: Option<String>,

    /// Bittrex API key. Env: {PREFIX}BITTREX_KEY
    #[arg(short, long)]
    pub key: Option<String>,

    /// Bittrex API secret. Env: {PREFIX}BITTREX_SECRET
    #[arg(short, long)]
    pub secret: Option<String>,

    /// TOML file with engine settings. Default: ./btcbot.toml if present
    #[arg(long)]
    pub settings: Option<String>,

    /// Apply sales and buys to the ledger instead of only reporting them.
    #[arg(long)]
    pub simulate: bool,

    /// Do not wait for confirmation after creating a new database.
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing {what}: pass --{flag} or set {env}")]
    Missing {
        what: &'static str,
        flag: &'static str,
        env: String,
    },

    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Settings file read when `--settings` is not given.
pub const DEFAULT_SETTINGS_FILE: &str = "btcbot.toml";

/// Engine tunables, loaded from the settings file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    /// Market symbol in the feed's notation.
    pub market: String,
    /// Delay after each tick before the next one starts.
    pub tick_interval_secs: u64,
    /// Upper bound on a single price fetch.
    pub feed_timeout_secs: u64,
    /// Fee deducted from sale proceeds, as a fraction of the price.
    pub fee_rate: Decimal,
    pub settlement: SettlementMode,
    pub feed_base_url: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            market: "USD-BTC".to_string(),
            tick_interval_secs: 5,
            feed_timeout_secs: 10,
            fee_rate: DEFAULT_FEE_RATE,
            settlement: SettlementMode::ReportOnly,
            feed_base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl EngineSettings {
    /// Load settings from `explicit`, or from [`DEFAULT_SETTINGS_FILE`] when
    /// no path was given. Only the implicit file may be absent.
    pub fn discover(explicit: Option<&str>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_SETTINGS_FILE).exists() => Self::load(DEFAULT_SETTINGS_FILE),
            None => Ok(Self::default()),
        }
    }

    /// Load settings from a TOML file that must exist.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml(&contents).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_string(),
                source,
            },
            other => other,
        })
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let settings: EngineSettings =
            toml::from_str(contents).map_err(|source| ConfigError::Parse {
                path: "<inline>".to_string(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.market.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "market",
                reason: "must not be empty".to_string(),
            });
        }
        if self.tick_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "tick_interval_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.feed_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "feed_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.fee_rate.is_sign_negative() || self.fee_rate >= Decimal::ONE {
            return Err(ConfigError::Invalid {
                field: "fee_rate",
                reason: format!("{} is outside [0, 1)", self.fee_rate),
            });
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_secs)
    }
}

/// Bittrex credentials. Never logged.
pub struct Credentials {
    pub api_key: SecretString,
    pub api_secret: SecretString,
}

/// Everything the binary needs to start the engine.
pub struct AppConfig {
    pub database: String,
    pub credentials: Credentials,
    pub settings: EngineSettings,
    /// Wait for the operator after seeding a new database.
    pub confirm_new_database: bool,
}

impl AppConfig {
    /// Resolve from flags, the process environment, and the settings file.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let settings = EngineSettings::discover(cli.settings.as_deref())?;
        Self::from_sources(cli, settings, |name| std::env::var(name).ok())
    }

    /// Resolve against an arbitrary environment lookup.
    pub fn from_sources<F>(
        cli: &Cli,
        mut settings: EngineSettings,
        env: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |what: &'static str, flag: &'static str, value: Option<&str>, suffix: &str| {
            let env_name = format!("{}{suffix}", cli.prefix);
            resolve(value, &env_name, &env).ok_or(ConfigError::Missing {
                what,
                flag,
                env: env_name,
            })
        };

        let database = required("database", "database", cli.database.as_deref(), "DATABASE")?;
        let key = required("Bittrex key", "key", cli.key.as_deref(), "BITTREX_KEY")?;
        let secret = required("Bittrex secret", "secret", cli.secret.as_deref(), "BITTREX_SECRET")?;

        if cli.simulate {
            settings.settlement = SettlementMode::Simulate;
        }

        Ok(Self {
            database,
            credentials: Credentials {
                api_key: SecretString::new(key),
                api_secret: SecretString::new(secret),
            },
            settings,
            confirm_new_database: !cli.yes,
        })
    }
}

/// Flag if non-empty, else the environment variable if non-empty.
pub fn resolve<F>(flag: Option<&str>, env_name: &str, env: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    flag.filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| env(env_name).filter(|v| !v.is_empty()))
}
