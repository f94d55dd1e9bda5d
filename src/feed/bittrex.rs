//! Bittrex public ticker client.
//!
//! API: `GET {base}/public/getticker?market=USD-BTC`
//! Base URL: https://api.bittrex.com/api/v1.1
//!
//! Every request carries `apikey` and `nonce` query parameters and an
//! `apisign` header holding the hex HMAC-SHA512 of the full request URI,
//! keyed with the API secret. The ticker endpoint does not require it, but
//! a bad key still surfaces here as an ordinary feed error.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha512;
use std::time::Duration;
use tracing::debug;

use super::{FeedError, PriceFeed};

pub const DEFAULT_BASE_URL: &str = "https://api.bittrex.com/api/v1.1";

type HmacSha512 = Hmac<Sha512>;

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

/// Envelope shared by every v1.1 endpoint.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    message: String,
    result: Option<T>,
}

/// `result` of `/public/getticker`. Bid and Ask are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Ticker {
    #[serde(default)]
    last: Option<Decimal>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Bittrex ticker client.
pub struct BittrexClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    api_secret: SecretString,
}

impl BittrexClient {
    pub fn with_base_url(
        base_url: &str,
        api_key: SecretString,
        api_secret: SecretString,
        timeout: Duration,
    ) -> Result<Self, FeedError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("BTCBOT/0.1.0")
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            api_secret,
        })
    }

    /// Build the ticker URI for `market` with the given nonce.
    fn ticker_uri(&self, market: &str, nonce: i64) -> String {
        format!(
            "{}/public/getticker?market={}&apikey={}&nonce={nonce}",
            self.base_url,
            urlencoding::encode(market),
            urlencoding::encode(self.api_key.expose_secret()),
        )
    }

    /// Hex HMAC-SHA512 of `uri` keyed with the API secret.
    fn sign(&self, uri: &str) -> Result<String, FeedError> {
        let mut mac = HmacSha512::new_from_slice(self.api_secret.expose_secret().as_bytes())
            .map_err(|e| FeedError::Signing(e.to_string()))?;
        mac.update(uri.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

/// Extract the last price from a ticker response body.
fn parse_ticker(body: &str) -> Result<Decimal, FeedError> {
    let envelope: Envelope<Ticker> =
        serde_json::from_str(body).map_err(|e| FeedError::Malformed(e.to_string()))?;

    if !envelope.success {
        return Err(FeedError::Api(envelope.message));
    }

    envelope
        .result
        .and_then(|t| t.last)
        .ok_or_else(|| FeedError::Malformed("ticker has no Last price".to_string()))
}

#[async_trait]
impl PriceFeed for BittrexClient {
    async fn last_price(&self, market: &str) -> Result<Decimal, FeedError> {
        let uri = self.ticker_uri(market, chrono::Utc::now().timestamp());
        let signature = self.sign(&uri)?;

        debug!(market, "Fetching Bittrex ticker");

        let resp = self.http.get(&uri).header("apisign", signature).send().await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(FeedError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_ticker(&body)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
