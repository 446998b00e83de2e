//! TON price quotes for `/ton` and `/price`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

pub const BINANCE_TICKER_URL: &str = "https://api.binance.com/api/v3/ticker/24hr?symbol=TONUSDT";
pub const EXCHANGE_RATE_URL: &str = "https://api.exchangerate-api.com/v4/latest/USD";

/// USD→RUB rate used when the exchange rate service is unavailable.
pub const FALLBACK_USD_RUB: f64 = 80.0;

/// How long a quote is served from cache.
pub const PRICE_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("Price request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Price service answered with HTTP {0}")]
    Status(u16),

    #[error("Malformed price data: {0}")]
    Malformed(String),
}

/// A TON price snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceQuote {
    pub price_usd: f64,
    pub price_rub: f64,
    /// 24h change in percent.
    pub change_24h: f64,
}

impl PriceQuote {
    pub fn trend_emoji(&self) -> &'static str {
        if self.change_24h > 0.0 { "📈" } else { "📉" }
    }
}

/// Something that can quote the TON price.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn quote(&self) -> Result<PriceQuote, PriceError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    last_price: String,
    price_change_percent: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeRates {
    rates: std::collections::HashMap<String, f64>,
}

/// Binance + exchangerate-api quote source with a short-lived cache.
pub struct PriceService {
    client: reqwest::Client,
    ticker_url: String,
    rates_url: String,
    ttl: Duration,
    cache: Mutex<Option<(Instant, PriceQuote)>>,
}

impl PriceService {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            ticker_url: BINANCE_TICKER_URL.to_owned(),
            rates_url: EXCHANGE_RATE_URL.to_owned(),
            ttl: PRICE_CACHE_TTL,
            cache: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_urls(mut self, ticker_url: impl Into<String>, rates_url: impl Into<String>) -> Self {
        self.ticker_url = ticker_url.into();
        self.rates_url = rates_url.into();
        self
    }

    /// Drops the cached quote so the next call refetches.
    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
    }

    async fn fetch_ticker(&self) -> Result<(f64, f64), PriceError> {
        let response = self.client.get(&self.ticker_url).send().await?;
        if !response.status().is_success() {
            return Err(PriceError::Status(response.status().as_u16()));
        }
        let ticker: Ticker24h = response.json().await?;
        parse_ticker(&ticker)
    }

    async fn fetch_usd_rub(&self) -> Result<f64, PriceError> {
        let response = self.client.get(&self.rates_url).send().await?;
        if !response.status().is_success() {
            return Err(PriceError::Status(response.status().as_u16()));
        }
        let rates: ExchangeRates = response.json().await?;
        rates
            .rates
            .get("RUB")
            .copied()
            .ok_or_else(|| PriceError::Malformed("RUB rate missing".to_owned()))
    }
}

fn parse_ticker(ticker: &Ticker24h) -> Result<(f64, f64), PriceError> {
    let price = ticker
        .last_price
        .parse::<f64>()
        .map_err(|_| PriceError::Malformed(format!("lastPrice {:?}", ticker.last_price)))?;
    let change = ticker.price_change_percent.parse::<f64>().unwrap_or(0.0);
    Ok((price, change))
}

#[async_trait]
impl PriceSource for PriceService {
    async fn quote(&self) -> Result<PriceQuote, PriceError> {
        let mut cache = self.cache.lock().await;
        if let Some((fetched_at, quote)) = *cache
            && fetched_at.elapsed() < self.ttl
        {
            debug!("Serving cached TON price");
            return Ok(quote);
        }

        let (price_usd, change_24h) = self.fetch_ticker().await?;
        let usd_rub = self.fetch_usd_rub().await.unwrap_or_else(|e| {
            warn!("Using fallback USD/RUB rate {}: {}", FALLBACK_USD_RUB, e);
            FALLBACK_USD_RUB
        });

        let quote = PriceQuote {
            price_usd,
            price_rub: price_usd * usd_rub,
            change_24h,
        };
        *cache = Some((Instant::now(), quote));
        Ok(quote)
    }
}
