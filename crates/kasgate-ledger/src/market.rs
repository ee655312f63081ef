//! Market statistics pass-through.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LedgerError;

/// The market figures surfaced to clients.
#[derive(Debug, Clone, Serialize)]
pub struct MarketStats {
    pub price: f64,
    pub price_change_24h: f64,
    pub volume_24h: f64,
    pub market_cap: f64,
}

// CoinGecko coin payload, pruned to the fields we read.
#[derive(Debug, Deserialize)]
struct CoinResponse {
    market_data: MarketData,
}

#[derive(Debug, Deserialize)]
struct MarketData {
    current_price: UsdQuote,
    price_change_percentage_24h: f64,
    total_volume: UsdQuote,
    market_cap: UsdQuote,
}

#[derive(Debug, Deserialize)]
struct UsdQuote {
    usd: f64,
}

/// Client for the upstream market-data API.
pub struct MarketClient {
    url: String,
    http: reqwest::Client,
}

impl MarketClient {
    pub const DEFAULT_URL: &'static str = "https://api.coingecko.com/api/v3/coins/kaspa";

    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn default_endpoint() -> Self {
        Self::new(Self::DEFAULT_URL)
    }

    /// Fetch the current market stats.
    pub async fn stats(&self) -> Result<MarketStats, LedgerError> {
        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| LedgerError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(LedgerError::Http(format!(
                "market API responded with status {}",
                resp.status().as_u16()
            )));
        }

        let coin: CoinResponse = resp
            .json()
            .await
            .map_err(|e| LedgerError::Decode(e.to_string()))?;

        let stats = MarketStats {
            price: coin.market_data.current_price.usd,
            price_change_24h: coin.market_data.price_change_percentage_24h,
            volume_24h: coin.market_data.total_volume.usd,
            market_cap: coin.market_data.market_cap.usd,
        };
        debug!(price = stats.price, "market stats fetched");
        Ok(stats)
    }
}
