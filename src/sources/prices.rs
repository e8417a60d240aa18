//! CoinGecko price API integration
//!
//! One request per call regardless of how many assets are asked for, to stay
//! inside the free-tier rate limit.
//!
//! ## API Reference
//!
//! - `{base}/simple/token_price/{platform}?contract_addresses=a,b&vs_currencies=usd`
//!   returns `{ "<lowercase address>": { "usd": 1.0 } }`
//! - `{base}/simple/price?ids=a,b&vs_currencies=usd`
//!   returns `{ "<id>": { "usd": 1.0 } }`

use super::{http_client, PriceSource};
use crate::error::AggregationError;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Deserialize)]
pub struct UsdQuote {
    pub usd: Option<f64>,
}

pub struct CoinGeckoPrices {
    client: reqwest::Client,
    base_url: String,
    /// Asset platform id, e.g. `optimistic-ethereum`
    platform: String,
}

impl CoinGeckoPrices {
    pub fn new(base_url: &str, platform: &str) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: http_client(10)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            platform: platform.to_string(),
        })
    }

    async fn fetch_quotes(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<HashMap<String, UsdQuote>, AggregationError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| AggregationError::SourceUnavailable(format!("price API: {}", e)))?;

        if !response.status().is_success() {
            return Err(AggregationError::SourceUnavailable(format!(
                "price API error: {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AggregationError::SourceUnavailable(format!("price API malformed response: {}", e)))
    }
}

/// Keep quotes that carry a USD price, keyed lowercase
pub fn usd_prices(quotes: HashMap<String, UsdQuote>) -> impl Iterator<Item = (String, f64)> {
    quotes
        .into_iter()
        .filter_map(|(key, quote)| quote.usd.map(|usd| (key.to_lowercase(), usd)))
}

#[async_trait]
impl PriceSource for CoinGeckoPrices {
    async fn token_prices(&self, assets: &[String]) -> Result<HashMap<String, f64>, AggregationError> {
        if assets.is_empty() {
            return Ok(HashMap::new());
        }
        let url = format!("{}/simple/token_price/{}", self.base_url, self.platform);
        let query = [
            ("contract_addresses", assets.join(",")),
            ("vs_currencies", "usd".to_string()),
        ];
        let quotes = self.fetch_quotes(&url, &query).await?;
        Ok(usd_prices(quotes).collect())
    }

    async fn coin_prices(&self, ids: &[String]) -> Result<BTreeMap<String, f64>, AggregationError> {
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let url = format!("{}/simple/price", self.base_url);
        let query = [("ids", ids.join(",")), ("vs_currencies", "usd".to_string())];
        let quotes = self.fetch_quotes(&url, &query).await?;
        Ok(usd_prices(quotes).collect())
    }
}
