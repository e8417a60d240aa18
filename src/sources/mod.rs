//! External collaborators of the aggregation engine
//!
//! Each trait is the boundary the cycle talks to; failures come back as
//! `AggregationError` and the cycle treats them as "no new data this cycle".
//!
//! - `RecordSource` - wins, claims, pooler snapshots, prize overview
//! - `VaultChain` - on-chain vault metadata and pool contribution accounting
//! - `PriceSource` - batched token/coin USD prices
//! - `PrizeTotalsSource` - read-back of this engine's own vault totals artifact
//! - `PromotionSource` - TWAB reward promotion events and token decimals

use crate::aggregation::amounts::Amount;
use crate::aggregation::promotions::PromotionEvents;
use crate::aggregation::types::{
    ClaimsByDraw, DrawId, NetworkSpec, PrizeOverview, SafeOwnerInfo, VaultMetadata,
    VaultPoolersSnapshot, VaultTotals, WinsByDraw,
};
use crate::error::AggregationError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};

pub mod indexer;
pub mod prices;
pub mod readback;
pub mod rpc;

pub use indexer::HttpRecordSource;
pub use prices::CoinGeckoPrices;
pub use readback::HttpPrizeTotals;
pub use rpc::{RpcTwabRewards, RpcVaultChain};

#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn get_wins(&self, network: &NetworkSpec) -> Result<WinsByDraw, AggregationError>;
    async fn get_claims(&self, network: &NetworkSpec) -> Result<ClaimsByDraw, AggregationError>;
    async fn get_players(&self, network: &NetworkSpec) -> Result<Vec<VaultPoolersSnapshot>, AggregationError>;
    async fn get_prizes(&self, network: &NetworkSpec) -> Result<PrizeOverview, AggregationError>;
}

#[async_trait]
pub trait VaultChain: Send + Sync {
    async fn vault_metadata(&self, vault: &str) -> Result<VaultMetadata, AggregationError>;

    /// `Ok(None)` when the owner is not a multisig
    async fn owner_info(&self, owner: &str) -> Result<Option<SafeOwnerInfo>, AggregationError>;

    async fn last_awarded_draw_id(&self, prize_pool: &str) -> Result<DrawId, AggregationError>;

    /// Vault contributions to the pool over `[start, end]` (inclusive draws)
    async fn contributed_between(
        &self,
        prize_pool: &str,
        vault: &str,
        start: DrawId,
        end: DrawId,
    ) -> Result<Amount, AggregationError>;
}

#[async_trait]
pub trait PriceSource: Send + Sync {
    /// USD price per token contract address (lowercase keys), one request
    async fn token_prices(&self, assets: &[String]) -> Result<HashMap<String, f64>, AggregationError>;

    /// USD price per coin id, one request
    async fn coin_prices(&self, ids: &[String]) -> Result<BTreeMap<String, f64>, AggregationError>;
}

#[async_trait]
pub trait PrizeTotalsSource: Send + Sync {
    async fn vault_totals(&self, network: &NetworkSpec) -> Result<VaultTotals, AggregationError>;
}

#[async_trait]
pub trait PromotionSource: Send + Sync {
    /// Every created and ended promotion of the rewards contract
    async fn promotion_events(&self) -> Result<PromotionEvents, AggregationError>;

    async fn token_decimals(&self, token: &str) -> Result<u8, AggregationError>;
}

/// Shared `reqwest` GET-and-decode used by the HTTP collaborators
pub(crate) async fn get_json<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
) -> Result<T, AggregationError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AggregationError::SourceUnavailable(format!("GET {}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(AggregationError::SourceUnavailable(format!(
            "GET {}: HTTP {}",
            url,
            response.status()
        )));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| AggregationError::SourceUnavailable(format!("GET {}: malformed response: {}", url, e)))
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
}
