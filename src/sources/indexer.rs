//! Upstream indexer export
//!
//! Reads the raw records this engine aggregates from an indexer that exposes
//! one JSON document per pool:
//!
//! - `{base}/{network}/{pool}/wins` → `{ drawId: { tierValues, wins } }`
//! - `{base}/{network}/{pool}/claims` → `{ drawId: { claimsList } }`
//! - `{base}/{network}/{pool}/players` → `[{ vault, poolers: [{ address, … }] }]`
//! - `{base}/{network}/{pool}/prizes` → prize overview (opaque)

use super::{get_json, http_client, RecordSource};
use crate::aggregation::types::{
    ClaimsByDraw, NetworkSpec, PrizeOverview, VaultPoolersSnapshot, WinsByDraw,
};
use crate::error::AggregationError;
use async_trait::async_trait;

pub struct HttpRecordSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRecordSource {
    pub fn new(base_url: &str) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: http_client(30)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, network: &NetworkSpec, document: &str) -> String {
        format!("{}/{}/{}/{}", self.base_url, network.id, network.prize_pool, document)
    }
}

#[async_trait]
impl RecordSource for HttpRecordSource {
    async fn get_wins(&self, network: &NetworkSpec) -> Result<WinsByDraw, AggregationError> {
        get_json(&self.client, &self.url(network, "wins")).await
    }

    async fn get_claims(&self, network: &NetworkSpec) -> Result<ClaimsByDraw, AggregationError> {
        get_json(&self.client, &self.url(network, "claims")).await
    }

    async fn get_players(&self, network: &NetworkSpec) -> Result<Vec<VaultPoolersSnapshot>, AggregationError> {
        get_json(&self.client, &self.url(network, "players")).await
    }

    async fn get_prizes(&self, network: &NetworkSpec) -> Result<PrizeOverview, AggregationError> {
        get_json(&self.client, &self.url(network, "prizes")).await
    }
}
