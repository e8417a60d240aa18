//! Read-back of this engine's own `/vault-totals-{network}-{pool}` artifact
//!
//! Vault enrichment needs the trailing 7 draws of per-vault prize totals. It
//! reads them through the public HTTP surface, the same way any consumer
//! would, so a restarted engine picks up what the previous process published.

use super::{get_json, http_client, PrizeTotalsSource};
use crate::aggregation::types::{NetworkSpec, VaultTotals};
use crate::error::AggregationError;
use async_trait::async_trait;

pub struct HttpPrizeTotals {
    client: reqwest::Client,
    public_base_url: String,
}

impl HttpPrizeTotals {
    pub fn new(public_base_url: &str) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: http_client(15)?,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self, network: &NetworkSpec) -> String {
        format!("{}/vault-totals-{}", self.public_base_url, network.key())
    }
}

#[async_trait]
impl PrizeTotalsSource for HttpPrizeTotals {
    async fn vault_totals(&self, network: &NetworkSpec) -> Result<VaultTotals, AggregationError> {
        let url = self.url(network);
        log::debug!("Fetching 7d prize data from {}", url);
        get_json(&self.client, &url).await
    }
}
