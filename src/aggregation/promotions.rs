//! TWAB reward promotions
//!
//! A promotion is live from its `PromotionCreated` event. A `PromotionEnded`
//! event cuts its epoch count down to the epoch it ended in, and promotions
//! left with zero epochs are dropped. Whitelisted ids are flagged for the
//! front end; nothing is filtered by the whitelist.

use super::amounts::Amount;
use super::types::NetworkSpec;
use crate::error::AggregationError;
use crate::sources::PromotionSource;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Promotion ids shown as curated
pub const DEFAULT_PROMOTION_WHITELIST: &[u64] = &[3, 4, 5, 6, 7, 9, 10, 11, 12];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionCreated {
    pub promotion_id: u64,
    pub vault: String,
    pub token: String,
    pub start_timestamp: u64,
    pub tokens_per_epoch: Amount,
    pub epoch_duration: u64,
    pub initial_number_of_epochs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionEnded {
    pub promotion_id: u64,
    pub epoch_number: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromotionEvents {
    pub created: Vec<PromotionCreated>,
    pub ended: Vec<PromotionEnded>,
}

/// Published promotion row; ids and timestamps are strings like the amounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Promotion {
    pub promotion_id: String,
    pub vault: String,
    pub token: String,
    pub token_decimals: u8,
    pub start_timestamp: String,
    pub tokens_per_epoch: Amount,
    pub epoch_duration: String,
    pub initial_number_of_epochs: u64,
    pub whitelist: bool,
}

/// Live promotions in creation order
///
/// Promotions whose token decimals are unknown are skipped with a warning.
pub fn active_promotions(
    events: &PromotionEvents,
    token_decimals: &HashMap<String, u8>,
    whitelist: &[u64],
) -> Vec<Promotion> {
    let ended: HashMap<u64, u64> = events
        .ended
        .iter()
        .map(|e| (e.promotion_id, e.epoch_number))
        .collect();

    events
        .created
        .iter()
        .filter_map(|created| {
            let token = created.token.to_lowercase();
            let Some(decimals) = token_decimals.get(&token) else {
                log::warn!(
                    "⚠️  Promotion {} skipped: no decimals for token {}",
                    created.promotion_id,
                    token
                );
                return None;
            };
            let epochs = ended
                .get(&created.promotion_id)
                .copied()
                .unwrap_or(created.initial_number_of_epochs);
            if epochs == 0 {
                return None;
            }
            Some(Promotion {
                promotion_id: created.promotion_id.to_string(),
                vault: created.vault.to_lowercase(),
                token,
                token_decimals: *decimals,
                start_timestamp: created.start_timestamp.to_string(),
                tokens_per_epoch: created.tokens_per_epoch,
                epoch_duration: created.epoch_duration.to_string(),
                initial_number_of_epochs: epochs,
                whitelist: whitelist.contains(&created.promotion_id),
            })
        })
        .collect()
}

/// Promotion feed for the one network whose rewards contract is configured
pub struct PromotionFeed {
    network_id: u64,
    source: Arc<dyn PromotionSource>,
    whitelist: Vec<u64>,
}

impl PromotionFeed {
    pub fn new(network_id: u64, source: Arc<dyn PromotionSource>, whitelist: Vec<u64>) -> Self {
        Self {
            network_id,
            source,
            whitelist,
        }
    }

    pub fn serves(&self, network: &NetworkSpec) -> bool {
        network.id == self.network_id
    }

    pub async fn collect(&self) -> Result<Vec<Promotion>, AggregationError> {
        let events = self.source.promotion_events().await?;

        let mut tokens: Vec<String> = events.created.iter().map(|c| c.token.to_lowercase()).collect();
        tokens.sort();
        tokens.dedup();

        let mut decimals = HashMap::new();
        for token in tokens {
            match self.source.token_decimals(&token).await {
                Ok(d) => {
                    decimals.insert(token, d);
                }
                Err(e) => log::warn!("⚠️  Decimals for {} unavailable: {}", token, e),
            }
        }

        Ok(active_promotions(&events, &decimals, &self.whitelist))
    }
}
