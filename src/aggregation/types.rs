//! Record shapes consumed and produced by the aggregation engine
//!
//! Upstream win records use the compact field names of the indexer export
//! (`t`, `p`, `i`, `c`, `v`). Claim records accept both compact and long names.
//! Everything this engine publishes uses camelCase long names, and every
//! token amount is an `Amount` (decimal string on the wire).

use super::amounts::Amount;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

pub type DrawId = u64;
pub type Tier = u8;

/// One prize pool on one network
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    pub id: u64,
    pub name: String,
    /// Lowercase prize pool contract address
    pub prize_pool: String,
}

impl NetworkSpec {
    pub fn new(id: u64, name: &str, prize_pool: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            prize_pool: prize_pool.to_lowercase(),
        }
    }

    /// `{id}-{prizePool}`, the prefix of every per-pool artifact
    pub fn key(&self) -> String {
        format!("{}-{}", self.id, self.prize_pool)
    }
}

/// A pooler's wins in one tier of one draw
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinRecord {
    #[serde(rename = "t")]
    pub tier: Tier,
    #[serde(rename = "p")]
    pub pooler: String,
    #[serde(rename = "v", default, skip_serializing_if = "Option::is_none")]
    pub vault: Option<String>,
    #[serde(rename = "i", default)]
    pub won_indices: Vec<u32>,
    /// Aligned index-for-index with `won_indices`; empty means unknown
    #[serde(rename = "c", default)]
    pub claimed_flags: Vec<bool>,
}

impl WinRecord {
    pub fn claimed_count(&self) -> u64 {
        self.claimed_flags.iter().filter(|c| **c).count() as u64
    }
}

/// Finalised tier values plus the wins of one draw
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawWins {
    pub tier_values: BTreeMap<Tier, Amount>,
    pub wins: Vec<WinRecord>,
}

/// One prize claim, immutable once observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRecord {
    #[serde(alias = "v")]
    pub vault: String,
    #[serde(alias = "t")]
    pub tier: Tier,
    #[serde(alias = "i", default)]
    pub index: u32,
    #[serde(alias = "w")]
    pub winner: String,
    #[serde(alias = "p")]
    pub payout: Amount,
    #[serde(alias = "f", default)]
    pub fee: Amount,
    #[serde(alias = "h", alias = "hash", default)]
    pub claim_hash: String,
}

impl ClaimRecord {
    /// Zero-payout claims are liveness canaries, not prizes
    pub fn is_canary(&self) -> bool {
        self.payout.is_zero()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawClaims {
    pub claims_list: Vec<ClaimRecord>,
}

pub type WinsByDraw = BTreeMap<DrawId, DrawWins>;
pub type ClaimsByDraw = BTreeMap<DrawId, DrawClaims>;

/// Won/claimed counts for one tier of one draw
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierTally {
    pub won_count: u64,
    pub claimed_count: u64,
    pub value_per_win: Amount,
}

/// Ranked row shared by the payout leaderboards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub pooler_address: String,
    pub value: Amount,
    pub draw_id: DrawId,
}

/// Cached per-draw summary; computed once, never recomputed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawHistoryEntry {
    pub draw_id: DrawId,
    pub wins_count: u64,
    pub total_payout: Amount,
    pub total_fee: Amount,
    pub tiers_won: BTreeSet<Tier>,
    pub unique_winners_count: u64,
    pub canary_count: u64,
    #[serde(default)]
    pub tiers: BTreeMap<Tier, TierTally>,
    /// Claim-adjusted win value per pooler in this draw
    #[serde(default)]
    pub contributions: Vec<LeaderboardEntry>,
}

/// Full-history prize leaderboard row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrizeLeaderboardEntry {
    pub pooler_address: String,
    pub distinct_draw_count: u64,
    pub distinct_prize_count: u64,
    pub total_won: Amount,
}

/// One pooler in a vault snapshot; unknown fields are passed through
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pooler {
    pub address: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultPoolersSnapshot {
    pub vault: String,
    pub poolers: Vec<Pooler>,
}

/// `{vault, poolers}` summary row fed to vault enrichment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultPoolerCount {
    pub vault: String,
    pub poolers: u64,
}

/// Opaque prize overview passed through to `/…-overview`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrizeOverview(pub serde_json::Value);

/// Multisig classification of a vault owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeOwnerInfo {
    pub threshold: u64,
    pub owners: Vec<String>,
}

/// Descriptive vault metadata read from chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub asset: String,
    pub asset_symbol: String,
    pub owner: String,
    pub liquidation_pair: String,
}

/// Persisted vault registry row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultRecord {
    pub vault_address: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub asset_address: String,
    pub asset_symbol: String,
    pub owner_address: String,
    pub liquidation_pair_address: String,
    pub safe_owner_info: Option<SafeOwnerInfo>,
    pub price_usd: Option<f64>,
    pub pooler_count: u64,
    #[serde(rename = "contributed24h")]
    pub contributed_24h: Option<String>,
    #[serde(rename = "contributed7d")]
    pub contributed_7d: Option<String>,
    #[serde(rename = "won7d")]
    pub won_7d: Option<String>,
    pub last_enriched_at: Option<i64>,
}

impl VaultRecord {
    pub fn from_metadata(vault_address: &str, pooler_count: u64, meta: VaultMetadata) -> Self {
        Self {
            vault_address: vault_address.to_string(),
            name: meta.name,
            symbol: meta.symbol,
            decimals: meta.decimals,
            asset_address: meta.asset.to_lowercase(),
            asset_symbol: meta.asset_symbol,
            owner_address: meta.owner.to_lowercase(),
            liquidation_pair_address: meta.liquidation_pair.to_lowercase(),
            safe_owner_info: None,
            price_usd: None,
            pooler_count,
            contributed_24h: None,
            contributed_7d: None,
            won_7d: None,
            last_enriched_at: None,
        }
    }
}

/// vault → draw → payout in POOL units with 4 decimals
pub type VaultTotals = BTreeMap<String, BTreeMap<DrawId, String>>;

/// Validates an account address and returns its lowercase `0x` form
///
/// Mixed-case input must carry a valid EIP-55 checksum.
pub fn normalize_address(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.len() >= 50 {
        return None;
    }
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
    let valid = if has_upper && has_lower {
        let prefixed = format!("0x{}", digits);
        Address::parse_checksummed(&prefixed, None).is_ok()
    } else {
        Address::from_str(digits).is_ok()
    };
    if valid {
        Some(format!("0x{}", digits.to_lowercase()))
    } else {
        None
    }
}
