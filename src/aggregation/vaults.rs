//! Vault registry enrichment
//!
//! Per vault lifecycle:
//!
//! ```text
//! Unknown ──(first seen in a pooler snapshot)──▶ Enriching ──▶ Enriched
//!                                                    ▲             │
//!                                                    └── Stale ◀───┘ (cooldown elapsed)
//! ```
//!
//! - New vaults get their descriptive metadata read once. A metadata failure
//!   drops the vault from this cycle entirely; it is retried next cycle.
//! - Every cycle refreshes the cheap `poolerCount` field.
//! - Vaults whose last enrichment is older than the cooldown (default 6 h) get
//!   their pool contribution windows, 7-draw prize total, owner classification
//!   and price refreshed. Prices for all due vaults come from one batched call.
//!
//! Blacklisted vaults are dropped on the way in and on registry load, so they
//! can never reach a published artifact.

use super::amounts::Amount;
use super::types::{normalize_address, NetworkSpec, VaultPoolerCount, VaultRecord, VaultTotals};
use crate::error::AggregationError;
use crate::persistence::{load_snapshot, save_snapshot};
use crate::sources::{PriceSource, PrizeTotalsSource, VaultChain};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Vaults that are never tracked
pub const DEFAULT_BLACKLIST: &[&str] = &["0x019ff7c88119bffce03cfa163148bc2e051f5905"];

pub const DEFAULT_COOLDOWN_SECS: i64 = 6 * 60 * 60;
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Contribution accounting decimals (POOL)
const CONTRIBUTION_DECIMALS: u8 = 18;
/// Vault totals are published with 4 decimals
const TOTALS_DECIMALS: u8 = 4;
const WON_WINDOW_DRAWS: u64 = 7;
const CONTRIBUTED_7D_LOOKBACK: u64 = 6;
const CONTRIBUTED_24H_LOOKBACK: u64 = 1;

#[derive(Debug, Clone)]
pub struct VaultBlacklist {
    addresses: HashSet<String>,
}

impl VaultBlacklist {
    /// Built-in list plus `extra`
    pub fn new(extra: &[String]) -> Self {
        let addresses = DEFAULT_BLACKLIST
            .iter()
            .map(|a| a.to_string())
            .chain(extra.iter().map(|a| a.trim().to_lowercase()))
            .filter(|a| !a.is_empty())
            .collect();
        Self { addresses }
    }

    pub fn contains(&self, vault: &str) -> bool {
        self.addresses.contains(&vault.to_lowercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentState {
    /// Not in the registry yet
    Unknown,
    /// Enriched within the cooldown window
    Enriched,
    /// Registered but never refreshed, or cooldown elapsed
    Stale,
}

pub fn enrichment_state(
    registered: bool,
    last_enriched_at: Option<i64>,
    now: i64,
    cooldown_secs: i64,
) -> EnrichmentState {
    if !registered {
        return EnrichmentState::Unknown;
    }
    match last_enriched_at {
        Some(last) if now.saturating_sub(last) < cooldown_secs => EnrichmentState::Enriched,
        _ => EnrichmentState::Stale,
    }
}

/// Per-pool vault registry and last-enriched timestamps on disk
pub struct VaultRegistryStore {
    dir: PathBuf,
}

impl VaultRegistryStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn registry_path(&self, network: &NetworkSpec) -> PathBuf {
        self.dir.join(format!("vaults-{}.json", network.key()))
    }

    fn timestamps_path(&self, network: &NetworkSpec) -> PathBuf {
        self.dir.join(format!("vault-enriched-at-{}.json", network.key()))
    }

    pub fn load(&self, network: &NetworkSpec) -> (Vec<VaultRecord>, BTreeMap<String, i64>) {
        let registry_path = self.registry_path(network);
        let timestamps_path = self.timestamps_path(network);
        let records = load_snapshot(&registry_path).or_empty(&registry_path);
        let timestamps = load_snapshot(&timestamps_path).or_empty(&timestamps_path);
        (records, timestamps)
    }

    pub fn save(
        &self,
        network: &NetworkSpec,
        records: &[VaultRecord],
        timestamps: &BTreeMap<String, i64>,
    ) -> Result<(), AggregationError> {
        let registry_path = self.registry_path(network);
        save_snapshot(records, &registry_path)
            .map_err(|e| AggregationError::Persistence(format!("{}: {}", registry_path.display(), e)))?;
        let timestamps_path = self.timestamps_path(network);
        save_snapshot(timestamps, &timestamps_path)
            .map_err(|e| AggregationError::Persistence(format!("{}: {}", timestamps_path.display(), e)))
    }
}

/// Outcome of one enrichment pass
#[derive(Debug, Clone, Default)]
pub struct EnrichmentReport {
    pub vaults: Vec<VaultRecord>,
    pub added: Vec<String>,
    /// New vaults whose metadata could not be read, retried next cycle
    pub failed: Vec<String>,
    pub refreshed: Vec<String>,
}

/// Pool-wide inputs shared by every due vault in one refresh
struct RefreshInputs {
    last_draw: u64,
    totals: HashMap<String, BTreeMap<u64, String>>,
    prices: HashMap<String, f64>,
}

pub struct VaultEnrichmentAggregator {
    store: VaultRegistryStore,
    chain: Arc<dyn VaultChain>,
    prices: Arc<dyn PriceSource>,
    totals: Arc<dyn PrizeTotalsSource>,
    blacklist: VaultBlacklist,
    cooldown_secs: i64,
    max_concurrency: usize,
}

impl VaultEnrichmentAggregator {
    pub fn new(
        store: VaultRegistryStore,
        chain: Arc<dyn VaultChain>,
        prices: Arc<dyn PriceSource>,
        totals: Arc<dyn PrizeTotalsSource>,
        blacklist: VaultBlacklist,
    ) -> Self {
        Self {
            store,
            chain,
            prices,
            totals,
            blacklist,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    pub fn with_cooldown_secs(mut self, cooldown_secs: i64) -> Self {
        self.cooldown_secs = cooldown_secs;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn blacklist(&self) -> &VaultBlacklist {
        &self.blacklist
    }

    /// Merge the latest pooler counts into the registry and enrich what is due
    pub async fn enrich(
        &self,
        network: &NetworkSpec,
        observed: &[VaultPoolerCount],
        now: i64,
    ) -> Result<EnrichmentReport, AggregationError> {
        let (mut records, mut timestamps) = self.store.load(network);
        records.retain(|r| !self.blacklist.contains(&r.vault_address));

        let mut counts: Vec<(String, u64)> = Vec::new();
        for row in observed {
            let Some(vault) = normalize_address(&row.vault) else {
                log::warn!("⚠️  Skipping vault with malformed address: {:?}", row.vault);
                continue;
            };
            if self.blacklist.contains(&vault) {
                continue;
            }
            counts.push((vault, row.poolers));
        }

        let mut report = EnrichmentReport::default();
        let mut new_vaults: Vec<(String, u64)> = Vec::new();
        for (vault, poolers) in counts {
            match records.iter_mut().find(|r| r.vault_address == vault) {
                Some(record) => record.pooler_count = poolers,
                None if !new_vaults.iter().any(|(v, _)| *v == vault) => new_vaults.push((vault, poolers)),
                None => {}
            }
        }

        // Metadata reads for new vaults, capped fan-out, results in input order
        let fetched: Vec<_> = stream::iter(new_vaults)
            .map(|(vault, poolers)| {
                let chain = Arc::clone(&self.chain);
                async move {
                    let result = chain.vault_metadata(&vault).await;
                    (vault, poolers, result)
                }
            })
            .buffered(self.max_concurrency)
            .collect()
            .await;

        for (vault, poolers, result) in fetched {
            match result {
                Ok(meta) => {
                    log::info!("🆕 New vault {} ({})", vault, meta.symbol);
                    records.push(VaultRecord::from_metadata(&vault, poolers, meta));
                    report.added.push(vault);
                }
                Err(e) => {
                    log::error!("❌ Vault {} metadata failed, retrying next cycle: {}", vault, e);
                    report.failed.push(vault);
                }
            }
        }

        let due: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| {
                enrichment_state(true, timestamps.get(&r.vault_address).copied(), now, self.cooldown_secs)
                    == EnrichmentState::Stale
            })
            .map(|(i, _)| i)
            .collect();

        if !due.is_empty() {
            match self.refresh_inputs(network, &records, &due).await {
                Ok(inputs) => {
                    for i in due {
                        let record = &mut records[i];
                        match self.refresh_vault(network, record, &inputs).await {
                            Ok(()) => {
                                record.last_enriched_at = Some(now);
                                timestamps.insert(record.vault_address.clone(), now);
                                report.refreshed.push(record.vault_address.clone());
                            }
                            Err(e) => {
                                log::error!("❌ Vault {} stats refresh failed: {}", record.vault_address, e);
                            }
                        }
                    }
                }
                Err(e) => log::error!("❌ Vault stats refresh skipped for {}: {}", network.name, e),
            }
        }

        // Unsaved timestamps would make every vault due again next cycle
        self.store.save(network, &records, &timestamps)?;

        log::info!(
            "🏦 Vaults {}: {} tracked, {} new, {} failed, {} refreshed",
            network.name,
            records.len(),
            report.added.len(),
            report.failed.len(),
            report.refreshed.len()
        );

        report.vaults = records;
        Ok(report)
    }

    async fn refresh_inputs(
        &self,
        network: &NetworkSpec,
        records: &[VaultRecord],
        due: &[usize],
    ) -> Result<RefreshInputs, AggregationError> {
        let last_draw = self.chain.last_awarded_draw_id(&network.prize_pool).await?;
        let totals: VaultTotals = self.totals.vault_totals(network).await?;
        let totals = totals
            .into_iter()
            .map(|(vault, draws)| (vault.to_lowercase(), draws))
            .collect();

        let mut assets: Vec<String> = due.iter().map(|i| records[*i].asset_address.clone()).collect();
        assets.sort();
        assets.dedup();
        let prices = match self.prices.token_prices(&assets).await {
            Ok(prices) => prices,
            Err(e) => {
                log::warn!("⚠️  Token prices unavailable, keeping previous: {}", e);
                HashMap::new()
            }
        };

        Ok(RefreshInputs {
            last_draw,
            totals,
            prices,
        })
    }

    async fn refresh_vault(
        &self,
        network: &NetworkSpec,
        record: &mut VaultRecord,
        inputs: &RefreshInputs,
    ) -> Result<(), AggregationError> {
        let pool = &network.prize_pool;
        let vault = &record.vault_address;
        let last = inputs.last_draw;

        let contributed_7d = self
            .chain
            .contributed_between(pool, vault, last.saturating_sub(CONTRIBUTED_7D_LOOKBACK), last)
            .await?;
        let contributed_24h = self
            .chain
            .contributed_between(pool, vault, last.saturating_sub(CONTRIBUTED_24H_LOOKBACK), last)
            .await?;
        let won_7d = won_over_window(inputs.totals.get(vault), last)?;

        let safe_owner_info = match self.chain.owner_info(&record.owner_address).await {
            Ok(info) => info,
            Err(e) => {
                log::warn!("⚠️  Owner info for {} unavailable: {}", record.owner_address, e);
                None
            }
        };

        record.contributed_7d = Some(contributed_7d.format_units(CONTRIBUTION_DECIMALS));
        record.contributed_24h = Some(contributed_24h.format_units(CONTRIBUTION_DECIMALS));
        record.won_7d = Some(won_7d.format_fixed(TOTALS_DECIMALS, TOTALS_DECIMALS));
        record.safe_owner_info = safe_owner_info;
        if let Some(price) = inputs.prices.get(&record.asset_address) {
            record.price_usd = Some(*price);
        }
        Ok(())
    }
}

/// Sum of a vault's published per-draw totals over the last 7 draws
fn won_over_window(draws: Option<&BTreeMap<u64, String>>, last_draw: u64) -> Result<Amount, AggregationError> {
    let Some(draws) = draws else {
        return Ok(Amount::ZERO);
    };
    let first = last_draw.saturating_sub(WON_WINDOW_DRAWS - 1);
    draws
        .range(first..=last_draw)
        .map(|(draw, raw)| {
            Amount::parse_units(raw, TOTALS_DECIMALS)
                .map_err(|e| AggregationError::DataShape(format!("vault total for draw {}: {}", draw, e)))
        })
        .try_fold(Amount::ZERO, |acc, value| Ok(acc.saturating_add(value?)))
}
