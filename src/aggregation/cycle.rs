//! Aggregation cycles
//!
//! `AggregationContext` owns everything a cycle mutates (draw cache, vault
//! registry) plus handles to the shared registry and history store, so tests
//! can build isolated instances.
//!
//! ## Fast cycle (per network, one at a time)
//!
//! ```text
//! get_wins + get_claims
//!     ↓
//! history store (claims, wins)
//!     ↓
//! per-draw artifacts
//!     ↓
//! tally draws ≥ resume point → merge finalised draws into the cache
//!     ↓
//! history, prize results, leaderboards, vault totals, draw lists
//! ```
//!
//! ## Slow cycle
//!
//! Coin prices once, then per network: pooler snapshots, vault enrichment,
//! overview, prize leaderboard, and TWAB reward promotions on the network
//! that hosts the rewards contract.
//!
//! History store calls run on the blocking pool.
//!
//! Each unit of work ends in a `UnitOutcome`; a failure is logged and the
//! cycle moves on to the next unit. Nothing here is fatal.

use super::cache::IncrementalCache;
use super::leaderboard::{
    claimed_value_leaderboard, cumulative_leaderboard, prize_leaderboard, single_draw_leaderboard,
    vault_draw_totals, CLAIMED_VALUE_LIMIT, CUMULATIVE_LIMIT, PRIZE_LEADERBOARD_LIMIT, SINGLE_DRAW_LIMIT,
};
use super::amounts::Amount;
use super::promotions::PromotionFeed;
use super::tally::tally_draw;
use super::types::{
    ClaimsByDraw, DrawHistoryEntry, DrawId, NetworkSpec, Tier, TierTally, VaultPoolerCount, WinsByDraw,
};
use super::vaults::VaultEnrichmentAggregator;
use crate::error::AggregationError;
use crate::history_store::{HistoryStore, HistoryStoreError};
use crate::publication::PublicationRegistry;
use crate::sources::{PriceSource, RecordSource};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Coin id whose price is quoted in every overview
pub const POOL_COIN_ID: &str = "pooltogether";

const GLOBAL_UNIT: &str = "global";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    Fast,
    Slow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Fetch,
    HistoryStore,
    DrawArtifacts,
    Tally,
    Publish,
    Prices,
    Poolers,
    Vaults,
    Overview,
    PrizeLeaderboard,
    Promotions,
}

impl CyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CyclePhase::Fetch => "fetch",
            CyclePhase::HistoryStore => "history-store",
            CyclePhase::DrawArtifacts => "draw-artifacts",
            CyclePhase::Tally => "tally",
            CyclePhase::Publish => "publish",
            CyclePhase::Prices => "prices",
            CyclePhase::Poolers => "poolers",
            CyclePhase::Vaults => "vaults",
            CyclePhase::Overview => "overview",
            CyclePhase::PrizeLeaderboard => "prize-leaderboard",
            CyclePhase::Promotions => "promotions",
        }
    }
}

/// Result of one unit of work; `Ok` carries an item count
#[derive(Debug, Clone, PartialEq)]
pub struct UnitOutcome {
    pub network: String,
    pub phase: CyclePhase,
    pub result: Result<usize, AggregationError>,
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub kind: CycleKind,
    pub outcomes: Vec<UnitOutcome>,
    pub elapsed: Duration,
}

impl CycleReport {
    fn new(kind: CycleKind) -> Self {
        Self {
            kind,
            outcomes: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    fn record(&mut self, network: &str, phase: CyclePhase, result: Result<usize, AggregationError>) {
        if let Err(e) = &result {
            log::error!("❌ {} {} failed ({}): {}", network, phase.as_str(), e.kind(), e);
        }
        self.outcomes.push(UnitOutcome {
            network: network.to_string(),
            phase,
            result,
        });
    }

    pub fn failures(&self) -> impl Iterator<Item = &UnitOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    pub fn outcome(&self, network: &str, phase: CyclePhase) -> Option<&UnitOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.network == network && o.phase == phase)
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    fn log_summary(&self) {
        let failed = self.failures().count();
        let icon = if failed == 0 { "✅" } else { "⚠️ " };
        log::info!(
            "{} {:?} cycle done in {:.1}s: {} units, {} failed",
            icon,
            self.kind,
            self.elapsed.as_secs_f64(),
            self.outcomes.len(),
            failed
        );
        for (i, outcome) in self.failures().enumerate() {
            let branch = if i + 1 == failed { "└─" } else { "├─" };
            if let Err(e) = &outcome.result {
                log::info!("   {} {} {}: {}", branch, outcome.network, outcome.phase.as_str(), e.kind());
            }
        }
    }
}

/// Published history row; per-winner contributions stay in the cache
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRow<'a> {
    draw_id: DrawId,
    wins_count: u64,
    total_payout: Amount,
    total_fee: Amount,
    tiers_won: &'a BTreeSet<Tier>,
    unique_winners_count: u64,
    canary_count: u64,
    /// Newest draw; claims may still arrive
    provisional: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrizeResultRow<'a> {
    draw_id: DrawId,
    tiers: &'a BTreeMap<Tier, TierTally>,
}

/// `/draws-…` and `/claimeddraws-…` row
#[derive(Serialize)]
struct DrawList {
    chain: u64,
    draws: Vec<DrawId>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Overview {
    poolers: usize,
    pool_price: Option<f64>,
    prize_data: Option<serde_json::Value>,
}

/// Cached entries followed by the newest (provisional) draw, if any
struct TallyOutcome {
    entries: Vec<DrawHistoryEntry>,
    provisional: Option<DrawId>,
    merged: Result<usize, AggregationError>,
}

pub struct AggregationContext {
    networks: Vec<NetworkSpec>,
    registry: Arc<PublicationRegistry>,
    cache: IncrementalCache,
    history: Arc<HistoryStore>,
    records: Arc<dyn RecordSource>,
    prices: Arc<dyn PriceSource>,
    vaults: VaultEnrichmentAggregator,
    pacing: Duration,
    coin_ids: Vec<String>,
    promotions: Option<PromotionFeed>,

    /// Timestamp function (for testing with mock time)
    now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
}

impl AggregationContext {
    pub fn new(
        networks: Vec<NetworkSpec>,
        data_dir: impl AsRef<Path>,
        registry: Arc<PublicationRegistry>,
        history: Arc<HistoryStore>,
        records: Arc<dyn RecordSource>,
        prices: Arc<dyn PriceSource>,
        vaults: VaultEnrichmentAggregator,
    ) -> Self {
        Self {
            networks,
            registry,
            cache: IncrementalCache::new(data_dir),
            history,
            records,
            prices,
            vaults,
            pacing: Duration::ZERO,
            coin_ids: Vec::new(),
            promotions: None,
            now_fn: Box::new(|| chrono::Utc::now().timestamp()),
        }
    }

    /// Pause between networks and between phases
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_coin_ids(mut self, coin_ids: Vec<String>) -> Self {
        self.coin_ids = coin_ids;
        self
    }

    pub fn with_promotions(mut self, feed: PromotionFeed) -> Self {
        self.promotions = Some(feed);
        self
    }

    pub fn with_now_fn(mut self, now_fn: Box<dyn Fn() -> i64 + Send + Sync>) -> Self {
        self.now_fn = now_fn;
        self
    }

    pub fn registry(&self) -> &Arc<PublicationRegistry> {
        &self.registry
    }

    pub fn networks(&self) -> &[NetworkSpec] {
        &self.networks
    }

    /// One past the highest cached draw for `network`
    pub fn resume_point(&mut self, network: &NetworkSpec) -> DrawId {
        self.cache.resume_point(network.id, &network.prize_pool)
    }

    async fn pause(&self) {
        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }
    }

    async fn with_history<T, F>(&self, f: F) -> Result<T, AggregationError>
    where
        T: Send + 'static,
        F: FnOnce(&HistoryStore) -> Result<T, HistoryStoreError> + Send + 'static,
    {
        let history = Arc::clone(&self.history);
        tokio::task::spawn_blocking(move || f(&history))
            .await
            .map_err(|e| AggregationError::Persistence(format!("history store task failed: {}", e)))?
            .map_err(AggregationError::from)
    }

    fn publish<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<(), AggregationError> {
        self.registry
            .publish_json(name, value)
            .map(|_| ())
            .map_err(|e| AggregationError::DataShape(format!("{}: {}", name, e)))
    }

    pub async fn run_fast_cycle(&mut self) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::new(CycleKind::Fast);
        log::info!("🔄 Fast cycle: {} networks", self.networks.len());

        let networks = self.networks.clone();
        for (i, network) in networks.iter().enumerate() {
            if i > 0 {
                self.pause().await;
            }
            self.fast_network(network, &mut report).await;
        }

        report.elapsed = started.elapsed();
        report.log_summary();
        report
    }

    async fn fetch_records(&self, network: &NetworkSpec) -> Result<(WinsByDraw, ClaimsByDraw), AggregationError> {
        let wins = self.records.get_wins(network).await?;
        let claims = self.records.get_claims(network).await?;
        Ok((wins, claims))
    }

    async fn fast_network(&mut self, network: &NetworkSpec, report: &mut CycleReport) {
        let label = network.name.as_str();

        let (wins, claims) = match self.fetch_records(network).await {
            Ok(records) => records,
            Err(e) => {
                // No new data this cycle; cache and artifacts stay as they were
                report.record(label, CyclePhase::Fetch, Err(e));
                return;
            }
        };
        report.record(label, CyclePhase::Fetch, Ok(wins.len().max(claims.len())));

        let (net, new_claims, new_wins) = (network.clone(), claims.clone(), wins.clone());
        let stored = self
            .with_history(move |history| {
                let added = history.record_claims(&net, &new_claims)?;
                Ok(added + history.record_wins(&net, &new_wins)?)
            })
            .await;
        report.record(label, CyclePhase::HistoryStore, stored);

        let per_draw = self.publish_draw_artifacts(network, &wins, &claims);
        report.record(label, CyclePhase::DrawArtifacts, per_draw);

        let tally = self.tally_and_cache(network, &wins, &claims);
        report.record(label, CyclePhase::Tally, tally.merged.clone());

        let views = self.publish_pool_views(network, &wins, &claims, &tally);
        report.record(label, CyclePhase::Publish, views);
    }

    fn publish_draw_artifacts(
        &self,
        network: &NetworkSpec,
        wins: &WinsByDraw,
        claims: &ClaimsByDraw,
    ) -> Result<usize, AggregationError> {
        let key = network.key();
        for (draw_id, draw) in claims {
            self.publish(&format!("/claims-{}-draw{}", key, draw_id), &draw.claims_list)?;
        }
        for (draw_id, draw) in wins {
            self.publish(&format!("/{}-draw{}", key, draw_id), draw)?;
        }
        log::debug!("   ├─ {} draw artifacts for {}", claims.len() + wins.len(), network.name);
        Ok(claims.len() + wins.len())
    }

    /// Tally every uncached draw; merge all but the newest
    fn tally_and_cache(&mut self, network: &NetworkSpec, wins: &WinsByDraw, claims: &ClaimsByDraw) -> TallyOutcome {
        let pool = network.prize_pool.as_str();
        let resume = self.cache.resume_point(network.id, pool);
        let draws: BTreeSet<DrawId> = wins.keys().chain(claims.keys()).copied().collect();
        let newest = draws.iter().next_back().copied();

        let mut finalised = Vec::new();
        let mut provisional = None;
        for draw_id in draws.range(resume..) {
            let draw_claims = claims
                .get(draw_id)
                .map(|d| d.claims_list.as_slice())
                .unwrap_or(&[]);
            let entry = tally_draw(*draw_id, wins.get(draw_id), draw_claims);
            if Some(*draw_id) == newest {
                provisional = Some(entry);
            } else {
                finalised.push(entry);
            }
        }

        let merged = self
            .cache
            .merge(network.id, pool, finalised)
            .map(|outcome| outcome.accepted);

        let mut entries = self.cache.entries(network.id, pool).to_vec();
        let provisional_id = provisional.as_ref().map(|e| e.draw_id);
        entries.extend(provisional);

        log::info!(
            "📊 {}: {} draws in history (resume at {}, provisional {:?})",
            network.name,
            entries.len(),
            self.cache.resume_point(network.id, pool),
            provisional_id
        );

        TallyOutcome {
            entries,
            provisional: provisional_id,
            merged,
        }
    }

    fn publish_pool_views(
        &self,
        network: &NetworkSpec,
        wins: &WinsByDraw,
        claims: &ClaimsByDraw,
        tally: &TallyOutcome,
    ) -> Result<usize, AggregationError> {
        let key = network.key();

        let history: Vec<HistoryRow> = tally
            .entries
            .iter()
            .map(|e| HistoryRow {
                draw_id: e.draw_id,
                wins_count: e.wins_count,
                total_payout: e.total_payout,
                total_fee: e.total_fee,
                tiers_won: &e.tiers_won,
                unique_winners_count: e.unique_winners_count,
                canary_count: e.canary_count,
                provisional: Some(e.draw_id) == tally.provisional,
            })
            .collect();
        self.publish(&format!("/{}-history", key), &history)?;

        let prize_results: Vec<PrizeResultRow> = tally
            .entries
            .iter()
            .map(|e| PrizeResultRow {
                draw_id: e.draw_id,
                tiers: &e.tiers,
            })
            .collect();
        self.publish(&format!("/{}-prizeresults", key), &prize_results)?;

        self.publish(
            &format!("/{}-bigwinners", key),
            &cumulative_leaderboard(claims, CUMULATIVE_LIMIT),
        )?;
        self.publish(
            &format!("/{}-bigwins", key),
            &single_draw_leaderboard(claims, SINGLE_DRAW_LIMIT),
        )?;
        self.publish(
            &format!("/{}-bigwinners-won", key),
            &claimed_value_leaderboard(&tally.entries, CLAIMED_VALUE_LIMIT),
        )?;

        let blacklist = self.vaults.blacklist();
        let mut totals = vault_draw_totals(claims);
        totals.retain(|vault, _| !blacklist.contains(vault));
        self.publish(&format!("/vault-totals-{}", key), &totals)?;

        let draws = [DrawList {
            chain: network.id,
            draws: wins.keys().copied().collect(),
        }];
        self.publish(&format!("/draws-{}", key), &draws)?;
        let claimed_draws = [DrawList {
            chain: network.id,
            draws: claims.keys().copied().collect(),
        }];
        self.publish(&format!("/claimeddraws-{}", key), &claimed_draws)?;

        log::info!("📤 {}: published pool views for {}", network.name, key);
        Ok(8)
    }

    pub async fn run_slow_cycle(&mut self) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::new(CycleKind::Slow);
        log::info!("🐢 Slow cycle: {} networks", self.networks.len());

        let pool_price = self.publish_prices(&mut report).await;

        let networks = self.networks.clone();
        for (i, network) in networks.iter().enumerate() {
            if i > 0 || !self.coin_ids.is_empty() {
                self.pause().await;
            }
            self.slow_network(network, pool_price, &mut report).await;
        }

        report.elapsed = started.elapsed();
        report.log_summary();
        report
    }

    async fn publish_prices(&self, report: &mut CycleReport) -> Option<f64> {
        if self.coin_ids.is_empty() {
            return None;
        }
        match self.prices.coin_prices(&self.coin_ids).await {
            Ok(prices) if prices.is_empty() => {
                log::warn!("⚠️  No coin prices returned");
                report.record(GLOBAL_UNIT, CyclePhase::Prices, Ok(0));
                None
            }
            Ok(prices) => {
                let published = self.publish("/prices", &prices).map(|_| prices.len());
                report.record(GLOBAL_UNIT, CyclePhase::Prices, published);
                prices.get(POOL_COIN_ID).copied()
            }
            Err(e) => {
                report.record(GLOBAL_UNIT, CyclePhase::Prices, Err(e));
                None
            }
        }
    }

    async fn slow_network(&self, network: &NetworkSpec, pool_price: Option<f64>, report: &mut CycleReport) {
        let label = network.name.as_str();
        let key = network.key();

        match self.records.get_players(network).await {
            Ok(snapshots) => {
                let blacklist = self.vaults.blacklist();
                let snapshots: Vec<_> = snapshots
                    .into_iter()
                    .filter(|s| !blacklist.contains(&s.vault))
                    .collect();

                let summary: Vec<VaultPoolerCount> = snapshots
                    .iter()
                    .map(|s| VaultPoolerCount {
                        vault: s.vault.to_lowercase(),
                        poolers: s.poolers.len() as u64,
                    })
                    .collect();
                let unique_poolers = snapshots
                    .iter()
                    .flat_map(|s| s.poolers.iter().map(|p| p.address.to_lowercase()))
                    .collect::<HashSet<_>>()
                    .len();

                let published = snapshots
                    .iter()
                    .try_for_each(|s| self.publish(&format!("/vault-{}-poolers", s.vault.to_lowercase()), &s.poolers))
                    .and_then(|_| self.publish(&format!("/{}-poolers", key), &summary))
                    .map(|_| summary.len());
                report.record(label, CyclePhase::Poolers, published);

                let net = network.clone();
                let stored = self
                    .with_history(move |history| history.record_poolers(&net, &snapshots))
                    .await;
                report.record(label, CyclePhase::HistoryStore, stored);

                self.pause().await;

                let now = (self.now_fn)();
                let enriched = match self.vaults.enrich(network, &summary, now).await {
                    Ok(enrichment) => self
                        .publish(&format!("/{}-vaults", key), &enrichment.vaults)
                        .map(|_| enrichment.vaults.len()),
                    Err(e) => Err(e),
                };
                report.record(label, CyclePhase::Vaults, enriched);

                let prize_data = match self.records.get_prizes(network).await {
                    Ok(prizes) => Some(prizes.0),
                    Err(e) => {
                        log::warn!("⚠️  {} prize overview unavailable: {}", label, e);
                        None
                    }
                };
                let overview = Overview {
                    poolers: unique_poolers,
                    pool_price,
                    prize_data,
                };
                let published = self.publish(&format!("/{}-overview", key), &overview).map(|_| 1);
                report.record(label, CyclePhase::Overview, published);
            }
            Err(e) => report.record(label, CyclePhase::Poolers, Err(e)),
        }

        let net = network.clone();
        let leaderboard = self
            .with_history(move |history| history.prize_claim_rows(&net))
            .await
            .and_then(|rows| {
                let board = prize_leaderboard(&rows, PRIZE_LEADERBOARD_LIMIT);
                self.publish(&format!("/{}-prizeleaderboard", key), &board)
                    .map(|_| board.len())
            });
        report.record(label, CyclePhase::PrizeLeaderboard, leaderboard);

        if let Some(feed) = self.promotions.as_ref().filter(|f| f.serves(network)) {
            let published = match feed.collect().await {
                Ok(promotions) => {
                    let mut by_chain = BTreeMap::new();
                    let count = promotions.len();
                    by_chain.insert(network.name.clone(), promotions);
                    self.publish(&format!("/{}-twabrewards", key), &by_chain).map(|_| count)
                }
                Err(e) => Err(e),
            };
            report.record(label, CyclePhase::Promotions, published);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::types::{
        ClaimRecord, DrawClaims, DrawWins, Pooler, PrizeOverview, SafeOwnerInfo, VaultMetadata,
        VaultPoolersSnapshot, VaultTotals, WinRecord,
    };
    use crate::aggregation::promotions::{PromotionCreated, PromotionEvents, DEFAULT_PROMOTION_WHITELIST};
    use crate::aggregation::vaults::{VaultBlacklist, VaultRegistryStore};
    use crate::sources::{PrizeTotalsSource, PromotionSource, VaultChain};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::tempdir;

    const WINNER: &str = "0x00000000000000000000000000000000000000aa";
    const VAULT: &str = "0x00000000000000000000000000000000000000bb";

    struct ScriptedSource {
        claims: Mutex<ClaimsByDraw>,
        wins: Mutex<WinsByDraw>,
    }

    #[async_trait]
    impl RecordSource for ScriptedSource {
        async fn get_wins(&self, _network: &NetworkSpec) -> Result<WinsByDraw, AggregationError> {
            Ok(self.wins.lock().unwrap().clone())
        }

        async fn get_claims(&self, _network: &NetworkSpec) -> Result<ClaimsByDraw, AggregationError> {
            Ok(self.claims.lock().unwrap().clone())
        }

        async fn get_players(&self, _network: &NetworkSpec) -> Result<Vec<VaultPoolersSnapshot>, AggregationError> {
            Ok(vec![VaultPoolersSnapshot {
                vault: VAULT.to_string(),
                poolers: vec![Pooler {
                    address: WINNER.to_string(),
                    extra: serde_json::Map::new(),
                }],
            }])
        }

        async fn get_prizes(&self, _network: &NetworkSpec) -> Result<PrizeOverview, AggregationError> {
            Err(AggregationError::SourceUnavailable("prizes down".to_string()))
        }
    }

    struct NoChain;

    #[async_trait]
    impl VaultChain for NoChain {
        async fn vault_metadata(&self, vault: &str) -> Result<VaultMetadata, AggregationError> {
            Err(AggregationError::Enrichment(format!("{} unavailable", vault)))
        }

        async fn owner_info(&self, _owner: &str) -> Result<Option<SafeOwnerInfo>, AggregationError> {
            Ok(None)
        }

        async fn last_awarded_draw_id(&self, _prize_pool: &str) -> Result<DrawId, AggregationError> {
            Err(AggregationError::SourceUnavailable("rpc down".to_string()))
        }

        async fn contributed_between(
            &self,
            _prize_pool: &str,
            _vault: &str,
            _start: DrawId,
            _end: DrawId,
        ) -> Result<Amount, AggregationError> {
            Ok(Amount::ZERO)
        }
    }

    struct FixedPrices;

    #[async_trait]
    impl PriceSource for FixedPrices {
        async fn token_prices(&self, _assets: &[String]) -> Result<HashMap<String, f64>, AggregationError> {
            Ok(HashMap::new())
        }

        async fn coin_prices(&self, ids: &[String]) -> Result<BTreeMap<String, f64>, AggregationError> {
            Ok(ids.iter().map(|id| (id.clone(), 0.5)).collect())
        }
    }

    struct NoTotals;

    #[async_trait]
    impl PrizeTotalsSource for NoTotals {
        async fn vault_totals(&self, _network: &NetworkSpec) -> Result<VaultTotals, AggregationError> {
            Ok(VaultTotals::new())
        }
    }

    fn claim(payout: u64) -> ClaimRecord {
        ClaimRecord {
            vault: VAULT.to_string(),
            tier: 1,
            index: 0,
            winner: WINNER.to_string(),
            payout: Amount::from(payout),
            fee: Amount::ZERO,
            claim_hash: format!("0x{}", payout),
        }
    }

    fn draws(ids: &[DrawId]) -> (WinsByDraw, ClaimsByDraw) {
        let mut wins = WinsByDraw::new();
        let mut claims = ClaimsByDraw::new();
        for id in ids {
            let mut tier_values = BTreeMap::new();
            tier_values.insert(1, Amount::from(100));
            wins.insert(
                *id,
                DrawWins {
                    tier_values,
                    wins: vec![WinRecord {
                        tier: 1,
                        pooler: WINNER.to_string(),
                        vault: None,
                        won_indices: vec![0],
                        claimed_flags: vec![true],
                    }],
                },
            );
            claims.insert(
                *id,
                DrawClaims {
                    claims_list: vec![claim(100 + id)],
                },
            );
        }
        (wins, claims)
    }

    fn context(dir: &Path, source: Arc<ScriptedSource>) -> AggregationContext {
        let vaults = VaultEnrichmentAggregator::new(
            VaultRegistryStore::new(dir),
            Arc::new(NoChain),
            Arc::new(FixedPrices),
            Arc::new(NoTotals),
            VaultBlacklist::new(&[]),
        );
        AggregationContext::new(
            vec![NetworkSpec::new(10, "OPTIMISM", "0xpool")],
            dir,
            Arc::new(PublicationRegistry::new()),
            Arc::new(HistoryStore::open_in_memory().unwrap()),
            source,
            Arc::new(FixedPrices),
            vaults,
        )
        .with_now_fn(Box::new(|| 1_700_000_000))
    }

    #[tokio::test]
    async fn test_newest_draw_is_provisional() {
        let dir = tempdir().unwrap();
        let (wins, claims) = draws(&[1, 2, 3]);
        let source = Arc::new(ScriptedSource {
            claims: Mutex::new(claims),
            wins: Mutex::new(wins),
        });
        let mut ctx = context(dir.path(), source.clone());
        let network = ctx.networks()[0].clone();

        let report = ctx.run_fast_cycle().await;
        assert!(report.is_clean(), "{:?}", report.outcomes);
        assert_eq!(ctx.resume_point(&network), 3);

        let history: serde_json::Value =
            serde_json::from_str(&ctx.registry().serve("/10-0xpool-history").unwrap().payload).unwrap();
        assert_eq!(history.as_array().unwrap().len(), 3);
        assert_eq!(history[2]["provisional"], true);
        assert_eq!(history[0]["provisional"], false);
        assert!(history[0].get("contributions").is_none());

        // Draw 3 picks up a late claim, draw 4 appears
        let (more_wins, more_claims) = draws(&[4]);
        {
            let mut claims = source.claims.lock().unwrap();
            claims.get_mut(&3).unwrap().claims_list.push(claim(7));
            claims.extend(more_claims);
            source.wins.lock().unwrap().extend(more_wins);
        }
        ctx.run_fast_cycle().await;
        assert_eq!(ctx.resume_point(&network), 4);

        let history: serde_json::Value =
            serde_json::from_str(&ctx.registry().serve("/10-0xpool-history").unwrap().payload).unwrap();
        assert_eq!(history[2]["winsCount"], 2);
        assert_eq!(history[3]["drawId"], 4);
    }

    #[tokio::test]
    async fn test_fast_cycle_publishes_every_view() {
        let dir = tempdir().unwrap();
        let (wins, claims) = draws(&[5, 6]);
        let source = Arc::new(ScriptedSource {
            claims: Mutex::new(claims),
            wins: Mutex::new(wins),
        });
        let mut ctx = context(dir.path(), source);
        ctx.run_fast_cycle().await;

        let registry = ctx.registry();
        for name in [
            "/claims-10-0xpool-draw5",
            "/10-0xpool-draw6",
            "/10-0xpool-history",
            "/10-0xpool-prizeresults",
            "/10-0xpool-bigwinners",
            "/10-0xpool-bigwins",
            "/10-0xpool-bigwinners-won",
            "/vault-totals-10-0xpool",
            "/draws-10-0xpool",
            "/claimeddraws-10-0xpool",
        ] {
            assert!(registry.serve(name).is_some(), "missing {}", name);
        }
        assert_eq!(
            registry.serve("/draws-10-0xpool").unwrap().payload,
            r#"[{"chain":10,"draws":[5,6]}]"#
        );
        assert_eq!(
            registry.serve("/claimeddraws-10-0xpool").unwrap().payload,
            r#"[{"chain":10,"draws":[5,6]}]"#
        );
    }

    #[tokio::test]
    async fn test_slow_cycle_isolates_failures() {
        let dir = tempdir().unwrap();
        let (wins, claims) = draws(&[1]);
        let source = Arc::new(ScriptedSource {
            claims: Mutex::new(claims),
            wins: Mutex::new(wins),
        });
        let mut ctx = context(dir.path(), source).with_coin_ids(vec![POOL_COIN_ID.to_string()]);
        ctx.run_fast_cycle().await;
        let report = ctx.run_slow_cycle().await;

        // Vault metadata is down but every other unit still ran
        assert!(report.outcome("OPTIMISM", CyclePhase::Vaults).unwrap().result.is_ok());
        assert!(report.outcome("OPTIMISM", CyclePhase::PrizeLeaderboard).unwrap().result.is_ok());

        let overview: serde_json::Value =
            serde_json::from_str(&ctx.registry().serve("/10-0xpool-overview").unwrap().payload).unwrap();
        assert_eq!(overview["poolers"], 1);
        assert_eq!(overview["poolPrice"], 0.5);
        assert!(overview["prizeData"].is_null());

        let leaderboard: serde_json::Value =
            serde_json::from_str(&ctx.registry().serve("/10-0xpool-prizeleaderboard").unwrap().payload).unwrap();
        assert_eq!(leaderboard[0]["poolerAddress"], WINNER);
        assert_eq!(ctx.registry().serve("/10-0xpool-vaults").unwrap().payload, "[]");
        assert!(report.outcome("OPTIMISM", CyclePhase::Promotions).is_none());
    }

    struct OneRewardPromotion;

    #[async_trait]
    impl PromotionSource for OneRewardPromotion {
        async fn promotion_events(&self) -> Result<PromotionEvents, AggregationError> {
            Ok(PromotionEvents {
                created: vec![PromotionCreated {
                    promotion_id: 4,
                    vault: VAULT.to_string(),
                    token: "0x4200000000000000000000000000000000000042".to_string(),
                    start_timestamp: 1_699_000_000,
                    tokens_per_epoch: Amount::from(500),
                    epoch_duration: 86_400,
                    initial_number_of_epochs: 12,
                }],
                ended: Vec::new(),
            })
        }

        async fn token_decimals(&self, _token: &str) -> Result<u8, AggregationError> {
            Ok(18)
        }
    }

    #[tokio::test]
    async fn test_slow_cycle_publishes_twab_rewards() {
        let dir = tempdir().unwrap();
        let (wins, claims) = draws(&[1]);
        let source = Arc::new(ScriptedSource {
            claims: Mutex::new(claims),
            wins: Mutex::new(wins),
        });
        let feed = PromotionFeed::new(10, Arc::new(OneRewardPromotion), DEFAULT_PROMOTION_WHITELIST.to_vec());
        let mut ctx = context(dir.path(), source).with_promotions(feed);

        let report = ctx.run_slow_cycle().await;

        assert_eq!(
            report.outcome("OPTIMISM", CyclePhase::Promotions).unwrap().result,
            Ok(1)
        );
        let rewards: serde_json::Value =
            serde_json::from_str(&ctx.registry().serve("/10-0xpool-twabrewards").unwrap().payload).unwrap();
        let promotion = &rewards["OPTIMISM"][0];
        assert_eq!(promotion["promotionId"], "4");
        assert_eq!(promotion["vault"], VAULT);
        assert_eq!(promotion["tokenDecimals"], 18);
        assert_eq!(promotion["initialNumberOfEpochs"], 12);
        assert_eq!(promotion["whitelist"], true);
    }
}
