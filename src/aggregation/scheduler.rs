//! Control loop driving the two periodic cycles
//!
//! Fast and slow cycles each have their own `interval`, so their cadences are
//! independent and neither drifts against the other. Cycles never overlap: the
//! loop runs one cycle to completion before waiting for the next tick, and a
//! tick missed while a long cycle ran is delayed rather than burst.

use super::cycle::AggregationContext;
use std::future::Future;
use tokio::time::{interval, Duration, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleCadence {
    pub fast: Duration,
    pub slow: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub fast_runs: u64,
    pub slow_runs: u64,
}

/// Run cycles until `shutdown` resolves
///
/// Both cycles fire once immediately at startup (fast first). Processing errors
/// are contained in each `CycleReport`; the loop itself only stops on shutdown.
pub async fn run_control_loop(
    ctx: &mut AggregationContext,
    cadence: CycleCadence,
    shutdown: impl Future<Output = ()>,
) -> LoopStats {
    log::info!(
        "⏰ Starting control loop (fast: {}ms, slow: {}ms)",
        cadence.fast.as_millis(),
        cadence.slow.as_millis()
    );

    let mut fast_timer = interval(cadence.fast);
    fast_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut slow_timer = interval(cadence.slow);
    slow_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tokio::pin!(shutdown);
    let mut stats = LoopStats::default();

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                log::info!("🛑 Shutdown requested");
                log::info!("   ├─ Fast cycles run: {}", stats.fast_runs);
                log::info!("   └─ Slow cycles run: {}", stats.slow_runs);
                return stats;
            }
            _ = fast_timer.tick() => {
                ctx.run_fast_cycle().await;
                stats.fast_runs += 1;
            }
            _ = slow_timer.tick() => {
                ctx.run_slow_cycle().await;
                stats.slow_runs += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::amounts::Amount;
    use crate::aggregation::types::{
        ClaimsByDraw, DrawId, NetworkSpec, PrizeOverview, SafeOwnerInfo, VaultMetadata, VaultPoolersSnapshot,
        VaultTotals, WinsByDraw,
    };
    use crate::aggregation::vaults::{VaultBlacklist, VaultEnrichmentAggregator, VaultRegistryStore};
    use crate::error::AggregationError;
    use crate::history_store::HistoryStore;
    use crate::publication::PublicationRegistry;
    use crate::sources::{PriceSource, PrizeTotalsSource, RecordSource, VaultChain};
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Arc;
    use tempfile::tempdir;

    struct Quiet;

    #[async_trait]
    impl RecordSource for Quiet {
        async fn get_wins(&self, _network: &NetworkSpec) -> Result<WinsByDraw, AggregationError> {
            Ok(WinsByDraw::new())
        }
        async fn get_claims(&self, _network: &NetworkSpec) -> Result<ClaimsByDraw, AggregationError> {
            Ok(ClaimsByDraw::new())
        }
        async fn get_players(&self, _network: &NetworkSpec) -> Result<Vec<VaultPoolersSnapshot>, AggregationError> {
            Ok(Vec::new())
        }
        async fn get_prizes(&self, _network: &NetworkSpec) -> Result<PrizeOverview, AggregationError> {
            Ok(PrizeOverview::default())
        }
    }

    #[async_trait]
    impl VaultChain for Quiet {
        async fn vault_metadata(&self, vault: &str) -> Result<VaultMetadata, AggregationError> {
            Err(AggregationError::Enrichment(vault.to_string()))
        }
        async fn owner_info(&self, _owner: &str) -> Result<Option<SafeOwnerInfo>, AggregationError> {
            Ok(None)
        }
        async fn last_awarded_draw_id(&self, _prize_pool: &str) -> Result<DrawId, AggregationError> {
            Ok(0)
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

    #[async_trait]
    impl PriceSource for Quiet {
        async fn token_prices(&self, _assets: &[String]) -> Result<HashMap<String, f64>, AggregationError> {
            Ok(HashMap::new())
        }
        async fn coin_prices(&self, _ids: &[String]) -> Result<BTreeMap<String, f64>, AggregationError> {
            Ok(BTreeMap::new())
        }
    }

    #[async_trait]
    impl PrizeTotalsSource for Quiet {
        async fn vault_totals(&self, _network: &NetworkSpec) -> Result<VaultTotals, AggregationError> {
            Ok(VaultTotals::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cadences_are_independent() {
        let dir = tempdir().unwrap();
        let quiet = Arc::new(Quiet);
        let vaults = VaultEnrichmentAggregator::new(
            VaultRegistryStore::new(dir.path()),
            quiet.clone(),
            quiet.clone(),
            quiet.clone(),
            VaultBlacklist::new(&[]),
        );
        let mut ctx = AggregationContext::new(
            vec![NetworkSpec::new(10, "OPTIMISM", "0xpool")],
            dir.path(),
            Arc::new(PublicationRegistry::new()),
            Arc::new(HistoryStore::open_in_memory().unwrap()),
            quiet.clone(),
            quiet,
            vaults,
        );

        let cadence = CycleCadence {
            fast: Duration::from_secs(10),
            slow: Duration::from_secs(25),
        };
        // Ticks at t=0,10,20,30,40,50 (fast) and t=0,25,50 (slow), stop at t=55
        let stats = run_control_loop(&mut ctx, cadence, tokio::time::sleep(Duration::from_secs(55))).await;

        assert_eq!(stats.fast_runs, 6);
        assert_eq!(stats.slow_runs, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_before_first_tick_wins() {
        let dir = tempdir().unwrap();
        let quiet = Arc::new(Quiet);
        let vaults = VaultEnrichmentAggregator::new(
            VaultRegistryStore::new(dir.path()),
            quiet.clone(),
            quiet.clone(),
            quiet.clone(),
            VaultBlacklist::new(&[]),
        );
        let mut ctx = AggregationContext::new(
            Vec::new(),
            dir.path(),
            Arc::new(PublicationRegistry::new()),
            Arc::new(HistoryStore::open_in_memory().unwrap()),
            quiet.clone(),
            quiet,
            vaults,
        );
        let cadence = CycleCadence {
            fast: Duration::from_secs(1),
            slow: Duration::from_secs(1),
        };

        let stats = run_control_loop(&mut ctx, cadence, std::future::ready(())).await;
        assert_eq!(stats, LoopStats::default());
    }
}
