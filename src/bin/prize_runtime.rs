//! Prize Runtime - draw aggregation and artifact publication
//!
//! - Opens the SQLite claim/win history
//! - Serves published artifacts and address lookups over HTTP
//! - Runs the fast and slow aggregation cycles until Ctrl-C
//!
//! Usage:
//!   cargo run --release --bin prize_runtime
//!
//! Environment variables: see `RuntimeConfig::from_env`.

use dotenv::dotenv;
use log::{error, info};
use prizeflow::aggregation::{
    promotions::PromotionFeed,
    run_control_loop,
    vaults::{VaultBlacklist, VaultEnrichmentAggregator, VaultRegistryStore},
    AggregationContext, CycleCadence,
};
use prizeflow::config::RuntimeConfig;
use prizeflow::history_store::HistoryStore;
use prizeflow::publication::{
    http::{bind_listener, serve, ArtifactRouter},
    PublicationRegistry,
};
use prizeflow::sources::{CoinGeckoPrices, HttpPrizeTotals, HttpRecordSource, RpcTwabRewards, RpcVaultChain};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    info!("🚀 Prize Runtime");
    let config = RuntimeConfig::from_env();
    config.log_summary();

    if config.networks.is_empty() {
        error!("❌ No networks configured (PRIZE_NETWORKS)");
        return Err("no networks configured".into());
    }

    std::fs::create_dir_all(&config.data_dir)?;
    if let Some(parent) = std::path::Path::new(&config.history_db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    info!("🔧 Opening history database...");
    let history = Arc::new(HistoryStore::open(&config.history_db_path)?);
    info!("✅ History database ready: {}", config.history_db_path);

    let registry = Arc::new(PublicationRegistry::new());

    let records = Arc::new(HttpRecordSource::new(&config.indexer_url)?);
    let chain = Arc::new(RpcVaultChain::new(&config.rpc_url)?);
    let prices = Arc::new(CoinGeckoPrices::new(&config.price_api_url, &config.price_platform)?);
    let totals = Arc::new(HttpPrizeTotals::new(&config.public_base_url)?);

    let vaults = VaultEnrichmentAggregator::new(
        VaultRegistryStore::new(&config.data_dir),
        chain,
        prices.clone(),
        totals,
        VaultBlacklist::new(&config.vault_blacklist),
    )
    .with_cooldown_secs(config.enrich_cooldown_secs)
    .with_max_concurrency(config.enrich_max_concurrency);

    let mut ctx = AggregationContext::new(
        config.networks.clone(),
        &config.data_dir,
        Arc::clone(&registry),
        Arc::clone(&history),
        records,
        prices,
        vaults,
    )
    .with_pacing(config.phase_pause())
    .with_coin_ids(config.price_coin_ids.clone());

    if !config.twab_rewards_address.is_empty() {
        let rewards = RpcTwabRewards::new(
            &config.rpc_url,
            &config.twab_rewards_address,
            config.twab_rewards_from_block,
        )?;
        ctx = ctx.with_promotions(PromotionFeed::new(
            config.twab_rewards_network,
            Arc::new(rewards),
            config.twab_rewards_whitelist.clone(),
        ));
    }

    // A listener that cannot bind is the one fatal condition
    let listener = bind_listener(&config.http_bind).await?;
    let router = Arc::new(ArtifactRouter::new(Arc::clone(&registry), history));
    tokio::spawn(serve(listener, router));

    let cadence = CycleCadence {
        fast: config.fast_interval(),
        slow: config.slow_interval(),
    };
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("❌ Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let stats = run_control_loop(&mut ctx, cadence, shutdown).await;
    info!("👋 Prize Runtime stopped");
    info!("   ├─ Artifacts published: {}", registry.len());
    info!("   └─ Cycles: {} fast, {} slow", stats.fast_runs, stats.slow_runs);
    Ok(())
}
