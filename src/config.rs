//! Runtime configuration from environment variables
//!
//! Every knob has a default so a bare `.env` with `INDEXER_URL` and `RPC_URL`
//! is enough to run.

use crate::aggregation::promotions::DEFAULT_PROMOTION_WHITELIST;
use crate::aggregation::types::NetworkSpec;
use std::env;
use std::time::Duration;

/// Optimism mainnet and OP Sepolia prize pools
pub const DEFAULT_NETWORKS: &str = "10:OPTIMISM:0xe32e5E1c5f0c80bD26Def2d0EA5008C107000d6A;\
11155420:OPSEPOLIA:0x31547D3c38F2F8dC92421C54B173F3B27Ab26EbB";

/// Coins quoted in `/prices`
pub const DEFAULT_COIN_IDS: &[&str] = &["pooltogether", "dai", "usd-coin", "weth", "optimism", "liquity-usd"];

/// TWAB rewards contract on Optimism
pub const DEFAULT_TWAB_REWARDS_ADDRESS: &str = "0x27Ed5760Edc0128E3043F6cC0C3428E337396A66";

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub networks: Vec<NetworkSpec>,

    /// Claims, wins, history, leaderboards
    pub fast_cycle_interval_ms: u64,

    /// Poolers, vault enrichment, overview, prices
    pub slow_cycle_interval_ms: u64,

    /// Pause between networks and between phases, to stay under free-tier limits
    pub phase_pause_ms: u64,

    pub enrich_cooldown_secs: i64,
    pub enrich_max_concurrency: usize,

    /// Draw-history cache and vault registry snapshots
    pub data_dir: String,
    pub history_db_path: String,
    pub http_bind: String,

    pub indexer_url: String,
    pub rpc_url: String,
    pub price_api_url: String,
    pub price_platform: String,
    pub price_coin_ids: Vec<String>,

    /// Where this process's artifacts are publicly reachable
    pub public_base_url: String,

    pub vault_blacklist: Vec<String>,

    /// Empty disables the `/…-twabrewards` artifact
    pub twab_rewards_address: String,
    pub twab_rewards_network: u64,
    /// First block scanned for promotion events
    pub twab_rewards_from_block: u64,
    pub twab_rewards_whitelist: Vec<u64>,
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

fn split_list(raw: Option<String>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

/// `id:name:pool;id:name:pool`; malformed entries are skipped with a warning
pub fn parse_networks(raw: &str) -> Vec<NetworkSpec> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            match parts.as_slice() {
                [id, name, pool] => match id.parse::<u64>() {
                    Ok(id) => Some(NetworkSpec::new(id, name, pool)),
                    Err(_) => {
                        log::warn!("⚠️  Ignoring network entry with bad id: {}", entry);
                        None
                    }
                },
                _ => {
                    log::warn!("⚠️  Ignoring malformed network entry: {}", entry);
                    None
                }
            }
        })
        .collect()
}

impl RuntimeConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `PRIZE_NETWORKS` (default: Optimism + OP Sepolia pools)
    /// - `FAST_CYCLE_INTERVAL_MS` (default: 120000)
    /// - `SLOW_CYCLE_INTERVAL_MS` (default: 600000)
    /// - `PHASE_PAUSE_MS` (default: 4000)
    /// - `ENRICH_COOLDOWN_SECS` (default: 21600)
    /// - `ENRICH_MAX_CONCURRENCY` (default: 4)
    /// - `DATA_DIR` (default: ./data)
    /// - `HISTORY_DB_PATH` (default: ./data/history.db)
    /// - `HTTP_BIND` (default: 0.0.0.0:8080)
    /// - `INDEXER_URL`, `RPC_URL`
    /// - `PRICE_API_URL` (default: CoinGecko v3), `PRICE_PLATFORM`, `PRICE_COIN_IDS`
    /// - `PUBLIC_BASE_URL` (default: http://127.0.0.1:8080)
    /// - `VAULT_BLACKLIST` (comma separated, added to the built-in list)
    /// - `TWAB_REWARDS_ADDRESS` (default: Optimism rewards contract; empty disables)
    /// - `TWAB_REWARDS_NETWORK` (default: 10), `TWAB_REWARDS_FROM_BLOCK` (default: 0)
    /// - `TWAB_REWARDS_WHITELIST` (comma separated promotion ids)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let networks = parse_networks(&var("PRIZE_NETWORKS").unwrap_or_else(|| DEFAULT_NETWORKS.to_string()));

        Self {
            networks,
            fast_cycle_interval_ms: parse_or(var("FAST_CYCLE_INTERVAL_MS"), 120_000),
            slow_cycle_interval_ms: parse_or(var("SLOW_CYCLE_INTERVAL_MS"), 600_000),
            phase_pause_ms: parse_or(var("PHASE_PAUSE_MS"), 4_000),
            enrich_cooldown_secs: parse_or(var("ENRICH_COOLDOWN_SECS"), 21_600),
            enrich_max_concurrency: parse_or(var("ENRICH_MAX_CONCURRENCY"), 4),
            data_dir: var("DATA_DIR").unwrap_or_else(|| "./data".to_string()),
            history_db_path: var("HISTORY_DB_PATH").unwrap_or_else(|| "./data/history.db".to_string()),
            http_bind: var("HTTP_BIND").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            indexer_url: var("INDEXER_URL").unwrap_or_else(|| "http://127.0.0.1:3000".to_string()),
            rpc_url: var("RPC_URL").unwrap_or_else(|| "https://mainnet.optimism.io".to_string()),
            price_api_url: var("PRICE_API_URL")
                .unwrap_or_else(|| "https://api.coingecko.com/api/v3".to_string()),
            price_platform: var("PRICE_PLATFORM").unwrap_or_else(|| "optimistic-ethereum".to_string()),
            price_coin_ids: match var("PRICE_COIN_IDS") {
                Some(raw) => split_list(Some(raw)),
                None => DEFAULT_COIN_IDS.iter().map(|id| id.to_string()).collect(),
            },
            public_base_url: var("PUBLIC_BASE_URL").unwrap_or_else(|| "http://127.0.0.1:8080".to_string()),
            vault_blacklist: split_list(var("VAULT_BLACKLIST")),
            twab_rewards_address: var("TWAB_REWARDS_ADDRESS")
                .unwrap_or_else(|| DEFAULT_TWAB_REWARDS_ADDRESS.to_string())
                .trim()
                .to_lowercase(),
            twab_rewards_network: parse_or(var("TWAB_REWARDS_NETWORK"), 10),
            twab_rewards_from_block: parse_or(var("TWAB_REWARDS_FROM_BLOCK"), 0),
            twab_rewards_whitelist: match var("TWAB_REWARDS_WHITELIST") {
                Some(raw) => split_list(Some(raw))
                    .iter()
                    .filter_map(|id| id.parse().ok())
                    .collect(),
                None => DEFAULT_PROMOTION_WHITELIST.to_vec(),
            },
        }
    }

    pub fn fast_interval(&self) -> Duration {
        Duration::from_millis(self.fast_cycle_interval_ms)
    }

    pub fn slow_interval(&self) -> Duration {
        Duration::from_millis(self.slow_cycle_interval_ms)
    }

    pub fn phase_pause(&self) -> Duration {
        Duration::from_millis(self.phase_pause_ms)
    }

    /// Startup summary, one line per setting
    pub fn log_summary(&self) {
        log::info!("⚙️  Configuration:");
        for network in &self.networks {
            log::info!("   ├─ Network {} ({}): {}", network.id, network.name, network.prize_pool);
        }
        log::info!(
            "   ├─ Fast cycle: {}ms, slow cycle: {}ms, pause: {}ms",
            self.fast_cycle_interval_ms,
            self.slow_cycle_interval_ms,
            self.phase_pause_ms
        );
        log::info!(
            "   ├─ Enrichment cooldown: {}s, concurrency: {}",
            self.enrich_cooldown_secs,
            self.enrich_max_concurrency
        );
        log::info!("   ├─ Data dir: {}, history db: {}", self.data_dir, self.history_db_path);
        log::info!("   ├─ Indexer: {}", self.indexer_url);
        if self.twab_rewards_address.is_empty() {
            log::info!("   ├─ TWAB rewards: disabled");
        } else {
            log::info!(
                "   ├─ TWAB rewards: {} on network {}",
                self.twab_rewards_address,
                self.twab_rewards_network
            );
        }
        log::info!("   └─ HTTP: {} (public {})", self.http_bind, self.public_base_url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> RuntimeConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RuntimeConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = config(&[]);

        assert_eq!(config.networks.len(), 2);
        assert_eq!(config.networks[0].id, 10);
        assert_eq!(config.networks[0].prize_pool, "0xe32e5e1c5f0c80bd26def2d0ea5008c107000d6a");
        assert_eq!(config.networks[1].name, "OPSEPOLIA");
        assert_eq!(config.fast_cycle_interval_ms, 120_000);
        assert_eq!(config.slow_cycle_interval_ms, 600_000);
        assert_eq!(config.phase_pause(), Duration::from_secs(4));
        assert_eq!(config.enrich_cooldown_secs, 21_600);
        assert_eq!(config.enrich_max_concurrency, 4);
        assert_eq!(config.price_platform, "optimistic-ethereum");
        assert_eq!(
            config.price_coin_ids,
            vec!["pooltogether", "dai", "usd-coin", "weth", "optimism", "liquity-usd"]
        );
        assert_eq!(config.twab_rewards_address, "0x27ed5760edc0128e3043f6cc0c3428e337396a66");
        assert_eq!(config.twab_rewards_network, 10);
        assert_eq!(config.twab_rewards_from_block, 0);
        assert_eq!(config.twab_rewards_whitelist, vec![3, 4, 5, 6, 7, 9, 10, 11, 12]);
    }

    #[test]
    fn test_empty_lists_disable_defaults() {
        let config = config(&[
            ("PRICE_COIN_IDS", ""),
            ("TWAB_REWARDS_ADDRESS", ""),
            ("TWAB_REWARDS_WHITELIST", "2, x, 8"),
        ]);

        assert!(config.price_coin_ids.is_empty());
        assert!(config.twab_rewards_address.is_empty());
        assert_eq!(config.twab_rewards_whitelist, vec![2, 8]);
    }

    #[test]
    fn test_custom_config() {
        let config = config(&[
            ("PRIZE_NETWORKS", "8453:BASE:0xABC; bad ;1:x"),
            ("FAST_CYCLE_INTERVAL_MS", "1000"),
            ("PHASE_PAUSE_MS", "not-a-number"),
            ("PRICE_COIN_IDS", "pooltogether, ethereum,"),
            ("VAULT_BLACKLIST", "0xdead"),
        ]);

        assert_eq!(config.networks, vec![NetworkSpec::new(8453, "BASE", "0xabc")]);
        assert_eq!(config.fast_interval(), Duration::from_secs(1));
        assert_eq!(config.phase_pause_ms, 4_000);
        assert_eq!(config.price_coin_ids, vec!["pooltogether", "ethereum"]);
        assert_eq!(config.vault_blacklist, vec!["0xdead"]);
    }
}
