//! SQLite claim/win history
//!
//! Tables (see `/sql/`):
//! - `claims` - every claim seen by the fast cycle, INSERT OR IGNORE
//! - `wins` - one row per won index set, UPSERT (claimed flags change over time)
//! - `poolers` - vault membership from pooler snapshots, INSERT OR IGNORE
//!
//! Backs the prize leaderboard full-history scan and the address endpoints.
//! Amounts are stored as decimal TEXT; SQLite integers cannot hold them.

use crate::aggregation::amounts::Amount;
use crate::aggregation::leaderboard::PrizeClaimRow;
use crate::aggregation::types::{ClaimsByDraw, NetworkSpec, VaultPoolersSnapshot, WinsByDraw};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;

/// Schema files, applied in order; each uses IF NOT EXISTS
const SCHEMA_FILES: &[(&str, &str)] = &[
    ("01_claims.sql", include_str!("../sql/01_claims.sql")),
    ("02_wins.sql", include_str!("../sql/02_wins.sql")),
    ("03_poolers.sql", include_str!("../sql/03_poolers.sql")),
];

#[derive(Debug)]
pub enum HistoryStoreError {
    Database(rusqlite::Error),
    Serialization(serde_json::Error),
    InvalidAmount(String),
    Poisoned,
}

impl From<rusqlite::Error> for HistoryStoreError {
    fn from(err: rusqlite::Error) -> Self {
        HistoryStoreError::Database(err)
    }
}

impl From<serde_json::Error> for HistoryStoreError {
    fn from(err: serde_json::Error) -> Self {
        HistoryStoreError::Serialization(err)
    }
}

impl std::fmt::Display for HistoryStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistoryStoreError::Database(e) => write!(f, "Database error: {}", e),
            HistoryStoreError::Serialization(e) => write!(f, "Serialization error: {}", e),
            HistoryStoreError::InvalidAmount(a) => write!(f, "Invalid stored amount: {}", a),
            HistoryStoreError::Poisoned => write!(f, "History store lock poisoned"),
        }
    }
}

impl std::error::Error for HistoryStoreError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerWin {
    pub network: u64,
    pub draw: u64,
    pub vault: String,
    pub tier: u8,
    pub prize_indices: Vec<u32>,
    pub prize_pool: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerClaim {
    pub network: u64,
    pub hash: String,
    pub draw: u64,
    pub vault: String,
    pub tier: u8,
    pub index: u32,
    pub payout: Amount,
    pub prize_pool: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolerVault {
    pub vault: String,
}

/// Read side used by the address endpoints
///
/// `address` is always a validated, lowercased account address.
pub trait PlayerLookup: Send + Sync {
    fn player_wins(&self, address: &str) -> Result<Vec<PlayerWin>, HistoryStoreError>;
    fn player_claims(&self, address: &str) -> Result<Vec<PlayerClaim>, HistoryStoreError>;
    fn pooler_vaults(&self, address: &str) -> Result<Vec<PoolerVault>, HistoryStoreError>;
}

pub struct HistoryStore {
    conn: Mutex<Connection>,
}

fn run_schema_migrations(conn: &Connection) -> Result<(), HistoryStoreError> {
    log::info!("🔧 Running history schema migrations");
    for (filename, sql) in SCHEMA_FILES {
        conn.execute_batch(sql)?;
        log::debug!("   └─ ✅ Applied {}", filename);
    }
    Ok(())
}

fn parse_amount(raw: &str) -> Result<Amount, HistoryStoreError> {
    raw.parse()
        .map_err(|_| HistoryStoreError::InvalidAmount(raw.to_string()))
}

impl HistoryStore {
    /// Open (or create) the history database and apply the schema
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, HistoryStoreError> {
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        run_schema_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, HistoryStoreError> {
        let conn = Connection::open_in_memory()?;
        run_schema_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, HistoryStoreError>,
    ) -> Result<T, HistoryStoreError> {
        let mut conn = self.conn.lock().map_err(|_| HistoryStoreError::Poisoned)?;
        f(&mut conn)
    }

    /// Insert every claim not seen before; returns rows added
    pub fn record_claims(&self, network: &NetworkSpec, claims: &ClaimsByDraw) -> Result<usize, HistoryStoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut added = 0;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO claims
                        (network, prizepool, draw, vault, tier, prize_index, winner, payout, fee, hash)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                )?;
                for (draw_id, draw) in claims {
                    for claim in &draw.claims_list {
                        added += stmt.execute(params![
                            network.id as i64,
                            network.prize_pool,
                            *draw_id as i64,
                            claim.vault.to_lowercase(),
                            claim.tier as i64,
                            claim.index as i64,
                            claim.winner.to_lowercase(),
                            claim.payout.to_string(),
                            claim.fee.to_string(),
                            claim.claim_hash.to_lowercase(),
                        ])?;
                    }
                }
            }
            tx.commit()?;
            Ok(added)
        })
    }

    /// Upsert win rows; returns rows written
    pub fn record_wins(&self, network: &NetworkSpec, wins: &WinsByDraw) -> Result<usize, HistoryStoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut written = 0;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO wins (network, prizepool, draw, vault, tier, pooler, prizeindices, claimed)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(network, prizepool, draw, vault, tier, pooler, prizeindices) DO UPDATE SET
                        claimed = excluded.claimed",
                )?;
                for (draw_id, draw) in wins {
                    for win in &draw.wins {
                        written += stmt.execute(params![
                            network.id as i64,
                            network.prize_pool,
                            *draw_id as i64,
                            win.vault.as_deref().unwrap_or("").to_lowercase(),
                            win.tier as i64,
                            win.pooler.to_lowercase(),
                            serde_json::to_string(&win.won_indices)?,
                            serde_json::to_string(&win.claimed_flags)?,
                        ])?;
                    }
                }
            }
            tx.commit()?;
            Ok(written)
        })
    }

    /// Record vault membership from a pooler snapshot; returns rows added
    pub fn record_poolers(
        &self,
        network: &NetworkSpec,
        snapshots: &[VaultPoolersSnapshot],
    ) -> Result<usize, HistoryStoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut added = 0;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO poolers (network, prizepool, vault, pooler)
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                for snapshot in snapshots {
                    for pooler in &snapshot.poolers {
                        added += stmt.execute(params![
                            network.id as i64,
                            network.prize_pool,
                            snapshot.vault.to_lowercase(),
                            pooler.address.to_lowercase(),
                        ])?;
                    }
                }
            }
            tx.commit()?;
            Ok(added)
        })
    }

    /// Every claim of one pool, in insertion order, for the prize leaderboard
    pub fn prize_claim_rows(&self, network: &NetworkSpec) -> Result<Vec<PrizeClaimRow>, HistoryStoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT winner, draw, vault, tier, payout FROM claims
                 WHERE network = ?1 AND prizepool = ?2
                 ORDER BY rowid",
            )?;
            let raw = stmt
                .query_map(params![network.id as i64, network.prize_pool], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            raw.into_iter()
                .map(|(winner, draw, vault, tier, payout)| {
                    Ok(PrizeClaimRow {
                        winner,
                        draw_id: draw as u64,
                        vault,
                        tier: tier as u8,
                        payout: parse_amount(&payout)?,
                    })
                })
                .collect()
        })
    }
}

impl PlayerLookup for HistoryStore {
    fn player_wins(&self, address: &str) -> Result<Vec<PlayerWin>, HistoryStoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT network, draw, vault, tier, prizeindices, prizepool FROM wins
                 WHERE pooler = ?1 ORDER BY network, draw, tier, rowid",
            )?;
            let raw = stmt
                .query_map(params![address], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            raw.into_iter()
                .map(|(network, draw, vault, tier, indices, prize_pool)| {
                    Ok(PlayerWin {
                        network: network as u64,
                        draw: draw as u64,
                        vault,
                        tier: tier as u8,
                        prize_indices: serde_json::from_str(&indices)?,
                        prize_pool,
                    })
                })
                .collect()
        })
    }

    fn player_claims(&self, address: &str) -> Result<Vec<PlayerClaim>, HistoryStoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT network, hash, draw, vault, tier, prize_index, payout, prizepool FROM claims
                 WHERE winner = ?1 ORDER BY network, draw, tier, prize_index",
            )?;
            let raw = stmt
                .query_map(params![address], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            raw.into_iter()
                .map(|(network, hash, draw, vault, tier, index, payout, prize_pool)| {
                    Ok(PlayerClaim {
                        network: network as u64,
                        hash,
                        draw: draw as u64,
                        vault,
                        tier: tier as u8,
                        index: index as u32,
                        payout: parse_amount(&payout)?,
                        prize_pool,
                    })
                })
                .collect()
        })
    }

    fn pooler_vaults(&self, address: &str) -> Result<Vec<PoolerVault>, HistoryStoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT DISTINCT vault FROM poolers WHERE pooler = ?1 ORDER BY vault")?;
            let vaults = stmt
                .query_map(params![address], |row| Ok(PoolerVault { vault: row.get(0)? }))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(vaults)
        })
    }
}
