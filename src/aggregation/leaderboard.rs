//! Ranked views over the full claim history
//!
//! Every ranking here is a strict total order: rows are first laid out in
//! encounter order (draws ascending, claims in source order) and then
//! stable-sorted by value descending, so equal values keep the order in which
//! their pooler first appeared.
//!
//! Canary claims (zero payout) never enter the payout rankings.

use super::amounts::Amount;
use super::types::{
    ClaimsByDraw, DrawHistoryEntry, DrawId, LeaderboardEntry, PrizeLeaderboardEntry, Tier,
    VaultTotals,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

pub const CUMULATIVE_LIMIT: usize = 50;
pub const SINGLE_DRAW_LIMIT: usize = 50;
pub const CLAIMED_VALUE_LIMIT: usize = 100;
pub const PRIZE_LEADERBOARD_LIMIT: usize = 1000;

/// POOL-denominated payouts
const PAYOUT_DECIMALS: u8 = 18;
const VAULT_TOTAL_PLACES: u8 = 4;

/// One claim row from the persisted history, used by the prize leaderboard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrizeClaimRow {
    pub winner: String,
    pub draw_id: DrawId,
    pub vault: String,
    pub tier: Tier,
    pub payout: Amount,
}

/// Accumulates per-pooler totals while remembering first-encounter order
struct EncounterTotals {
    index: HashMap<String, usize>,
    rows: Vec<LeaderboardEntry>,
}

impl EncounterTotals {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            rows: Vec::new(),
        }
    }

    fn add(&mut self, pooler: &str, value: Amount, draw_id: DrawId) {
        let pooler = pooler.to_lowercase();
        match self.index.get(&pooler) {
            Some(&i) => {
                let row = &mut self.rows[i];
                row.value = row.value.saturating_add(value);
            }
            None => {
                self.index.insert(pooler.clone(), self.rows.len());
                self.rows.push(LeaderboardEntry {
                    pooler_address: pooler,
                    value,
                    draw_id,
                });
            }
        }
    }
}

fn rank(mut rows: Vec<LeaderboardEntry>, limit: usize) -> Vec<LeaderboardEntry> {
    rows.sort_by(|a, b| b.value.cmp(&a.value));
    rows.truncate(limit);
    rows
}

/// Biggest lifetime winners by summed payout
///
/// `draw_id` is the first draw the pooler won a paying prize in.
pub fn cumulative_leaderboard(claims: &ClaimsByDraw, limit: usize) -> Vec<LeaderboardEntry> {
    let mut totals = EncounterTotals::new();
    for (draw_id, draw) in claims {
        for claim in draw.claims_list.iter().filter(|c| !c.is_canary()) {
            totals.add(&claim.winner, claim.payout, *draw_id);
        }
    }
    rank(totals.rows, limit)
}

/// Biggest single-draw wins: one candidate per draw, then ranked globally
///
/// Within a draw the pooler with the largest summed payout is the candidate;
/// on a tie the first encountered pooler wins.
pub fn single_draw_leaderboard(claims: &ClaimsByDraw, limit: usize) -> Vec<LeaderboardEntry> {
    let mut candidates = Vec::new();
    for (draw_id, draw) in claims {
        let mut totals = EncounterTotals::new();
        for claim in draw.claims_list.iter().filter(|c| !c.is_canary()) {
            totals.add(&claim.winner, claim.payout, *draw_id);
        }

        let mut best: Option<LeaderboardEntry> = None;
        for row in totals.rows {
            let better = best.as_ref().map(|b| row.value > b.value).unwrap_or(true);
            if better {
                best = Some(row);
            }
        }
        if let Some(best) = best.filter(|b| !b.value.is_zero()) {
            candidates.push(best);
        }
    }
    rank(candidates, limit)
}

/// Biggest claim-adjusted win values, one row per (pooler, draw)
pub fn claimed_value_leaderboard(history: &[DrawHistoryEntry], limit: usize) -> Vec<LeaderboardEntry> {
    let rows = history
        .iter()
        .flat_map(|entry| entry.contributions.iter().cloned())
        .collect();
    rank(rows, limit)
}

/// Payout per vault per draw, formatted as POOL with 4 decimals
pub fn vault_draw_totals(claims: &ClaimsByDraw) -> VaultTotals {
    let mut sums: BTreeMap<String, BTreeMap<DrawId, Amount>> = BTreeMap::new();
    for (draw_id, draw) in claims {
        for claim in &draw.claims_list {
            let per_draw = sums.entry(claim.vault.to_lowercase()).or_default();
            let total = per_draw.entry(*draw_id).or_default();
            *total = total.saturating_add(claim.payout);
        }
    }

    sums.into_iter()
        .map(|(vault, draws)| {
            let formatted = draws
                .into_iter()
                .map(|(draw_id, total)| {
                    (draw_id, total.format_fixed(PAYOUT_DECIMALS, VAULT_TOTAL_PLACES))
                })
                .collect();
            (vault, formatted)
        })
        .collect()
}

/// Full-history prize leaderboard
///
/// Counts distinct draws and distinct (draw, vault, tier) prizes per winner,
/// sums payouts, sorts by total won descending.
pub fn prize_leaderboard(rows: &[PrizeClaimRow], limit: usize) -> Vec<PrizeLeaderboardEntry> {
    struct Acc {
        draws: BTreeSet<DrawId>,
        prizes: HashSet<(DrawId, String, Tier)>,
        total: Amount,
    }

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut accs: Vec<(String, Acc)> = Vec::new();

    for row in rows {
        let winner = row.winner.to_lowercase();
        let i = match index.get(&winner) {
            Some(&i) => i,
            None => {
                index.insert(winner.clone(), accs.len());
                accs.push((
                    winner,
                    Acc {
                        draws: BTreeSet::new(),
                        prizes: HashSet::new(),
                        total: Amount::ZERO,
                    },
                ));
                accs.len() - 1
            }
        };
        let acc = &mut accs[i].1;
        acc.draws.insert(row.draw_id);
        acc.prizes.insert((row.draw_id, row.vault.to_lowercase(), row.tier));
        acc.total = acc.total.saturating_add(row.payout);
    }

    let mut board: Vec<PrizeLeaderboardEntry> = accs
        .into_iter()
        .map(|(winner, acc)| PrizeLeaderboardEntry {
            pooler_address: winner,
            distinct_draw_count: acc.draws.len() as u64,
            distinct_prize_count: acc.prizes.len() as u64,
            total_won: acc.total,
        })
        .collect();
    board.sort_by(|a, b| b.total_won.cmp(&a.total_won));
    board.truncate(limit);
    board
}
