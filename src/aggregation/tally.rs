//! Per-draw tally
//!
//! Turns one draw's win records and claim records into a `DrawHistoryEntry`.
//!
//! Two views of the same draw are kept apart:
//! - **won**: indices a pooler won, from the win records (`TierTally::won_count`)
//! - **realized**: what was actually claimed. Win value is
//!   `tier_value * count(claimed_flags == true)`; a record with no claimed flags
//!   is treated as fully unclaimed and contributes zero.
//!
//! Claim aggregates skip canary prizes (`payout == 0`): they only bump
//! `canary_count` and never touch payout, fee, tiers or winners.
//!
//! Output is a pure function of the input; `BTreeMap`/`BTreeSet` keep the
//! serialized form byte-identical across runs.

use super::amounts::Amount;
use super::types::{
    normalize_address, ClaimRecord, DrawHistoryEntry, DrawId, DrawWins, LeaderboardEntry,
    TierTally,
};
use std::collections::{BTreeMap, BTreeSet};

/// Tally one draw
///
/// `wins` is `None` when the source has claims for a draw but no win export
/// yet; the tier tallies are then empty.
pub fn tally_draw(draw_id: DrawId, wins: Option<&DrawWins>, claims: &[ClaimRecord]) -> DrawHistoryEntry {
    let (tiers, contributions) = match wins {
        Some(draw_wins) => tally_wins(draw_id, draw_wins),
        None => (BTreeMap::new(), Vec::new()),
    };

    let mut wins_count = 0u64;
    let mut canary_count = 0u64;
    let mut total_payout = Amount::ZERO;
    let mut total_fee = Amount::ZERO;
    let mut tiers_won = BTreeSet::new();
    let mut unique_winners = BTreeSet::new();

    for claim in claims {
        if claim.is_canary() {
            canary_count += 1;
            continue;
        }
        wins_count += 1;
        total_payout = total_payout.saturating_add(claim.payout);
        total_fee = total_fee.saturating_add(claim.fee);
        tiers_won.insert(claim.tier);
        unique_winners.insert(claim.winner.to_lowercase());
    }

    DrawHistoryEntry {
        draw_id,
        wins_count,
        total_payout,
        total_fee,
        tiers_won,
        unique_winners_count: unique_winners.len() as u64,
        canary_count,
        tiers,
        contributions,
    }
}

/// Per-tier counts and per-pooler claim-adjusted values for one draw
///
/// Malformed records (tier without a value, bad pooler address, claimed flags
/// misaligned with won indices) are skipped with a warning.
fn tally_wins(draw_id: DrawId, draw_wins: &DrawWins) -> (BTreeMap<u8, TierTally>, Vec<LeaderboardEntry>) {
    let mut tiers: BTreeMap<u8, TierTally> = BTreeMap::new();
    let mut contributions = Vec::new();

    for win in &draw_wins.wins {
        let Some(tier_value) = draw_wins.tier_values.get(&win.tier) else {
            log::warn!(
                "⚠️  Draw {}: skipping win for {} in tier {} (no tier value)",
                draw_id, win.pooler, win.tier
            );
            continue;
        };
        if !win.claimed_flags.is_empty() && win.claimed_flags.len() != win.won_indices.len() {
            log::warn!(
                "⚠️  Draw {}: skipping win for {} in tier {} ({} claimed flags for {} indices)",
                draw_id, win.pooler, win.tier, win.claimed_flags.len(), win.won_indices.len()
            );
            continue;
        }
        let Some(pooler) = normalize_address(&win.pooler) else {
            log::warn!("⚠️  Draw {}: skipping win with malformed pooler {:?}", draw_id, win.pooler);
            continue;
        };

        let claimed = win.claimed_count();
        let tally = tiers.entry(win.tier).or_insert_with(|| TierTally {
            won_count: 0,
            claimed_count: 0,
            value_per_win: *tier_value,
        });
        tally.won_count += win.won_indices.len() as u64;
        tally.claimed_count += claimed;

        let value = tier_value.saturating_mul_count(claimed);
        if !value.is_zero() {
            contributions.push(LeaderboardEntry {
                pooler_address: pooler,
                value,
                draw_id,
            });
        }
    }

    (tiers, contributions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::types::WinRecord;

    fn addr(n: u64) -> String {
        format!("0x{:040x}", n)
    }

    fn claim(winner: &str, tier: u8, payout: u64, fee: u64) -> ClaimRecord {
        ClaimRecord {
            vault: addr(900),
            tier,
            index: 0,
            winner: winner.to_string(),
            payout: Amount::from(payout),
            fee: Amount::from(fee),
            claim_hash: format!("0xhash{}{}", winner, payout),
        }
    }

    fn win(pooler: &str, tier: u8, indices: Vec<u32>, flags: Vec<bool>) -> WinRecord {
        WinRecord {
            tier,
            pooler: pooler.to_string(),
            vault: None,
            won_indices: indices,
            claimed_flags: flags,
        }
    }

    #[test]
    fn test_canary_prizes_excluded_from_aggregates() {
        let x = addr(1);
        let y = addr(2);
        let claims = vec![claim(&x, 1, 0, 0), claim(&y, 2, 1000, 5)];

        let entry = tally_draw(7, None, &claims);

        assert_eq!(entry.wins_count, 1);
        assert_eq!(entry.total_payout, Amount::from(1000));
        assert_eq!(entry.total_fee, Amount::from(5));
        assert_eq!(entry.canary_count, 1);
        assert_eq!(entry.tiers_won.iter().copied().collect::<Vec<_>>(), vec![2]);
        assert_eq!(entry.unique_winners_count, 1);

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["totalPayout"], "1000");
    }

    #[test]
    fn test_claim_adjusted_valuation() {
        let a = addr(10);
        let b = addr(11);
        let mut tier_values = BTreeMap::new();
        tier_values.insert(0, Amount::from(500));
        tier_values.insert(1, Amount::from(20));
        let draw = DrawWins {
            tier_values,
            wins: vec![
                win(&a, 0, vec![1, 2], vec![true, false]),
                win(&b, 1, vec![3, 4, 5], vec![true, true, true]),
                // unknown claim state counts as unclaimed
                win(&b, 1, vec![6], vec![]),
            ],
        };

        let entry = tally_draw(3, Some(&draw), &[]);

        assert_eq!(entry.tiers[&0].won_count, 2);
        assert_eq!(entry.tiers[&0].claimed_count, 1);
        assert_eq!(entry.tiers[&1].won_count, 4);
        assert_eq!(entry.tiers[&1].claimed_count, 3);
        assert_eq!(entry.tiers[&1].value_per_win, Amount::from(20));

        assert_eq!(entry.contributions.len(), 2);
        assert_eq!(entry.contributions[0].pooler_address, a);
        assert_eq!(entry.contributions[0].value, Amount::from(500));
        assert_eq!(entry.contributions[1].value, Amount::from(60));
    }

    #[test]
    fn test_malformed_wins_skipped_without_aborting() {
        let a = addr(20);
        let mut tier_values = BTreeMap::new();
        tier_values.insert(0, Amount::from(100));
        let draw = DrawWins {
            tier_values,
            wins: vec![
                win(&a, 5, vec![1], vec![true]),             // tier 5 has no value
                win(&a, 0, vec![1, 2], vec![true]),          // misaligned flags
                win("nonsense", 0, vec![1], vec![true]),     // bad address
                win(&a, 0, vec![9], vec![true]),             // good
            ],
        };

        let entry = tally_draw(1, Some(&draw), &[]);

        assert_eq!(entry.tiers.len(), 1);
        assert_eq!(entry.tiers[&0].won_count, 1);
        assert_eq!(entry.contributions.len(), 1);
        assert_eq!(entry.contributions[0].value, Amount::from(100));
    }

    #[test]
    fn test_tally_is_deterministic() {
        let claims: Vec<ClaimRecord> = (0..20)
            .map(|i| claim(&addr(i % 7), (i % 4) as u8, i * 13, i))
            .collect();

        let first = serde_json::to_string(&tally_draw(9, None, &claims)).unwrap();
        let second = serde_json::to_string(&tally_draw(9, None, &claims)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_winner_case_does_not_split_unique_count() {
        let lower = "0x00000000000000000000000000000000000000ab";
        let upper = "0x00000000000000000000000000000000000000AB";
        let entry = tally_draw(2, None, &[claim(lower, 0, 5, 0), claim(upper, 0, 5, 0)]);
        assert_eq!(entry.unique_winners_count, 1);
        assert_eq!(entry.wins_count, 2);
    }
}
