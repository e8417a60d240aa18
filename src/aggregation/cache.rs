//! Incremental draw-history cache
//!
//! One flat JSON file per (network, pool) holding every `DrawHistoryEntry`
//! computed so far, in draw order. The file is rewritten wholesale on each
//! merge; draws are low-frequency (one per protocol epoch) so the snapshot
//! stays small.
//!
//! Invariant: entries are only ever appended at or after the resume point.
//! A draw below the resume point is rejected, never overwritten. An unreadable
//! snapshot resets that pool to empty, so the next cycle rebuilds its history
//! from the record source.

use super::types::{DrawHistoryEntry, DrawId};
use crate::error::AggregationError;
use crate::persistence::{load_snapshot, save_snapshot};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Result of a `merge` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub accepted: usize,
    /// Draw ids refused because they were below the resume point
    pub rejected: Vec<DrawId>,
}

pub struct IncrementalCache {
    dir: PathBuf,
    histories: HashMap<(u64, String), Vec<DrawHistoryEntry>>,
}

impl IncrementalCache {
    /// Cache rooted at `dir`; snapshots are loaded lazily per pool
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            histories: HashMap::new(),
        }
    }

    fn snapshot_path(&self, network: u64, pool: &str) -> PathBuf {
        self.dir.join(format!("draw-history-{}-{}.json", network, pool.to_lowercase()))
    }

    fn history(&mut self, network: u64, pool: &str) -> &mut Vec<DrawHistoryEntry> {
        let key = (network, pool.to_lowercase());
        if !self.histories.contains_key(&key) {
            let path = self.snapshot_path(network, pool);
            let mut entries: Vec<DrawHistoryEntry> = load_snapshot(&path).or_empty(&path);
            entries.sort_by_key(|e| e.draw_id);
            entries.dedup_by_key(|e| e.draw_id);
            log::info!(
                "📥 Draw cache {}-{}: {} cached draws",
                network,
                key.1,
                entries.len()
            );
            self.histories.insert(key.clone(), entries);
        }
        self.histories.entry(key).or_default()
    }

    /// One past the highest cached draw id, 0 when empty
    pub fn resume_point(&mut self, network: u64, pool: &str) -> DrawId {
        self.history(network, pool)
            .last()
            .map(|e| e.draw_id + 1)
            .unwrap_or(0)
    }

    /// All cached entries, ascending by draw id
    pub fn entries(&mut self, network: u64, pool: &str) -> &[DrawHistoryEntry] {
        self.history(network, pool).as_slice()
    }

    /// Append new entries and rewrite the snapshot
    ///
    /// Entries are taken in the given order; each accepted entry advances the
    /// resume point, so duplicates within the batch are rejected too. The
    /// in-memory history is updated even when the snapshot write fails; the
    /// error is still returned so the cycle reports it.
    pub fn merge(
        &mut self,
        network: u64,
        pool: &str,
        new_entries: Vec<DrawHistoryEntry>,
    ) -> Result<MergeOutcome, AggregationError> {
        let path = self.snapshot_path(network, pool);
        let history = self.history(network, pool);
        let mut resume = history.last().map(|e| e.draw_id + 1).unwrap_or(0);
        let mut outcome = MergeOutcome::default();

        for entry in new_entries {
            if entry.draw_id < resume {
                log::warn!(
                    "⚠️  Draw cache {}-{}: rejecting draw {} (resume point {})",
                    network,
                    pool,
                    entry.draw_id,
                    resume
                );
                outcome.rejected.push(entry.draw_id);
                continue;
            }
            resume = entry.draw_id + 1;
            history.push(entry);
            outcome.accepted += 1;
        }

        if outcome.accepted > 0 {
            save_snapshot(history.as_slice(), &path).map_err(|e| {
                AggregationError::Persistence(format!("{}: {}", path.display(), e))
            })?;
            log::debug!(
                "💾 Draw cache {}-{}: +{} draws, resume at {}",
                network,
                pool,
                outcome.accepted,
                resume
            );
        }

        Ok(outcome)
    }
}
