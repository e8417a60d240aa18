//! Draw/claims aggregation engine
//!
//! Leaves first:
//! - `amounts` / `types` - token amounts and record shapes
//! - `tally` - one draw's records → `DrawHistoryEntry`
//! - `cache` - per-pool draw history, append-only above the resume point
//! - `leaderboard` - ranked views over the full claim history
//! - `vaults` - vault registry enrichment on a cooldown
//! - `promotions` - live TWAB reward promotions
//! - `cycle` - fast/slow cycles publishing every derived artifact
//! - `scheduler` - control loop with independent cycle cadences

pub mod amounts;
pub mod cache;
pub mod cycle;
pub mod leaderboard;
pub mod promotions;
pub mod scheduler;
pub mod tally;
pub mod types;
pub mod vaults;

pub use cycle::{AggregationContext, CycleKind, CyclePhase, CycleReport, UnitOutcome};
pub use scheduler::{run_control_loop, CycleCadence, LoopStats};
