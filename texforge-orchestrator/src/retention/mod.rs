//! Retention and cleanup
//!
//! Published artifact sets are deleted after a grace period, in one of two
//! ways depending on how the service runs:
//! - Deferred: a one-shot timer per job, for the synchronous endpoint
//! - Sweep: a periodic pass over expiring shadow keys in the shared store,
//!   for the queue front door
//!
//! Deletion is idempotent in both modes. At start the output area is
//! reclaimed, so artifact sets whose timers died with a previous run are
//! still deleted.

mod deferred;
mod sweep;

pub use deferred::{CleanupScheduler, Reclaimed};
pub use sweep::{SweepReport, Sweeper};
