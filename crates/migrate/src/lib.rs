//! Migration Engine: upgrades persisted state to the current shape, exactly once per migration.
//!
//! # Invariants
//! - Declaration order is execution order; a migration may rely on every earlier one.
//! - A migration whose key is flagged in `migrations` never runs again.
//! - The flag is set only after the body succeeds; a failure aborts the rest of the run.
//! - The engine only transforms snapshots; committing the result is the caller's job.

pub mod engine;
pub mod migration;

pub use engine::{MigrationEngine, MigrationError, MigrationOutcome};
pub use migration::{BoxError, Migration};
