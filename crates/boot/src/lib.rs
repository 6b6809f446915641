//! Bootstrap Sequencer: turns disk state into the first committed store state.
//!
//! # Invariants
//! - Startup is one chain of state transforms threaded through a single accumulator.
//! - Nothing is written to the store until the chain completes; the commit is one `write`.
//! - A migration failure aborts startup before anything is committed.
//! - Best-effort steps (legacy identity, system probe, telemetry) never fail the chain.

pub mod boundary;
pub mod config;
pub mod identity;
pub mod sequencer;

pub use boundary::{
    Catalog, CatalogLoader, FileLegacyIdentity, HostProbe, IdentityObserver, JsonFileCatalog,
    LegacyIdentitySource, NoLegacyIdentity, StaticCatalog, SystemProbe,
};
pub use config::BootConfig;
pub use identity::IdentitySource;
pub use sequencer::{BootError, BootReport, Booted, Bootstrap};
