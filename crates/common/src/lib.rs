//! Shared types for hoard: the state tree, identity and system descriptors.
//!
//! # Invariants
//! - A `StateTree` maps field names to JSON-shaped values; iteration is ordered (BTreeMap).
//! - Migration completion flags live inside the tree, under [`fields::MIGRATIONS`].

pub mod tree;
pub mod types;

pub use serde_json::Value;
pub use tree::{FieldName, StateTree, is_storable_name};
pub use types::{PlatformFamily, PlayerId, SystemInfo};

/// Field names the core reserves for its own bookkeeping.
pub mod fields {
    /// Persisted mapping of migration key -> `true`.
    pub const MIGRATIONS: &str = "migrations";
    /// Persisted stable identity of this client install.
    pub const IDENTITY: &str = "identity";
    /// Transient system descriptor detected at startup.
    pub const SYSTEM: &str = "system";
    /// Transient item catalog loaded at startup.
    pub const CATALOG: &str = "catalog";
}
