//! State Kernel: the sole owner of the live state tree.
//!
//! # Invariants
//! - All state mutations flow through [`StateStore::write`]; callers only ever hold snapshots.
//! - One `write` is one atomic step: readers see the tree before it or after it, never between.
//! - Writes apply one at a time in call order; merge, persist, notify completes before the next.
//! - Only fields declared persisted in the schema reach the persistence adapter.

pub mod store;
pub mod subscription;
pub mod update;

pub use store::{StateStore, StoreError, WriteReport};
pub use subscription::{FieldChange, FieldPattern, Subscription};
pub use update::Update;
