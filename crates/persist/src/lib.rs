//! Persistence: durable get/set of individual named values.
//!
//! # Invariants
//! - Values round-trip losslessly (nested mappings, lists, strings, numbers, booleans).
//! - File-backed writes are atomic per key; a torn write never replaces a good value.
//! - A value whose integrity hash does not match is an error, never silently accepted.

pub mod adapter;
pub mod file;
pub mod memory;

pub use adapter::{PersistError, PersistenceAdapter, validate_key};
pub use file::FileAdapter;
pub use memory::MemoryAdapter;
