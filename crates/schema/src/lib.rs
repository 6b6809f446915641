//! Schema Registry: the single place where a field's persistence and merge behavior is decided.
//!
//! # Invariants
//! - A field's `persisted` flag is fixed at registration and never changes.
//! - Registration closes once the owning store accepts its first write.
//! - Every registered field carries a default that is valid before startup completes.

pub mod merge;
pub mod registry;

pub use merge::MergeStrategy;
pub use registry::{FieldDescriptor, SchemaError, SchemaRegistry};
