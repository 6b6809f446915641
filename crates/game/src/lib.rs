//! Game client state layered on the generic store: which fields exist, how
//! their persisted shape evolved, and how items are equipped.
//!
//! # Invariants
//! - Every client field is declared in [`client_schema`]; nothing else decides persistence.
//! - [`client_migrations`] is append-only; its order is the dependency order.
//! - Equipping is one pure loadout transform committed with one `write`.

pub mod loadout;
pub mod migrations;
pub mod schema;

pub use loadout::{EquipError, Loadout, Slot, SlotKind, equip, equip_in_store, unequip};
pub use migrations::client_migrations;
pub use schema::{client_schema, field};
