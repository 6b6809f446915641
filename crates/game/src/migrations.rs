//! Persisted-shape upgrades for the game client, oldest first.
//!
//! Retired migrations are removed from the list but their keys stay reserved:
//! installs that ran them still carry the flag, and later fix-ups read it.

use hoard_common::{StateTree, Value};
use hoard_migrate::{BoxError, Migration, MigrationEngine, MigrationError};
use serde_json::json;

use crate::schema::field;

/// Retired: de-duplicated the inventory but also dropped equipped items.
pub const RETIRED_DEDUPE_INVENTORY_V1: &str = "dedupe_inventory_v1";

/// Starting xp grant.
pub const SEED_XP: &str = "seed_xp";
/// `hand`/`accessory` slots split into two interchangeable slots each.
pub const LOADOUT_SLOTS_V2: &str = "loadout_slots_v2";
/// Restores equipped items that `dedupe_inventory_v1` dropped from the inventory.
/// Must run after `loadout_slots_v2`, which it relies on for slot names.
pub const FIX_DEDUPE_INVENTORY: &str = "fix_dedupe_inventory";

const STARTING_XP: u64 = 100;

/// The client's migrations in execution order.
pub fn client_migrations() -> Result<MigrationEngine, MigrationError> {
    MigrationEngine::new()
        .with(Migration::new(SEED_XP, seed_xp))?
        .with(Migration::new(LOADOUT_SLOTS_V2, loadout_slots_v2))?
        .with(Migration::new(FIX_DEDUPE_INVENTORY, fix_dedupe_inventory))
}

/// Grants the starting xp only while xp is still unset (absent, null or zero).
fn seed_xp(mut state: StateTree) -> Result<StateTree, BoxError> {
    let unset = match state.get(field::XP) {
        None | Some(Value::Null) => true,
        Some(Value::Number(n)) => n.as_f64() == Some(0.0),
        Some(_) => false,
    };
    if unset {
        state.insert(field::XP, json!(STARTING_XP));
    }
    Ok(state)
}

fn loadout_slots_v2(mut state: StateTree) -> Result<StateTree, BoxError> {
    if let Some(Value::Object(loadout)) = state.get_mut(field::LOADOUT) {
        for (old, new) in [("hand", "hand_1"), ("accessory", "accessory_1")] {
            if let Some(item) = loadout.remove(old) {
                if !loadout.contains_key(new) {
                    loadout.insert(new.to_string(), item);
                }
            }
        }
    }
    Ok(state)
}

fn fix_dedupe_inventory(mut state: StateTree) -> Result<StateTree, BoxError> {
    if !state.migration_applied(RETIRED_DEDUPE_INVENTORY_V1) {
        return Ok(state);
    }
    let equipped: Vec<Value> = match state.get(field::LOADOUT) {
        Some(Value::Object(loadout)) => loadout.values().cloned().collect(),
        _ => Vec::new(),
    };
    let mut inventory = match state.get(field::INVENTORY) {
        Some(Value::Array(items)) => items.clone(),
        Some(other) => return Err(format!("inventory is not a list: {other}").into()),
        None => Vec::new(),
    };
    let mut restored = 0;
    for item in equipped {
        if !inventory.contains(&item) {
            inventory.push(item);
            restored += 1;
        }
    }
    if restored > 0 {
        tracing::info!(restored, "restored equipped items to inventory");
    }
    state.insert(field::INVENTORY, Value::Array(inventory));
    Ok(state)
}
