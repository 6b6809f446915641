use hoard_common::fields;
use hoard_schema::{FieldDescriptor, MergeStrategy, SchemaError, SchemaRegistry};
use serde_json::json;

/// Client field names beyond the core's reserved ones.
pub mod field {
    pub const XP: &str = "xp";
    pub const COINS: &str = "coins";
    pub const INVENTORY: &str = "inventory";
    pub const LOADOUT: &str = "loadout";
    pub const SETTINGS: &str = "settings";
    pub const SESSION: &str = "session";
}

/// Every field the game client keeps in its state tree.
pub fn client_schema() -> Result<SchemaRegistry, SchemaError> {
    SchemaRegistry::new()
        .with(FieldDescriptor::persisted(fields::MIGRATIONS, json!({})))?
        .with(FieldDescriptor::persisted(fields::IDENTITY, json!("")))?
        .with(FieldDescriptor::transient(fields::SYSTEM, json!(null)))?
        .with(FieldDescriptor::transient(fields::CATALOG, json!({})))?
        .with(FieldDescriptor::persisted(field::XP, json!(0)))?
        .with(FieldDescriptor::persisted(field::COINS, json!(0)))?
        // owned item ids; a list, so updates replace it wholesale
        .with(FieldDescriptor::persisted(field::INVENTORY, json!([])).with_merge(MergeStrategy::Replace))?
        .with(FieldDescriptor::persisted(field::LOADOUT, json!({})))?
        .with(
            FieldDescriptor::persisted(
                field::SETTINGS,
                json!({"audio": {"music": 0.8, "sfx": 1.0}, "language": "en"}),
            )
            .with_merge(MergeStrategy::Deep),
        )?
        .with(FieldDescriptor::transient(field::SESSION, json!({"screen": "title"})))
}
