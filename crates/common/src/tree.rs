use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::fields;

/// Name of a top-level field in the state tree.
pub type FieldName = String;

/// Whether `name` can be used as a persistence key: non-empty, `[A-Za-z0-9_-]` only.
pub fn is_storable_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// The full application state: one value per declared field.
///
/// Uses BTreeMap for deterministic iteration order, so snapshots, persistence
/// passes and notifications always visit fields in the same order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateTree {
    fields: BTreeMap<FieldName, Value>,
}

impl StateTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.fields.get_mut(field)
    }

    /// Set a field, returning its previous value.
    pub fn insert(&mut self, field: impl Into<FieldName>, value: Value) -> Option<Value> {
        self.fields.insert(field.into(), value)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&FieldName, &Value)> {
        self.fields.iter()
    }

    /// Whether `migrations[key]` is `true`.
    ///
    /// A missing or malformed `migrations` field counts as "nothing applied".
    pub fn migration_applied(&self, key: &str) -> bool {
        self.fields
            .get(fields::MIGRATIONS)
            .and_then(|m| m.get(key))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Record `migrations[key] = true`, creating the mapping if needed.
    pub fn mark_migration(&mut self, key: &str) {
        let entry = self
            .fields
            .entry(fields::MIGRATIONS.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        if let Value::Object(map) = entry {
            map.insert(key.to_string(), Value::Bool(true));
        }
    }
}

impl FromIterator<(FieldName, Value)> for StateTree {
    fn from_iter<I: IntoIterator<Item = (FieldName, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for StateTree {
    type Item = (FieldName, Value);
    type IntoIter = std::collections::btree_map::IntoIter<FieldName, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}
