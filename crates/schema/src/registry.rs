use hoard_common::{FieldName, StateTree, Value, is_storable_name};
use std::collections::{BTreeMap, BTreeSet};

use crate::merge::MergeStrategy;

/// Errors from schema operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("unknown field: {0}")]
    UnknownField(FieldName),
    #[error("field registered twice: {0}")]
    DuplicateField(FieldName),
    #[error("schema is frozen; cannot register field {0} after the first write")]
    SchemaFrozen(FieldName),
    #[error("persisted field name {0:?} is not a valid storage key (allowed: A-Z a-z 0-9 _ -)")]
    UnstorableName(FieldName),
}

/// Declaration of one field of the state tree.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: FieldName,
    pub persisted: bool,
    pub merge: MergeStrategy,
    pub default: Value,
}

impl FieldDescriptor {
    /// A field that survives restarts.
    pub fn persisted(name: impl Into<FieldName>, default: Value) -> Self {
        Self {
            name: name.into(),
            persisted: true,
            merge: MergeStrategy::default(),
            default,
        }
    }

    /// A field that lives only for the current process.
    pub fn transient(name: impl Into<FieldName>, default: Value) -> Self {
        Self {
            name: name.into(),
            persisted: false,
            merge: MergeStrategy::default(),
            default,
        }
    }

    pub fn with_merge(mut self, merge: MergeStrategy) -> Self {
        self.merge = merge;
        self
    }
}

/// Registry of every field the state tree may hold.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    fields: BTreeMap<FieldName, FieldDescriptor>,
    frozen: bool,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field. Fails once the schema is frozen, if the name is taken,
    /// or if a persisted field's name cannot be used as a storage key.
    pub fn register(&mut self, descriptor: FieldDescriptor) -> Result<(), SchemaError> {
        if self.frozen {
            return Err(SchemaError::SchemaFrozen(descriptor.name));
        }
        if self.fields.contains_key(&descriptor.name) {
            return Err(SchemaError::DuplicateField(descriptor.name));
        }
        if descriptor.persisted && !is_storable_name(&descriptor.name) {
            return Err(SchemaError::UnstorableName(descriptor.name));
        }
        tracing::debug!(
            field = %descriptor.name,
            persisted = descriptor.persisted,
            merge = ?descriptor.merge,
            "registered field"
        );
        self.fields.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Builder-style `register` for static schema declarations.
    pub fn with(mut self, descriptor: FieldDescriptor) -> Result<Self, SchemaError> {
        self.register(descriptor)?;
        Ok(self)
    }

    /// Look up a field's descriptor.
    pub fn field(&self, name: &str) -> Result<&FieldDescriptor, SchemaError> {
        self.fields
            .get(name)
            .ok_or_else(|| SchemaError::UnknownField(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Whether `name` is a declared, persisted field. Unknown fields are not persisted.
    pub fn is_persisted(&self, name: &str) -> bool {
        self.fields.get(name).is_some_and(|d| d.persisted)
    }

    /// Names of all persisted fields, in name order.
    pub fn persisted_fields(&self) -> BTreeSet<FieldName> {
        self.fields
            .values()
            .filter(|d| d.persisted)
            .map(|d| d.name.clone())
            .collect()
    }

    /// A state tree holding every field at its default.
    pub fn defaults(&self) -> StateTree {
        self.fields
            .values()
            .map(|d| (d.name.clone(), d.default.clone()))
            .collect()
    }

    /// Close registration. Idempotent.
    pub fn freeze(&mut self) {
        if !self.frozen {
            tracing::debug!(fields = self.fields.len(), "schema frozen");
        }
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// All descriptors in name order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> SchemaRegistry {
        SchemaRegistry::new()
            .with(FieldDescriptor::persisted("xp", json!(0)))
            .and_then(|s| s.with(FieldDescriptor::persisted("migrations", json!({}))))
            .and_then(|s| s.with(FieldDescriptor::transient("system", json!(null))))
            .unwrap()
    }

    #[test]
    fn registry_starts_empty() {
        let s = SchemaRegistry::new();
        assert!(s.is_empty());
        assert!(!s.is_frozen());
    }

    #[test]
    fn is_persisted_reflects_registration() {
        let s = sample();
        assert!(s.is_persisted("xp"));
        assert!(!s.is_persisted("system"));
        assert!(!s.is_persisted("never_registered"));
    }

    #[test]
    fn persisted_fields_lists_only_persisted() {
        let s = sample();
        let names: Vec<String> = s.persisted_fields().into_iter().collect();
        assert_eq!(names, ["migrations", "xp"]);
    }

    #[test]
    fn defaults_cover_every_field() {
        let d = sample().defaults();
        assert_eq!(d.len(), 3);
        assert_eq!(d.get("xp"), Some(&json!(0)));
        assert_eq!(d.get("migrations"), Some(&json!({})));
        assert_eq!(d.get("system"), Some(&json!(null)));
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut s = sample();
        let err = s
            .register(FieldDescriptor::transient("xp", json!(1)))
            .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateField("xp".into()));
        // original declaration is untouched
        assert!(s.is_persisted("xp"));
    }

    #[test]
    fn registration_after_freeze_fails() {
        let mut s = sample();
        s.freeze();
        let err = s
            .register(FieldDescriptor::persisted("late", json!(null)))
            .unwrap_err();
        assert_eq!(err, SchemaError::SchemaFrozen("late".into()));
        assert!(!s.contains("late"));
    }

    #[test]
    fn persisted_name_must_be_storable() {
        let mut s = sample();
        let err = s
            .register(FieldDescriptor::persisted("player.xp", json!(0)))
            .unwrap_err();
        assert_eq!(err, SchemaError::UnstorableName("player.xp".into()));
        assert!(!s.contains("player.xp"));

        // transient fields never reach an adapter, so any name is fine
        s.register(FieldDescriptor::transient("ui.scale", json!(1.0)))
            .unwrap();
        assert!(s.contains("ui.scale"));
    }

    #[test]
    fn unknown_field_lookup_fails() {
        let s = sample();
        assert_eq!(
            s.field("nope").unwrap_err(),
            SchemaError::UnknownField("nope".into())
        );
    }

    #[test]
    fn merge_strategy_recorded() {
        let s = SchemaRegistry::new()
            .with(FieldDescriptor::persisted("inventory", json!([])).with_merge(MergeStrategy::Replace))
            .unwrap();
        assert_eq!(s.field("inventory").unwrap().merge, MergeStrategy::Replace);
    }
}
