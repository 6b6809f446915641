use hoard_common::{FieldName, StateTree, Value};

/// A batch of field changes applied by one [`crate::StateStore::write`] call.
///
/// Entries apply in insertion order. `set` merges using the field's declared
/// strategy; `replace` overwrites the field regardless of strategy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    entries: Vec<UpdateEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct UpdateEntry {
    pub field: FieldName,
    pub value: Value,
    pub replace: bool,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `value` into `field` using the field's merge strategy.
    pub fn set(mut self, field: impl Into<FieldName>, value: Value) -> Self {
        self.entries.push(UpdateEntry {
            field: field.into(),
            value,
            replace: false,
        });
        self
    }

    /// Overwrite `field` with `value`.
    pub fn replace(mut self, field: impl Into<FieldName>, value: Value) -> Self {
        self.entries.push(UpdateEntry {
            field: field.into(),
            value,
            replace: true,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct field names touched, in first-mention order.
    pub fn fields(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for e in &self.entries {
            if !seen.contains(&e.field.as_str()) {
                seen.push(&e.field);
            }
        }
        seen
    }

    pub(crate) fn entries(&self) -> &[UpdateEntry] {
        &self.entries
    }
}

/// A whole tree becomes an update that replaces every field it holds.
impl From<StateTree> for Update {
    fn from(tree: StateTree) -> Self {
        tree.into_iter()
            .fold(Self::new(), |u, (field, value)| u.replace(field, value))
    }
}

impl<K: Into<FieldName>> FromIterator<(K, Value)> for Update {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |u, (field, value)| u.set(field, value))
    }
}
