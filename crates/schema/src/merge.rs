use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a partial update is combined with a field's current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Mapping keys in the update overwrite; keys not mentioned are kept.
    /// Non-mapping values are replaced outright.
    #[default]
    Shallow,
    /// The update replaces the current value entirely.
    Replace,
    /// Like `Shallow`, applied recursively to nested mappings.
    Deep,
}

impl MergeStrategy {
    /// Combine `incoming` with `current`, producing the new field value.
    pub fn merge(self, current: &Value, incoming: Value) -> Value {
        match self {
            Self::Replace => incoming,
            Self::Shallow => match (current, incoming) {
                (Value::Object(existing), Value::Object(update)) => {
                    let mut merged = existing.clone();
                    for (k, v) in update {
                        merged.insert(k, v);
                    }
                    Value::Object(merged)
                }
                (_, incoming) => incoming,
            },
            Self::Deep => deep_merge(current, incoming),
        }
    }
}

fn deep_merge(current: &Value, incoming: Value) -> Value {
    match (current, incoming) {
        (Value::Object(existing), Value::Object(update)) => {
            let mut merged = existing.clone();
            for (k, v) in update {
                let next = match existing.get(&k) {
                    Some(old) => deep_merge(old, v),
                    None => v,
                };
                merged.insert(k, next);
            }
            Value::Object(merged)
        }
        (_, incoming) => incoming,
    }
}
