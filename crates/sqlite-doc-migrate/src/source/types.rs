//! Row and item types shared by every pipeline stage.

use serde_json::{Map, Value};

/// A source record as read from the snapshot: column name to value.
pub type Row = Map<String, Value>;

/// A row after normalization. Same shape as [`Row`], but owned and mutated
/// by the transform stage.
pub type Item = Map<String, Value>;

/// Render a field value as text, the way it is used for identity and
/// partition keys. `None` for null.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Text of `field` in `item` if present, non-null and non-blank after trimming.
pub fn non_blank_field(item: &Item, field: &str) -> Option<String> {
    item.get(field)
        .and_then(value_text)
        .filter(|s| !s.trim().is_empty())
}
