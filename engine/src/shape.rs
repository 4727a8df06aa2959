//! Normalization of the shapes collection files have had over time.
//!
//! Current files carry the canonical `{ items, meta: { deleted } }` wrapper,
//! but older installs persisted a bare array of items or a wrapper without
//! `meta`, and some remotes still answer with those. Every reader goes
//! through [`normalize`] so the rest of the engine only ever sees
//! [`Document`].

use serde_json::Value;

use crate::document::{Document, Item, Meta};

/// The shapes a persisted or pulled collection payload can take.
#[derive(Debug, Clone, PartialEq)]
pub enum RawShape {
    /// Canonical or near-canonical wrapper: an object with an `items` array.
    Wrapped(Document),
    /// Legacy: a bare JSON array of items.
    Bare(Vec<Item>),
    /// Anything else (non-item collections, unknown blobs).
    Opaque(Value),
}

/// Classify a raw payload without losing information.
pub fn classify(value: &Value) -> RawShape {
    match value {
        Value::Array(entries) => RawShape::Bare(items_from(entries)),
        Value::Object(fields) => match fields.get("items") {
            Some(Value::Array(entries)) => RawShape::Wrapped(Document {
                items: items_from(entries),
                meta: meta_from(fields.get("meta")),
            }),
            _ => RawShape::Opaque(value.clone()),
        },
        _ => RawShape::Opaque(value.clone()),
    }
}

/// Upgrade a raw payload to the canonical document shape.
///
/// Returns `None` for payloads that are not item-shaped at all; callers
/// decide whether that means "use the default" or "keep the blob as is".
pub fn normalize(value: &Value) -> Option<Document> {
    match classify(value) {
        RawShape::Wrapped(doc) => Some(doc),
        RawShape::Bare(items) => Some(Document {
            items,
            meta: Meta::default(),
        }),
        RawShape::Opaque(_) => None,
    }
}

pub fn normalize_or_default(value: &Value) -> Document {
    normalize(value).unwrap_or_default()
}

/// Whether a payload holds any data worth keeping, across every known
/// shape. The `products` key is a legacy snapshot shape that only ever
/// mattered for this emptiness check.
pub fn has_data(value: &Value) -> bool {
    match value {
        Value::Array(entries) => !entries.is_empty(),
        Value::Object(fields) => {
            if let Some(Value::Array(items)) = fields.get("items") {
                return !items.is_empty();
            }
            if let Some(Value::Array(products)) = fields.get("products") {
                return !products.is_empty();
            }
            !fields.is_empty()
        }
        _ => false,
    }
}

fn items_from(entries: &[Value]) -> Vec<Item> {
    // Non-object entries cannot carry an id; they are dropped here rather
    // than tolerated through every merge path.
    entries
        .iter()
        .filter_map(|entry| entry.as_object().cloned().map(Item::new))
        .collect()
}

fn meta_from(value: Option<&Value>) -> Meta {
    value
        .cloned()
        .and_then(|meta| serde_json::from_value(meta).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_array_upgrades() {
        let doc = normalize(&json!([{"id": "a"}, {"id": "b"}])).unwrap();
        assert_eq!(doc.items.len(), 2);
        assert!(doc.meta.deleted.is_empty());
    }

    #[test]
    fn wrapper_without_meta_upgrades() {
        let doc = normalize(&json!({"items": [{"id": "a"}]})).unwrap();
        assert_eq!(doc.items.len(), 1);
        assert!(doc.meta.deleted.is_empty());
    }

    #[test]
    fn wrapper_keeps_tombstones() {
        let doc = normalize(&json!({
            "items": [],
            "meta": {"deleted": [{"id": "x", "deletedAt": "2024-01-01T00:00:00Z"}]}
        }))
        .unwrap();
        assert_eq!(doc.meta.deleted.len(), 1);
    }

    #[test]
    fn malformed_meta_falls_back_to_empty() {
        let doc = normalize(&json!({"items": [], "meta": "oops"})).unwrap();
        assert!(doc.meta.deleted.is_empty());
    }

    #[test]
    fn opaque_payloads_do_not_normalize() {
        assert!(normalize(&json!({"stats": {"today": null}})).is_none());
        assert!(normalize(&json!(null)).is_none());
        assert!(normalize(&json!("text")).is_none());
        assert_eq!(normalize_or_default(&json!(null)), Document::default());
    }

    #[test]
    fn non_object_items_are_dropped() {
        let doc = normalize(&json!({"items": [{"id": "a"}, 3, "b", null]})).unwrap();
        assert_eq!(doc.items.len(), 1);
    }

    #[test]
    fn has_data_across_shapes() {
        assert!(has_data(&json!([1])));
        assert!(!has_data(&json!([])));
        assert!(has_data(&json!({"items": [{"id": "a"}]})));
        assert!(!has_data(&json!({"items": []})));
        assert!(has_data(&json!({"products": [{"id": "a"}]})));
        assert!(!has_data(&json!({"products": []})));
        assert!(has_data(&json!({"stats": {}})));
        assert!(!has_data(&json!({})));
        assert!(!has_data(&json!(null)));
        assert!(!has_data(&json!("text")));
    }
}
