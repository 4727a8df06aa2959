//! Delta merging: folding remote changes into a local document.
//!
//! This is the core of convergence. Given a local [`Document`] and a
//! [`DeltaPayload`] (changed items plus tombstones), [`apply_delta`]
//! produces the merged document and reports what changed so callers can
//! raise events for it.
//!
//! # Algorithm
//!
//! 1. For each incoming item: insert when the id is unknown locally,
//!    otherwise overlay it onto the local item when it is at least as new
//!    (see [`crate::timestamp::incoming_wins`]).
//! 2. For each incoming tombstone: drop the local item when the tombstone
//!    supersedes it, then fold the tombstone into `meta.deleted`.
//!
//! Applying the same delta twice yields the same document as applying it
//! once; replicas that exchange their states converge.

use serde_json::Value;

use crate::document::{Document, Item, Tombstone};
use crate::shape;
use crate::timestamp;
use crate::ItemId;

/// A batch of changes to merge: the item-oriented half of a pull response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeltaPayload {
    pub items: Vec<Item>,
    pub deleted: Vec<Tombstone>,
}

impl DeltaPayload {
    /// Whether a pull response is a delta (`{"delta": true, ...}`) rather
    /// than a full snapshot.
    pub fn is_delta(payload: &Value) -> bool {
        payload.get("delta").and_then(Value::as_bool) == Some(true)
    }

    /// Extract the delta batch from a pull response, tolerating missing
    /// `items` or `meta`.
    pub fn from_value(payload: &Value) -> Self {
        shape::normalize(payload)
            .map(Self::from_document)
            .unwrap_or_default()
    }

    /// Treat a full document as a delta batch (used when both replicas
    /// hold data and a snapshot response must be merged, not adopted).
    pub fn from_document(doc: Document) -> Self {
        Self {
            items: doc.items,
            deleted: doc.meta.deleted,
        }
    }
}

/// What a merge changed, by item id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergeReport {
    /// Ids that did not exist locally and were inserted.
    pub inserted: Vec<ItemId>,
    /// Ids that existed locally and were overwritten by the incoming item.
    pub replaced: Vec<ItemId>,
    /// Ids removed by an incoming tombstone.
    pub removed: Vec<ItemId>,
}

impl MergeReport {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.replaced.is_empty() && self.removed.is_empty()
    }
}

/// Fold a delta batch into a document. See the module docs for the rules.
pub fn apply_delta(doc: &mut Document, delta: &DeltaPayload) -> MergeReport {
    let mut report = MergeReport::default();

    for incoming in &delta.items {
        // An item without an id cannot be matched against anything; skip it.
        let Some(id) = incoming.id() else { continue };
        match doc.position_of(&id) {
            Some(ix) => {
                if timestamp::incoming_wins(incoming, &doc.items[ix]) {
                    doc.items[ix] = doc.items[ix].merged_with(incoming);
                    report.replaced.push(id);
                }
            }
            None => {
                doc.items.push(incoming.clone());
                report.inserted.push(id);
            }
        }
    }

    for tombstone in &delta.deleted {
        if let Some(ix) = doc.position_of(&tombstone.id) {
            if timestamp::tombstone_wins(tombstone, &doc.items[ix]) {
                doc.items.remove(ix);
                report.removed.push(tombstone.id.clone());
            }
        }
        doc.upsert_tombstone(tombstone.clone());
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(value: Value) -> Item {
        serde_json::from_value(value).unwrap()
    }

    fn doc_with(items: Vec<Item>) -> Document {
        Document {
            items,
            ..Document::default()
        }
    }

    #[test]
    fn unknown_items_are_inserted() {
        let mut doc = Document::default();
        let delta = DeltaPayload {
            items: vec![item(json!({"id": "c1", "name": "Ana"}))],
            deleted: vec![],
        };

        let report = apply_delta(&mut doc, &delta);

        assert_eq!(report.inserted, vec!["c1".to_string()]);
        assert_eq!(doc.items.len(), 1);
    }

    #[test]
    fn newer_incoming_replaces_but_keeps_local_only_fields() {
        let mut doc = doc_with(vec![item(json!({
            "id": "p1",
            "name": "Quattro",
            "notes": "local only",
            "updatedAt": "2024-01-01T00:00:00Z"
        }))]);
        let delta = DeltaPayload {
            items: vec![item(json!({
                "id": "p1",
                "name": "Quattro Formaggi",
                "updatedAt": "2024-02-01T00:00:00Z"
            }))],
            deleted: vec![],
        };

        let report = apply_delta(&mut doc, &delta);

        assert_eq!(report.replaced, vec!["p1".to_string()]);
        assert_eq!(doc.items[0].get("name"), Some(&json!("Quattro Formaggi")));
        assert_eq!(doc.items[0].get("notes"), Some(&json!("local only")));
        assert_eq!(doc.items[0].updated_at(), Some("2024-02-01T00:00:00Z"));
    }

    #[test]
    fn older_incoming_is_ignored() {
        // An order updated locally at T keeps winning over a remote copy
        // from T-1s.
        let mut doc = doc_with(vec![item(json!({
            "id": "o1",
            "status": "open",
            "updatedAt": "2024-03-01T12:00:01Z"
        }))]);
        let delta = DeltaPayload {
            items: vec![item(json!({
                "id": "o1",
                "status": "cancelled",
                "updatedAt": "2024-03-01T12:00:00Z"
            }))],
            deleted: vec![],
        };

        let report = apply_delta(&mut doc, &delta);

        assert!(report.replaced.is_empty());
        assert_eq!(doc.items[0].get("status"), Some(&json!("open")));
    }

    #[test]
    fn equal_timestamps_favor_incoming() {
        let mut doc = doc_with(vec![item(json!({
            "id": "s1",
            "value": "local",
            "updatedAt": "2024-03-01T12:00:00Z"
        }))]);
        let delta = DeltaPayload {
            items: vec![item(json!({
                "id": "s1",
                "value": "remote",
                "updatedAt": "2024-03-01T12:00:00Z"
            }))],
            deleted: vec![],
        };

        apply_delta(&mut doc, &delta);
        assert_eq!(doc.items[0].get("value"), Some(&json!("remote")));
    }

    #[test]
    fn tombstone_removes_older_item() {
        let mut doc = doc_with(vec![item(json!({
            "id": "o1",
            "updatedAt": "2024-03-01T00:00:00Z"
        }))]);
        let delta = DeltaPayload {
            items: vec![],
            deleted: vec![Tombstone::new("o1", Some("2024-03-02T00:00:00Z".into()))],
        };

        let report = apply_delta(&mut doc, &delta);

        assert_eq!(report.removed, vec!["o1".to_string()]);
        assert!(doc.items.is_empty());
        assert_eq!(doc.meta.deleted.len(), 1);
    }

    #[test]
    fn tombstone_spares_newer_item_but_is_still_recorded() {
        let mut doc = doc_with(vec![item(json!({
            "id": "o1",
            "updatedAt": "2024-03-02T00:00:00Z"
        }))]);
        let delta = DeltaPayload {
            items: vec![],
            deleted: vec![Tombstone::new("o1", Some("2024-03-01T00:00:00Z".into()))],
        };

        let report = apply_delta(&mut doc, &delta);

        assert!(report.removed.is_empty());
        assert_eq!(doc.items.len(), 1);
        // The tombstone stays in meta so later merges can still see it.
        assert_eq!(doc.meta.deleted.len(), 1);
    }

    #[test]
    fn local_tombstone_does_not_block_recreation() {
        let mut doc = Document::default();
        doc.upsert_tombstone(Tombstone::new("o1", Some("2024-01-01T00:00:00Z".into())));

        let delta = DeltaPayload {
            items: vec![item(json!({
                "id": "o1",
                "updatedAt": "2024-02-01T00:00:00Z"
            }))],
            deleted: vec![],
        };
        let report = apply_delta(&mut doc, &delta);

        assert_eq!(report.inserted, vec!["o1".to_string()]);
        assert_eq!(doc.items.len(), 1);
        assert_eq!(doc.meta.deleted.len(), 1);
    }

    #[test]
    fn applying_a_delta_twice_is_idempotent() {
        let mut doc = doc_with(vec![
            item(json!({"id": "a", "v": 1, "updatedAt": "2024-01-01T00:00:00Z"})),
            item(json!({"id": "b", "v": 1, "updatedAt": "2024-01-01T00:00:00Z"})),
        ]);
        let delta = DeltaPayload {
            items: vec![
                item(json!({"id": "a", "v": 2, "updatedAt": "2024-02-01T00:00:00Z"})),
                item(json!({"id": "c", "v": 1, "updatedAt": "2024-02-01T00:00:00Z"})),
            ],
            deleted: vec![Tombstone::new("b", Some("2024-02-01T00:00:00Z".into()))],
        };

        apply_delta(&mut doc, &delta);
        let once = doc.clone();
        apply_delta(&mut doc, &delta);

        assert_eq!(doc, once);
    }

    #[test]
    fn delta_in_one_batch_is_idempotent_for_same_id() {
        // An item and its own newer tombstone in the same batch: the item
        // is inserted then deleted, and a second application ends the same.
        let mut doc = Document::default();
        let delta = DeltaPayload {
            items: vec![item(json!({"id": "x", "updatedAt": "2024-01-01T00:00:00Z"}))],
            deleted: vec![Tombstone::new("x", Some("2024-01-02T00:00:00Z".into()))],
        };

        apply_delta(&mut doc, &delta);
        let once = doc.clone();
        apply_delta(&mut doc, &delta);

        assert!(doc.items.is_empty());
        assert_eq!(doc, once);
    }

    #[test]
    fn is_delta_detection() {
        assert!(DeltaPayload::is_delta(&json!({"delta": true, "items": []})));
        assert!(!DeltaPayload::is_delta(&json!({"delta": false, "items": []})));
        assert!(!DeltaPayload::is_delta(&json!({"items": []})));
        assert!(!DeltaPayload::is_delta(&json!({"delta": "true"})));
    }

    #[test]
    fn from_value_tolerates_sparse_payloads() {
        let delta = DeltaPayload::from_value(&json!({"delta": true, "items": [{"id": "a"}]}));
        assert_eq!(delta.items.len(), 1);
        assert!(delta.deleted.is_empty());

        let empty = DeltaPayload::from_value(&json!({"delta": true}));
        assert_eq!(empty, DeltaPayload::default());
    }

    mod property_tests {
        use super::*;
        use chrono::DateTime;
        use proptest::prelude::*;

        fn iso(secs: i64) -> String {
            DateTime::from_timestamp(secs, 0)
                .map(|ts| ts.to_rfc3339())
                .unwrap_or_default()
        }

        proptest! {
            #[test]
            fn prop_apply_delta_idempotent(
                local_ts in 1_000_000i64..2_000_000,
                remote_ts in 1_000_000i64..2_000_000,
                deleted_ts in 1_000_000i64..2_000_000,
            ) {
                let mut doc = Document {
                    items: vec![serde_json::from_value(json!({
                        "id": "a", "v": "local", "updatedAt": iso(local_ts)
                    })).unwrap()],
                    ..Document::default()
                };
                let delta = DeltaPayload {
                    items: vec![serde_json::from_value(json!({
                        "id": "a", "v": "remote", "updatedAt": iso(remote_ts)
                    })).unwrap()],
                    deleted: vec![Tombstone::new("a", Some(iso(deleted_ts)))],
                };

                apply_delta(&mut doc, &delta);
                let once = doc.clone();
                apply_delta(&mut doc, &delta);
                prop_assert_eq!(doc, once);
            }

            #[test]
            fn prop_lww_keeps_the_newer_value(
                local_ts in 1_000_000i64..2_000_000,
                remote_ts in 1_000_000i64..2_000_000,
            ) {
                let mut doc = Document {
                    items: vec![serde_json::from_value(json!({
                        "id": "a", "v": "local", "updatedAt": iso(local_ts)
                    })).unwrap()],
                    ..Document::default()
                };
                let delta = DeltaPayload {
                    items: vec![serde_json::from_value(json!({
                        "id": "a", "v": "remote", "updatedAt": iso(remote_ts)
                    })).unwrap()],
                    deleted: vec![],
                };

                apply_delta(&mut doc, &delta);

                let expected = if remote_ts >= local_ts { "remote" } else { "local" };
                prop_assert_eq!(doc.items[0].get("v"), Some(&json!(expected)));
            }

            #[test]
            fn prop_tombstone_precedence(
                item_ts in 1_000_000i64..2_000_000,
                deleted_ts in 1_000_000i64..2_000_000,
            ) {
                let mut doc = Document {
                    items: vec![serde_json::from_value(json!({
                        "id": "a", "updatedAt": iso(item_ts)
                    })).unwrap()],
                    ..Document::default()
                };
                let delta = DeltaPayload {
                    items: vec![],
                    deleted: vec![Tombstone::new("a", Some(iso(deleted_ts)))],
                };

                apply_delta(&mut doc, &delta);

                if deleted_ts >= item_ts {
                    prop_assert!(doc.items.is_empty());
                } else {
                    prop_assert_eq!(doc.items.len(), 1);
                }
            }

            #[test]
            fn prop_disjoint_ids_never_lose_data(
                remote_count in 0usize..8,
            ) {
                let mut doc = Document {
                    items: vec![serde_json::from_value(json!({
                        "id": "local-0", "updatedAt": iso(1_500_000)
                    })).unwrap()],
                    ..Document::default()
                };
                let delta = DeltaPayload {
                    items: (0..remote_count).map(|ix| serde_json::from_value(json!({
                        "id": format!("remote-{ix}"), "updatedAt": iso(1_500_000)
                    })).unwrap()).collect(),
                    deleted: vec![],
                };

                let report = apply_delta(&mut doc, &delta);

                prop_assert_eq!(report.inserted.len(), remote_count);
                prop_assert_eq!(doc.items.len(), remote_count + 1);
            }
        }
    }
}
