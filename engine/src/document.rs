//! The canonical collection document and its building blocks.
//!
//! On disk and on the wire a collection is one JSON document:
//!
//! ```json
//! { "items": [ ... ], "meta": { "deleted": [ {"id": "...", "deletedAt": "..."} ] } }
//! ```
//!
//! Items are opaque to the engine apart from three reserved fields: `id`,
//! `createdAt` and `updatedAt`. Consumers own the rest of the payload.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::ItemId;

/// Reserved item field: unique identifier within the collection.
pub const ID_FIELD: &str = "id";
/// Reserved item field: set once at creation, immutable afterwards.
pub const CREATED_AT_FIELD: &str = "createdAt";
/// Reserved item field: bumped on every local or merged write.
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// A single record in a collection: an opaque JSON object.
///
/// Ids are compared as strings; a numeric JSON id coerces to its decimal
/// representation so `1` and `"1"` address the same item.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Item(Map<String, Value>);

impl Item {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// The item id, coerced to a string.
    pub fn id(&self) -> Option<String> {
        coerce_id(self.0.get(ID_FIELD))
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.0.insert(ID_FIELD.into(), Value::String(id.into()));
    }

    pub fn created_at(&self) -> Option<&str> {
        self.0.get(CREATED_AT_FIELD).and_then(Value::as_str)
    }

    pub fn set_created_at(&mut self, ts: impl Into<String>) {
        self.0.insert(CREATED_AT_FIELD.into(), Value::String(ts.into()));
    }

    pub fn updated_at(&self) -> Option<&str> {
        self.0.get(UPDATED_AT_FIELD).and_then(Value::as_str)
    }

    pub fn set_updated_at(&mut self, ts: impl Into<String>) {
        self.0.insert(UPDATED_AT_FIELD.into(), Value::String(ts.into()));
    }

    /// The raw timestamp string that decides conflicts: `updatedAt` when
    /// present, otherwise `createdAt`.
    pub fn timestamp_field(&self) -> Option<&str> {
        self.updated_at().or_else(|| self.created_at())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Field-wise overlay: fields of `incoming` replace fields of `self`,
    /// fields only present in `self` survive.
    pub fn merged_with(&self, incoming: &Item) -> Item {
        let mut fields = self.0.clone();
        for (key, value) in &incoming.0 {
            fields.insert(key.clone(), value.clone());
        }
        Item(fields)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for Item {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// A deletion marker. Retained forever so late-merging replicas still learn
/// of the delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: ItemId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<String>,
}

impl Tombstone {
    pub fn new(id: impl Into<ItemId>, deleted_at: Option<String>) -> Self {
        Self {
            id: id.into(),
            deleted_at,
        }
    }
}

/// Collection metadata. Currently only the tombstone list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub deleted: Vec<Tombstone>,
}

/// The canonical persisted shape of one collection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub meta: Meta,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the item with the given id, comparing ids as strings.
    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.id().as_deref() == Some(id))
    }

    pub fn find_item(&self, id: &str) -> Option<&Item> {
        self.position_of(id).map(|ix| &self.items[ix])
    }

    pub fn push_item(&mut self, item: Item) {
        self.items.push(item);
    }

    /// Merge `changes` into the item with the given id and bump `updatedAt`.
    ///
    /// `createdAt` is immutable: a value smuggled in through `changes` is
    /// discarded in favor of the stored one.
    pub fn update_item(
        &mut self,
        id: &str,
        changes: &Map<String, Value>,
        updated_at: &str,
    ) -> Result<&Item> {
        let ix = self
            .position_of(id)
            .ok_or_else(|| Error::ItemNotFound(id.to_string()))?;
        let created_at = self.items[ix].created_at().map(str::to_owned);
        let mut merged = self.items[ix].merged_with(&Item::new(changes.clone()));
        if let Some(created_at) = created_at {
            merged.set_created_at(created_at);
        }
        merged.set_updated_at(updated_at);
        self.items[ix] = merged;
        Ok(&self.items[ix])
    }

    /// Remove the item with the given id, always recording a tombstone.
    ///
    /// Removing an absent id is not an error: the tombstone is still
    /// upserted (the delete may be racing a not-yet-merged create) and
    /// `None` is returned.
    pub fn remove_item(&mut self, id: &str, deleted_at: &str) -> Option<Item> {
        let removed = self.position_of(id).map(|ix| self.items.remove(ix));
        self.upsert_tombstone(Tombstone::new(id, Some(deleted_at.to_string())));
        removed
    }

    /// Insert or refresh a tombstone. An incoming `deletedAt` replaces the
    /// stored one; an incoming `None` keeps whatever is already recorded.
    pub fn upsert_tombstone(&mut self, tombstone: Tombstone) {
        match self
            .meta
            .deleted
            .iter_mut()
            .find(|existing| existing.id == tombstone.id)
        {
            Some(existing) => {
                if tombstone.deleted_at.is_some() {
                    existing.deleted_at = tombstone.deleted_at;
                }
            }
            None => self.meta.deleted.push(tombstone),
        }
    }

    pub fn has_items(&self) -> bool {
        !self.items.is_empty()
    }
}

fn coerce_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn id_from_string_or_number<'de, D>(deserializer: D) -> std::result::Result<ItemId, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    coerce_id(Some(&value))
        .ok_or_else(|| serde::de::Error::custom("tombstone id must be a string or number"))
}
