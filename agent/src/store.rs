//! The file-backed collection store.
//!
//! One JSON file per collection inside the data directory. Reads are
//! corruption-tolerant: a file that no longer parses is renamed to a
//! `.corrupted-<millis>` sidecar for forensics and replaced with the
//! collection default, so a bad file can never keep the application from
//! starting.
//!
//! The store takes no cross-process lock; concurrent external writers to
//! the same file are not supported. Within this process, every mutator
//! re-reads the file before writing to keep the lost-update window small.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use tillsync_engine::{shape, Document, Item, Tombstone};

use crate::collections;
use crate::error::StoreError;

/// Current time as the RFC 3339 string every sync timestamp uses.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Outcome of removing an item: the item (when it existed) and the
/// tombstone that now records the deletion.
#[derive(Debug, Clone)]
pub struct Removal {
    pub item: Option<Item>,
    pub tombstone: Tombstone,
}

/// Durable, corruption-tolerant access to the collection files.
#[derive(Debug, Clone)]
pub struct CollectionStore {
    data_dir: PathBuf,
}

impl CollectionStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn path_for(&self, collection: &str) -> Result<PathBuf, StoreError> {
        let file = collections::file_name(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;
        Ok(self.data_dir.join(file))
    }

    /// Read a collection file as raw JSON, repairing as needed.
    ///
    /// A missing file is created with the collection default; an
    /// unparsable one is quarantined and replaced with the default. Both
    /// cases return the default rather than an error.
    pub async fn read_value(&self, collection: &str) -> Result<Value, StoreError> {
        let path = self.path_for(collection)?;
        let default = collections::default_document(collection);

        match fs::read(&path).await {
            Ok(bytes) => match parse_document_bytes(&bytes) {
                Some(value) => Ok(value),
                None => {
                    self.quarantine(collection, &path).await;
                    self.write_raw(&path, &default).await?;
                    Ok(default)
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                self.write_raw(&path, &default).await?;
                Ok(default)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Read a collection as a canonical document.
    pub async fn read(&self, collection: &str) -> Result<Document, StoreError> {
        let raw = self.read_value(collection).await?;
        Ok(shape::normalize_or_default(&raw))
    }

    /// Overwrite a collection file with a raw JSON payload.
    pub async fn write_value(&self, collection: &str, value: &Value) -> Result<(), StoreError> {
        let path = self.path_for(collection)?;
        self.write_raw(&path, value).await
    }

    /// Overwrite a collection file with a canonical document.
    pub async fn write(&self, collection: &str, doc: &Document) -> Result<(), StoreError> {
        self.write_value(collection, &serde_json::to_value(doc)?).await
    }

    /// Append an item, assigning `id` / `createdAt` / `updatedAt` when
    /// missing. Returns the item as persisted.
    pub async fn add_item(
        &self,
        collection: &str,
        fields: Map<String, Value>,
    ) -> Result<Item, StoreError> {
        let mut doc = self.read(collection).await?;

        let mut item = Item::new(fields);
        if item.id().is_none() {
            item.set_id(Uuid::new_v4().to_string());
        }
        let now = now_iso();
        if item.created_at().is_none() {
            item.set_created_at(now.clone());
        }
        if item.updated_at().is_none() {
            item.set_updated_at(now);
        }

        doc.push_item(item.clone());
        self.write(collection, &doc).await?;
        debug!(collection, id = ?item.id(), "item added");
        Ok(item)
    }

    /// Merge `changes` into an existing item and bump its `updatedAt`.
    pub async fn update_item(
        &self,
        collection: &str,
        id: &str,
        changes: Map<String, Value>,
    ) -> Result<Item, StoreError> {
        let mut doc = self.read(collection).await?;
        let updated = doc.update_item(id, &changes, &now_iso())?.clone();
        self.write(collection, &doc).await?;
        Ok(updated)
    }

    /// Remove an item and record its tombstone. Removing an unknown id is
    /// not an error; the tombstone is recorded either way.
    pub async fn remove_item(&self, collection: &str, id: &str) -> Result<Removal, StoreError> {
        let mut doc = self.read(collection).await?;
        let now = now_iso();
        let item = doc.remove_item(id, &now);
        self.write(collection, &doc).await?;
        Ok(Removal {
            item,
            tombstone: Tombstone::new(id, Some(now)),
        })
    }

    /// Reset a collection to its default document.
    pub async fn reset(&self, collection: &str) -> Result<Value, StoreError> {
        let default = collections::default_document(collection);
        self.write_value(collection, &default).await?;
        Ok(default)
    }

    async fn write_raw(&self, path: &Path, value: &Value) -> Result<(), StoreError> {
        fs::create_dir_all(&self.data_dir).await?;
        let json = serde_json::to_vec_pretty(value)?;
        // Write-then-rename keeps a crashed write from leaving a torn file
        // where the collection used to be.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn quarantine(&self, collection: &str, path: &Path) {
        let sidecar = self
            .data_dir
            .join(format!("{collection}.corrupted-{}.json", Utc::now().timestamp_millis()));
        match fs::rename(path, &sidecar).await {
            Ok(()) => warn!(
                collection,
                sidecar = %sidecar.display(),
                "collection file was corrupt; quarantined and reset to default"
            ),
            Err(err) => warn!(
                collection,
                %err,
                "collection file was corrupt and could not be quarantined; overwriting"
            ),
        }
    }
}

/// Parse collection file bytes, treating empty files, BOM/null-byte
/// artifacts and non-JSON content as corruption (`None`).
fn parse_document_bytes(bytes: &[u8]) -> Option<Value> {
    let text = std::str::from_utf8(bytes).ok()?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}
