//! # Tillsync Engine
//!
//! The deterministic core of the Tillsync point-of-sale data layer.
//!
//! Each collection (`products`, `orders`, ...) is a single JSON document of
//! the shape `{ items: [...], meta: { deleted: [...] } }`. This crate owns
//! that document model and everything that can be computed without touching
//! the outside world: shape normalization, last-write-wins merging of delta
//! payloads, and tombstone-based delete propagation.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine has no knowledge of files, network, or platform
//! - **Deterministic**: the same inputs always produce the same outputs
//! - **Testable**: pure logic, no mocks needed
//!
//! The companion `tillsync-agent` crate supplies the impure half: the
//! file-backed store, the outbound queue, the HTTP client, and the timer
//! loop that drives sync cycles.
//!
//! ## Core Concepts
//!
//! ### Documents and Items
//!
//! An [`Item`] is an opaque JSON object with three reserved fields: `id`,
//! `createdAt`, and `updatedAt`. Timestamps are RFC 3339 strings; an item's
//! *effective* timestamp is `updatedAt`, falling back to `createdAt`.
//!
//! ### Tombstones
//!
//! Deletions are propagated as [`Tombstone`] markers in `meta.deleted`.
//! Tombstones are never garbage collected, so a replica that merges late
//! can still learn of the deletion. A tombstone in `meta.deleted` does not
//! imply the item is absent: recreation with a newer timestamp is legal.
//!
//! ### Merging
//!
//! [`merge::apply_delta`] folds a [`DeltaPayload`] (changed items plus
//! tombstones) into a [`Document`] using a last-write-wins rule with a
//! deliberate bias: on equal timestamps the incoming value wins. Applying
//! the same delta twice yields the same document as applying it once.
//!
//! ### Shapes
//!
//! Persisted collections have accumulated legacy shapes over time (a bare
//! array of items, a wrapper without `meta`). [`shape::RawShape`] names
//! them and [`shape::normalize`] upgrades everything to the canonical
//! document shape in one place.

pub mod document;
pub mod error;
pub mod merge;
pub mod shape;
pub mod timestamp;

pub use document::{Document, Item, Meta, Tombstone};
pub use error::Error;
pub use merge::{DeltaPayload, MergeReport};
pub use shape::RawShape;

/// Type aliases for clarity
pub type CollectionName = String;
pub type ItemId = String;
