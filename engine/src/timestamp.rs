//! Timestamp parsing and the last-write-wins comparison rules.
//!
//! All sync timestamps travel as RFC 3339 strings (`2024-03-01T12:00:00.000Z`).
//! Parsing is the only place where "newer" is decided, so the whole conflict
//! policy lives here:
//!
//! 1. An incoming item whose timestamp cannot be parsed loses.
//! 2. A current item whose timestamp cannot be parsed loses to a parsable one.
//! 3. Otherwise the incoming item wins on greater-or-equal comparison; ties
//!    favor the just-pulled value.
//!
//! Tombstones are delete-biased: when either side of the comparison is
//! unparsable the deletion applies.

use chrono::{DateTime, Utc};

use crate::document::{Item, Tombstone};

/// Parse an RFC 3339 timestamp string. Anything unparsable is `None`.
pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// The effective timestamp of an item: `updatedAt`, falling back to
/// `createdAt` when `updatedAt` is missing.
pub fn effective(item: &Item) -> Option<DateTime<Utc>> {
    item.timestamp_field().and_then(parse)
}

/// Whether an incoming item should replace the current one.
pub fn incoming_wins(incoming: &Item, current: &Item) -> bool {
    match (effective(incoming), effective(current)) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(incoming_ts), Some(current_ts)) => incoming_ts >= current_ts,
    }
}

/// Whether a tombstone supersedes the item it points at.
pub fn tombstone_wins(tombstone: &Tombstone, item: &Item) -> bool {
    let deleted_ts = tombstone.deleted_at.as_deref().and_then(parse);
    match (deleted_ts, effective(item)) {
        (Some(deleted), Some(current)) => deleted >= current,
        // Unparsable on either side: the deletion applies.
        _ => true,
    }
}
