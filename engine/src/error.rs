//! Error types for the Tillsync engine.

use crate::ItemId;
use thiserror::Error;

/// All possible errors from the Tillsync engine.
///
/// The engine never fails fatally: a malformed document is normalized away
/// before it reaches any operation, so the only thing left to go wrong is
/// addressing an item that is not there.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("item not found: {0}")]
    ItemNotFound(ItemId),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
