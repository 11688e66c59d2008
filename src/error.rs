use std::collections::TryReserveError;

use thiserror::Error;

/// Errors returned by the fallible operations of the map and set.
///
/// Ordinary outcomes such as a duplicate key on insert or a missing key on
/// erase are reported through `bool` and `Option` return values, not here.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage for a new node could not be allocated.
    /// The tree was left unchanged.
    #[error("failed to allocate a tree node: {0}")]
    Alloc(#[from] TryReserveError),
}
