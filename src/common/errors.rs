//! Error taxonomy for the buffering subsystem.
//!
//! Stream primitives never error on a short transfer; partial counts are
//! the normal path and callers must check them. The variants here cover
//! the genuinely fallible entry points: acquisition, file-backed
//! transfers, and cache loads.

use thiserror::Error;

use crate::stream::Role;

/// Failures raised by [`crate::stream::Stream`] and its accessors.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The role is already held; the existing accessor is untouched.
    #[error("{0} accessor is already acquired")]
    AlreadyAcquired(Role),

    /// A file-like collaborator failed mid-transfer.
    #[error("stream transfer i/o failure")]
    Io(#[from] std::io::Error),
}

/// Failures raised by [`crate::cache::SampleCache`].
#[derive(Debug, Error)]
pub enum CacheError {
    /// The registered asset source could not open the name.
    #[error("asset `{0}` was not found")]
    Missing(String),

    /// A pool ran dry and no unlocked item was left to evict.
    #[error("cache exhausted and nothing is evictable")]
    OutOfMemory,

    /// Reading asset bytes failed; the partially-built item was torn down.
    #[error("i/o failure while caching `{name}`")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The item's in-use count is non-zero; it was left intact.
    #[error("item is locked")]
    ItemLocked,
}
