//! Buffered audio delivery: segmented stream buffers plus a pooled,
//! LRU-ordered decode cache.
//!
//! Two independent pieces share this crate:
//!
//! - [`stream`]: a fixed-capacity ring of memory segments with one
//!   producer cursor and one consumer cursor, so a decoder can run ahead
//!   of a real-time playback callback without copying and without either
//!   side blocking the other.
//! - [`cache`]: fully-decoded short clips held in fixed-size pooled
//!   frames, served by name with least-recently-used eviction.
//!
//! Neither piece decodes audio or talks to a device; both sit between a
//! byte producer (decoder, file reader) and whatever consumes the bytes.

pub mod cache;
pub mod common;
pub mod config;
pub mod constants;
pub mod stream;

pub use cache::{
    AssetSource, CacheStats, FsAssetSource, ItemGuard, ItemId, OpenedAsset, SampleCache,
};
pub use common::{CacheError, SampleFormat, StreamError};
pub use config::{CacheConfig, Config, StreamConfig};
pub use stream::{FileTransfer, Role, Stream, StreamConsumer, StreamProducer, TransferProfile};
