//! Pooled decode cache for short, fully-decoded audio clips.
//!
//! A [`SampleCache`] owns two fixed pools (one of [`item`] slots, one of
//! fixed-size frames) and an MRU-ordered list of named items. A lookup
//! hit promotes the item; a miss streams the asset's bytes into pooled
//! frames, evicting the least-recently-used unlocked item whenever either
//! pool runs dry. Locked items are never evicted.

pub mod item;
pub mod pool;
pub mod source;
pub mod store;

pub use item::{ItemGuard, ItemId};
pub use source::{AssetSource, FsAssetSource, OpenedAsset};
pub use store::{CacheStats, Frames, SampleCache};
