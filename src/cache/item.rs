//! Cached items and their lock accounting.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::common::types::SampleFormat;

/// Stable handle to a cached item. The generation guards against a slot
/// being reused after eviction: a stale id simply stops resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// Checked in-use counter. An item with a non-zero count must never be
/// evicted or freed.
#[derive(Debug, Default)]
pub(crate) struct LockCount(AtomicU32);

impl LockCount {
    pub fn acquire(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn release(&self) {
        let previous = self.0.fetch_sub(1, Ordering::Release);
        debug_assert!(previous > 0, "lock count underflow");
    }

    pub fn is_locked(&self) -> bool {
        self.0.load(Ordering::Acquire) > 0
    }
}

/// Pins a cached item against eviction while audio plays from it.
/// Dropping the guard releases the pin; the counter is shared through an
/// `Arc`, so the drop may happen on any thread without touching the
/// cache itself.
pub struct ItemGuard {
    pub(crate) id: ItemId,
    pub(crate) count: Arc<LockCount>,
}

impl ItemGuard {
    pub fn id(&self) -> ItemId {
        self.id
    }
}

impl Drop for ItemGuard {
    fn drop(&mut self) {
        self.count.release();
    }
}

/// Ordered list of frames owned by one item, linked through the frame
/// pool's `next` indices.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameChain {
    pub head: Option<u32>,
    pub tail: Option<u32>,
    pub count: u32,
}

impl FrameChain {
    pub fn new() -> Self {
        Self {
            head: None,
            tail: None,
            count: 0,
        }
    }
}

/// One cached, decoded, named asset.
pub(crate) struct CacheItem {
    pub name: String,
    pub format: SampleFormat,
    pub frames: FrameChain,
    pub bytes: usize,
    pub valid: bool,
    pub locks: Arc<LockCount>,
}

/// Arena slot holding either a live item or a free-list link. The MRU
/// list threads through occupied slots via `lru_prev`/`lru_next`.
pub(crate) struct ItemSlot {
    pub generation: u32,
    pub entry: Option<CacheItem>,
    pub next_free: Option<u32>,
    pub lru_prev: Option<u32>,
    pub lru_next: Option<u32>,
}

impl ItemSlot {
    pub fn new(next_free: Option<u32>) -> Self {
        Self {
            generation: 0,
            entry: None,
            next_free,
            lru_prev: None,
            lru_next: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_drop_releases_the_lock() {
        let count = Arc::new(LockCount::default());
        count.acquire();
        let guard = ItemGuard {
            id: ItemId {
                index: 0,
                generation: 0,
            },
            count: Arc::clone(&count),
        };
        assert!(count.is_locked());
        drop(guard);
        assert!(!count.is_locked());
    }

    #[test]
    fn nested_guards_keep_the_item_locked() {
        let count = Arc::new(LockCount::default());
        count.acquire();
        count.acquire();
        count.release();
        assert!(count.is_locked());
        count.release();
        assert!(!count.is_locked());
    }
}
