//! The LRU-ordered sample cache over the item and frame pools.
//!
//! Structural mutation (load, evict, relink) is single-writer: every
//! mutating method takes `&mut self`, so the borrow checker enforces the
//! contract. Item pins are the exception: each item carries its own
//! atomic in-use counter behind an `Arc`, so a playback thread can drop
//! an [`ItemGuard`] while another thread is loading or evicting
//! unrelated items.

use std::io::{ErrorKind, Read};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::cache::item::{CacheItem, FrameChain, ItemGuard, ItemId, ItemSlot, LockCount};
use crate::cache::pool::FramePool;
use crate::cache::source::{AssetSource, OpenedAsset};
use crate::common::errors::CacheError;
use crate::common::types::SampleFormat;
use crate::config::CacheConfig;

/// Hit/miss/eviction counters, cheap to copy out.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Named, fully-decoded clips held in pooled frames with strict
/// LRU-skip-if-locked eviction.
pub struct SampleCache {
    slots: Vec<ItemSlot>,
    free_head: Option<u32>,
    pool: FramePool,
    /// Least-recently-used end of the item list.
    lru_head: Option<u32>,
    /// Most-recently-used end of the item list.
    lru_tail: Option<u32>,
    source: Option<Arc<dyn AssetSource>>,
    stats: CacheStats,
    len: usize,
}

impl SampleCache {
    /// Build a cache holding at most `max_items` clips inside
    /// `byte_budget / frame_bytes` pooled frames, all allocated up front.
    pub fn new(
        byte_budget: usize,
        max_items: usize,
        frame_bytes: usize,
    ) -> Result<Self, CacheError> {
        if frame_bytes == 0 || max_items == 0 {
            return Err(CacheError::OutOfMemory);
        }
        let frame_count = byte_budget / frame_bytes;
        if frame_count == 0 {
            return Err(CacheError::OutOfMemory);
        }

        let mut slots = Vec::with_capacity(max_items);
        for i in 0..max_items {
            let next = if i + 1 < max_items {
                Some(i as u32 + 1)
            } else {
                None
            };
            slots.push(ItemSlot::new(next));
        }

        debug!(
            "decode cache created: {} frames of {} bytes, {} item slots",
            frame_count, frame_bytes, max_items
        );
        Ok(Self {
            slots,
            free_head: Some(0),
            pool: FramePool::new(frame_count, frame_bytes),
            lru_head: None,
            lru_tail: None,
            source: None,
            stats: CacheStats::default(),
            len: 0,
        })
    }

    pub fn with_config(config: &CacheConfig) -> Result<Self, CacheError> {
        Self::new(config.byte_budget, config.max_items, config.frame_bytes)
    }

    /// Register the asset-open collaborator, returning the previous one.
    pub fn set_source(&mut self, source: Arc<dyn AssetSource>) -> Option<Arc<dyn AssetSource>> {
        self.source.replace(source)
    }

    /// Find a valid item by name. Does not touch the MRU order.
    pub fn lookup(&self, name: &str) -> Option<ItemId> {
        let mut cursor = self.lru_tail;
        while let Some(index) = cursor {
            let slot = &self.slots[index as usize];
            if let Some(entry) = &slot.entry {
                if entry.valid && entry.name == name {
                    return Some(ItemId {
                        index,
                        generation: slot.generation,
                    });
                }
            }
            cursor = slot.lru_prev;
        }
        None
    }

    /// Serve `name` from the cache, loading it through the registered
    /// source on a miss. A hit is promoted to the MRU end. The only
    /// legitimately fallible entry point: `Missing`, `OutOfMemory`, and
    /// `Io` all leave the cache consistent with no leaked pool slots.
    pub fn load(&mut self, name: &str) -> Result<ItemId, CacheError> {
        if let Some(id) = self.lookup(name) {
            self.unlink(id.index);
            self.link_mru(id.index);
            self.stats.hits += 1;
            trace!("cache hit: {}", name);
            return Ok(id);
        }

        let Some(source) = self.source.clone() else {
            return Err(CacheError::Missing(name.to_string()));
        };
        let Some(opened) = source.open(name) else {
            debug!("asset not found: {}", name);
            return Err(CacheError::Missing(name.to_string()));
        };
        let OpenedAsset { format, mut reader } = opened;

        let index = self.alloc_slot()?;
        let mut chain = FrameChain::new();
        let mut total = 0usize;

        loop {
            let frame = loop {
                if let Some(frame) = self.pool.acquire() {
                    break frame;
                }
                if !self.evict_lru() {
                    self.release_chain(&chain);
                    self.release_slot(index);
                    warn!("cache overflow while loading: {}", name);
                    return Err(CacheError::OutOfMemory);
                }
            };

            let filled = match fill_frame(reader.as_mut(), self.pool.buffer_mut(frame)) {
                Ok(n) => n,
                Err(source) => {
                    self.pool.release(frame);
                    self.release_chain(&chain);
                    self.release_slot(index);
                    return Err(CacheError::Io {
                        name: name.to_string(),
                        source,
                    });
                }
            };
            if filled == 0 {
                self.pool.release(frame);
                break;
            }
            self.pool.set_used(frame, filled);
            self.chain_push(&mut chain, frame);
            total += filled;
            if filled < self.pool.frame_bytes() {
                break; // asset exhausted
            }
        }

        let generation = {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(CacheItem {
                name: name.to_string(),
                format,
                frames: chain,
                bytes: total,
                valid: true,
                locks: Arc::new(LockCount::default()),
            });
            slot.generation
        };
        self.link_mru(index);
        self.len += 1;
        self.stats.misses += 1;
        debug!("cached {}: {} bytes in {} frames", name, total, chain.count);
        Ok(ItemId { index, generation })
    }

    /// Pin an item against eviction. The guard's drop releases the pin
    /// and may happen on any thread.
    pub fn lock(&self, id: ItemId) -> Option<ItemGuard> {
        let entry = self.entry(id)?;
        entry.locks.acquire();
        Some(ItemGuard {
            id,
            count: Arc::clone(&entry.locks),
        })
    }

    /// Evict the least-recently-used unlocked item. `false` when every
    /// remaining item is locked (or the cache is empty).
    pub fn evict_lru(&mut self) -> bool {
        let mut cursor = self.lru_head;
        while let Some(index) = cursor {
            let (evictable, next) = {
                let slot = &self.slots[index as usize];
                let evictable = slot
                    .entry
                    .as_ref()
                    .is_some_and(|entry| !entry.locks.is_locked());
                (evictable, slot.lru_next)
            };
            if evictable {
                if let Some(entry) = &self.slots[index as usize].entry {
                    debug!("evicting {} ({} bytes)", entry.name, entry.bytes);
                }
                self.evict_at(index);
                self.stats.evictions += 1;
                return true;
            }
            cursor = next;
        }
        false
    }

    /// Detach one item explicitly: frames back to the frame pool, slot
    /// back to the item pool. Rejected while the item is locked; a stale
    /// id is a no-op.
    pub fn free_item(&mut self, id: ItemId) -> Result<(), CacheError> {
        let Some(entry) = self.entry(id) else {
            return Ok(());
        };
        if entry.locks.is_locked() {
            warn!("refusing to free locked item: {}", entry.name);
            return Err(CacheError::ItemLocked);
        }
        self.evict_at(id.index);
        Ok(())
    }

    /// Mark every item invalid: excluded from lookup, memory retained,
    /// locked items untouched. Used when the backing source changes.
    pub fn invalidate_all(&mut self) {
        let mut invalidated = 0;
        for slot in &mut self.slots {
            if let Some(entry) = &mut slot.entry {
                entry.valid = false;
                invalidated += 1;
            }
        }
        debug!("invalidated {} cached items", invalidated);
    }

    /// Invalidate everything, then evict until nothing unlocked remains.
    pub fn flush(&mut self) {
        self.invalidate_all();
        while self.evict_lru() {}
    }

    /// Iterate the decoded byte chunks of an item, in order.
    pub fn frames(&self, id: ItemId) -> Option<Frames<'_>> {
        let entry = self.entry(id)?;
        Some(Frames {
            pool: &self.pool,
            cursor: entry.frames.head,
        })
    }

    pub fn name(&self, id: ItemId) -> Option<&str> {
        self.entry(id).map(|entry| entry.name.as_str())
    }

    pub fn format(&self, id: ItemId) -> Option<SampleFormat> {
        self.entry(id).map(|entry| entry.format)
    }

    /// Total decoded bytes of an item.
    pub fn bytes(&self, id: ItemId) -> Option<usize> {
        self.entry(id).map(|entry| entry.bytes)
    }

    pub fn frame_count(&self, id: ItemId) -> Option<u32> {
        self.entry(id).map(|entry| entry.frames.count)
    }

    pub fn is_valid(&self, id: ItemId) -> bool {
        self.entry(id).is_some_and(|entry| entry.valid)
    }

    pub fn is_locked(&self, id: ItemId) -> bool {
        self.entry(id).is_some_and(|entry| entry.locks.is_locked())
    }

    /// Number of live items, valid or not.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn free_frames(&self) -> usize {
        self.pool.free_frames()
    }

    /// Total frames in the pool, free or checked out.
    pub fn frame_capacity(&self) -> usize {
        self.pool.capacity()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    // ── internals ────────────────────────────────────────────────────────────

    fn entry(&self, id: ItemId) -> Option<&CacheItem> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    fn alloc_slot(&mut self) -> Result<u32, CacheError> {
        loop {
            if let Some(index) = self.free_head {
                let slot = &mut self.slots[index as usize];
                self.free_head = slot.next_free;
                slot.next_free = None;
                return Ok(index);
            }
            if !self.evict_lru() {
                warn!("item pool exhausted and nothing evictable");
                return Err(CacheError::OutOfMemory);
            }
        }
    }

    fn release_slot(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        debug_assert!(slot.entry.is_none());
        slot.next_free = self.free_head;
        self.free_head = Some(index);
    }

    fn release_chain(&mut self, chain: &FrameChain) {
        let mut cursor = chain.head;
        while let Some(index) = cursor {
            let next = self.pool.next(index);
            self.pool.release(index);
            cursor = next;
        }
    }

    fn evict_at(&mut self, index: u32) {
        self.unlink(index);
        let entry = {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.entry.take()
        };
        self.release_slot(index);
        if let Some(entry) = entry {
            self.release_chain(&entry.frames);
            self.len -= 1;
        }
    }

    fn chain_push(&mut self, chain: &mut FrameChain, frame: u32) {
        match chain.tail {
            Some(tail) => self.pool.set_next(tail, Some(frame)),
            None => chain.head = Some(frame),
        }
        chain.tail = Some(frame);
        chain.count += 1;
    }

    fn unlink(&mut self, index: u32) {
        let (prev, next) = {
            let slot = &self.slots[index as usize];
            (slot.lru_prev, slot.lru_next)
        };
        match prev {
            Some(p) => self.slots[p as usize].lru_next = next,
            None => self.lru_head = next,
        }
        match next {
            Some(n) => self.slots[n as usize].lru_prev = prev,
            None => self.lru_tail = prev,
        }
        let slot = &mut self.slots[index as usize];
        slot.lru_prev = None;
        slot.lru_next = None;
    }

    fn link_mru(&mut self, index: u32) {
        let tail = self.lru_tail;
        {
            let slot = &mut self.slots[index as usize];
            slot.lru_prev = tail;
            slot.lru_next = None;
        }
        match tail {
            Some(t) => self.slots[t as usize].lru_next = Some(index),
            None => self.lru_head = Some(index),
        }
        self.lru_tail = Some(index);
    }
}

/// Iterator over an item's decoded byte chunks.
pub struct Frames<'a> {
    pool: &'a FramePool,
    cursor: Option<u32>,
}

impl<'a> Iterator for Frames<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        let index = self.cursor?;
        self.cursor = self.pool.next(index);
        Some(self.pool.data(index))
    }
}

/// Read until `buf` is full or the reader is exhausted. A count below
/// `buf.len()` means end of asset; only a hard error is an error.
fn fill_frame(reader: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Cursor;

    use super::*;

    struct MemorySource {
        assets: HashMap<String, Vec<u8>>,
    }

    impl MemorySource {
        fn new() -> Self {
            Self {
                assets: HashMap::new(),
            }
        }

        fn with(mut self, name: &str, bytes: Vec<u8>) -> Self {
            self.assets.insert(name.to_string(), bytes);
            self
        }
    }

    impl AssetSource for MemorySource {
        fn open(&self, name: &str) -> Option<OpenedAsset> {
            let bytes = self.assets.get(name)?.clone();
            Some(OpenedAsset {
                format: SampleFormat::default(),
                reader: Box::new(Cursor::new(bytes)),
            })
        }
    }

    struct FailingSource;

    struct FailingReader;

    impl std::io::Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("backing store went away"))
        }
    }

    impl AssetSource for FailingSource {
        fn open(&self, _name: &str) -> Option<OpenedAsset> {
            Some(OpenedAsset {
                format: SampleFormat::default(),
                reader: Box::new(FailingReader),
            })
        }
    }

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(3).wrapping_add(seed)).collect()
    }

    /// 4 frames of 16 bytes, 4 item slots.
    fn small_cache(source: MemorySource) -> SampleCache {
        let mut cache = SampleCache::new(64, 4, 16).unwrap();
        cache.set_source(Arc::new(source));
        cache
    }

    #[test]
    fn zero_budgets_are_rejected() {
        assert!(matches!(
            SampleCache::new(0, 4, 16),
            Err(CacheError::OutOfMemory)
        ));
        assert!(matches!(
            SampleCache::new(64, 0, 16),
            Err(CacheError::OutOfMemory)
        ));
        assert!(matches!(
            SampleCache::new(64, 4, 0),
            Err(CacheError::OutOfMemory)
        ));
    }

    #[test]
    fn load_without_source_is_missing() {
        let mut cache = SampleCache::new(64, 4, 16).unwrap();
        assert!(matches!(cache.load("boom"), Err(CacheError::Missing(_))));
    }

    #[test]
    fn load_unknown_name_is_missing() {
        let mut cache = small_cache(MemorySource::new());
        assert!(matches!(cache.load("nope"), Err(CacheError::Missing(_))));
        assert!(cache.is_empty());
    }

    #[test]
    fn frames_concatenate_to_the_asset_bytes() {
        let data = pattern(50, 7);
        let mut cache = small_cache(MemorySource::new().with("clip", data.clone()));

        let id = cache.load("clip").unwrap();
        assert_eq!(cache.bytes(id), Some(50));
        assert_eq!(cache.frame_count(id), Some(4));

        let collected: Vec<u8> = cache.frames(id).unwrap().flatten().copied().collect();
        assert_eq!(collected, data);
    }

    #[test]
    fn second_load_is_a_hit_with_no_new_frames() {
        let mut cache = small_cache(
            MemorySource::new()
                .with("a", pattern(20, 1))
                .with("b", pattern(10, 2)),
        );

        let first = cache.load("a").unwrap();
        cache.load("b").unwrap();
        let free_before = cache.free_frames();

        let second = cache.load("a").unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.free_frames(), free_before);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 2);

        // The hit moved "a" to the MRU end, so "b" is now the LRU victim.
        assert!(cache.evict_lru());
        assert!(cache.lookup("b").is_none());
        assert!(cache.lookup("a").is_some());
    }

    #[test]
    fn filling_item_slots_evicts_exactly_the_lru() {
        let mut cache = SampleCache::new(256, 2, 16).unwrap();
        cache.set_source(Arc::new(
            MemorySource::new()
                .with("a", pattern(10, 1))
                .with("b", pattern(10, 2))
                .with("c", pattern(10, 3)),
        ));

        cache.load("a").unwrap();
        cache.load("b").unwrap();
        cache.load("c").unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.lookup("a").is_none());
        assert!(cache.lookup("b").is_some());
        assert!(cache.lookup("c").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn locked_items_survive_overflow() {
        let mut cache = SampleCache::new(256, 2, 16).unwrap();
        cache.set_source(Arc::new(
            MemorySource::new()
                .with("a", pattern(10, 1))
                .with("b", pattern(10, 2))
                .with("c", pattern(10, 3)),
        ));

        let a = cache.load("a").unwrap();
        let b = cache.load("b").unwrap();
        let _guard_a = cache.lock(a).unwrap();
        let _guard_b = cache.lock(b).unwrap();

        assert!(matches!(cache.load("c"), Err(CacheError::OutOfMemory)));
        assert_eq!(cache.len(), 2);
        assert!(cache.lookup("a").is_some());
        assert!(cache.lookup("b").is_some());
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn frame_exhaustion_mid_copy_evicts_and_retries() {
        // 4 frames total; "a" takes 3, so "b" (3 frames) must evict it
        // halfway through its own copy.
        let mut cache = small_cache(
            MemorySource::new()
                .with("a", pattern(48, 1))
                .with("b", pattern(40, 2)),
        );

        cache.load("a").unwrap();
        let b = cache.load("b").unwrap();

        assert!(cache.lookup("a").is_none());
        let collected: Vec<u8> = cache.frames(b).unwrap().flatten().copied().collect();
        assert_eq!(collected, pattern(40, 2));
        assert_eq!(cache.free_frames(), 1);
    }

    #[test]
    fn oversized_asset_fails_and_leaks_nothing() {
        let mut cache = small_cache(MemorySource::new().with("huge", pattern(200, 1)));

        assert!(matches!(cache.load("huge"), Err(CacheError::OutOfMemory)));
        assert!(cache.is_empty());
        assert_eq!(cache.free_frames(), 4);
    }

    #[test]
    fn read_failure_tears_down_the_partial_item() {
        let mut cache = SampleCache::new(64, 4, 16).unwrap();
        cache.set_source(Arc::new(FailingSource));

        assert!(matches!(cache.load("clip"), Err(CacheError::Io { .. })));
        assert!(cache.is_empty());
        assert_eq!(cache.free_frames(), 4);
    }

    #[test]
    fn free_item_is_rejected_while_locked() {
        let mut cache = small_cache(MemorySource::new().with("a", pattern(20, 1)));
        let id = cache.load("a").unwrap();
        let guard = cache.lock(id).unwrap();

        assert!(matches!(cache.free_item(id), Err(CacheError::ItemLocked)));
        assert!(cache.lookup("a").is_some());
        assert_eq!(cache.frame_count(id), Some(2));

        drop(guard);
        cache.free_item(id).unwrap();
        assert!(cache.lookup("a").is_none());
        assert_eq!(cache.free_frames(), 4);
    }

    #[test]
    fn guard_can_be_dropped_on_another_thread() {
        let mut cache = small_cache(MemorySource::new().with("a", pattern(20, 1)));
        let id = cache.load("a").unwrap();
        let guard = cache.lock(id).unwrap();

        std::thread::spawn(move || drop(guard)).join().unwrap();
        assert!(!cache.is_locked(id));
    }

    #[test]
    fn lookup_does_not_promote() {
        let mut cache = SampleCache::new(256, 2, 16).unwrap();
        cache.set_source(Arc::new(
            MemorySource::new()
                .with("a", pattern(10, 1))
                .with("b", pattern(10, 2))
                .with("c", pattern(10, 3)),
        ));

        cache.load("a").unwrap();
        cache.load("b").unwrap();
        cache.lookup("a").unwrap();
        cache.load("c").unwrap();

        // "a" stayed at the LRU end despite the lookup.
        assert!(cache.lookup("a").is_none());
        assert!(cache.lookup("b").is_some());
    }

    #[test]
    fn invalidate_hides_items_but_keeps_memory() {
        let mut cache = small_cache(MemorySource::new().with("a", pattern(20, 1)));
        let id = cache.load("a").unwrap();
        let free_after_load = cache.free_frames();

        cache.invalidate_all();
        assert!(cache.lookup("a").is_none());
        assert!(!cache.is_valid(id));
        assert_eq!(cache.free_frames(), free_after_load);
        assert_eq!(cache.len(), 1);

        // A reload is a fresh miss; the stale copy becomes evictable prey.
        cache.load("a").unwrap();
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn flush_leaves_an_empty_cache() {
        let mut cache = small_cache(
            MemorySource::new()
                .with("a", pattern(20, 1))
                .with("b", pattern(20, 2)),
        );
        cache.load("a").unwrap();
        cache.load("b").unwrap();

        cache.flush();
        assert!(cache.is_empty());
        assert_eq!(cache.free_frames(), cache.frame_capacity());
    }

    #[test]
    fn stale_ids_stop_resolving_after_eviction() {
        let mut cache = small_cache(MemorySource::new().with("a", pattern(20, 1)));
        let id = cache.load("a").unwrap();
        cache.free_item(id).unwrap();

        assert!(cache.frames(id).is_none());
        assert!(cache.lock(id).is_none());
        assert!(!cache.is_valid(id));

        // The slot is reused under a new generation; the old id stays dead.
        let fresh = cache.load("a").unwrap();
        assert_ne!(id, fresh);
        assert!(cache.frames(id).is_none());
    }

    #[test]
    fn zero_byte_asset_is_a_valid_empty_item() {
        let mut cache = small_cache(MemorySource::new().with("silence", Vec::new()));
        let id = cache.load("silence").unwrap();
        assert_eq!(cache.bytes(id), Some(0));
        assert_eq!(cache.frame_count(id), Some(0));
        assert!(cache.is_valid(id));
        assert_eq!(cache.free_frames(), 4);
    }
}
