//! The segmented circular stream shared by one producer and one consumer.
//!
//! All cursor state sits behind one `parking_lot::Mutex`; every operation
//! takes the lock for its full duration, including the copy of a
//! file-like transfer. Transfers are synchronous; there is no in-flight
//! state to cancel, and every primitive returns a partial count instead
//! of blocking.
//!
//! The two cursors coordinate purely through wrapping byte counters: a
//! commit on one side credits the peer's `bytes_in`, so the consumer can
//! never see bytes the producer has not committed, and the producer
//! reclaims space only as the consumer commits reads.

use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::common::errors::StreamError;
use crate::config::StreamConfig;
use crate::constants::COUNTER_SEED;
use crate::stream::accessor::{
    AccessorState, FileTransfer, Role, StreamConsumer, StreamProducer,
};
use crate::stream::segment::Segment;

/// A fixed-capacity segmented ring buffer with two role-bound cursors.
///
/// Segments are added while the stream is idle; the first acquisition of
/// either role resets the ring (empty for the consumer, full for the
/// producer) and freezes the topology until both roles are released.
pub struct Stream {
    core: Arc<StreamCore>,
}

pub(crate) struct StreamCore {
    state: Mutex<StreamState>,
}

struct StreamState {
    segments: Vec<Segment>,
    total_bytes: u32,
    accessors: [AccessorState; 2],
}

impl Stream {
    /// An empty stream: no segments, both accessors idle.
    pub fn new() -> Self {
        Self {
            core: Arc::new(StreamCore {
                state: Mutex::new(StreamState {
                    segments: Vec::new(),
                    total_bytes: 0,
                    accessors: [AccessorState::new(), AccessorState::new()],
                }),
            }),
        }
    }

    /// A stream pre-populated from config.
    pub fn with_config(config: &StreamConfig) -> Self {
        let stream = Self::new();
        stream.add_segments(config.segment_count, config.segment_bytes, config.align);
        stream
    }

    /// Append one fixed-size segment to the ring. The size is rounded up
    /// to the requested power-of-two alignment.
    ///
    /// # Panics
    /// If either accessor is currently acquired.
    pub fn add_segment(&self, bytes: usize, align: usize) {
        let mut state = self.core.state.lock();
        assert!(
            !state.held_any(),
            "segment topology cannot change while the stream is acquired"
        );
        assert!(bytes > 0, "segment size must be non-zero");
        let segment = Segment::new(bytes, align);
        state.total_bytes += segment.len() as u32;
        state.segments.push(segment);
    }

    /// Append `count` segments of the same size.
    pub fn add_segments(&self, count: usize, bytes: usize, align: usize) {
        for _ in 0..count {
            self.add_segment(bytes, align);
        }
    }

    /// Drop every segment.
    ///
    /// # Panics
    /// If either accessor is currently acquired.
    pub fn clear_segments(&self) {
        let mut state = self.core.state.lock();
        assert!(
            !state.held_any(),
            "segment topology cannot change while the stream is acquired"
        );
        state.segments.clear();
        state.total_bytes = 0;
        state.reset();
    }

    /// Rewind both cursors and mark the ring empty-for-consumer,
    /// full-for-producer. Happens implicitly on first acquisition.
    ///
    /// # Panics
    /// If either accessor is currently acquired.
    pub fn reset(&self) {
        let mut state = self.core.state.lock();
        assert!(!state.held_any(), "cannot reset an acquired stream");
        state.reset();
    }

    /// Acquire the write side.
    pub fn acquire_producer(&self) -> Result<StreamProducer, StreamError> {
        self.acquire(Role::Producer)?;
        Ok(StreamProducer {
            core: Arc::clone(&self.core),
        })
    }

    /// Acquire the read side.
    pub fn acquire_consumer(&self) -> Result<StreamConsumer, StreamError> {
        self.acquire(Role::Consumer)?;
        Ok(StreamConsumer {
            core: Arc::clone(&self.core),
        })
    }

    fn acquire(&self, role: Role) -> Result<(), StreamError> {
        let mut state = self.core.state.lock();
        if state.accessors[role.index()].held {
            warn!("{} access to stream refused: already acquired", role);
            return Err(StreamError::AlreadyAcquired(role));
        }
        assert!(
            !state.segments.is_empty(),
            "acquire on a stream with no segments"
        );
        if !state.held_any() {
            state.reset();
            debug!(
                "stream reset on acquisition: {} segments, {} bytes",
                state.segments.len(),
                state.total_bytes
            );
        }
        state.accessors[role.index()].held = true;
        Ok(())
    }

    /// Total ring capacity in bytes.
    pub fn total_bytes(&self) -> u32 {
        self.core.state.lock().total_bytes
    }

    /// Bytes written by the producer and not yet consumed.
    pub fn buffered_bytes(&self) -> u32 {
        self.core.available(Role::Consumer)
    }

    /// Free space remaining before the ring is full.
    pub fn space_till_full(&self) -> u32 {
        self.core.available(Role::Producer)
    }

    /// True once the producer has filled the entire ring.
    pub fn is_full(&self) -> bool {
        self.space_till_full() == 0
    }

    /// True while at least one role is held.
    pub fn is_acquired(&self) -> bool {
        self.core.state.lock().held_any()
    }

    pub fn segment_count(&self) -> usize {
        self.core.state.lock().segments.len()
    }
}

impl Default for Stream {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamState {
    fn held_any(&self) -> bool {
        self.accessors.iter().any(|accessor| accessor.held)
    }

    fn next_segment(&self, index: usize) -> usize {
        (index + 1) % self.segments.len()
    }

    /// Full reset: every region back to its whole block, both cursors on
    /// segment 0, counters reseeded, and the producer pre-credited with
    /// the entire capacity.
    fn reset(&mut self) {
        for segment in &mut self.segments {
            segment.reset();
        }
        for accessor in &mut self.accessors {
            accessor.bytes_in = COUNTER_SEED;
            accessor.bytes_out = COUNTER_SEED;
            accessor.position = 0;
            accessor.start_segment = 0;
            accessor.rewind(0);
        }
        let producer = &mut self.accessors[Role::Producer.index()];
        producer.bytes_in = producer.bytes_in.wrapping_add(self.total_bytes);
    }

    fn rewind_accessor(&mut self, role: Role) {
        let idx = role.index();
        let start = self.accessors[idx].start_segment;
        let offset = if self.segments.is_empty() {
            0
        } else {
            self.segments[start].region(role).offset
        };
        self.accessors[idx].rewind(offset);
    }

    /// Recompute the visible block and move the cursor forward by up to
    /// `bytes`, crossing segments and wrapping at the ring end. Returns
    /// the clamped count actually advanced.
    fn advance(&mut self, role: Role, bytes: u32) -> u32 {
        let idx = role.index();
        let total = self.accessors[idx].available();
        debug_assert!(self.accessors[idx].pending <= total);

        let mut bytes_available = total - self.accessors[idx].pending;
        if bytes_available == 0 {
            self.accessors[idx].block_len = 0;
            return 0;
        }

        let mut to_advance = bytes.min(bytes_available);
        let mut advanced: u32 = 0;

        loop {
            let (wrapped, segment, block_offset, start_segment) = {
                let accessor = &self.accessors[idx];
                (
                    accessor.wrapped_to_start,
                    accessor.segment,
                    accessor.block_offset,
                    accessor.start_segment,
                )
            };

            // Once the cursor has lapped back onto its own start segment,
            // the visible block is the whole remaining availability: the
            // head of that segment up to the cursor's own start point.
            let block_len = if wrapped {
                bytes_available as usize
            } else {
                let region = self.segments[segment].region(role);
                let used = block_offset - region.offset;
                (region.len - used).min(bytes_available as usize)
            };
            self.accessors[idx].block_len = block_len;

            if to_advance == 0 {
                break;
            }

            let step = (to_advance as usize).min(block_len);
            if step == block_len {
                // Crossed the block boundary: hop to the next segment.
                let next = self.next_segment(segment);
                let next_offset = if next == start_segment {
                    0
                } else {
                    self.segments[next].region(role).offset
                };
                let accessor = &mut self.accessors[idx];
                accessor.segment = next;
                accessor.block_offset = next_offset;
                if next == start_segment {
                    accessor.wrapped_to_start = true;
                }
            } else {
                self.accessors[idx].block_offset += step;
            }

            to_advance -= step as u32;
            advanced += step as u32;
            bytes_available -= step as u32;
        }

        let total_bytes = self.total_bytes;
        let accessor = &mut self.accessors[idx];
        accessor.pending += advanced;
        accessor.position = (accessor.position + advanced) % total_bytes;

        if self.accessors[idx].pending > 0 && self.accessors[idx].auto_commit {
            self.commit(role);
        }

        advanced
    }

    /// Publish the pending span: credit the peer's `bytes_in`, consume
    /// this role's segment regions, and resynchronize the cursor at the
    /// new span start. Returns the committed count.
    fn commit(&mut self, role: Role) -> u32 {
        let idx = role.index();
        let pending = self.accessors[idx].pending;
        if pending == 0 {
            return 0;
        }

        self.accessors[idx].bytes_out = self.accessors[idx].bytes_out.wrapping_add(pending);
        let peer = role.peer().index();
        self.accessors[peer].bytes_in = self.accessors[peer].bytes_in.wrapping_add(pending);

        let segment_count = self.segments.len();
        let mut seg = self.accessors[idx].start_segment;
        let mut remaining = pending as usize;
        loop {
            let seg_len = self.segments[seg].len();
            let region = self.segments[seg].region_mut(role);
            if region.len <= remaining {
                remaining -= region.len;
                // Fully consumed: restore the region and move on.
                region.offset = 0;
                region.len = seg_len;
                seg = (seg + 1) % segment_count;
            } else {
                region.offset += remaining;
                region.len -= remaining;
                remaining = 0;
            }
            if remaining == 0 {
                break;
            }
        }

        self.accessors[idx].start_segment = seg;
        self.rewind_accessor(role);
        self.advance(role, 0);
        pending
    }
}

impl StreamCore {
    pub(crate) fn available(&self, role: Role) -> u32 {
        self.state.lock().accessors[role.index()].available()
    }

    pub(crate) fn position(&self, role: Role) -> u32 {
        self.state.lock().accessors[role.index()].position
    }

    pub(crate) fn current_block(&self, role: Role) -> usize {
        let mut state = self.state.lock();
        state.advance(role, 0);
        state.accessors[role.index()].block_len
    }

    pub(crate) fn advance_accessor(&self, role: Role, bytes: u32) -> u32 {
        self.state.lock().advance(role, bytes)
    }

    pub(crate) fn commit_accessor(&self, role: Role) -> u32 {
        self.state.lock().commit(role)
    }

    pub(crate) fn set_auto_commit(&self, role: Role, enabled: bool) {
        self.state.lock().accessors[role.index()].auto_commit = enabled;
    }

    pub(crate) fn skip_block(&self, role: Role) -> usize {
        let mut state = self.state.lock();
        state.advance(role, 0);
        let block = state.accessors[role.index()].block_len;
        if block > 0 {
            state.advance(role, block as u32);
        }
        block
    }

    pub(crate) fn release(&self, role: Role) {
        let mut state = self.state.lock();
        debug_assert!(state.accessors[role.index()].held);
        state.accessors[role.index()].held = false;
    }

    pub(crate) fn transfer_in(&self, buf: &[u8]) -> usize {
        let mut state = self.state.lock();
        state.advance(Role::Producer, 0);
        let mut written = 0;
        while written < buf.len() {
            let (block_len, seg, off) = {
                let accessor = &state.accessors[Role::Producer.index()];
                (accessor.block_len, accessor.segment, accessor.block_offset)
            };
            let n = block_len.min(buf.len() - written);
            if n == 0 {
                break; // ring is full
            }
            state.segments[seg].data_mut()[off..off + n]
                .copy_from_slice(&buf[written..written + n]);
            state.advance(Role::Producer, n as u32);
            written += n;
        }
        written
    }

    pub(crate) fn transfer_out(&self, buf: &mut [u8]) -> usize {
        let mut state = self.state.lock();
        state.advance(Role::Consumer, 0);
        let mut read = 0;
        while read < buf.len() {
            let (block_len, seg, off) = {
                let accessor = &state.accessors[Role::Consumer.index()];
                (accessor.block_len, accessor.segment, accessor.block_offset)
            };
            let n = block_len.min(buf.len() - read);
            if n == 0 {
                break; // ring is empty
            }
            buf[read..read + n].copy_from_slice(&state.segments[seg].data()[off..off + n]);
            state.advance(Role::Consumer, n as u32);
            read += n;
        }
        read
    }

    pub(crate) fn fill_from(
        &self,
        reader: &mut (impl Read + ?Sized),
        max: usize,
    ) -> Result<FileTransfer, StreamError> {
        let mut state = self.state.lock();
        state.advance(Role::Producer, 0);
        let mut moved = 0;
        while moved < max {
            let (block_len, seg, off) = {
                let accessor = &state.accessors[Role::Producer.index()];
                (accessor.block_len, accessor.segment, accessor.block_offset)
            };
            let want = block_len.min(max - moved);
            if want == 0 {
                break; // ring is full, a legitimate short transfer
            }
            let n = match reader.read(&mut state.segments[seg].data_mut()[off..off + want]) {
                Ok(0) => {
                    return Ok(FileTransfer {
                        bytes: moved,
                        end_of_data: true,
                    });
                }
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(StreamError::Io(e)),
            };
            state.advance(Role::Producer, n as u32);
            moved += n;
        }
        Ok(FileTransfer {
            bytes: moved,
            end_of_data: false,
        })
    }

    pub(crate) fn drain_to(
        &self,
        writer: &mut (impl Write + ?Sized),
        max: usize,
    ) -> Result<FileTransfer, StreamError> {
        let mut state = self.state.lock();
        state.advance(Role::Consumer, 0);
        let mut moved = 0;
        while moved < max {
            let (block_len, seg, off) = {
                let accessor = &state.accessors[Role::Consumer.index()];
                (accessor.block_len, accessor.segment, accessor.block_offset)
            };
            let want = block_len.min(max - moved);
            if want == 0 {
                break; // ring is empty, a legitimate short transfer
            }
            let n = match writer.write(&state.segments[seg].data()[off..off + want]) {
                Ok(0) => {
                    return Ok(FileTransfer {
                        bytes: moved,
                        end_of_data: true,
                    });
                }
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(StreamError::Io(e)),
            };
            state.advance(Role::Consumer, n as u32);
            moved += n;
        }
        Ok(FileTransfer {
            bytes: moved,
            end_of_data: false,
        })
    }
}
