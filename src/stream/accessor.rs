//! Role-bound cursors over a stream.
//!
//! Acquiring a role yields an RAII handle: [`StreamProducer`] for the
//! write side, [`StreamConsumer`] for the read side. Dropping the handle
//! releases the role. All cursor state lives inside the stream core;
//! the handles only carry the shared reference and the role binding.

use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

use crate::common::errors::StreamError;
use crate::stream::ring::StreamCore;

/// The two cursor roles over a stream: the producer writes bytes in, the
/// consumer reads them out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Producer = 0,
    Consumer = 1,
}

impl Role {
    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// The accessor on the other side of the same stream.
    pub(crate) fn peer(self) -> Role {
        match self {
            Role::Producer => Role::Consumer,
            Role::Consumer => Role::Producer,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Producer => write!(f, "producer"),
            Role::Consumer => write!(f, "consumer"),
        }
    }
}

/// Outcome of a file-like transfer. `end_of_data` marks the collaborator
/// reporting exhaustion, distinct from a short transfer caused by the
/// stream itself running full or empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileTransfer {
    pub bytes: usize,
    pub end_of_data: bool,
}

/// Cursor bookkeeping for one role. Lives inside the stream state, one
/// per role, whether or not the role is currently held.
pub(crate) struct AccessorState {
    pub held: bool,
    pub auto_commit: bool,
    /// Wrapping byte counters. Available bytes for the role is always
    /// `bytes_in.wrapping_sub(bytes_out)`.
    pub bytes_in: u32,
    pub bytes_out: u32,
    /// Segment where the uncommitted span begins.
    pub start_segment: usize,
    /// Segment under the cursor.
    pub segment: usize,
    /// Byte offset of the visible block within the cursor segment.
    pub block_offset: usize,
    /// Length of the visible contiguous block.
    pub block_len: usize,
    /// Bytes advanced past but not yet committed to the peer.
    pub pending: u32,
    /// Absolute position within the ring, modulo total stream bytes.
    pub position: u32,
    /// The cursor has lapped fully back onto its own start segment.
    pub wrapped_to_start: bool,
}

impl AccessorState {
    pub fn new() -> Self {
        Self {
            held: false,
            auto_commit: true,
            bytes_in: 0,
            bytes_out: 0,
            start_segment: 0,
            segment: 0,
            block_offset: 0,
            block_len: 0,
            pending: 0,
            position: 0,
            wrapped_to_start: false,
        }
    }

    /// Bytes this role may still move: data for the consumer, free space
    /// for the producer. Modular subtraction; the counters wrap.
    pub fn available(&self) -> u32 {
        self.bytes_in.wrapping_sub(self.bytes_out)
    }

    /// Put the cursor back onto the start of its uncommitted span.
    pub fn rewind(&mut self, region_offset: usize) {
        self.segment = self.start_segment;
        self.block_offset = region_offset;
        self.block_len = 0;
        self.pending = 0;
        self.wrapped_to_start = false;
    }
}

/// Write-side handle. Obtained from [`crate::stream::Stream::acquire_producer`].
pub struct StreamProducer {
    pub(crate) core: Arc<StreamCore>,
}

impl StreamProducer {
    /// Copy bytes from `buf` into the stream, crossing segment boundaries
    /// and wrapping at the ring end. Returns how many bytes were
    /// accepted; fewer than `buf.len()` once the stream runs full.
    pub fn write(&mut self, buf: &[u8]) -> usize {
        self.core.transfer_in(buf)
    }

    /// Read up to `max` bytes from a file-like collaborator straight into
    /// the stream's segments.
    pub fn fill_from<R: Read + ?Sized>(
        &mut self,
        reader: &mut R,
        max: usize,
    ) -> Result<FileTransfer, StreamError> {
        self.core.fill_from(reader, max)
    }

    /// Free space remaining before the stream is full.
    pub fn available(&self) -> u32 {
        self.core.available(Role::Producer)
    }

    /// Recompute the visible contiguous block without moving the cursor.
    pub fn current_block(&self) -> usize {
        self.core.current_block(Role::Producer)
    }

    /// Move the cursor forward by up to `bytes`, clamped to availability.
    pub fn advance(&mut self, bytes: u32) -> u32 {
        self.core.advance_accessor(Role::Producer, bytes)
    }

    /// Publish all advanced-but-uncommitted bytes to the consumer.
    pub fn commit(&mut self) -> u32 {
        self.core.commit_accessor(Role::Producer)
    }

    /// When enabled (the default), every advance commits immediately.
    pub fn set_auto_commit(&mut self, enabled: bool) {
        self.core.set_auto_commit(Role::Producer, enabled);
    }

    /// Consume the whole current visible block without writing into it.
    pub fn skip_block(&mut self) -> usize {
        self.core.skip_block(Role::Producer)
    }

    /// Absolute cursor position, modulo total stream bytes.
    pub fn position(&self) -> u32 {
        self.core.position(Role::Producer)
    }
}

impl Drop for StreamProducer {
    fn drop(&mut self) {
        self.core.release(Role::Producer);
    }
}

/// Read-side handle. Obtained from [`crate::stream::Stream::acquire_consumer`].
pub struct StreamConsumer {
    pub(crate) core: Arc<StreamCore>,
}

impl StreamConsumer {
    /// Copy bytes out of the stream into `buf`. Returns how many bytes
    /// were produced; fewer than `buf.len()` once the stream runs empty.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        self.core.transfer_out(buf)
    }

    /// Write up to `max` buffered bytes into a file-like collaborator.
    pub fn drain_to<W: Write + ?Sized>(
        &mut self,
        writer: &mut W,
        max: usize,
    ) -> Result<FileTransfer, StreamError> {
        self.core.drain_to(writer, max)
    }

    /// Bytes buffered and ready to read.
    pub fn available(&self) -> u32 {
        self.core.available(Role::Consumer)
    }

    /// Recompute the visible contiguous block without moving the cursor.
    pub fn current_block(&self) -> usize {
        self.core.current_block(Role::Consumer)
    }

    /// Move the cursor forward by up to `bytes`, clamped to availability.
    pub fn advance(&mut self, bytes: u32) -> u32 {
        self.core.advance_accessor(Role::Consumer, bytes)
    }

    /// Return all advanced-but-uncommitted bytes to the producer as free
    /// space.
    pub fn commit(&mut self) -> u32 {
        self.core.commit_accessor(Role::Consumer)
    }

    /// When enabled (the default), every advance commits immediately.
    pub fn set_auto_commit(&mut self, enabled: bool) {
        self.core.set_auto_commit(Role::Consumer, enabled);
    }

    /// Discard the whole current visible block without reading it.
    pub fn skip_block(&mut self) -> usize {
        self.core.skip_block(Role::Consumer)
    }

    /// Absolute cursor position, modulo total stream bytes.
    pub fn position(&self) -> u32 {
        self.core.position(Role::Consumer)
    }
}

impl Drop for StreamConsumer {
    fn drop(&mut self) {
        self.core.release(Role::Consumer);
    }
}
