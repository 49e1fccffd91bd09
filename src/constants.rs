//! Central constants for the buffering subsystem.
//!
//! All magic numbers in `src/**` live here so they can be tuned in one
//! place and remain consistent across modules.

// ── Stream segments ──────────────────────────────────────────────────────────

/// Default byte size of one stream segment (32 KB ≈ 170 ms of 48 kHz
/// stereo 16-bit PCM).
pub const DEFAULT_SEGMENT_BYTES: usize = 32 * 1_024;

/// Default number of segments in a freshly configured stream.
pub const DEFAULT_SEGMENT_COUNT: usize = 4;

/// Default power-of-two size alignment for segment allocations.
pub const DEFAULT_SEGMENT_ALIGN: usize = 16;

/// Accessor byte counters seed just below the `u32` wrap point, so the
/// modular-subtraction paths run within the first second of streaming
/// instead of after ~4 GB of traffic.
pub const COUNTER_SEED: u32 = u32::MAX - 1_000;

// ── Decode cache ─────────────────────────────────────────────────────────────

/// Default total frame budget for a decode cache (2 MB).
pub const DEFAULT_CACHE_BYTES: usize = 2 * 1_024 * 1_024;

/// Default maximum number of cached items.
pub const DEFAULT_MAX_ITEMS: usize = 64;

/// Default byte size of one cache frame.
pub const DEFAULT_FRAME_BYTES: usize = 4 * 1_024;

// ── Transfer profiling ───────────────────────────────────────────────────────

/// Measurement window for [`crate::stream::TransferProfile`] (seconds).
pub const PROFILE_WINDOW_SECS: u64 = 3;

// ── PCM ──────────────────────────────────────────────────────────────────────

/// Sample rate assumed for cached clips unless the source says otherwise (Hz).
pub const TARGET_SAMPLE_RATE: u32 = 48_000;

/// Stereo channel count used throughout.
pub const TARGET_CHANNELS: u16 = 2;

/// Bit depth of decoded PCM.
pub const TARGET_BITS_PER_SAMPLE: u16 = 16;
