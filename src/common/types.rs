use serde::{Deserialize, Serialize};

use crate::constants::{TARGET_BITS_PER_SAMPLE, TARGET_CHANNELS, TARGET_SAMPLE_RATE};

/// A generic boxed error type.
pub type AnyError = Box<dyn std::error::Error + Send + Sync>;

/// A convenient Result alias returning `AnyError`.
pub type AnyResult<T> = std::result::Result<T, AnyError>;

/// PCM shape of a decoded asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl SampleFormat {
    /// Bytes covering one sample across all channels.
    pub fn block_align(&self) -> u32 {
        u32::from(self.channels) * u32::from(self.bits_per_sample) / 8
    }

    /// Decoded byte rate of this format.
    pub fn bytes_per_second(&self) -> u32 {
        self.sample_rate * self.block_align()
    }

    /// Playback duration of `bytes` in milliseconds.
    pub fn duration_ms(&self, bytes: usize) -> u64 {
        let rate = u64::from(self.bytes_per_second());
        if rate == 0 {
            return 0;
        }
        bytes as u64 * 1_000 / rate
    }
}

impl Default for SampleFormat {
    fn default() -> Self {
        Self {
            sample_rate: TARGET_SAMPLE_RATE,
            channels: TARGET_CHANNELS,
            bits_per_sample: TARGET_BITS_PER_SAMPLE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_16bit_rates() {
        let format = SampleFormat::default();
        assert_eq!(format.block_align(), 4);
        assert_eq!(format.bytes_per_second(), 192_000);
    }

    #[test]
    fn duration_of_one_second() {
        let format = SampleFormat::default();
        assert_eq!(format.duration_ms(192_000), 1_000);
    }
}
