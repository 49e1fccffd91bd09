//! Transfer-rate metering for stream producers and consumers.

use std::time::{Duration, Instant};

use crate::constants::PROFILE_WINDOW_SECS;

/// Windowed byte-rate meter. Feed it the count of every transfer; it
/// folds them into a bytes-per-second figure once per window.
pub struct TransferProfile {
    bytes: u64,
    rate: u64,
    window: Duration,
    last_update: Instant,
    active: bool,
}

impl TransferProfile {
    /// Start measuring with the default window.
    pub fn start() -> Self {
        Self::with_window(Duration::from_secs(PROFILE_WINDOW_SECS))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            bytes: 0,
            rate: 0,
            window,
            last_update: Instant::now(),
            active: true,
        }
    }

    /// Stop measuring; the reported rate drops to zero.
    pub fn stop(&mut self) {
        self.active = false;
        self.rate = 0;
    }

    /// Resume measuring from now.
    pub fn resume(&mut self) {
        self.bytes = 0;
        self.last_update = Instant::now();
        self.active = true;
    }

    /// Record `bytes` moved. Recomputes the rate when the window has
    /// elapsed since the last fold.
    pub fn update(&mut self, bytes: usize) {
        if !self.active {
            return;
        }
        self.bytes += bytes as u64;
        let elapsed = self.last_update.elapsed();
        if elapsed >= self.window {
            let millis = elapsed.as_millis().max(1) as u64;
            self.rate = self.bytes * 1_000 / millis;
            self.last_update = Instant::now();
            self.bytes = 0;
        }
    }

    /// Latest bytes-per-second figure; zero while stopped or before the
    /// first full window.
    pub fn rate(&self) -> u64 {
        if self.active { self.rate } else { 0 }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_window_folds_immediately() {
        let mut profile = TransferProfile::with_window(Duration::ZERO);
        profile.update(48_000);
        assert!(profile.rate() > 0);
    }

    #[test]
    fn stopped_profile_reports_zero() {
        let mut profile = TransferProfile::with_window(Duration::ZERO);
        profile.update(48_000);
        profile.stop();
        assert_eq!(profile.rate(), 0);
        profile.update(48_000);
        assert_eq!(profile.rate(), 0);
    }
}
