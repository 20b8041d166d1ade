//! Fixed and sliding window arithmetic.

use std::time::Duration;

/// Clock-aligned window containing `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindow {
    pub index: i64,
    pub window_seconds: u64,
}

impl FixedWindow {
    pub fn containing(now: f64, window_seconds: u64) -> Self {
        Self {
            index: (now / window_seconds as f64).floor() as i64,
            window_seconds,
        }
    }

    pub fn resets_at(&self) -> f64 {
        (self.index + 1) as f64 * self.window_seconds as f64
    }
}

/// Result of an atomic add-and-trim on a sliding window log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSample {
    /// Whether `now` was recorded. A rejected timestamp is never stored.
    pub admitted: bool,
    /// Entries inside the trailing window after the operation.
    pub count: u64,
    /// Oldest timestamp still inside the window.
    pub oldest: Option<f64>,
}

/// Lower bound, exclusive, of the trailing window ending at `now`.
///
/// Entries at or before the cutoff are expired, so the live window is
/// `(now - window, now]`.
pub fn sliding_cutoff(now: f64, window: Duration) -> f64 {
    now - window.as_secs_f64()
}
