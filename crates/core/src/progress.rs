//! Progress policy shared by the executor and the store mutations.

/// A running job never reports more than this; only completion sets 100.
pub const MAX_RUNNING_PROGRESS: u8 = 99;

/// Progress of a completed job.
pub const COMPLETE: u8 = 100;

/// Clamp an arbitrary progress value into `0..=100`.
pub fn clamp_percent(value: i64) -> u8 {
    value.clamp(0, i64::from(COMPLETE)) as u8
}

/// Filters raw progress values into a non-decreasing, coarse-grained stream.
///
/// Values are clamped, anything not strictly above the last forwarded value
/// is dropped, and steps smaller than `granularity` are held back so pollers
/// are not flooded with one-percent updates.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    last_forwarded: u8,
    granularity: u8,
}

impl ProgressTracker {
    pub fn new(granularity: u8) -> Self {
        Self {
            last_forwarded: 0,
            granularity: granularity.max(1),
        }
    }

    /// Returns the value to forward, or `None` if it should be dropped.
    pub fn advance(&mut self, value: i64) -> Option<u8> {
        let value = clamp_percent(value);
        if value <= self.last_forwarded {
            return None;
        }
        if value - self.last_forwarded < self.granularity && value < COMPLETE {
            return None;
        }
        self.last_forwarded = value;
        Some(value)
    }

    pub fn last(&self) -> u8 {
        self.last_forwarded
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(1)
    }
}
