use std::time::Duration;
use crate::core::distance::{DEFAULT_CONFIDENCE_SCALE, DEFAULT_THRESHOLD};

/// UX pacing of the session. None of these affect decisions, so tests run
/// with [`SessionTiming::immediate`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionTiming {
    /// Wait after acquiring the camera before the first capture counts.
    pub warmup: Duration,
    /// How long the confidence indicator ramps before capture.
    pub scan_delay: Duration,
    /// Number of indicator updates over `scan_delay`.
    pub progress_steps: u32,
    /// Time spent in `Error` after a mismatch before returning to `Ready`.
    pub mismatch_recovery: Duration,
    pub probe_interval: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            warmup: Duration::from_millis(1000),
            scan_delay: Duration::from_millis(1500),
            progress_steps: 10,
            mismatch_recovery: Duration::from_millis(2000),
            probe_interval: Duration::from_millis(500),
        }
    }
}

impl SessionTiming {
    pub fn immediate() -> Self {
        Self {
            warmup: Duration::ZERO,
            scan_delay: Duration::ZERO,
            progress_steps: 1,
            mismatch_recovery: Duration::ZERO,
            probe_interval: Duration::from_millis(1),
        }
    }

    pub(crate) fn progress_tick(&self) -> Duration {
        self.scan_delay / self.progress_steps.max(1)
    }
}

/// Decision parameters and robustness limits.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub distance_threshold: f32,
    pub confidence_scale: f32,
    pub acquire_timeout: Duration,
    pub load_timeout: Duration,
    /// Consecutive mismatches before verification locks; 0 disables.
    pub lockout_after: u32,
    pub lockout: Duration,
    pub thumbnail_size: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            distance_threshold: DEFAULT_THRESHOLD,
            confidence_scale: DEFAULT_CONFIDENCE_SCALE,
            acquire_timeout: Duration::from_secs(10),
            load_timeout: Duration::from_secs(30),
            lockout_after: 0,
            lockout: Duration::from_secs(30),
            thumbnail_size: 96,
        }
    }
}
