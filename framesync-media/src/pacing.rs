//! Audio pacing policies
//!
//! A pacer decides how many silence units go out ahead of the next real
//! audio unit so that audio does not fall behind the video clock. Pacers
//! only ever add audio; nothing is dropped to catch up.

/// Decides how much silence to insert before a real audio unit
pub trait AudioPacer: Send + std::fmt::Debug {
    /// Number of silence units to emit before the next real unit
    ///
    /// `last_video_remote_ms` is the most recent video presentation time and
    /// `produced` the number of audio units emitted so far.
    fn silence_units(&self, last_video_remote_ms: u64, produced: u64) -> u64;
}

/// Keeps audio level with the video presentation clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoClockPacer {
    unit_ms: u64,
}

impl VideoClockPacer {
    /// Default duration of one audio unit in milliseconds
    pub const DEFAULT_UNIT_MS: u64 = 125;

    /// Create a pacer for audio units of `unit_ms` milliseconds
    pub fn new(unit_ms: u64) -> Self {
        Self {
            unit_ms: unit_ms.max(1),
        }
    }

    /// Duration of one audio unit in milliseconds
    pub fn unit_ms(&self) -> u64 {
        self.unit_ms
    }
}

impl Default for VideoClockPacer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_UNIT_MS)
    }
}

impl AudioPacer for VideoClockPacer {
    fn silence_units(&self, last_video_remote_ms: u64, produced: u64) -> u64 {
        let expected = last_video_remote_ms / self.unit_ms;
        expected.saturating_sub(produced)
    }
}

/// Never inserts silence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoPacing;

impl AudioPacer for NoPacing {
    fn silence_units(&self, _last_video_remote_ms: u64, _produced: u64) -> u64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_clock_pacer() {
        let pacer = VideoClockPacer::default();
        assert_eq!(pacer.silence_units(1000, 2), 6);
        assert_eq!(pacer.silence_units(1000, 8), 0);
        assert_eq!(pacer.silence_units(1000, 20), 0);
        assert_eq!(pacer.silence_units(124, 0), 0);
        assert_eq!(pacer.silence_units(0, 0), 0);
    }

    #[test]
    fn test_zero_unit_clamped() {
        assert_eq!(VideoClockPacer::new(0).unit_ms(), 1);
    }

    #[test]
    fn test_no_pacing() {
        assert_eq!(NoPacing.silence_units(60_000, 0), 0);
    }
}
