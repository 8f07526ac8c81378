//! Monotonic and wall-clock time sources
//!
//! Timeline anchors are taken from a [`Clock`] so that sessions can be driven
//! by the real monotonic clock in production and by a [`ManualClock`] in tests
//! or replays.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

fn process_epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

/// Milliseconds on the monotonic clock, counted from the first call in this process
pub fn monotonic_ms() -> u64 {
    u64::try_from(process_epoch().elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Nanoseconds on the monotonic clock, counted from the first call in this process
pub fn monotonic_ns() -> u64 {
    u64::try_from(process_epoch().elapsed().as_nanos()).unwrap_or(u64::MAX)
}

/// Wall-clock milliseconds since the Unix epoch
pub fn system_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Format a millisecond duration as `HH:MM:SS.mmm`
pub fn format_duration_ms(ms: u64) -> String {
    let millis = ms % 1000;
    let total_secs = ms / 1000;
    let seconds = total_secs % 60;
    let minutes = (total_secs / 60) % 60;
    let hours = total_secs / 3600;
    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
}

/// Format a Unix millisecond timestamp as ISO-8601 UTC
///
/// Returns `None` when the timestamp is outside chrono's representable range.
pub fn format_timestamp(unix_ms: u64) -> Option<String> {
    let ms = i64::try_from(unix_ms).ok()?;
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
}

/// Source of "now" for timeline anchoring
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time in milliseconds
    fn now_ms(&self) -> u64;
}

/// Process monotonic clock
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        monotonic_ms()
    }
}

/// Manually driven clock
///
/// Clones share the same underlying time, so a test can keep one handle and
/// advance the clock seen by a session.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a manual clock starting at `start_ms`
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Set the current time
    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    /// Advance the current time by `delta_ms`
    pub fn advance(&self, delta_ms: u64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
