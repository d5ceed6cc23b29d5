//! Monotonic tick clock used for query timing

use std::sync::OnceLock;
use web_time::Instant;

/// Number of ticks per second (100ns resolution).
pub const TICKS_PER_SECOND: i64 = 10_000_000;

fn epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

/// Current tick count since the first call in this process.
pub fn ticks() -> i64 {
    (epoch().elapsed().as_nanos() / 100) as i64
}

/// Converts a tick delta to milliseconds.
#[inline]
pub fn ticks_to_millis(ticks: i64) -> f64 {
    ticks as f64 * 1000.0 / TICKS_PER_SECOND as f64
}
