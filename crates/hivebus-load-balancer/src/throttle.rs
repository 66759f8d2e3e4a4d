/// Rate-limiting for recurring log statements
/// Keeps the per-tick resource summaries and misconfiguration errors from
/// flooding the log on short scheduler intervals.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Interval used for scheduler summary and sanitation logs
pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Allows one emission per configured interval
pub struct LogThrottle {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl LogThrottle {
    pub fn new(min_interval: Duration) -> Self {
        LogThrottle {
            min_interval,
            last: Mutex::new(None),
        }
    }

    /// True when the caller may log now; records the emission
    pub fn ready(&self) -> bool {
        let mut last = self.last.lock();
        match *last {
            Some(at) if at.elapsed() < self.min_interval => false,
            _ => {
                *last = Some(Instant::now());
                true
            }
        }
    }
}
