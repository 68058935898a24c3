//! Progress throttling.
//!
//! Rate-limits progress reports so the index and the listener bus see a
//! bounded number of writes per job.

use std::time::{Duration, Instant};

/// Rate-limiter for progress updates.
///
/// A report is let through when the minimum interval has elapsed since the
/// last one, or when the byte count advanced by at least the byte quantum.
pub struct ProgressThrottle {
    last_emit: Option<Instant>,
    last_bytes: u64,
    min_interval: Duration,
    byte_quantum: u64,
}

impl ProgressThrottle {
    /// Create a new throttle with the specified interval and byte quantum.
    ///
    /// A zero quantum disables the byte trigger.
    pub const fn new(min_interval: Duration, byte_quantum: u64) -> Self {
        Self {
            last_emit: None,
            last_bytes: 0,
            min_interval,
            byte_quantum,
        }
    }

    /// Check if a report for `bytes` should be emitted now.
    pub fn should_emit(&mut self, bytes: u64) -> bool {
        let now = Instant::now();
        let due = match self.last_emit {
            None => true,
            Some(last) => {
                now.duration_since(last) >= self.min_interval
                    || (self.byte_quantum > 0
                        && bytes.saturating_sub(self.last_bytes) >= self.byte_quantum)
            }
        };
        if due && bytes != self.last_bytes {
            self.last_emit = Some(now);
            self.last_bytes = bytes;
            return true;
        }
        if self.last_emit.is_none() {
            self.last_emit = Some(now);
        }
        false
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 4 * 1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_first_emit() {
        let mut throttle = ProgressThrottle::new(Duration::from_millis(100), 0);
        assert!(throttle.should_emit(10));
    }

    #[test]
    fn test_throttle_respects_interval() {
        let mut throttle = ProgressThrottle::new(Duration::from_millis(50), 0);
        assert!(throttle.should_emit(1));
        assert!(!throttle.should_emit(2)); // Too soon

        std::thread::sleep(Duration::from_millis(60));
        assert!(throttle.should_emit(3));
    }

    #[test]
    fn test_throttle_byte_quantum() {
        let mut throttle = ProgressThrottle::new(Duration::from_secs(60), 100);
        assert!(throttle.should_emit(10));
        assert!(!throttle.should_emit(50));
        assert!(throttle.should_emit(110));
        assert!(!throttle.should_emit(150));
    }

    #[test]
    fn test_throttle_skips_unchanged_bytes() {
        let mut throttle = ProgressThrottle::new(Duration::ZERO, 0);
        assert!(throttle.should_emit(5));
        assert!(!throttle.should_emit(5));
        assert!(throttle.should_emit(6));
    }
}
