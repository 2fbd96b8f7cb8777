//! Server clock: message timestamps and the human-readable time string.

use chrono::Local;
use std::time::{Duration, Instant};

/// Message timestamps are milliseconds since the server started, truncated
/// to the 32-bit wire field.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    started: Instant,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn timestamp(&self) -> i32 {
        self.started.elapsed().as_millis() as u64 as i32
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Local wall-clock time as `YYYY/MM/DD HH:MM:SS`.
    pub fn time_string(&self) -> String {
        Local::now().format("%Y/%m/%d %H:%M:%S").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_string_shape() {
        let s = Clock::new().time_string();
        assert_eq!(s.len(), 19);
        assert_eq!(&s[4..5], "/");
        assert_eq!(&s[13..14], ":");
    }

    #[test]
    fn test_timestamp_monotonic() {
        let clock = Clock::new();
        let a = clock.timestamp();
        std::thread::sleep(Duration::from_millis(2));
        assert!(clock.timestamp() >= a);
    }
}
