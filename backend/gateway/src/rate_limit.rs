//! Inbound audio throttle.
//!
//! A fixed minimum spacing between forwarded microphone chunks; anything
//! arriving sooner is dropped.

use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug, Clone)]
pub struct AudioThrottle {
    min_interval: Duration,
    last_forwarded: Option<Instant>,
    dropped: u64,
}

impl AudioThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_forwarded: None,
            dropped: 0,
        }
    }

    /// Whether a chunk arriving at `now` may be forwarded. Admission resets
    /// the interval; a drop does not.
    pub fn admit(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_forwarded {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.min_interval {
                self.dropped += 1;
                trace!(elapsed_ms = elapsed.as_millis() as u64, "Throttled audio chunk");
                return false;
            }
        }
        self.last_forwarded = Some(now);
        true
    }

    /// Chunks dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_chunk_always_passes() {
        let mut throttle = AudioThrottle::new(Duration::from_millis(100));
        assert!(throttle.admit(Instant::now()));
    }

    #[test]
    fn chunks_spaced_at_or_above_threshold_pass() {
        let mut throttle = AudioThrottle::new(Duration::from_millis(100));
        let t0 = Instant::now();
        assert!(throttle.admit(t0));
        assert!(throttle.admit(t0 + Duration::from_millis(150)));
        assert!(throttle.admit(t0 + Duration::from_millis(300)));
        assert!(throttle.admit(t0 + Duration::from_millis(400)));
        assert_eq!(throttle.dropped(), 0);
    }

    #[test]
    fn close_chunks_are_dropped_without_resetting() {
        let mut throttle = AudioThrottle::new(Duration::from_millis(100));
        let t0 = Instant::now();
        assert!(throttle.admit(t0));
        assert!(!throttle.admit(t0 + Duration::from_millis(50)));
        assert!(!throttle.admit(t0 + Duration::from_millis(90)));
        assert!(throttle.admit(t0 + Duration::from_millis(100)));
        assert_eq!(throttle.dropped(), 2);
    }
}
