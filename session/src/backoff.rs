//! Randomized exponential backoff for the data-worker reconnect loop.

use rand::Rng;
use std::time::Duration;

/// Backoff primed after the first failed attempt, in microseconds.
const INITIAL_BACKOFF_US: u64 = 16_384_000;

/// Growth stops once the backoff reaches this many microseconds.
const MAX_BACKOFF_US: u64 = 1_000_000_000;

/// Uniform jitter applied to every sleep, in microseconds.
const JITTER_US: i64 = 4_096_000;

/// The data-worker backoff schedule.
///
/// Starts at zero; the first failed attempt primes the schedule without
/// sleeping, each later failure sleeps the current value plus uniform jitter,
/// and the value grows ~6.25% per attempt until the cap. A served session
/// resets the schedule.
#[derive(Debug, Default)]
pub(crate) struct Backoff {
    current_us: u64,
}

impl Backoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the schedule after one attempt; returns the delay to sleep
    /// before re-arming on the session signal, if any.
    pub fn after_attempt(&mut self, served: bool) -> Option<Duration> {
        if served {
            self.current_us = 0;
        }
        let delay = if self.current_us > 0 {
            // 64-bit arithmetic with an explicit floor; the jitter window is
            // symmetric around the current value.
            let jitter = rand::thread_rng().gen_range(-JITTER_US..=JITTER_US);
            let us = (self.current_us as i64).saturating_add(jitter).max(0) as u64;
            Some(Duration::from_micros(us))
        } else {
            self.current_us = INITIAL_BACKOFF_US;
            None
        };
        if self.current_us < MAX_BACKOFF_US {
            self.current_us += self.current_us >> 4;
        }
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_failure_primes_without_sleeping() {
        let mut b = Backoff::new();
        assert!(b.after_attempt(false).is_none());
        assert_eq!(b.current_us, INITIAL_BACKOFF_US + (INITIAL_BACKOFF_US >> 4));
    }

    #[test]
    fn test_later_failures_sleep_with_jitter() {
        let mut b = Backoff::new();
        b.after_attempt(false);
        let base = b.current_us;
        let delay = b.after_attempt(false).unwrap();
        let lo = base.saturating_sub(JITTER_US as u64);
        let hi = base + JITTER_US as u64;
        assert!(delay >= Duration::from_micros(lo));
        assert!(delay <= Duration::from_micros(hi));
        // ~6.25% growth per attempt
        assert_eq!(b.current_us, base + (base >> 4));
    }

    #[test]
    fn test_growth_caps() {
        let mut b = Backoff::new();
        for _ in 0..200 {
            b.after_attempt(false);
        }
        assert!(b.current_us >= MAX_BACKOFF_US);
        assert!(b.current_us <= MAX_BACKOFF_US + (MAX_BACKOFF_US >> 4));
    }

    #[test]
    fn test_served_session_resets() {
        let mut b = Backoff::new();
        for _ in 0..5 {
            b.after_attempt(false);
        }
        assert!(b.after_attempt(true).is_none());
        assert_eq!(b.current_us, INITIAL_BACKOFF_US + (INITIAL_BACKOFF_US >> 4));
    }
}
