//! Bounded polling.
//!
//! All waiting in the orchestrator is "check, sleep, check again" through
//! [`poll_until`]. Time comes from a [`Clock`] so tests can run the same
//! loops on virtual time.

use std::cell::Cell;
use std::thread;
use std::time::{Duration, Instant};

use stack_core::error::Result;
use tracing::trace;

pub trait Clock {
    /// Time elapsed since the clock was created.
    fn elapsed(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

/// Wall-clock time; `sleep` blocks the thread.
#[derive(Debug)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Virtual time: `sleep` advances the clock instantly.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Duration>,
    sleeps: Cell<u32>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }

    pub fn sleeps(&self) -> u32 {
        self.sleeps.get()
    }
}

impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.set(self.sleeps.get() + 1);
        self.advance(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub timeout: Duration,
    pub interval: Duration,
    pub max_attempts: Option<u32>,
}

impl PollPolicy {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            max_attempts: None,
        }
    }

    /// `attempts` checks spaced `interval` apart.
    pub fn attempts(attempts: u32, interval: Duration) -> Self {
        Self {
            timeout: interval * attempts,
            interval,
            max_attempts: Some(attempts),
        }
    }
}

/// Call `check` until it returns `true`, the timeout passes or the attempt
/// limit is reached. Returns whether the condition was met.
///
/// The first check runs immediately and later checks are at least
/// `interval` apart, so a failed wait ends within `timeout + interval`.
pub fn poll_until<F>(policy: &PollPolicy, clock: &dyn Clock, mut check: F) -> Result<bool>
where
    F: FnMut(u32) -> Result<bool>,
{
    let start = clock.elapsed();
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        if check(attempt)? {
            trace!("Condition met after {} attempt(s)", attempt);
            return Ok(true);
        }
        if policy.max_attempts.is_some_and(|max| attempt >= max) {
            return Ok(false);
        }
        if clock.elapsed().saturating_sub(start) >= policy.timeout {
            return Ok(false);
        }
        clock.sleep(policy.interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_returns_immediately_when_condition_holds() {
        let clock = ManualClock::new();
        let policy = PollPolicy::new(Duration::from_secs(30), Duration::from_secs(5));
        assert!(poll_until(&policy, &clock, |_| Ok(true)).unwrap());
        assert_eq!(clock.sleeps(), 0);
    }

    #[test]
    fn test_timeout_bounded_by_timeout_plus_interval() {
        let clock = ManualClock::new();
        let policy = PollPolicy::new(Duration::from_secs(12), Duration::from_secs(5));
        let met = poll_until(&policy, &clock, |_| Ok(false)).unwrap();
        assert!(!met);
        assert!(clock.elapsed() <= policy.timeout + policy.interval);
        assert!(clock.elapsed() >= policy.timeout);
    }

    #[test]
    fn test_never_polls_faster_than_interval() {
        let clock = ManualClock::new();
        let policy = PollPolicy::new(Duration::from_secs(20), Duration::from_secs(5));
        let mut seen = Vec::new();
        poll_until(&policy, &clock, |_| {
            seen.push(clock.elapsed());
            Ok(false)
        })
        .unwrap();
        for pair in seen.windows(2) {
            assert!(pair[1] - pair[0] >= policy.interval);
        }
    }

    #[test]
    fn test_attempt_limit() {
        let clock = ManualClock::new();
        let policy = PollPolicy::attempts(3, Duration::from_secs(5));
        let mut calls = 0;
        let met = poll_until(&policy, &clock, |_| {
            calls += 1;
            Ok(false)
        })
        .unwrap();
        assert!(!met);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_condition_met_on_later_attempt() {
        let clock = ManualClock::new();
        let policy = PollPolicy::new(Duration::from_secs(60), Duration::from_secs(5));
        let met = poll_until(&policy, &clock, |attempt| Ok(attempt == 4)).unwrap();
        assert!(met);
        assert_eq!(clock.elapsed(), Duration::from_secs(15));
    }
}
