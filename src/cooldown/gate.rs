//! At-most-once-per-interval gate
//!
//! A single timestamp guarded by a mutex. `consume` checks and records in
//! one critical section, so two callers racing at the interval boundary can
//! never both get through.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::clock::{Clock, MonotonicClock};

/// Outcome of asking the gate whether an action may run now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDecision {
    /// Whether the action may proceed
    pub allowed: bool,
    /// Time until the gate opens, rounded up to whole seconds (zero when allowed)
    pub retry_after: Duration,
}

impl GateDecision {
    fn open() -> Self {
        Self {
            allowed: true,
            retry_after: Duration::ZERO,
        }
    }

    fn closed(remaining: Duration) -> Self {
        Self {
            allowed: false,
            retry_after: ceil_to_secs(remaining),
        }
    }
}

/// Errors raised when building a gate
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("invalid cooldown interval {interval:?}: must be greater than zero")]
    InvalidConfiguration { interval: Duration },
}

/// Returned by [`CooldownGate::enforce`] while the gate is closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rate limited, retry after {}s", .retry_after.as_secs())]
pub struct GateBlocked {
    pub retry_after: Duration,
}

/// Thread-safe cooldown gate
#[derive(Debug)]
pub struct CooldownGate<C: Clock = MonotonicClock> {
    min_interval: Duration,
    clock: C,
    /// `None` until the first successful consumption (or after a reset)
    last_allowed_at: Mutex<Option<Instant>>,
}

impl CooldownGate<MonotonicClock> {
    /// Create a gate measured against the monotonic system clock
    pub fn new(min_interval: Duration) -> Result<Self, GateError> {
        Self::with_clock(min_interval, MonotonicClock)
    }
}

impl<C: Clock> CooldownGate<C> {
    /// Create a gate with an explicit time source
    pub fn with_clock(min_interval: Duration, clock: C) -> Result<Self, GateError> {
        if min_interval.is_zero() {
            return Err(GateError::InvalidConfiguration {
                interval: min_interval,
            });
        }

        Ok(Self {
            min_interval,
            clock,
            last_allowed_at: Mutex::new(None),
        })
    }

    /// The configured interval between consumptions
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Report whether the gate is open without consuming it
    pub fn peek(&self) -> GateDecision {
        let last = *self.lock();
        self.decide(last, self.clock.now())
    }

    /// Check the gate and, if open, record a consumption atomically
    pub fn consume(&self) -> GateDecision {
        let mut last = self.lock();
        let now = self.clock.now();
        let decision = self.decide(*last, now);
        if decision.allowed {
            *last = Some(now);
        }
        decision
    }

    /// Like [`consume`](Self::consume), but a closed gate is an error
    pub fn enforce(&self) -> Result<(), GateBlocked> {
        let decision = self.consume();
        if decision.allowed {
            Ok(())
        } else {
            Err(GateBlocked {
                retry_after: decision.retry_after,
            })
        }
    }

    /// Forget the last consumption so the next one is allowed immediately
    pub fn reset(&self) {
        *self.lock() = None;
    }

    fn decide(&self, last: Option<Instant>, now: Instant) -> GateDecision {
        let Some(last) = last else {
            return GateDecision::open();
        };

        let elapsed = now.saturating_duration_since(last);
        if elapsed >= self.min_interval {
            GateDecision::open()
        } else {
            GateDecision::closed(self.min_interval - elapsed)
        }
    }

    // The guarded value is a Copy timestamp, so a panic elsewhere can't leave it torn.
    fn lock(&self) -> MutexGuard<'_, Option<Instant>> {
        self.last_allowed_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Round up to whole seconds so a caller waiting `retry_after` is never early
fn ceil_to_secs(d: Duration) -> Duration {
    let extra = u64::from(d.subsec_nanos() > 0);
    Duration::from_secs(d.as_secs() + extra)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cooldown::clock::MockClock;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn gate(secs: u64) -> (CooldownGate<MockClock>, MockClock) {
        let clock = MockClock::new();
        let gate = CooldownGate::with_clock(Duration::from_secs(secs), clock.clone()).unwrap();
        (gate, clock)
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let err = CooldownGate::new(Duration::ZERO).unwrap_err();
        assert_eq!(
            err,
            GateError::InvalidConfiguration {
                interval: Duration::ZERO
            }
        );
    }

    #[test]
    fn test_first_consume_is_allowed() {
        for secs in [1, 2, 15, 3600] {
            let (gate, _) = gate(secs);
            let decision = gate.consume();
            assert!(decision.allowed);
            assert_eq!(decision.retry_after, Duration::ZERO);
        }
    }

    #[test]
    fn test_calls_inside_interval_are_blocked() {
        let (gate, clock) = gate(10);
        assert!(gate.consume().allowed);

        for _ in 0..9 {
            clock.advance(Duration::from_millis(900));
            let decision = gate.consume();
            assert!(!decision.allowed);
            assert!(decision.retry_after > Duration::ZERO);
        }
    }

    #[test]
    fn test_calls_spaced_by_interval_are_allowed() {
        let (gate, clock) = gate(3);
        for _ in 0..5 {
            assert!(gate.consume().allowed);
            clock.advance(Duration::from_secs(3));
        }
    }

    #[test]
    fn test_waiting_retry_after_opens_the_gate() {
        let (gate, clock) = gate(7);
        assert!(gate.consume().allowed);

        for step_ms in [1, 333, 2_500, 6_999] {
            gate.reset();
            assert!(gate.consume().allowed);
            clock.advance(Duration::from_millis(step_ms));

            let blocked = gate.consume();
            assert!(!blocked.allowed);
            clock.advance(blocked.retry_after);
            assert!(gate.consume().allowed, "retry_after under-reported after {step_ms}ms");
        }
    }

    #[test]
    fn test_peek_does_not_consume() {
        let (gate, clock) = gate(5);
        for _ in 0..10 {
            assert!(gate.peek().allowed);
        }
        assert!(gate.consume().allowed);

        clock.advance(Duration::from_secs(2));
        for _ in 0..10 {
            assert_eq!(gate.peek().retry_after, Duration::from_secs(3));
        }
        clock.advance(Duration::from_secs(3));
        assert!(gate.peek().allowed);
        assert!(gate.consume().allowed);
    }

    #[test]
    fn test_reset_reopens_the_gate() {
        let (gate, _) = gate(60);
        assert!(gate.consume().allowed);
        assert!(!gate.consume().allowed);

        gate.reset();
        assert!(gate.consume().allowed);
        assert!(!gate.consume().allowed);
    }

    #[test]
    fn test_enforce_reports_retry_after() {
        let (gate, clock) = gate(4);
        assert_eq!(gate.enforce(), Ok(()));

        clock.advance(Duration::from_millis(1_500));
        let blocked = gate.enforce().unwrap_err();
        assert_eq!(blocked.retry_after, Duration::from_secs(3));
        assert_eq!(blocked.to_string(), "rate limited, retry after 3s");
    }

    #[test]
    fn test_two_second_scenario() {
        let (gate, clock) = gate(2);
        assert!(gate.consume().allowed);

        clock.advance(Duration::from_secs(1));
        assert_eq!(
            gate.consume(),
            GateDecision {
                allowed: false,
                retry_after: Duration::from_secs(1)
            }
        );

        clock.advance(Duration::from_secs(1));
        assert!(gate.consume().allowed);

        clock.advance(Duration::from_millis(100));
        assert_eq!(
            gate.consume(),
            GateDecision {
                allowed: false,
                retry_after: Duration::from_secs(2)
            }
        );
    }

    #[test]
    fn test_concurrent_consumers_get_one_pass() {
        const CALLERS: usize = 16;

        let (gate, _) = gate(30);
        let gate = Arc::new(gate);
        let barrier = Arc::new(Barrier::new(CALLERS));

        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    gate.consume().allowed
                })
            })
            .collect();

        let allowed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|allowed| *allowed)
            .count();
        assert_eq!(allowed, 1);
    }

    #[test]
    fn test_ceil_to_secs() {
        assert_eq!(ceil_to_secs(Duration::from_secs(1)), Duration::from_secs(1));
        assert_eq!(ceil_to_secs(Duration::from_millis(1_900)), Duration::from_secs(2));
        assert_eq!(ceil_to_secs(Duration::from_nanos(1)), Duration::from_secs(1));
    }
}
