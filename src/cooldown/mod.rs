//! Cooldown gate guarding the outbound notification
//!
//! Permits an action at most once per fixed interval, measured against a
//! monotonic clock.

mod clock;
mod gate;

pub use clock::{Clock, MonotonicClock};
pub use gate::{CooldownGate, GateBlocked};

#[cfg(test)]
pub use clock::MockClock;
