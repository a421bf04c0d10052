//! # Time Sources
//!
//! Consensus cares about two different clocks and must never confuse them:
//!
//! - **Monotonic milliseconds** drive round pacing: how long a ledger has
//!   been open, how stale a proposal is, when a peer request times out.
//!   Monotonic time never goes backwards, even when NTP yanks the wall
//!   clock around.
//! - **Wall-clock seconds** (network time) are what validators agree on:
//!   close times and validation sign times are wall times, because they
//!   must mean the same thing on every machine.
//!
//! Everything that needs time takes an `Arc<dyn Clock>`; nothing reads the
//! system clock directly. That one rule is what makes the entire state
//! machine testable: hand the driver a [`ManualClock`] and a ten-minute
//! consensus scenario runs in microseconds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// A source of monotonic and wall-clock time.
pub trait Clock: Send + Sync {
    /// Milliseconds from an arbitrary fixed origin. Never decreases.
    fn monotonic_ms(&self) -> u64;

    /// Seconds since the Unix epoch, per this node's wall clock.
    fn wall_secs(&self) -> u64;
}

// ---------------------------------------------------------------------------
// WallClock
// ---------------------------------------------------------------------------

/// The production clock: `Instant` for monotonic time, `SystemTime` for
/// wall time.
pub struct WallClock {
    origin: Instant,
}

impl WallClock {
    /// Create a wall clock with its monotonic origin at construction time.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for WallClock {
    fn monotonic_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn wall_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

// ---------------------------------------------------------------------------
// ManualClock
// ---------------------------------------------------------------------------

/// A hand-cranked clock for tests.
///
/// Both time bases advance together via [`advance_ms`](Self::advance_ms),
/// so "wait twelve seconds" in a test is one method call instead of one
/// actual wait.
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    /// A manual clock starting at the given wall time (seconds).
    pub fn at_wall_secs(secs: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(secs * 1_000),
        }
    }

    /// A manual clock at a fixed, boring epoch: 2026-01-01T00:00:00Z.
    pub fn new() -> Self {
        Self::at_wall_secs(1_767_225_600)
    }

    /// Advance both time bases by `ms` milliseconds.
    pub fn advance_ms(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    /// Advance both time bases by `secs` seconds.
    pub fn advance_secs(&self, secs: u64) {
        self.advance_ms(secs * 1_000);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn monotonic_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    fn wall_secs(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst) / 1_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wall_clock_monotonic_does_not_decrease() {
        let clock = WallClock::new();
        let a = clock.monotonic_ms();
        let b = clock.monotonic_ms();
        assert!(b >= a);
    }

    #[test]
    fn wall_clock_wall_secs_is_plausible() {
        // Anything before 2024 means the host clock is broken.
        assert!(WallClock::new().wall_secs() > 1_700_000_000);
    }

    #[test]
    fn manual_clock_advances_on_demand() {
        let clock = ManualClock::at_wall_secs(1_000);
        assert_eq!(clock.wall_secs(), 1_000);
        assert_eq!(clock.monotonic_ms(), 1_000_000);

        clock.advance_ms(2_500);
        assert_eq!(clock.monotonic_ms(), 1_002_500);
        assert_eq!(clock.wall_secs(), 1_002);

        clock.advance_secs(10);
        assert_eq!(clock.wall_secs(), 1_012);
    }

    #[test]
    fn manual_clock_is_frozen_between_advances() {
        let clock = ManualClock::new();
        let a = clock.monotonic_ms();
        let b = clock.monotonic_ms();
        assert_eq!(a, b);
    }
}
