//! Tick clock for the Vitalis simulation.
//!
//! The clock is the single source of truth for simulated time. It counts
//! ticks from 0 up to the configured run length. Ticks are also written
//! into the store's 32-bit tick columns, whose maximum value is reserved as
//! the "unset" sentinel, so a run length that does not fit below the
//! sentinel is rejected when the clock is built rather than mid-run.

use vitalis_population::TICK_UNSET;

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// Tick counter would overflow.
    #[error("tick counter overflow: cannot advance beyond u64::MAX")]
    TickOverflow,

    /// The run is longer than the tick columns can represent.
    #[error("run of {num_ticks} ticks is too long: tick columns hold values below {limit}")]
    RunTooLong {
        /// Requested run length.
        num_ticks: u64,
        /// First tick value that cannot be stored.
        limit: u64,
    },
}

/// Simulation clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickClock {
    /// The tick that will run next (0-indexed).
    tick: u64,

    /// Total number of ticks in the run.
    num_ticks: u64,
}

impl TickClock {
    /// Create a clock for a run of `num_ticks` ticks.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::RunTooLong`] if `num_ticks` is not strictly
    /// below the tick-column sentinel.
    pub fn new(num_ticks: u64) -> Result<Self, ClockError> {
        let limit = tick_limit();
        if num_ticks >= limit {
            return Err(ClockError::RunTooLong { num_ticks, limit });
        }
        Ok(Self { tick: 0, num_ticks })
    }

    /// Advance the clock by one tick. Returns the new tick number.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::TickOverflow`] if the tick counter would exceed
    /// `u64::MAX`.
    pub fn advance(&mut self) -> Result<u64, ClockError> {
        self.tick = self.tick.checked_add(1).ok_or(ClockError::TickOverflow)?;
        Ok(self.tick)
    }

    /// The tick that will run next.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Configured run length.
    pub const fn num_ticks(&self) -> u64 {
        self.num_ticks
    }

    /// Whether every configured tick has run.
    pub const fn is_finished(&self) -> bool {
        self.tick >= self.num_ticks
    }

    /// Ticks left to run.
    pub const fn remaining(&self) -> u64 {
        self.num_ticks.saturating_sub(self.tick)
    }
}

/// First tick value the tick columns cannot hold.
fn tick_limit() -> u64 {
    u64::try_from(TICK_UNSET).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn clock_starts_at_tick_zero() {
        let clock = TickClock::new(10).unwrap();
        assert_eq!(clock.tick(), 0);
        assert_eq!(clock.remaining(), 10);
        assert!(!clock.is_finished());
    }

    #[test]
    fn clock_advances_to_the_end() {
        let mut clock = TickClock::new(3).unwrap();
        assert_eq!(clock.advance().unwrap(), 1);
        assert_eq!(clock.advance().unwrap(), 2);
        assert!(!clock.is_finished());
        assert_eq!(clock.advance().unwrap(), 3);
        assert!(clock.is_finished());
        assert_eq!(clock.remaining(), 0);
    }

    #[test]
    fn run_length_must_fit_below_sentinel() {
        let limit = u64::try_from(TICK_UNSET).unwrap();
        assert!(TickClock::new(limit.saturating_sub(1)).is_ok());
        assert!(matches!(
            TickClock::new(limit),
            Err(ClockError::RunTooLong { .. })
        ));
        assert!(TickClock::new(u64::MAX).is_err());
    }

    #[test]
    fn zero_length_run_is_finished() {
        let clock = TickClock::new(0).unwrap();
        assert!(clock.is_finished());
    }
}
