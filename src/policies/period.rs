//! # Send period for an item.
//!
//! [`Period`] decides how long an item waits between two sends.
//!
//! - [`Period::Fixed`] always waits exactly `end`
//! - [`Period::Randomized`] draws a uniform delay in `[start, end)` on every re-arm
//!
//! Randomized periods spread sends of many items so they do not fire in lockstep.

use rand::Rng;
use std::time::Duration;

use crate::error::ValidationError;

/// Delay between consecutive sends of one item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Period {
    /// Constant delay.
    Fixed(Duration),

    /// Uniform random delay in `[start, end)`.
    ///
    /// Invariant: `start < end` (checked by [`Period::new`]).
    Randomized { start: Duration, end: Duration },
}

impl Period {
    /// Builds a period from an optional lower bound and an upper bound.
    ///
    /// `None` gives [`Period::Fixed(end)`](Period::Fixed).
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use relaycast::Period;
    ///
    /// let p = Period::new(Some(Duration::from_secs(5)), Duration::from_secs(10)).unwrap();
    /// let d = p.sample();
    /// assert!(d >= Duration::from_secs(5) && d < Duration::from_secs(10));
    ///
    /// assert!(Period::new(Some(Duration::from_secs(10)), Duration::from_secs(5)).is_err());
    /// ```
    pub fn new(start: Option<Duration>, end: Duration) -> Result<Self, ValidationError> {
        match start {
            None => Ok(Period::Fixed(end)),
            Some(start) if start < end => Ok(Period::Randomized { start, end }),
            Some(start) => Err(ValidationError::InvalidPeriod { start, end }),
        }
    }

    /// Constant period.
    pub fn fixed(end: Duration) -> Self {
        Period::Fixed(end)
    }

    /// Re-checks the `start < end` invariant (the enum fields are public).
    pub fn validate(&self) -> Result<(), ValidationError> {
        match *self {
            Period::Fixed(_) => Ok(()),
            Period::Randomized { start, end } if start < end => Ok(()),
            Period::Randomized { start, end } => Err(ValidationError::InvalidPeriod { start, end }),
        }
    }

    /// Draws the next delay.
    pub fn sample(&self) -> Duration {
        match *self {
            Period::Fixed(end) => end,
            Period::Randomized { start, end } => Self::uniform(start, end),
        }
    }

    /// Upper bound of the period.
    pub fn end(&self) -> Duration {
        match *self {
            Period::Fixed(end) | Period::Randomized { end, .. } => end,
        }
    }

    /// Uniform draw over `[start, end)`, in whole nanoseconds.
    fn uniform(start: Duration, end: Duration) -> Duration {
        if start >= end {
            return start;
        }
        let nanos = rand::rng().random_range(start.as_nanos()..end.as_nanos());
        const NANOS_PER_SEC: u128 = 1_000_000_000;
        // Both bounds came from a `Duration`, so the seconds fit in a u64.
        Duration::new((nanos / NANOS_PER_SEC) as u64, (nanos % NANOS_PER_SEC) as u32)
    }
}

impl Default for Period {
    /// One minute, fixed.
    fn default() -> Self {
        Period::Fixed(Duration::from_secs(60))
    }
}
