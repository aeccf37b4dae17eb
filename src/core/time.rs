use crate::error::{Error, Result};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// Simulation time split into the quotient and remainder of a division by one.
///
/// Event times grow without bound during a run while time displacements stay small. Keeping the
/// integral part separate stops the fractional part from losing precision, so positions advanced by
/// `velocity * (t_event - t_stamp)` stay accurate late in long runs.
///
/// Ordering is lexicographic on `(quotient, remainder)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Time {
    quotient: OrderedFloat<f64>,
    remainder: OrderedFloat<f64>,
}

impl Time {
    pub const ZERO: Time = Time {
        quotient: OrderedFloat(0.0),
        remainder: OrderedFloat(0.0),
    };

    /// Time that never arrives (used for handlers that will not produce an event).
    pub const INFINITY: Time = Time {
        quotient: OrderedFloat(f64::INFINITY),
        remainder: OrderedFloat(f64::INFINITY),
    };

    /// Convert a float into a time, rejecting NaN.
    pub fn new(time: f64) -> Result<Self> {
        if time.is_nan() {
            return Err(Error::InvalidParam("time cannot be NaN".into()));
        }
        Ok(Self::from_float(time))
    }

    /// Convert a non-NaN float into a time.
    #[inline]
    pub fn from_float(time: f64) -> Self {
        if time.is_infinite() {
            return Self {
                quotient: OrderedFloat(time),
                remainder: OrderedFloat(time),
            };
        }
        Self::normalized(time.div_euclid(1.0), time.rem_euclid(1.0))
    }

    fn normalized(quotient: f64, remainder: f64) -> Self {
        // rem_euclid may round to exactly 1.0
        let (quotient, remainder) = if remainder >= 1.0 {
            (quotient + 1.0, remainder - 1.0)
        } else {
            (quotient, remainder)
        };
        Self {
            quotient: OrderedFloat(quotient),
            remainder: OrderedFloat(remainder),
        }
    }

    #[inline]
    pub fn quotient(&self) -> f64 {
        self.quotient.into_inner()
    }

    #[inline]
    pub fn remainder(&self) -> f64 {
        self.remainder.into_inner()
    }

    #[inline]
    pub fn is_infinite(&self) -> bool {
        self.quotient.is_infinite()
    }

    /// Lossy conversion back into a float.
    #[inline]
    pub fn to_f64(&self) -> f64 {
        if self.is_infinite() {
            return self.quotient();
        }
        self.quotient() + self.remainder()
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Add<f64> for Time {
    type Output = Time;

    fn add(self, displacement: f64) -> Time {
        if self.is_infinite() || displacement.is_infinite() {
            return Time::from_float(self.to_f64() + displacement);
        }
        let sum = self.remainder() + displacement;
        Time::normalized(self.quotient() + sum.div_euclid(1.0), sum.rem_euclid(1.0))
    }
}

impl Sub for Time {
    type Output = f64;

    /// Difference in float precision; exact for the integral parts.
    fn sub(self, other: Time) -> f64 {
        (self.quotient() - other.quotient()) + (self.remainder() - other.remainder())
    }
}

impl From<f64> for Time {
    fn from(time: f64) -> Self {
        Time::from_float(time)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_f64())
    }
}
