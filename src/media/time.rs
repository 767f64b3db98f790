//! Rational time bases and timestamp rescaling

use serde::{Deserialize, Serialize};

/// Rational number, used both for stream time bases (seconds per tick) and
/// for frame rates (frames per second).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    num: i32,
    den: i32,
}

/// Seconds represented by one timestamp tick of a stream.
pub type TimeBase = Rational;

impl Rational {
    pub const MILLISECONDS: Rational = Rational::new(1, 1_000);
    pub const MICROSECONDS: Rational = Rational::new(1, 1_000_000);

    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    pub const fn num(&self) -> i32 {
        self.num
    }

    pub const fn den(&self) -> i32 {
        self.den
    }

    /// A rational with a zero on either side carries no usable value.
    pub fn is_valid(&self) -> bool {
        self.num != 0 && self.den != 0
    }

    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }
}

impl std::fmt::Display for Rational {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Rescale `value` from time base `from` to time base `to`, rounding half
/// away from zero. Saturates at the `i64` range.
pub fn rescale(value: i64, from: TimeBase, to: TimeBase) -> i64 {
    if from == to {
        return value;
    }

    let numerator = value as i128 * from.num as i128 * to.den as i128;
    let denominator = from.den as i128 * to.num as i128;
    if denominator == 0 {
        return value;
    }

    let rounded = div_round(numerator, denominator);
    rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Convert a timestamp expressed in `time_base` into whole milliseconds.
pub fn to_millis(value: i64, time_base: TimeBase) -> i64 {
    rescale(value, time_base, Rational::MILLISECONDS)
}

fn div_round(numerator: i128, denominator: i128) -> i128 {
    let (numerator, denominator) = if denominator < 0 {
        (-numerator, -denominator)
    } else {
        (numerator, denominator)
    };

    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    if remainder.abs() * 2 >= denominator {
        quotient + numerator.signum()
    } else {
        quotient
    }
}
