
//! Simple math utilities.
//! Contains the two-dimensional vector used for resolutions and positions,
//! and the resolution level arithmetic shared by tiled parts.

use std::convert::TryFrom;
use std::ops::{Add, Div, Mul, Sub};
use crate::error::{Error, Result};

/// Simple two-dimensional vector of any numeric type.
/// Supports only few mathematical operations, as this is used mainly as a data struct.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Vec2<T>(pub T, pub T);

impl<T> Vec2<T> {

    /// Returns the vector with the maximum of both components of the two inputs.
    pub fn max(self, other: Self) -> Self where T: Ord {
        Vec2(self.0.max(other.0), self.1.max(other.1))
    }

    /// Returns the vector with the minimum of both components of the two inputs.
    pub fn min(self, other: Self) -> Self where T: Ord {
        Vec2(self.0.min(other.0), self.1.min(other.1))
    }

    /// Try to convert all components of this vector to a new type,
    /// yielding either a vector of that new type, or an error.
    pub fn try_from<S>(value: Vec2<S>) -> std::result::Result<Self, T::Error> where T: TryFrom<S> {
        let x = T::try_from(value.0)?;
        let y = T::try_from(value.1)?;
        Ok(Vec2(x, y))
    }

    /// Seeing this vector as a dimension or size (width and height),
    /// this returns the area of that rectangle.
    pub fn area(self) -> T where T: Mul<T, Output = T> {
        self.0 * self.1
    }

    /// The first component of this 2D vector.
    #[inline] pub fn x(self) -> T where T: Copy { self.0 }

    /// The second component of this 2D vector.
    #[inline] pub fn y(self) -> T where T: Copy { self.1 }

    /// The first component of this 2D vector. (Method for better readability.)
    #[inline] pub fn width(self) -> T where T: Copy { self.0 }

    /// The second component of this 2D vector. (Method for better readability.)
    #[inline] pub fn height(self) -> T where T: Copy { self.1 }
}

impl Vec2<i32> {

    /// Try to convert to [`Vec2<usize>`], returning an error on negative numbers.
    pub fn to_usize(self, error_message: &'static str) -> Result<Vec2<usize>> {
        Vec2::try_from(self).map_err(|_| Error::invalid(error_message))
    }
}

impl Vec2<usize> {

    /// Panics on too large value
    pub fn to_i32(self) -> Vec2<i32> {
        Vec2::try_from(self).expect("(usize as i32) overflowed")
    }
}

impl<T: Add<T>> Add<Vec2<T>> for Vec2<T> {
    type Output = Vec2<T::Output>;
    fn add(self, other: Vec2<T>) -> Self::Output {
        Vec2(self.0 + other.0, self.1 + other.1)
    }
}

impl<T: Sub<T>> Sub<Vec2<T>> for Vec2<T> {
    type Output = Vec2<T::Output>;
    fn sub(self, other: Vec2<T>) -> Self::Output {
        Vec2(self.0 - other.0, self.1 - other.1)
    }
}

impl<T: Div<T>> Div<Vec2<T>> for Vec2<T> {
    type Output = Vec2<T::Output>;
    fn div(self, other: Vec2<T>) -> Self::Output {
        Vec2(self.0 / other.0, self.1 / other.1)
    }
}

impl<T: Mul<T>> Mul<Vec2<T>> for Vec2<T> {
    type Output = Vec2<T::Output>;
    fn mul(self, other: Vec2<T>) -> Self::Output {
        Vec2(self.0 * other.0, self.1 * other.1)
    }
}

impl<T> From<(T, T)> for Vec2<T> {
    fn from((x, y): (T, T)) -> Self { Vec2(x, y) }
}

impl<T> From<Vec2<T>> for (T, T) {
    fn from(vec2: Vec2<T>) -> Self { (vec2.0, vec2.1) }
}


/// Computes `floor(log(x) / log(2))`. Returns `0` where argument is `0`.
pub fn floor_log_2(mut number: u32) -> u32 {
    let mut log = 0;

    while number > 1 {
        log += 1;
        number >>= 1;
    }

    log
}


/// Computes `ceil(log(x) / log(2))`. Returns `0` where argument is `0`.
pub fn ceil_log_2(mut number: u32) -> u32 {
    let mut log = 0;
    let mut round_up = 0;

    while number > 1 {
        if number & 1 != 0 {
            round_up = 1;
        }

        log += 1;
        number >>= 1;
    }

    log + round_up
}


/// Whether to round up or down, for example when dividing resolution levels.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum RoundingMode {

    /// Round down.
    Down,

    /// Round up.
    Up,
}

impl RoundingMode {

    /// Compute the logarithm with base 2, rounding according to this mode.
    pub fn log2(self, number: u32) -> u32 {
        match self {
            RoundingMode::Down => self::floor_log_2(number),
            RoundingMode::Up => self::ceil_log_2(number),
        }
    }

    /// Computes `dividend / divisor`, rounding according to this mode.
    /// Only works for positive numbers.
    pub fn divide<T>(self, dividend: T, divisor: T) -> T
        where T: Copy + Add<Output = T> + Sub<Output = T> + Div<Output = T> + From<u8>
    {
        match self {
            RoundingMode::Up => (dividend + divisor - T::from(1_u8)) / divisor,
            RoundingMode::Down => dividend / divisor,
        }
    }
}

// used in a couple of places where we truly want ceiling division,
// regardless of any level rounding mode
pub(crate) fn div_ceil(dividend: usize, divisor: usize) -> usize {
    RoundingMode::Up.divide(dividend, divisor)
}

/// Divide, rounding towards negative infinity.
/// Required for sampling factors of pixel positions, which may be negative.
pub(crate) fn div_p(x: i32, y: i32) -> i32 {
    if x >= 0 {
        if y >= 0 { x / y }
        else { -(x / -y) }
    }
    else if y >= 0 { -((y - 1 - x) / y) }
    else { (-y - 1 - x) / -y }
}

/// The remainder of `div_p`. Never negative.
pub(crate) fn mod_p(x: i32, y: i32) -> i32 {
    x - y * div_p(x, y)
}

/// The number of positions in `[first, first + count)` that are
/// divisible by the sampling factor. The range may start anywhere,
/// in particular between two sampled positions.
pub(crate) fn count_sampled(first: i32, count: usize, sampling: usize) -> usize {
    if count == 0 { return 0; }

    let sampling = sampling as i32;
    let last = first + count as i32 - 1;

    (div_p(last, sampling) - div_p(first - 1, sampling)) as usize
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn log_2(){
        assert_eq!(floor_log_2(1), 0);
        assert_eq!(floor_log_2(2), 1);
        assert_eq!(floor_log_2(3), 1);
        assert_eq!(floor_log_2(4), 2);
        assert_eq!(floor_log_2(1024), 10);
        assert_eq!(floor_log_2(1023), 9);

        assert_eq!(ceil_log_2(1), 0);
        assert_eq!(ceil_log_2(2), 1);
        assert_eq!(ceil_log_2(3), 2);
        assert_eq!(ceil_log_2(4), 2);
        assert_eq!(ceil_log_2(1024), 10);
        assert_eq!(ceil_log_2(1025), 11);
    }

    #[test]
    fn divide(){
        assert_eq!(RoundingMode::Up.divide(7_usize, 2), 4);
        assert_eq!(RoundingMode::Down.divide(7_usize, 2), 3);
        assert_eq!(RoundingMode::Up.divide(8_usize, 2), 4);
        assert_eq!(RoundingMode::Down.divide(8_usize, 2), 4);
    }
}
