use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Neg, Sub};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    #[error("Invalid frame rate {num}/{den}: numerator and denominator must be positive")]
    InvalidRate { num: i64, den: i64 },
    #[error("Cannot divide a time value by zero")]
    DivideByZero,
}

/// Frames per second as an exact fraction (e.g. 30000/1001 for 29.97).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "FrameRateRepr", into = "FrameRateRepr")]
pub struct FrameRate {
    num: i64,
    den: i64,
}

#[derive(Serialize, Deserialize)]
struct FrameRateRepr {
    num: i64,
    den: i64,
}

impl FrameRate {
    pub const FPS_24: Self = Self { num: 24, den: 1 };
    pub const FPS_25: Self = Self { num: 25, den: 1 };
    pub const FPS_30: Self = Self { num: 30, den: 1 };
    pub const FPS_29_97: Self = Self { num: 30000, den: 1001 };
    pub const FPS_60: Self = Self { num: 60, den: 1 };

    pub fn new(num: i64, den: i64) -> Result<Self, TimeError> {
        if num <= 0 || den <= 0 {
            return Err(TimeError::InvalidRate { num, den });
        }
        Ok(Self { num, den })
    }

    pub fn num(&self) -> i64 {
        self.num
    }

    pub fn den(&self) -> i64 {
        self.den
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl TryFrom<FrameRateRepr> for FrameRate {
    type Error = TimeError;

    fn try_from(repr: FrameRateRepr) -> Result<Self, Self::Error> {
        Self::new(repr.num, repr.den)
    }
}

impl From<FrameRate> for FrameRateRepr {
    fn from(rate: FrameRate) -> Self {
        Self { num: rate.num, den: rate.den }
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

/// An exact whole number of frames at a given frame rate.
///
/// Equality and ordering compare the time the value represents, so `30@30`
/// equals `25@25`. Use [`Rational::identical`] when the stored representation
/// itself must match (row comparisons, undo verification).
///
/// Arithmetic between values of different rates rescales the right-hand operand
/// into the left-hand operand's rate with integer math only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "RationalRepr", into = "RationalRepr")]
pub struct Rational {
    frames: i64,
    rate: FrameRate,
}

/// Serialized shape of a [`Rational`]. Hydration always goes through
/// [`Rational::new`], so malformed rates are rejected.
#[derive(Serialize, Deserialize)]
struct RationalRepr {
    frames: i64,
    rate_num: i64,
    rate_den: i64,
}

impl TryFrom<RationalRepr> for Rational {
    type Error = TimeError;

    fn try_from(repr: RationalRepr) -> Result<Self, Self::Error> {
        Self::new(repr.frames, repr.rate_num, repr.rate_den)
    }
}

impl From<Rational> for RationalRepr {
    fn from(value: Rational) -> Self {
        Self {
            frames: value.frames,
            rate_num: value.rate.num,
            rate_den: value.rate.den,
        }
    }
}

impl Rational {
    pub fn new(frames: i64, rate_num: i64, rate_den: i64) -> Result<Self, TimeError> {
        Ok(Self {
            frames,
            rate: FrameRate::new(rate_num, rate_den)?,
        })
    }

    pub fn from_frames(frames: i64, rate: FrameRate) -> Self {
        Self { frames, rate }
    }

    pub fn zero(rate: FrameRate) -> Self {
        Self { frames: 0, rate }
    }

    pub fn frames(&self) -> i64 {
        self.frames
    }

    pub fn rate(&self) -> FrameRate {
        self.rate
    }

    pub fn is_zero(&self) -> bool {
        self.frames == 0
    }

    pub fn is_positive(&self) -> bool {
        self.frames > 0
    }

    pub fn is_negative(&self) -> bool {
        self.frames < 0
    }

    /// Same frame count and same rate, not merely the same instant.
    pub fn identical(&self, other: &Self) -> bool {
        self.frames == other.frames && self.rate == other.rate
    }

    /// Re-express this value at `rate`, rounding to the nearest frame
    /// (halves away from zero).
    pub fn rescale(&self, rate: FrameRate) -> Self {
        self.rescale_with(rate, div_round)
    }

    /// Re-express this value at `rate`, rounding toward earlier time. The
    /// result never lies after `self`.
    pub fn rescale_floor(&self, rate: FrameRate) -> Self {
        self.rescale_with(rate, i128::div_euclid)
    }

    /// Re-express this value at `rate`, rounding toward later time. The
    /// result never lies before `self`.
    pub fn rescale_ceil(&self, rate: FrameRate) -> Self {
        self.rescale_with(rate, |n, d| -(-n).div_euclid(d))
    }

    fn rescale_with(&self, rate: FrameRate, divide: impl Fn(i128, i128) -> i128) -> Self {
        if rate == self.rate {
            return *self;
        }
        let numer = self.frames as i128 * rate.num as i128 * self.rate.den as i128;
        let denom = self.rate.num as i128 * rate.den as i128;
        Self {
            frames: saturate(divide(numer, denom)),
            rate,
        }
    }

    pub fn mul_int(&self, factor: i64) -> Self {
        Self {
            frames: self.frames.saturating_mul(factor),
            rate: self.rate,
        }
    }

    pub fn div_int(&self, divisor: i64) -> Result<Self, TimeError> {
        if divisor == 0 {
            return Err(TimeError::DivideByZero);
        }
        let (n, d) = if divisor < 0 {
            (-(self.frames as i128), -(divisor as i128))
        } else {
            (self.frames as i128, divisor as i128)
        };
        Ok(Self {
            frames: saturate(div_round(n, d)),
            rate: self.rate,
        })
    }

    /// Seconds as a float. Display only; never feed this back into arithmetic.
    pub fn to_seconds(&self) -> f64 {
        self.frames as f64 * self.rate.den as f64 / self.rate.num as f64
    }

    /// Cross-multiplied magnitude used for exact comparison against `other`.
    fn scaled_against(&self, other: &Self) -> i128 {
        self.frames as i128 * self.rate.den as i128 * other.rate.num as i128
    }
}

/// Integer division rounding to nearest, halves away from zero. `d` must be positive.
fn div_round(n: i128, d: i128) -> i128 {
    let q = n / d;
    let r = n % d;
    if 2 * r.abs() >= d {
        q + n.signum()
    } else {
        q
    }
}

fn saturate(v: i128) -> i64 {
    i64::try_from(v).unwrap_or(if v < 0 { i64::MIN } else { i64::MAX })
}

impl PartialEq for Rational {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Rational {}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.rate == other.rate {
            return self.frames.cmp(&other.frames);
        }
        self.scaled_against(other).cmp(&other.scaled_against(self))
    }
}

impl Add for Rational {
    type Output = Rational;

    fn add(self, rhs: Rational) -> Rational {
        let rhs = rhs.rescale(self.rate);
        Rational {
            frames: self.frames.saturating_add(rhs.frames),
            rate: self.rate,
        }
    }
}

impl Sub for Rational {
    type Output = Rational;

    fn sub(self, rhs: Rational) -> Rational {
        let rhs = rhs.rescale(self.rate);
        Rational {
            frames: self.frames.saturating_sub(rhs.frames),
            rate: self.rate,
        }
    }
}

impl Neg for Rational {
    type Output = Rational;

    fn neg(self) -> Rational {
        Rational {
            frames: -self.frames,
            rate: self.rate,
        }
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.frames, self.rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(frames: i64, num: i64, den: i64) -> Rational {
        Rational::new(frames, num, den).unwrap()
    }

    #[test]
    fn test_same_rate_addition() {
        let sum = r(10, 30, 1) + r(5, 30, 1);
        assert!(sum.identical(&r(15, 30, 1)));
        assert_eq!(sum, r(15, 30, 1));
    }

    #[test]
    fn test_cross_rate_equality() {
        assert_eq!(r(30, 30, 1), r(25, 25, 1));
        assert_ne!(r(30, 30, 1), r(24, 25, 1));
        assert!(r(29, 30, 1) < r(25, 25, 1));
    }

    #[test]
    fn test_cross_rate_add_rescales_rhs_into_lhs_rate() {
        // 12 frames at 24fps is half a second, 15 frames at 30fps.
        let sum = r(10, 30, 1) + r(12, 24, 1);
        assert_eq!(sum.frames(), 25);
        assert_eq!(sum.rate(), FrameRate::FPS_30);
    }

    #[test]
    fn test_rescale_ntsc_rounds_to_nearest_frame() {
        let ntsc = Rational::from_frames(1001, FrameRate::FPS_29_97);
        assert_eq!(ntsc.rescale(FrameRate::FPS_30).frames(), 1002);
        let back = Rational::from_frames(30, FrameRate::FPS_30).rescale(FrameRate::FPS_29_97);
        assert_eq!(back.frames(), 30);
    }

    #[test]
    fn test_rescale_negative_rounds_away_from_zero() {
        // -1 frame at 24 is -1.25 frames at 30 -> -1; -2 at 24 is -2.5 -> -3.
        assert_eq!(r(-1, 24, 1).rescale(FrameRate::FPS_30).frames(), -1);
        assert_eq!(r(-2, 24, 1).rescale(FrameRate::FPS_30).frames(), -3);
    }

    #[test]
    fn test_directed_rescale_brackets_the_exact_time() {
        // 3 frames at 24fps is 3.75 frames at 30fps.
        let v = r(3, 24, 1);
        assert_eq!(v.rescale_floor(FrameRate::FPS_30).frames(), 3);
        assert_eq!(v.rescale_ceil(FrameRate::FPS_30).frames(), 4);
        assert_eq!(r(-3, 24, 1).rescale_floor(FrameRate::FPS_30).frames(), -4);
        assert_eq!(r(-3, 24, 1).rescale_ceil(FrameRate::FPS_30).frames(), -3);
        // Exact conversions are unchanged in either direction.
        assert_eq!(r(24, 24, 1).rescale_floor(FrameRate::FPS_30).frames(), 30);
        assert_eq!(r(24, 24, 1).rescale_ceil(FrameRate::FPS_30).frames(), 30);
    }

    #[test]
    fn test_invalid_rate_rejected() {
        assert!(matches!(Rational::new(1, 0, 1), Err(TimeError::InvalidRate { .. })));
        assert!(matches!(Rational::new(1, 30, -1), Err(TimeError::InvalidRate { .. })));
        assert!(FrameRate::new(-24, 1).is_err());
    }

    #[test]
    fn test_div_and_mul_by_integer() {
        let viewport = r(305, 30, 1);
        assert_eq!(viewport.div_int(10).unwrap().frames(), 31);
        assert_eq!(r(-305, 30, 1).div_int(10).unwrap().frames(), -31);
        assert_eq!(viewport.mul_int(2).frames(), 610);
        assert_eq!(viewport.div_int(0), Err(TimeError::DivideByZero));
    }

    #[test]
    fn test_hydrate_from_serialized_shape() {
        let value: Rational =
            serde_json::from_str(r#"{"frames":48,"rate_num":24,"rate_den":1}"#).unwrap();
        assert!(value.identical(&r(48, 24, 1)));

        let bad = serde_json::from_str::<Rational>(r#"{"frames":48,"rate_num":0,"rate_den":1}"#);
        assert!(bad.is_err());

        let json = serde_json::to_string(&r(7, 30000, 1001)).unwrap();
        assert_eq!(json, r#"{"frames":7,"rate_num":30000,"rate_den":1001}"#);
    }
}
