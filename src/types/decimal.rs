//! Fixed-point decimal with an i128 coefficient
//!
//! A decimal is `unscaled * 10^-scale`. The coefficient holds at most
//! [`MAX_PRECISION`] significant digits, which is what the 128-bit wire kind
//! can carry.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Result, WireError};

/// Significant digits representable by the widest decimal kind
pub const MAX_PRECISION: u32 = 38;

/// Exact decimal value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Decimal {
    unscaled: i128,
    scale: u8,
}

/// `10^n` if it fits in an i128
pub(crate) fn pow10(n: u32) -> Option<i128> {
    10i128.checked_pow(n)
}

/// Number of decimal digits in `v` (zero has one digit)
fn digit_count(v: u128) -> u32 {
    if v == 0 {
        1
    } else {
        v.ilog10() + 1
    }
}

/// Divide by `10^n`, rounding half away from zero
fn div_round(v: i128, n: u32) -> i128 {
    if n == 0 {
        return v;
    }
    match pow10(n) {
        Some(divisor) => {
            let quotient = v / divisor;
            let remainder = (v % divisor).unsigned_abs();
            if remainder * 2 >= divisor.unsigned_abs() {
                quotient + v.signum()
            } else {
                quotient
            }
        }
        // |v| < 10^39 <= divisor
        None => 0,
    }
}

impl Decimal {
    pub const ZERO: Decimal = Decimal { unscaled: 0, scale: 0 };

    pub fn new(unscaled: i128, scale: u8) -> Result<Self> {
        if scale as u32 > MAX_PRECISION {
            return Err(WireError::overflow(format!("scale {} exceeds {}", scale, MAX_PRECISION)));
        }
        if digit_count(unscaled.unsigned_abs()) > MAX_PRECISION {
            return Err(WireError::overflow(format!(
                "{} has more than {} significant digits",
                unscaled, MAX_PRECISION
            )));
        }
        Ok(Self { unscaled, scale })
    }

    pub fn from_i64(v: i64) -> Self {
        Self { unscaled: v as i128, scale: 0 }
    }

    #[inline]
    pub fn unscaled(&self) -> i128 {
        self.unscaled
    }

    #[inline]
    pub fn scale(&self) -> u8 {
        self.scale
    }

    /// Significant digits in the coefficient
    pub fn digits(&self) -> u32 {
        digit_count(self.unscaled.unsigned_abs())
    }

    /// Change the scale. Scaling up is exact; scaling down rounds half away
    /// from zero.
    pub fn rescale(&self, scale: u8) -> Result<Self> {
        match scale.cmp(&self.scale) {
            Ordering::Equal => Ok(*self),
            Ordering::Greater => {
                let factor = pow10((scale - self.scale) as u32)
                    .ok_or_else(|| WireError::overflow(format!("cannot rescale {} to {}", self, scale)))?;
                let unscaled = self
                    .unscaled
                    .checked_mul(factor)
                    .ok_or_else(|| WireError::overflow(format!("cannot rescale {} to {}", self, scale)))?;
                Decimal::new(unscaled, scale)
            }
            Ordering::Less => Ok(Self {
                unscaled: div_round(self.unscaled, (self.scale - scale) as u32),
                scale,
            }),
        }
    }

    /// Express the value at exactly `scale` within `precision` digits.
    ///
    /// Lowering the scale may only strip trailing zeros. Anything that would
    /// round a digit away, or a coefficient wider than `precision`, fails
    /// with `Overflow`.
    pub fn fit(&self, scale: u8, precision: u32) -> Result<Self> {
        let fitted = if scale < self.scale {
            let factor = pow10((self.scale - scale) as u32)
                .ok_or_else(|| WireError::overflow(format!("cannot rescale {} to {}", self, scale)))?;
            if self.unscaled % factor != 0 {
                return Err(WireError::overflow(format!(
                    "{} has more than {} fractional digits",
                    self, scale
                )));
            }
            Self {
                unscaled: self.unscaled / factor,
                scale,
            }
        } else {
            self.rescale(scale)?
        };
        if fitted.digits() > precision {
            return Err(WireError::overflow(format!(
                "{} needs {} digits at scale {}, precision is {}",
                self,
                fitted.digits(),
                scale,
                precision
            )));
        }
        Ok(fitted)
    }

    pub fn to_f64(&self) -> f64 {
        self.unscaled as f64 / 10f64.powi(self.scale as i32)
    }

    /// Try to express the value as an integer without losing digits
    pub fn to_i64_exact(&self) -> Option<i64> {
        let factor = pow10(self.scale as u32)?;
        if self.unscaled % factor != 0 {
            return None;
        }
        i64::try_from(self.unscaled / factor).ok()
    }

    /// Parse text that may spell NaN; NaN yields `None`
    pub fn parse_nullable(s: &str) -> Result<Option<Self>> {
        let t = s.trim();
        if t.eq_ignore_ascii_case("nan") || t.eq_ignore_ascii_case("-nan") || t.eq_ignore_ascii_case("snan") {
            return Ok(None);
        }
        t.parse().map(Some)
    }

    /// Numeric comparison across scales
    pub fn compare(&self, other: &Decimal) -> Ordering {
        if self.scale == other.scale {
            return self.unscaled.cmp(&other.unscaled);
        }
        let scale = self.scale.max(other.scale);
        match (self.rescale(scale), other.rescale(scale)) {
            (Ok(a), Ok(b)) => a.unscaled.cmp(&b.unscaled),
            _ => self.to_f64().partial_cmp(&other.to_f64()).unwrap_or(Ordering::Equal),
        }
    }
}

impl FromStr for Decimal {
    type Err = WireError;

    /// Accepts `[-+]digits[.digits][e[-+]digits]`. The scale is the number of
    /// fractional digits as written, so `0.00` keeps scale 2.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || WireError::InvalidArgument(format!("invalid decimal literal '{}'", s));
        let t = s.trim();
        let (negative, body) = match t.as_bytes().first() {
            Some(b'-') => (true, &t[1..]),
            Some(b'+') => (false, &t[1..]),
            _ => (false, t),
        };
        let (mantissa, exponent) = match body.find(|c: char| c == 'e' || c == 'E') {
            Some(pos) => {
                let exp: i64 = body[pos + 1..].parse().map_err(|_| invalid())?;
                (&body[..pos], exp)
            }
            None => (body, 0),
        };
        let (int_part, frac_part) = match mantissa.find('.') {
            Some(pos) => (&mantissa[..pos], &mantissa[pos + 1..]),
            None => (mantissa, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let mut digits: Vec<u8> = int_part.bytes().chain(frac_part.bytes()).collect();
        let too_wide = || WireError::overflow(format!("'{}' exceeds {} digits", s, MAX_PRECISION));
        let mut scale = (frac_part.len() as i64).checked_sub(exponent).ok_or_else(too_wide)?;

        let leading = digits.iter().take_while(|&&d| d == b'0').count();
        digits.drain(..leading.min(digits.len().saturating_sub(1)));
        if digits.len() == 1 && digits[0] == b'0' && scale < 0 {
            scale = 0;
        }

        if scale < 0 {
            let width = (digits.len() as i64).checked_sub(scale).ok_or_else(too_wide)?;
            if width > (MAX_PRECISION + 1) as i64 {
                return Err(too_wide());
            }
            digits.extend(std::iter::repeat(b'0').take((-scale) as usize));
            scale = 0;
        }

        // Round away fractional digits beyond the precision or the maximum scale
        let excess_digits = digits.len().saturating_sub(MAX_PRECISION as usize) as i64;
        let excess_scale = (scale - MAX_PRECISION as i64).max(0);
        let drop = excess_digits.max(excess_scale);
        if drop > scale {
            return Err(WireError::overflow(format!(
                "'{}' has more than {} integral digits",
                s, MAX_PRECISION
            )));
        }

        let parse = |ds: &[u8]| -> Result<i128> {
            if ds.is_empty() {
                return Ok(0);
            }
            std::str::from_utf8(ds)
                .map_err(|_| invalid())?
                .parse::<i128>()
                .map_err(|_| WireError::overflow(format!("'{}' exceeds {} digits", s, MAX_PRECISION)))
        };

        let mut unscaled = if drop == 0 {
            parse(&digits)?
        } else {
            let drop = drop as usize;
            let keep_len = digits.len().saturating_sub(drop);
            let first_dropped = if drop > digits.len() { b'0' } else { digits[keep_len] };
            let mut kept = parse(&digits[..keep_len])?;
            if first_dropped >= b'5' {
                kept += 1;
            }
            scale -= drop as i64;
            kept
        };
        if digit_count(unscaled.unsigned_abs()) > MAX_PRECISION {
            // Only reachable as 10^38 after a rounding carry
            if scale == 0 {
                return Err(WireError::overflow(format!("'{}' exceeds {} digits", s, MAX_PRECISION)));
            }
            unscaled /= 10;
            scale -= 1;
        }
        if negative {
            unscaled = -unscaled;
        }
        Decimal::new(unscaled, scale as u8)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.unscaled < 0 { "-" } else { "" };
        let abs = self.unscaled.unsigned_abs().to_string();
        let scale = self.scale as usize;
        if scale == 0 {
            return write!(f, "{}{}", sign, abs);
        }
        let padded = if abs.len() <= scale {
            format!("{}{}", "0".repeat(scale + 1 - abs.len()), abs)
        } else {
            abs
        };
        let split = padded.len() - scale;
        write!(f, "{}{}.{}", sign, &padded[..split], &padded[split..])
    }
}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}
