//! Decimal values for margins, limits and risks.
//!
//! Margins, risk limits and gamma are kept as exact rationals so that comparisons
//! between them never depend on floating point. Values that leave the engine for
//! reporting (the measured risk) are rounded half-up to a fixed number of digits.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use num::{BigInt, BigRational, One, Signed, ToPrimitive, Zero};

use crate::config::AuditError;

/// A non-negative fixed precision decimal, stored as an integer scaled by 10^DIGITS.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct FixedDecimal<const DIGITS: usize> {
    scaled_value: u64,
}

/// The measured risk of an audit, three decimal places.
pub type Risk = FixedDecimal<3>;

impl<const DIGITS: usize> FixedDecimal<DIGITS> {
    /// The scale that scaled_value has been multiplied by.
    pub const SCALE: u64 = {
        let mut res: u64 = 1;
        let mut togo = DIGITS;
        while togo > 0 {
            res *= 10;
            togo -= 1;
        }
        res
    };
    pub const ZERO: Self = FixedDecimal { scaled_value: 0 };
    pub const ONE: Self = FixedDecimal {
        scaled_value: Self::SCALE,
    };

    pub fn scaled_value(&self) -> u64 {
        self.scaled_value
    }

    pub fn from_scaled_value(scaled_value: u64) -> Self {
        FixedDecimal { scaled_value }
    }

    /// Rounds half-up to DIGITS places. Negative values become zero.
    pub fn from_rational_half_up(value: &BigRational) -> Self {
        if !value.is_positive() {
            return Self::ZERO;
        }
        let scaled = value * BigRational::from_integer(BigInt::from(Self::SCALE));
        let half = BigRational::new(BigInt::one(), BigInt::from(2));
        let rounded = (scaled + half).floor().to_integer();
        FixedDecimal {
            scaled_value: rounded.to_u64().unwrap_or(u64::MAX),
        }
    }

    /// Rounds half-up, reading the float through its shortest decimal representation
    /// (0.0125 rounds to 0.013, not to the 0.012 its binary expansion would give).
    /// Non-finite values become zero.
    pub fn from_f64_half_up(value: f64) -> Self {
        if !value.is_finite() {
            return Self::ZERO;
        }
        match parse_decimal(&value.to_string()) {
            Ok(r) => Self::from_rational_half_up(&r),
            Err(_) => Self::ZERO,
        }
    }

    pub fn to_rational(&self) -> BigRational {
        BigRational::new(BigInt::from(self.scaled_value), BigInt::from(Self::SCALE))
    }
}

impl<const DIGITS: usize> From<FixedDecimal<DIGITS>> for f64 {
    fn from(v: FixedDecimal<DIGITS>) -> Self {
        v.scaled_value as f64 / (FixedDecimal::<DIGITS>::SCALE as f64)
    }
}

impl<const DIGITS: usize> Display for FixedDecimal<DIGITS> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let int_portion = self.scaled_value / Self::SCALE;
        let frac_portion = self.scaled_value % Self::SCALE;
        if DIGITS == 0 {
            write!(f, "{}", int_portion)
        } else {
            write!(f, "{}.{:02$}", int_portion, frac_portion, DIGITS)
        }
    }
}

impl<const DIGITS: usize> FromStr for FixedDecimal<DIGITS> {
    type Err = AuditError;

    fn from_str(buf: &str) -> Result<Self, Self::Err> {
        let value = parse_decimal(buf)?;
        if value.is_negative() {
            return Err(AuditError::InvalidDecimal(buf.to_string()));
        }
        Ok(Self::from_rational_half_up(&value))
    }
}

/// Parses a plain decimal string ("0.03", "-1.5", "12") into an exact rational.
pub fn parse_decimal(buf: &str) -> Result<BigRational, AuditError> {
    let invalid = || AuditError::InvalidDecimal(buf.to_string());
    let trimmed = buf.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid());
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }
    let numer: BigInt = format!("{}{}", int_part, frac_part)
        .parse()
        .map_err(|_| invalid())?;
    let denom: BigInt = num::pow(BigInt::from(10), frac_part.len());
    let value = BigRational::new(numer, denom);
    Ok(if negative { -value } else { value })
}

/// Formats a rational with `digits` decimal places, rounding half-up (away from zero).
pub fn format_rational(value: &BigRational, digits: usize) -> String {
    let scale = num::pow(BigInt::from(10), digits);
    let half = BigRational::new(BigInt::one(), BigInt::from(2));
    let scaled = (value.abs() * BigRational::from_integer(scale.clone()) + half)
        .floor()
        .to_integer();
    let int_portion = &scaled / &scale;
    let frac_portion = &scaled % &scale;
    let sign = if value.is_negative() && !scaled.is_zero() {
        "-"
    } else {
        ""
    };
    if digits == 0 {
        format!("{}{}", sign, int_portion)
    } else {
        format!(
            "{}{}.{:0>width$}",
            sign,
            int_portion,
            frac_portion.to_string(),
            width = digits
        )
    }
}

/// Lossy conversion used only as input to logarithms and powers.
pub fn rational_to_f64(value: &BigRational) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_risk() {
        let r: Risk = "0.25".parse().unwrap();
        assert_eq!(r.to_string(), "0.250");
        assert_eq!(Risk::ONE.to_string(), "1.000");
        assert_eq!(Risk::ZERO.to_string(), "0.000");
        assert!("abc".parse::<Risk>().is_err());
        assert!("-0.5".parse::<Risk>().is_err());
    }

    #[test]
    fn half_up_rounding() {
        assert_eq!(Risk::from_f64_half_up(0.0125).to_string(), "0.013");
        assert_eq!(Risk::from_f64_half_up(0.0124999).to_string(), "0.012");
        assert_eq!(Risk::from_f64_half_up(0.16371837521436877).to_string(), "0.164");
        assert_eq!(Risk::from_f64_half_up(f64::NAN), Risk::ZERO);
        let third = BigRational::new(BigInt::from(1), BigInt::from(3));
        assert_eq!(Risk::from_rational_half_up(&third).scaled_value(), 333);
    }

    #[test]
    fn decimal_strings() {
        let v = parse_decimal("1.03905").unwrap();
        assert_eq!(
            v,
            BigRational::new(BigInt::from(103905), BigInt::from(100000))
        );
        assert_eq!(parse_decimal("-2").unwrap(), BigRational::from_integer((-2).into()));
        assert_eq!(parse_decimal(".5").unwrap(), BigRational::new(1.into(), 2.into()));
        assert!(parse_decimal("").is_err());
        assert!(parse_decimal("1.2.3").is_err());
        assert!(parse_decimal("1e5").is_err());
    }

    #[test]
    fn formatting() {
        let v = BigRational::new(BigInt::from(1), BigInt::from(8));
        assert_eq!(format_rational(&v, 2), "0.13");
        assert_eq!(format_rational(&v, 3), "0.125");
        assert_eq!(format_rational(&-v, 2), "-0.13");
        assert_eq!(format_rational(&BigRational::zero(), 4), "0.0000");
        assert_eq!(format_rational(&BigRational::from_integer(7.into()), 0), "7");
    }
}
