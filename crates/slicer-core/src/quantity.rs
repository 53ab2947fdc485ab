//! Kubernetes-style resource quantities
//!
//! Values are kept as an exact fraction so that `"0.1"` CPUs become exactly
//! 100 millicores.

use crate::{SliceError, SliceResult};

/// A parsed, non-negative resource quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantity {
    numerator: i128,
    denominator: i128,
}

impl Quantity {
    /// Parse a quantity string such as `500m`, `2`, `1.5Gi` or `1e3`
    pub fn parse(input: &str) -> SliceResult<Self> {
        let s = input.trim();
        let invalid = || SliceError::Quantity(input.to_string());

        let split = s
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(s.len());
        let (number, suffix) = s.split_at(split);
        if number.is_empty() {
            return Err(invalid());
        }

        let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        if frac_part.len() > 18 {
            return Err(invalid());
        }

        let digits = format!("{}{}", int_part, frac_part);
        let mut numerator: i128 = digits.parse().map_err(|_| invalid())?;
        let mut denominator: i128 = 10i128.pow(frac_part.len() as u32);

        let (mul, div) = suffix_scale(suffix).ok_or_else(invalid)?;
        numerator = numerator.checked_mul(mul).ok_or_else(invalid)?;
        denominator = denominator.checked_mul(div).ok_or_else(invalid)?;

        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// Value in thousandths, rounded up (CPU millicores); `None` if it
    /// does not fit in an `i64`
    pub fn milli_ceil(&self) -> Option<i64> {
        let scaled = self.numerator.checked_mul(1000)?;
        i64::try_from(ceil_div(scaled, self.denominator)).ok()
    }

    /// Value in whole units, rounded up (bytes, device counts); `None` if it
    /// does not fit in an `i64`
    pub fn units_ceil(&self) -> Option<i64> {
        i64::try_from(ceil_div(self.numerator, self.denominator)).ok()
    }

    /// Whether the quantity is exactly one unit
    pub fn is_one(&self) -> bool {
        self.numerator == self.denominator
    }
}

impl std::str::FromStr for Quantity {
    type Err = SliceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Quantity::parse(s)
    }
}

/// Multiplier and divisor for a suffix
fn suffix_scale(suffix: &str) -> Option<(i128, i128)> {
    let decimal = |exp: u32| Some((10i128.pow(exp), 1));
    let binary = |exp: u32| Some((1i128 << exp, 1));

    match suffix {
        "" => Some((1, 1)),
        "m" => Some((1, 1000)),
        "k" => decimal(3),
        "M" => decimal(6),
        "G" => decimal(9),
        "T" => decimal(12),
        "P" => decimal(15),
        "E" => decimal(18),
        "Ki" => binary(10),
        "Mi" => binary(20),
        "Gi" => binary(30),
        "Ti" => binary(40),
        "Pi" => binary(50),
        "Ei" => binary(60),
        exp if exp.starts_with(|c: char| c == 'e' || c == 'E') => {
            let power: u32 = exp[1..].parse().ok()?;
            if power > 18 {
                return None;
            }
            decimal(power)
        }
        _ => None,
    }
}

fn ceil_div(a: i128, b: i128) -> i128 {
    a.div_euclid(b) + i128::from(a.rem_euclid(b) != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_quantities() {
        assert_eq!(Quantity::parse("500m").unwrap().milli_ceil(), Some(500));
        assert_eq!(Quantity::parse("2").unwrap().milli_ceil(), Some(2000));
        assert_eq!(Quantity::parse("0.1").unwrap().milli_ceil(), Some(100));
        assert_eq!(Quantity::parse("1.0005").unwrap().milli_ceil(), Some(1001));
    }

    #[test]
    fn test_memory_quantities() {
        assert_eq!(Quantity::parse("1Gi").unwrap().units_ceil(), Some(1 << 30));
        assert_eq!(Quantity::parse("1.5Gi").unwrap().units_ceil(), Some(3 << 29));
        assert_eq!(Quantity::parse("128M").unwrap().units_ceil(), Some(128_000_000));
        assert_eq!(Quantity::parse("1e3").unwrap().units_ceil(), Some(1000));
        assert_eq!(Quantity::parse("1k").unwrap().units_ceil(), Some(1000));
    }

    #[test]
    fn test_out_of_range_quantities() {
        let huge = Quantity::parse("170141183460469231731687303715884105727m").unwrap();
        assert_eq!(huge.milli_ceil(), None);
        assert_eq!(huge.units_ceil(), None);

        let big = Quantity::parse("9223372036854775808").unwrap();
        assert_eq!(big.units_ceil(), None);
        assert_eq!(
            Quantity::parse("9223372036854775807").unwrap().units_ceil(),
            Some(i64::MAX)
        );
    }

    #[test]
    fn test_is_one() {
        assert!(Quantity::parse("1").unwrap().is_one());
        assert!(Quantity::parse("1.0").unwrap().is_one());
        assert!(Quantity::parse("1000m").unwrap().is_one());
        assert!(!Quantity::parse("2").unwrap().is_one());
    }

    #[test]
    fn test_invalid_quantities() {
        for bad in ["", "Gi", "-1", "1.2.3", "12Xi", "1e", "abc", "."] {
            assert!(Quantity::parse(bad).is_err(), "{} should not parse", bad);
        }
    }
}
