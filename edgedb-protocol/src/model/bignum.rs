use std::fmt;

use bigdecimal::BigDecimal;
use num_bigint::{BigInt as NumBigInt, BigUint, Sign};
use num_traits::{ToPrimitive, Zero};

use super::OutOfRangeError;

/// An arbitrary-precision integer in its wire form: a sign, a weight and
/// big-endian base-10000 digit groups. `value = ±Σ digits[i]·10000^(weight−i)`;
/// trailing zero groups are stripped and accounted for by the weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigInt {
    pub(crate) negative: bool,
    pub(crate) weight: i16,
    pub(crate) digits: Vec<u16>,
}

/// An arbitrary-precision decimal in its wire form. Same digit-group layout
/// as [`BigInt`] plus the number of decimal digits after the point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decimal {
    pub(crate) negative: bool,
    pub(crate) weight: i16,
    pub(crate) decimal_digits: u16,
    pub(crate) digits: Vec<u16>,
}

impl BigInt {
    fn normalize(mut self) -> BigInt {
        while self.digits.last() == Some(&0) {
            self.digits.pop();
        }
        if self.digits.is_empty() {
            self.negative = false;
            self.weight = 0;
        }
        self
    }
}

impl From<i64> for BigInt {
    fn from(value: i64) -> BigInt {
        let negative = value < 0;
        let mut abs = value.unsigned_abs();
        let mut digits = Vec::new();
        while abs > 0 {
            digits.push((abs % 10_000) as u16);
            abs /= 10_000;
        }
        digits.reverse();
        BigInt {
            negative,
            weight: digits.len().saturating_sub(1) as i16,
            digits,
        }
        .normalize()
    }
}

impl From<i32> for BigInt {
    fn from(value: i32) -> BigInt {
        BigInt::from(value as i64)
    }
}

impl From<&BigInt> for NumBigInt {
    fn from(value: &BigInt) -> NumBigInt {
        let mut result = NumBigInt::from(0u8);
        for &digit in &value.digits {
            result = result * 10_000 + digit;
        }
        let trailing = value.weight as i64 - (value.digits.len() as i64 - 1);
        for _ in 0..trailing.max(0) {
            result *= 10_000;
        }
        if value.negative {
            -result
        } else {
            result
        }
    }
}

impl From<BigInt> for NumBigInt {
    fn from(value: BigInt) -> NumBigInt {
        (&value).into()
    }
}

impl TryFrom<&NumBigInt> for BigInt {
    type Error = OutOfRangeError;
    fn try_from(value: &NumBigInt) -> Result<BigInt, Self::Error> {
        let negative = value.sign() == Sign::Minus;
        let digits = base_10000_digits(value.magnitude());
        let weight = i16::try_from(digits.len().saturating_sub(1)).map_err(|_| OutOfRangeError)?;
        Ok(BigInt {
            negative,
            weight,
            digits,
        }
        .normalize())
    }
}

impl TryFrom<NumBigInt> for BigInt {
    type Error = OutOfRangeError;
    fn try_from(value: NumBigInt) -> Result<BigInt, Self::Error> {
        BigInt::try_from(&value)
    }
}

impl fmt::Display for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        NumBigInt::from(self).fmt(f)
    }
}

fn base_10000_digits(magnitude: &BigUint) -> Vec<u16> {
    let ten_k = BigUint::from(10_000u32);
    let mut rest = magnitude.clone();
    let mut digits = Vec::new();
    while !rest.is_zero() {
        let group = (&rest % &ten_k).to_u16().expect("group below 10000");
        digits.push(group);
        rest /= &ten_k;
    }
    digits.reverse();
    digits
}

impl From<&Decimal> for BigDecimal {
    fn from(value: &Decimal) -> BigDecimal {
        let mut int = NumBigInt::from(0u8);
        for &digit in &value.digits {
            int = int * 10_000 + digit;
        }
        if value.negative {
            int = -int;
        }
        let scale = 4 * (value.digits.len() as i64 - 1 - value.weight as i64);
        BigDecimal::new(int, scale).with_scale(value.decimal_digits as i64)
    }
}

impl From<Decimal> for BigDecimal {
    fn from(value: Decimal) -> BigDecimal {
        (&value).into()
    }
}

impl TryFrom<&BigDecimal> for Decimal {
    type Error = OutOfRangeError;
    fn try_from(value: &BigDecimal) -> Result<Decimal, Self::Error> {
        let (int, scale) = value.as_bigint_and_exponent();
        let negative = int.sign() == Sign::Minus;
        let decimal_digits = u16::try_from(scale.max(0)).map_err(|_| OutOfRangeError)?;

        // Pad so the fractional part spans a whole number of 4-digit groups.
        let pad = (4 - scale.rem_euclid(4)) % 4;
        let mut magnitude = int.magnitude().clone();
        for _ in 0..pad {
            magnitude *= 10u8;
        }
        let frac_groups = (scale + pad) / 4;

        let mut digits = base_10000_digits(&magnitude);
        let weight_wide = digits.len() as i64 - 1 - frac_groups;
        while digits.last() == Some(&0) {
            digits.pop();
        }
        if digits.is_empty() {
            return Ok(Decimal {
                negative: false,
                weight: 0,
                decimal_digits,
                digits,
            });
        }
        let weight = i16::try_from(weight_wide).map_err(|_| OutOfRangeError)?;
        Ok(Decimal {
            negative,
            weight,
            decimal_digits,
            digits,
        })
    }
}

impl TryFrom<BigDecimal> for Decimal {
    type Error = OutOfRangeError;
    fn try_from(value: BigDecimal) -> Result<Decimal, Self::Error> {
        Decimal::try_from(&value)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        BigDecimal::from(self).fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(text: &str) -> Decimal {
        Decimal::try_from(BigDecimal::from_str(text).unwrap()).unwrap()
    }

    #[test]
    fn bigint_small() {
        let value = BigInt::from(42i64);
        assert_eq!(value.digits, vec![42]);
        assert_eq!(value.weight, 0);
        assert!(!value.negative);
        assert_eq!(value.to_string(), "42");
    }

    #[test]
    fn bigint_trailing_groups() {
        let value = BigInt::from(1_0000_0000i64);
        assert_eq!(value.digits, vec![1]);
        assert_eq!(value.weight, 2);
        assert_eq!(NumBigInt::from(&value), NumBigInt::from(1_0000_0000i64));
    }

    #[test]
    fn bigint_negative_roundtrip() {
        let src = NumBigInt::from_str("-123456789012345678901234567890").unwrap();
        let wire = BigInt::try_from(&src).unwrap();
        assert!(wire.negative);
        assert_eq!(NumBigInt::from(&wire), src);
    }

    #[test]
    fn bigint_zero() {
        let value = BigInt::from(0i64);
        assert_eq!(value.digits, Vec::<u16>::new());
        assert_eq!(value.weight, 0);
        assert_eq!(value.to_string(), "0");
    }

    #[test]
    fn decimal_groups() {
        let value = dec("1.5");
        assert_eq!(value.digits, vec![1, 5000]);
        assert_eq!(value.weight, 0);
        assert_eq!(value.decimal_digits, 1);

        let value = dec("0.00005");
        assert_eq!(value.digits, vec![5000]);
        assert_eq!(value.weight, -2);
        assert_eq!(value.decimal_digits, 5);

        let value = dec("20000");
        assert_eq!(value.digits, vec![2]);
        assert_eq!(value.weight, 1);
        assert_eq!(value.decimal_digits, 0);
    }

    #[test]
    fn decimal_roundtrip() {
        for text in ["0", "-0.000001", "123456.654321", "1e10", "-1.5"] {
            let source = BigDecimal::from_str(text).unwrap();
            let wire = Decimal::try_from(&source).unwrap();
            assert_eq!(BigDecimal::from(&wire), source, "{text}");
        }
    }
}
