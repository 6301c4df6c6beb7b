//! Resource quantities
//!
//! Parses Kubernetes-style quantity strings ("16Gi", "500M", "1.5Ti", "2e3")
//! into an integral value. Binary suffixes (Ki..Ei) are powers of 1024,
//! decimal suffixes (m, k, M..E) and exponents are powers of 10. Fractional
//! results are rounded up, matching how the platform reports byte sizes.

use schemars::JsonSchema;
use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Longest mantissa accepted, keeps intermediate arithmetic inside `i128`.
const MAX_MANTISSA_DIGITS: usize = 30;

const QUANTITY_PATTERN: &str = r"^(\+|-)?(([0-9]+(\.[0-9]*)?)|(\.[0-9]+))(([KMGTPE]i)|[numkMGTPE]|([eE](\+|-)?(([0-9]+(\.[0-9]*)?)|(\.[0-9]+))))?$";

/// Errors produced while parsing a quantity string
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QuantityError {
    /// The input was empty or whitespace
    #[error("quantity is empty")]
    Empty,

    /// The numeric part could not be parsed
    #[error("invalid number in quantity '{0}'")]
    InvalidNumber(String),

    /// The suffix is not a known binary, decimal or exponent suffix
    #[error("unknown suffix '{suffix}' in quantity '{input}'")]
    InvalidSuffix {
        /// Full input string
        input: String,
        /// Unrecognised trailing part
        suffix: String,
    },

    /// The value does not fit in 64 bits
    #[error("quantity '{0}' is out of range")]
    OutOfRange(String),
}

/// A parsed resource quantity.
///
/// Keeps the string it was parsed from so the wire form round-trips
/// unchanged. Two quantities are equal when their values are equal,
/// so `"1Gi"` equals `"1024Mi"`.
#[derive(Debug, Clone)]
pub struct Quantity {
    repr: String,
    value: i64,
}

#[derive(Debug, Clone, Copy)]
enum Scale {
    Binary(u32),
    Decimal(i32),
}

impl Quantity {
    /// Parse a quantity string
    pub fn parse(input: &str) -> Result<Self, QuantityError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(QuantityError::Empty);
        }

        let (number, suffix) = split_number(trimmed);
        let (negative, mantissa, frac_digits) = parse_number(number, trimmed)?;
        let scale = parse_suffix(suffix, trimmed)?;
        let value = scaled_value(mantissa, frac_digits, scale)
            .ok_or_else(|| QuantityError::OutOfRange(trimmed.to_string()))?;
        let value = if negative { -value } else { value };

        Ok(Self {
            repr: trimmed.to_string(),
            value,
        })
    }

    /// Integral value, rounded up. For memory and storage this is bytes.
    pub fn value(&self) -> i64 {
        self.value
    }

    /// The string this quantity was parsed from
    pub fn as_str(&self) -> &str {
        &self.repr
    }

    /// Whether the quantity is zero
    pub fn is_zero(&self) -> bool {
        self.value == 0
    }
}

fn split_number(input: &str) -> (&str, &str) {
    let end = input
        .char_indices()
        .find(|(i, c)| {
            !(c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '+' || *c == '-')))
        })
        .map_or(input.len(), |(i, _)| i);
    input.split_at(end)
}

/// Returns (negative, mantissa digits as integer, digits after the point)
fn parse_number(number: &str, input: &str) -> Result<(bool, i128, u32), QuantityError> {
    let invalid = || QuantityError::InvalidNumber(input.to_string());

    let (negative, unsigned) = match number.as_bytes().first() {
        Some(b'-') => (true, &number[1..]),
        Some(b'+') => (false, &number[1..]),
        _ => (false, number),
    };

    let (whole, frac) = match unsigned.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (unsigned, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if frac.contains('.') || whole.len() + frac.len() > MAX_MANTISSA_DIGITS {
        return Err(invalid());
    }

    let digits: String = whole.chars().chain(frac.chars()).collect();
    let mantissa = digits.parse::<i128>().map_err(|_| invalid())?;
    let frac_digits = u32::try_from(frac.len()).map_err(|_| invalid())?;
    Ok((negative, mantissa, frac_digits))
}

fn parse_suffix(suffix: &str, input: &str) -> Result<Scale, QuantityError> {
    let scale = match suffix {
        "" => Scale::Decimal(0),
        "Ki" => Scale::Binary(10),
        "Mi" => Scale::Binary(20),
        "Gi" => Scale::Binary(30),
        "Ti" => Scale::Binary(40),
        "Pi" => Scale::Binary(50),
        "Ei" => Scale::Binary(60),
        "m" => Scale::Decimal(-3),
        "k" => Scale::Decimal(3),
        "M" => Scale::Decimal(6),
        "G" => Scale::Decimal(9),
        "T" => Scale::Decimal(12),
        "P" => Scale::Decimal(15),
        "E" => Scale::Decimal(18),
        other => {
            let exponent = other
                .strip_prefix('e')
                .or_else(|| other.strip_prefix('E'))
                .and_then(|exp| exp.parse::<i32>().ok())
                .filter(|exp| exp.abs() <= 30);
            match exponent {
                Some(exp) => Scale::Decimal(exp),
                None => {
                    return Err(QuantityError::InvalidSuffix {
                        input: input.to_string(),
                        suffix: other.to_string(),
                    });
                }
            }
        }
    };
    Ok(scale)
}

fn scaled_value(mantissa: i128, frac_digits: u32, scale: Scale) -> Option<i64> {
    let mut numerator = mantissa;
    let mut denominator = 10i128.checked_pow(frac_digits)?;

    match scale {
        Scale::Binary(shift) => numerator = numerator.checked_mul(1i128 << shift)?,
        Scale::Decimal(exp) if exp >= 0 => {
            numerator = numerator.checked_mul(10i128.checked_pow(exp.unsigned_abs())?)?;
        }
        Scale::Decimal(exp) => {
            denominator = denominator.checked_mul(10i128.checked_pow(exp.unsigned_abs())?)?;
        }
    }

    let rounded_up = numerator.checked_add(denominator - 1)? / denominator;
    i64::try_from(rounded_up).ok()
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr)
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for Quantity {}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.repr)
    }
}

/// Accepts both the string form and bare integers, which the API server
/// may hand back for unsuffixed quantities.
struct QuantityVisitor;

impl de::Visitor<'_> for QuantityVisitor {
    type Value = Quantity;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a quantity string (e.g. \"16Gi\", \"500M\") or an integer")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        Quantity::parse(value).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        Ok(Quantity {
            repr: value.to_string(),
            value,
        })
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        let signed = i64::try_from(value)
            .map_err(|_| E::custom(format!("quantity {value} is out of range")))?;
        self.visit_i64(signed)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(QuantityVisitor)
    }
}

impl JsonSchema for Quantity {
    fn schema_name() -> Cow<'static, str> {
        "Quantity".into()
    }

    fn inline_schema() -> bool {
        true
    }

    fn json_schema(_generator: &mut schemars::SchemaGenerator) -> schemars::Schema {
        schemars::json_schema!({
            "x-kubernetes-int-or-string": true,
            "anyOf": [
                { "type": "integer" },
                { "type": "string" }
            ],
            "pattern": QUANTITY_PATTERN
        })
    }
}

/// Schema of an optional quantity field, nullable on the int-or-string node
/// itself rather than under `anyOf`
pub(crate) fn optional_quantity_schema(
    generator: &mut schemars::SchemaGenerator,
) -> schemars::Schema {
    let mut schema = Quantity::json_schema(generator);
    schema.insert("nullable".to_string(), true.into());
    schema
}
