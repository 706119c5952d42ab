//! Typed cell values and their line protocol field representation.

use std::fmt::Write;

use base64::Engine;
use ordered_float::OrderedFloat;

use crate::line::escape_string_field;

/// A typed value parsed from one CSV cell.
///
/// This enum covers all data types that can appear in annotated CSV. Each
/// variant knows how it is written as a line protocol field value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// String value, written quoted.
    String(String),

    /// 64-bit floating point value, written without suffix.
    Double(OrderedFloat<f64>),

    /// Boolean value, written as `t` or `f`.
    Bool(bool),

    /// Signed 64-bit integer, written with an `i` suffix.
    Long(i64),

    /// Unsigned 64-bit integer, written with a `u` suffix.
    UnsignedLong(u64),

    /// Duration value, written as integer nanoseconds.
    Duration(chrono::Duration),

    /// Binary data, written as a quoted base64 string.
    Base64Binary(Vec<u8>),

    /// Timestamp in nanoseconds since the Unix epoch, written as an integer.
    Time(i64),
}

impl Value {
    /// Returns the value as a string reference if it is a `String` variant.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as a f64 if it is a `Double` variant.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(f) => Some(f.into_inner()),
            _ => None,
        }
    }

    /// Returns the value as an i64 if it is a `Long` variant.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as a bool if it is a `Bool` variant.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Append the line protocol representation of this value to `out`.
    pub fn write_field(&self, out: &mut String) {
        match self {
            Value::String(s) => {
                out.push('"');
                escape_string_field(s, out);
                out.push('"');
            }
            Value::Double(d) => write_double(d.into_inner(), out),
            Value::Bool(b) => out.push(if *b { 't' } else { 'f' }),
            Value::Long(i) => {
                let _ = write!(out, "{}i", i);
            }
            Value::UnsignedLong(u) => {
                let _ = write!(out, "{}u", u);
            }
            Value::Duration(d) => {
                let _ = write!(out, "{}i", d.num_nanoseconds().unwrap_or(i64::MAX));
            }
            Value::Base64Binary(b) => {
                out.push('"');
                out.push_str(&base64::engine::general_purpose::STANDARD.encode(b));
                out.push('"');
            }
            Value::Time(ns) => {
                let _ = write!(out, "{}i", ns);
            }
        }
    }
}

/// Non-finite values are forwarded as the literal tokens `NaN`, `+Inf` and
/// `-Inf`; the receiver decides whether to accept them.
fn write_double(v: f64, out: &mut String) {
    if v.is_nan() {
        out.push_str("NaN");
    } else if v.is_infinite() {
        out.push_str(if v > 0.0 { "+Inf" } else { "-Inf" });
    } else {
        let _ = write!(out, "{}", v);
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = String::new();
        self.write_field(&mut s);
        f.write_str(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Value accessor tests
    // =========================================================================

    #[test]
    fn test_as_string() {
        let v = Value::String("hello".to_string());
        assert_eq!(v.as_string(), Some("hello"));

        // Wrong type returns None
        assert_eq!(Value::Long(42).as_string(), None);
    }

    #[test]
    fn test_as_double() {
        let v = Value::Double(OrderedFloat::from(2.72));
        assert_eq!(v.as_double(), Some(2.72));
        assert_eq!(Value::String("2.72".to_string()).as_double(), None);
    }

    #[test]
    fn test_as_long_and_bool() {
        assert_eq!(Value::Long(i64::MAX).as_long(), Some(i64::MAX));
        assert_eq!(Value::UnsignedLong(42).as_long(), None);
        assert_eq!(Value::Bool(false).as_bool(), Some(false));
        assert_eq!(Value::Long(1).as_bool(), None);
    }

    // =========================================================================
    // Line protocol rendering tests
    // =========================================================================

    #[test]
    fn test_display_string_is_quoted_and_escaped() {
        let v = Value::String(r#"say "hi" \o/"#.to_string());
        assert_eq!(v.to_string(), r#""say \"hi\" \\o/""#);
    }

    #[test]
    fn test_display_numbers_carry_suffixes() {
        assert_eq!(Value::Long(-100).to_string(), "-100i");
        assert_eq!(Value::UnsignedLong(u64::MAX).to_string(), "18446744073709551615u");
        assert_eq!(Value::Double(OrderedFloat::from(1.5)).to_string(), "1.5");
        assert_eq!(Value::Double(OrderedFloat::from(42.0)).to_string(), "42");
    }

    #[test]
    fn test_display_non_finite_doubles() {
        assert_eq!(Value::Double(OrderedFloat::from(f64::NAN)).to_string(), "NaN");
        assert_eq!(Value::Double(OrderedFloat::from(f64::INFINITY)).to_string(), "+Inf");
        assert_eq!(
            Value::Double(OrderedFloat::from(f64::NEG_INFINITY)).to_string(),
            "-Inf"
        );
    }

    #[test]
    fn test_display_bool() {
        assert_eq!(Value::Bool(true).to_string(), "t");
        assert_eq!(Value::Bool(false).to_string(), "f");
    }

    #[test]
    fn test_display_duration_and_time() {
        let dur = chrono::Duration::nanoseconds(1_500_000_000);
        assert_eq!(Value::Duration(dur).to_string(), "1500000000i");
        assert_eq!(Value::Time(1_672_531_200_000_000_000).to_string(), "1672531200000000000i");
    }

    #[test]
    fn test_display_base64_binary() {
        let v = Value::Base64Binary(b"hello".to_vec());
        assert_eq!(v.to_string(), "\"aGVsbG8=\"");
    }
}
