//! Conversion of one data row into a line protocol record.

use base64::Engine;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone};
use go_parse_duration::parse_duration;
use ordered_float::OrderedFloat;

use crate::config::{ConverterConfig, Precision};
use crate::error::{Error, Result};
use crate::line::LineProtocolRecord;
use crate::schema::Schema;
use crate::types::{ColumnSpec, DataType, DateTimeFormat};
use crate::value::Value;

/// Convert one data row using the section's schema.
///
/// Empty tag and field cells without a default are left out of the record.
/// An empty measurement or time cell without a default fails the row, as does
/// a row whose fields are all empty.
pub fn convert_row(
    schema: &Schema,
    config: &ConverterConfig,
    row: &[&str],
) -> Result<LineProtocolRecord> {
    if row.len() != schema.width() {
        return Err(Error::ColumnMismatch {
            expected: schema.width(),
            actual: row.len(),
        });
    }

    let measurement = match schema.measurement_column() {
        Some(col) => col.resolve(row).ok_or_else(|| missing(col))?,
        None => schema.default_measurement().ok_or(Error::MissingMeasurement)?,
    };
    let mut record = LineProtocolRecord::new(measurement);

    for col in schema.tag_columns() {
        if let Some(value) = col.resolve(row) {
            record.tags.push((col.label.clone(), value.to_string()));
        }
    }
    record.sort_tags();

    let ctx = ParseContext {
        precision: config.timestamp_precision,
        timezone: schema.timezone(),
    };
    for col in schema.field_columns() {
        if let Some(raw) = col.resolve(row) {
            record
                .fields
                .push((col.label.clone(), parse_value(raw, col, &ctx)?));
        }
    }
    if let Some((name_col, value_col)) = schema.field_pair() {
        if let Some(raw) = value_col.resolve(row) {
            let name = name_col.resolve(row).ok_or_else(|| missing(name_col))?;
            record
                .fields
                .push((name.to_string(), parse_value(raw, value_col, &ctx)?));
        }
    }

    record.timestamp = match schema.time_column() {
        Some(col) => {
            let raw = col.resolve(row).ok_or_else(|| missing(col))?;
            Some(parse_timestamp(raw, col, &ctx)?)
        }
        None => config.default_timestamp.map(|ts| ts.nanos()),
    };

    record.validate()?;
    Ok(record)
}

fn missing(col: &ColumnSpec) -> Error {
    Error::MissingValue {
        column: col.label.clone(),
    }
}

/// Settings shared by all cells of a row.
pub struct ParseContext {
    /// Unit of integer timestamps.
    pub precision: Precision,
    /// Offset for pattern timestamps without one.
    pub timezone: FixedOffset,
}

impl Default for ParseContext {
    fn default() -> Self {
        Self {
            precision: Precision::Nanoseconds,
            timezone: chrono::Utc.fix(),
        }
    }
}

/// Parse a string value into a Value based on the column's data type.
pub fn parse_value(s: &str, col: &ColumnSpec, ctx: &ParseContext) -> Result<Value> {
    let format = col.format.as_deref();
    match &col.data_type {
        DataType::String => Ok(Value::String(s.to_string())),
        DataType::Double => {
            let v = parse_double(s, format).map_err(|e| {
                Error::parse(format!(
                    "Invalid double '{}' for column '{}': {}",
                    s, col.label, e
                ))
            })?;
            Ok(Value::Double(OrderedFloat::from(v)))
        }
        DataType::Bool => {
            let v = parse_bool(s, format).ok_or_else(|| {
                Error::parse(format!(
                    "Invalid boolean '{}' for column '{}'",
                    s, col.label
                ))
            })?;
            Ok(Value::Bool(v))
        }
        DataType::Long => {
            let v = parse_integer(s, format)?.parse::<i64>().map_err(|e| {
                Error::parse(format!(
                    "Invalid long '{}' for column '{}': {}",
                    s, col.label, e
                ))
            })?;
            Ok(Value::Long(v))
        }
        DataType::UnsignedLong => {
            let v = parse_integer(s, format)?.parse::<u64>().map_err(|e| {
                Error::parse(format!(
                    "Invalid unsignedLong '{}' for column '{}': {}",
                    s, col.label, e
                ))
            })?;
            Ok(Value::UnsignedLong(v))
        }
        DataType::Duration => {
            let nanos = parse_duration(s).map_err(|_| {
                Error::parse(format!(
                    "Invalid duration '{}' for column '{}'",
                    s, col.label
                ))
            })?;
            Ok(Value::Duration(chrono::Duration::nanoseconds(nanos)))
        }
        DataType::Base64Binary => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(s)
                .map_err(|e| {
                    Error::parse(format!(
                        "Invalid base64 '{}' for column '{}': {}",
                        s, col.label, e
                    ))
                })?;
            Ok(Value::Base64Binary(bytes))
        }
        DataType::DateTime(f) => Ok(Value::Time(parse_date_time(s, f, &col.label, ctx)?)),
    }
}

/// Parse the value of the time column into nanoseconds since the epoch.
pub fn parse_timestamp(s: &str, col: &ColumnSpec, ctx: &ParseContext) -> Result<i64> {
    match &col.data_type {
        DataType::DateTime(f) => parse_date_time(s, f, &col.label, ctx),
        DataType::Long | DataType::UnsignedLong => {
            parse_date_time(s, &DateTimeFormat::Number, &col.label, ctx)
        }
        _ => parse_date_time(s, &DateTimeFormat::Auto, &col.label, ctx),
    }
}

fn parse_date_time(
    s: &str,
    format: &DateTimeFormat,
    column_name: &str,
    ctx: &ParseContext,
) -> Result<i64> {
    let invalid = |reason: &str| {
        Error::parse(format!(
            "Invalid timestamp '{}' for column '{}': {}",
            s, column_name, reason
        ))
    };
    let number = |s: &str| -> Result<i64> {
        let v = s.parse::<i64>().map_err(|e| invalid(&e.to_string()))?;
        ctx.precision
            .to_nanos(v)
            .ok_or_else(|| invalid("out of range"))
    };
    let to_nanos = |t: DateTime<FixedOffset>| {
        t.timestamp_nanos_opt()
            .ok_or_else(|| invalid("out of range"))
    };

    match format {
        DateTimeFormat::Number => number(s),
        DateTimeFormat::Auto => match s.parse::<i64>() {
            Ok(v) => ctx
                .precision
                .to_nanos(v)
                .ok_or_else(|| invalid("out of range")),
            Err(_) => {
                to_nanos(DateTime::parse_from_rfc3339(s).map_err(|e| invalid(&e.to_string()))?)
            }
        },
        DateTimeFormat::Rfc3339 | DateTimeFormat::Rfc3339Nano => {
            to_nanos(DateTime::parse_from_rfc3339(s).map_err(|e| invalid(&e.to_string()))?)
        }
        DateTimeFormat::Pattern(pattern) => {
            if let Ok(t) = DateTime::parse_from_str(s, pattern) {
                return to_nanos(t);
            }
            let naive = match NaiveDateTime::parse_from_str(s, pattern) {
                Ok(t) => t,
                Err(e) => NaiveDate::parse_from_str(s, pattern)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .ok_or_else(|| invalid(&e.to_string()))?,
            };
            let t = ctx
                .timezone
                .from_local_datetime(&naive)
                .single()
                .ok_or_else(|| invalid("ambiguous local time"))?;
            to_nanos(t)
        }
    }
}

/// Grouping characters and decimal separator of a numeric format.
///
/// The last character of the format is the decimal separator; the ones before
/// it are removed from the input. `strict` rejects a fractional part in
/// integer columns instead of truncating it.
struct NumberFormat<'a> {
    strict: bool,
    ignored: &'a str,
    decimal: Option<char>,
}

impl<'a> NumberFormat<'a> {
    fn parse(format: &'a str) -> Self {
        let (strict, rest) = match format.strip_prefix("strict") {
            Some(rest) => (true, rest),
            None => (false, format),
        };
        let decimal = rest.chars().last();
        let ignored = match decimal {
            Some(c) => &rest[..rest.len() - c.len_utf8()],
            None => rest,
        };
        Self {
            strict,
            ignored,
            decimal,
        }
    }

    /// Remove grouping characters and normalize the decimal separator to `.`.
    fn normalize(&self, s: &str) -> String {
        s.chars()
            .filter(|c| !self.ignored.contains(*c))
            .map(|c| if Some(c) == self.decimal { '.' } else { c })
            .collect()
    }
}

fn parse_double(
    s: &str,
    format: Option<&str>,
) -> std::result::Result<f64, std::num::ParseFloatError> {
    match format {
        None => s.parse::<f64>(),
        Some(f) => NumberFormat::parse(f).normalize(s).parse::<f64>(),
    }
}

/// Apply an integer format and return the text to hand to `parse`.
fn parse_integer(s: &str, format: Option<&str>) -> Result<String> {
    let Some(format) = format else {
        return Ok(s.to_string());
    };
    let nf = NumberFormat::parse(format);
    let mut normalized = nf.normalize(s);
    if let Some(dot) = normalized.find('.') {
        let fraction = &normalized[dot + 1..];
        if nf.strict && fraction.bytes().any(|b| b != b'0') {
            return Err(Error::parse(format!(
                "Fractional part in strict integer '{}'",
                s
            )));
        }
        normalized.truncate(dot);
    }
    Ok(normalized)
}

/// Parse a boolean. A format `truthy,...:falsy,...` replaces the default
/// vocabulary; with one of the lists empty every other value belongs to it.
fn parse_bool(s: &str, format: Option<&str>) -> Option<bool> {
    match format {
        None => match s.to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => Some(true),
            "false" | "f" | "0" => Some(false),
            _ => None,
        },
        Some(format) => {
            let (truthy, falsy) = format.split_once(':').unwrap_or((format, ""));
            let contains = |list: &str| !list.is_empty() && list.split(',').any(|v| v == s);
            if contains(truthy) {
                Some(true)
            } else if contains(falsy) {
                Some(false)
            } else if truthy.is_empty() {
                Some(true)
            } else if falsy.is_empty() {
                Some(false)
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::AnnotationBlock;
    use crate::config::DefaultTimestamp;

    fn col(data_type: &str, format: Option<&str>) -> ColumnSpec {
        ColumnSpec {
            data_type: data_type.parse().unwrap(),
            format: format.map(str::to_string),
            ..ColumnSpec::new(0, "test")
        }
    }

    fn value(s: &str, data_type: &str) -> Result<Value> {
        parse_value(s, &col(data_type, None), &ParseContext::default())
    }

    fn schema(header: &[&str], default_measurement: Option<&str>) -> Schema {
        Schema::build(AnnotationBlock::new(), header, default_measurement)
            .unwrap()
            .0
    }

    #[test]
    fn test_parse_value_string() {
        assert_eq!(value("hello", "string").unwrap(), Value::String("hello".to_string()));
    }

    #[test]
    fn test_parse_value_double() {
        assert_eq!(
            value("3.14", "double").unwrap(),
            Value::Double(OrderedFloat::from(3.14))
        );
        assert!(value("NaN", "double").unwrap().as_double().unwrap().is_nan());
        assert_eq!(value("-Inf", "double").unwrap().to_string(), "-Inf");
        assert!(value("abc", "double").is_err());
    }

    #[test]
    fn test_parse_value_bool() {
        for t in ["true", "TRUE", "t", "1"] {
            assert_eq!(value(t, "boolean").unwrap(), Value::Bool(true));
        }
        for f in ["false", "F", "0"] {
            assert_eq!(value(f, "boolean").unwrap(), Value::Bool(false));
        }
        assert!(value("yes", "boolean").is_err());
    }

    #[test]
    fn test_parse_value_long() {
        assert_eq!(value("-42", "long").unwrap(), Value::Long(-42));
        assert!(value("4.2", "long").is_err());
        assert!(value("x", "long").is_err());
        assert_eq!(value("42", "unsignedLong").unwrap(), Value::UnsignedLong(42));
        assert!(value("-1", "unsignedLong").is_err());
    }

    #[test]
    fn test_parse_value_duration_and_binary() {
        assert_eq!(value("1h30m", "duration").unwrap().to_string(), "5400000000000i");
        assert_eq!(
            value("aGVsbG8=", "base64Binary").unwrap(),
            Value::Base64Binary(b"hello".to_vec())
        );
        assert!(value("not base64!", "base64Binary").is_err());
    }

    #[test]
    fn test_number_formats() {
        let ctx = ParseContext::default();
        let v = parse_value("1 234,5", &col("double", Some(" ,")), &ctx).unwrap();
        assert_eq!(v.as_double(), Some(1234.5));

        let v = parse_value("1,234.9", &col("long", Some(",.")), &ctx).unwrap();
        assert_eq!(v, Value::Long(1234));

        assert!(parse_value("1,234.9", &col("long", Some("strict,.")), &ctx).is_err());
        let v = parse_value("1,234.00", &col("long", Some("strict,.")), &ctx).unwrap();
        assert_eq!(v, Value::Long(1234));
    }

    #[test]
    fn test_bool_formats() {
        assert_eq!(parse_bool("y", Some("y,Y:n,N")), Some(true));
        assert_eq!(parse_bool("N", Some("y,Y:n,N")), Some(false));
        assert_eq!(parse_bool("maybe", Some("y,Y:n,N")), None);
        assert_eq!(parse_bool("anything", Some(":no")), Some(true));
        assert_eq!(parse_bool("anything", Some("yes:")), Some(false));
    }

    #[test]
    fn test_timestamps() {
        let ctx = ParseContext::default();
        let rfc = col("dateTime:RFC3339", None);
        assert_eq!(
            parse_timestamp("2023-01-01T00:00:00Z", &rfc, &ctx).unwrap(),
            1_672_531_200_000_000_000
        );
        let nano = col("dateTime:RFC3339Nano", None);
        assert_eq!(
            parse_timestamp("2023-01-01T00:00:00.000000001+00:00", &nano, &ctx).unwrap(),
            1_672_531_200_000_000_001
        );
        let auto = col("string", None);
        assert_eq!(
            parse_timestamp("1672531200000000000", &auto, &ctx).unwrap(),
            1_672_531_200_000_000_000
        );
        assert!(parse_timestamp("yesterday", &rfc, &ctx).is_err());
    }

    #[test]
    fn test_number_timestamps_use_precision() {
        let ctx = ParseContext {
            precision: Precision::Seconds,
            ..ParseContext::default()
        };
        let number = col("dateTime:number", None);
        assert_eq!(
            parse_timestamp("1672531200", &number, &ctx).unwrap(),
            1_672_531_200_000_000_000
        );
        let long = col("long", None);
        assert_eq!(parse_timestamp("1", &long, &ctx).unwrap(), 1_000_000_000);
    }

    #[test]
    fn test_pattern_timestamps() {
        let mut ctx = ParseContext::default();
        let pattern = col("dateTime:%Y-%m-%d %H:%M:%S", None);
        assert_eq!(
            parse_timestamp("2023-01-01 00:00:00", &pattern, &ctx).unwrap(),
            1_672_531_200_000_000_000
        );
        ctx.timezone = FixedOffset::east_opt(3600).unwrap();
        assert_eq!(
            parse_timestamp("2023-01-01 01:00:00", &pattern, &ctx).unwrap(),
            1_672_531_200_000_000_000
        );
        let date_only = col("dateTime:%d.%m.%Y", None);
        assert_eq!(
            parse_timestamp("01.01.2023", &date_only, &ParseContext::default()).unwrap(),
            1_672_531_200_000_000_000
        );
        let with_zone = col("dateTime:%Y-%m-%d %H:%M %z", None);
        assert_eq!(
            parse_timestamp("2023-01-01 02:00 +0200", &with_zone, &ParseContext::default())
                .unwrap(),
            1_672_531_200_000_000_000
        );
    }

    #[test]
    fn test_convert_row_omits_empty_fields() {
        let s = schema(&["m|measurement", "a|long", "b|double"], None);
        let config = ConverterConfig::default();
        let record = convert_row(&s, &config, &["cpu", "", "1.5"]).unwrap();
        assert_eq!(record.to_string(), "cpu b=1.5");

        let err = convert_row(&s, &config, &["cpu", "", ""]).unwrap_err();
        assert!(matches!(err, Error::NoFields));
    }

    #[test]
    fn test_convert_row_required_cells() {
        let s = schema(&["m|measurement", "v|long", "time"], None);
        let config = ConverterConfig::default();
        assert!(matches!(
            convert_row(&s, &config, &["", "1", "5"]),
            Err(Error::MissingValue { column }) if column == "m"
        ));
        assert!(matches!(
            convert_row(&s, &config, &["cpu", "1", ""]),
            Err(Error::MissingValue { column }) if column == "time"
        ));
        assert_eq!(
            convert_row(&s, &config, &["cpu", "1", "5"]).unwrap().to_string(),
            "cpu v=1i 5"
        );
    }

    #[test]
    fn test_convert_row_column_count() {
        let s = schema(&["m|measurement", "v|long"], None);
        let err = convert_row(&s, &ConverterConfig::default(), &["cpu"]).unwrap_err();
        assert!(matches!(err, Error::ColumnMismatch { expected: 2, actual: 1 }));
    }

    #[test]
    fn test_convert_row_sorted_tags_and_default_timestamp() {
        let s = schema(&["zone|tag", "host|tag", "v|boolean"], Some("m"));
        let config = ConverterConfig::default().with_default_timestamp(DefaultTimestamp::Fixed(7));
        let record = convert_row(&s, &config, &["z1", "h1", "true"]).unwrap();
        assert_eq!(record.to_string(), "m,host=h1,zone=z1 v=t 7");
    }

    #[test]
    fn test_convert_row_duplicate_key() {
        let s = schema(&["m|measurement", "k|tag", "k|long"], None);
        let err = convert_row(&s, &ConverterConfig::default(), &["cpu", "a", "1"]).unwrap_err();
        assert!(matches!(err, Error::DuplicateKey(k) if k == "k"));
    }
}
