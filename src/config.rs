//! Converter configuration.

use serde::Deserialize;

/// What to do with rows that start with `#` followed by an unknown keyword.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownAnnotationPolicy {
    /// Skip the row silently.
    Skip,
    /// Skip the row and report a diagnostic.
    #[default]
    Warn,
    /// Treat the row as a schema error and suspend the current section.
    Reject,
}

/// Unit of integer timestamps in the input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    /// Nanoseconds.
    #[default]
    Nanoseconds,
    /// Microseconds.
    Microseconds,
    /// Milliseconds.
    Milliseconds,
    /// Seconds.
    Seconds,
}

impl Precision {
    /// Convert a timestamp in this precision to nanoseconds, `None` on overflow.
    pub fn to_nanos(self, value: i64) -> Option<i64> {
        let factor = match self {
            Precision::Nanoseconds => 1,
            Precision::Microseconds => 1_000,
            Precision::Milliseconds => 1_000_000,
            Precision::Seconds => 1_000_000_000,
        };
        value.checked_mul(factor)
    }
}

/// Timestamp used for records when the section has no time column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultTimestamp {
    /// A fixed timestamp in nanoseconds.
    Fixed(i64),
    /// The wall clock at conversion time. This is the only source of
    /// non-deterministic output.
    Now,
}

impl DefaultTimestamp {
    /// Resolve to nanoseconds since the Unix epoch.
    pub fn nanos(self) -> i64 {
        match self {
            DefaultTimestamp::Fixed(ns) => ns,
            DefaultTimestamp::Now => chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX),
        }
    }
}

/// Configuration for a CSV to line protocol conversion.
///
/// # Example
///
/// ```
/// use csv2lp::{ConverterConfig, DefaultTimestamp};
///
/// let config = ConverterConfig::default()
///     .with_default_measurement("weather")
///     .with_default_timestamp(DefaultTimestamp::Fixed(0))
///     .with_chunk_size(64 * 1024);
/// assert_eq!(config.default_measurement.as_deref(), Some("weather"));
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Measurement used when a section has no measurement column.
    pub default_measurement: Option<String>,
    /// Timestamp used when a section has no time column.
    pub default_timestamp: Option<DefaultTimestamp>,
    /// Unit of integer timestamps in the input.
    pub timestamp_precision: Precision,
    /// Handling of unknown `#keyword` rows.
    pub unknown_annotation: UnknownAnnotationPolicy,
    /// Skip rows that fail to convert. When false the first row error ends
    /// the conversion.
    pub skip_row_on_error: bool,
    /// Number of leading lines to skip before parsing.
    pub skip_header_lines: usize,
    /// CSV field delimiter.
    pub delimiter: u8,
    /// Trim whitespace around cells.
    pub trim: bool,
    /// Target size in bytes of each chunk produced by the async stream.
    pub chunk_size: usize,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            default_measurement: None,
            default_timestamp: None,
            timestamp_precision: Precision::Nanoseconds,
            unknown_annotation: UnknownAnnotationPolicy::Warn,
            skip_row_on_error: true,
            skip_header_lines: 0,
            delimiter: b',',
            trim: false,
            chunk_size: 8192,
        }
    }
}

impl ConverterConfig {
    /// Set the measurement used when no measurement column exists.
    pub fn with_default_measurement(mut self, measurement: impl Into<String>) -> Self {
        self.default_measurement = Some(measurement.into());
        self
    }

    /// Set the timestamp used when no time column exists.
    pub fn with_default_timestamp(mut self, timestamp: DefaultTimestamp) -> Self {
        self.default_timestamp = Some(timestamp);
        self
    }

    /// Set the unit of integer timestamps.
    pub fn with_timestamp_precision(mut self, precision: Precision) -> Self {
        self.timestamp_precision = precision;
        self
    }

    /// Set the policy for unknown annotation rows.
    pub fn with_unknown_annotation(mut self, policy: UnknownAnnotationPolicy) -> Self {
        self.unknown_annotation = policy;
        self
    }

    /// Choose between skipping bad rows and failing on the first one.
    pub fn with_skip_row_on_error(mut self, skip: bool) -> Self {
        self.skip_row_on_error = skip;
        self
    }

    /// Skip this many leading lines of input.
    pub fn with_skip_header_lines(mut self, lines: usize) -> Self {
        self.skip_header_lines = lines;
        self
    }

    /// Set the CSV delimiter.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Trim whitespace around cells.
    pub fn with_trim(mut self, trim: bool) -> Self {
        self.trim = trim;
        self
    }

    /// Set the target chunk size of the async stream. Zero is treated as one.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConverterConfig::default();
        assert!(config.skip_row_on_error);
        assert_eq!(config.delimiter, b',');
        assert_eq!(config.unknown_annotation, UnknownAnnotationPolicy::Warn);
        assert!(config.default_measurement.is_none());
    }

    #[test]
    fn test_precision_to_nanos() {
        assert_eq!(Precision::Seconds.to_nanos(2), Some(2_000_000_000));
        assert_eq!(Precision::Milliseconds.to_nanos(-1), Some(-1_000_000));
        assert_eq!(Precision::Seconds.to_nanos(i64::MAX), None);
    }

    #[test]
    fn test_fixed_default_timestamp() {
        assert_eq!(DefaultTimestamp::Fixed(42).nanos(), 42);
        assert!(DefaultTimestamp::Now.nanos() > 1_600_000_000_000_000_000);
    }

    #[test]
    fn test_chunk_size_never_zero() {
        assert_eq!(ConverterConfig::default().with_chunk_size(0).chunk_size, 1);
    }
}
