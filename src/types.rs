//! Core types describing the columns of an annotated CSV table.

use std::str::FromStr;

use crate::error::Error;

/// How a `dateTime` column encodes its values.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum DateTimeFormat {
    /// Integer timestamp or RFC3339, decided per value.
    #[default]
    Auto,
    /// `dateTime:RFC3339`.
    Rfc3339,
    /// `dateTime:RFC3339Nano`.
    Rfc3339Nano,
    /// `dateTime:number`, an integer in the configured precision.
    Number,
    /// `dateTime:<pattern>` using strftime syntax, e.g. `%Y-%m-%d %H:%M:%S`.
    Pattern(String),
}

/// Data types supported in annotated CSV.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum DataType {
    /// String data type.
    #[default]
    String,
    /// 64-bit floating point.
    Double,
    /// Boolean value.
    Bool,
    /// Signed 64-bit integer.
    Long,
    /// Unsigned 64-bit integer.
    UnsignedLong,
    /// Duration (Go-style, e.g., "1h30m").
    Duration,
    /// Base64-encoded binary data.
    Base64Binary,
    /// Timestamp.
    DateTime(DateTimeFormat),
}

impl DataType {
    /// Build a data type from its name and the optional text after the first `:`.
    ///
    /// Formats of numeric and boolean types are not interpreted here; they are
    /// kept on the [`ColumnSpec`] and applied when values are parsed.
    pub fn from_parts(name: &str, format: Option<&str>) -> Result<Self, Error> {
        let data_type = match name {
            "string" => Self::String,
            "double" => Self::Double,
            "boolean" => Self::Bool,
            "long" => Self::Long,
            "unsignedLong" => Self::UnsignedLong,
            "duration" => Self::Duration,
            "base64Binary" => Self::Base64Binary,
            "dateTime" => Self::DateTime(match format {
                None | Some("") => DateTimeFormat::Auto,
                Some("RFC3339") => DateTimeFormat::Rfc3339,
                Some("RFC3339Nano") => DateTimeFormat::Rfc3339Nano,
                Some("number") => DateTimeFormat::Number,
                Some(pattern) => DateTimeFormat::Pattern(pattern.to_string()),
            }),
            _ => {
                let full = match format {
                    Some(f) => format!("{}:{}", name, f),
                    None => name.to_string(),
                };
                return Err(Error::UnknownDataType(full));
            }
        };
        Ok(data_type)
    }

    /// Returns true for the `dateTime` family.
    pub fn is_date_time(&self) -> bool {
        matches!(self, DataType::DateTime(_))
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.split_once(':') {
            Some((name, format)) => Self::from_parts(name, Some(format)),
            None => Self::from_parts(input, None),
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DataType::String => "string",
            DataType::Double => "double",
            DataType::Bool => "boolean",
            DataType::Long => "long",
            DataType::UnsignedLong => "unsignedLong",
            DataType::Duration => "duration",
            DataType::Base64Binary => "base64Binary",
            DataType::DateTime(DateTimeFormat::Auto) => "dateTime",
            DataType::DateTime(DateTimeFormat::Rfc3339) => "dateTime:RFC3339",
            DataType::DateTime(DateTimeFormat::Rfc3339Nano) => "dateTime:RFC3339Nano",
            DataType::DateTime(DateTimeFormat::Number) => "dateTime:number",
            DataType::DateTime(DateTimeFormat::Pattern(p)) => {
                return write!(f, "dateTime:{}", p);
            }
        };
        write!(f, "{}", s)
    }
}

/// Role of a column in the produced line protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Semantic {
    /// Supplies the measurement name.
    Measurement,
    /// Indexed string attribute.
    Tag,
    /// Typed value.
    Field,
    /// Supplies the timestamp.
    Time,
    /// Not written to the output.
    Ignored,
}

impl std::fmt::Display for Semantic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Semantic::Measurement => "measurement",
            Semantic::Tag => "tag",
            Semantic::Field => "field",
            Semantic::Time => "time",
            Semantic::Ignored => "ignored",
        };
        write!(f, "{}", s)
    }
}

/// Resolved description of one CSV column.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSpec {
    /// Position in the CSV row, `None` for `#constant` virtual columns.
    pub index: Option<usize>,
    /// Column label from the header row.
    pub label: String,
    /// Data type of the column.
    pub data_type: DataType,
    /// Format of numeric and boolean types, e.g. `,.` for `double:,.`.
    pub format: Option<String>,
    /// Role of the column in the produced line.
    pub semantic: Semantic,
    /// Value used for empty cells.
    pub default_value: Option<String>,
}

impl ColumnSpec {
    /// Create a string field column at the given position.
    pub fn new(index: usize, label: impl Into<String>) -> Self {
        Self {
            index: Some(index),
            label: label.into(),
            data_type: DataType::String,
            format: None,
            semantic: Semantic::Field,
            default_value: None,
        }
    }

    /// Resolve the raw text of this column in `row`, falling back to the
    /// default value for empty or missing cells.
    pub fn resolve<'a>(&'a self, row: &[&'a str]) -> Option<&'a str> {
        let cell = self.index.and_then(|i| row.get(i).copied()).unwrap_or("");
        if cell.is_empty() {
            self.default_value.as_deref().filter(|d| !d.is_empty())
        } else {
            Some(cell)
        }
    }
}
