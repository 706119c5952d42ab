//! Line protocol records and escaping.
//!
//! Format: `measurement[,tag1=v1,tag2=v2] field1=v1[,field2=v2...] [timestamp]`
//!
//! Example: `cpu,host=server01,region=us-west usage=64.5,cores=8i 1609459200000000000`

use std::collections::HashSet;
use std::fmt::Write;

use crate::error::{Error, Result};
use crate::value::Value;

/// One point in line protocol form.
#[derive(Clone, Debug, PartialEq)]
pub struct LineProtocolRecord {
    /// Measurement name, unescaped.
    pub measurement: String,
    /// Tag key/value pairs, sorted by key once [`sort_tags`](Self::sort_tags) ran.
    pub tags: Vec<(String, String)>,
    /// Field key/value pairs in column order.
    pub fields: Vec<(String, Value)>,
    /// Timestamp in nanoseconds since the Unix epoch.
    pub timestamp: Option<i64>,
}

impl LineProtocolRecord {
    /// Create an empty record for the given measurement.
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: Vec::new(),
            fields: Vec::new(),
            timestamp: None,
        }
    }

    /// Sort tags by key. Line protocol requires sorted tags.
    pub fn sort_tags(&mut self) {
        self.tags.sort_by(|a, b| a.0.cmp(&b.0));
    }

    /// Check that the record can be written as a well-formed line.
    pub fn validate(&self) -> Result<()> {
        if self.measurement.is_empty() {
            return Err(Error::MissingValue {
                column: "measurement".to_string(),
            });
        }
        if self.fields.is_empty() {
            return Err(Error::NoFields);
        }
        let mut seen = HashSet::with_capacity(self.tags.len() + self.fields.len());
        let keys = self
            .tags
            .iter()
            .map(|(k, _)| k)
            .chain(self.fields.iter().map(|(k, _)| k));
        for key in keys {
            if key.is_empty() {
                return Err(Error::Schema("empty tag or field key".to_string()));
            }
            if !seen.insert(key.as_str()) {
                return Err(Error::DuplicateKey(key.clone()));
            }
        }
        Ok(())
    }

    /// Append this record as one newline-terminated line to `out`.
    pub fn write_line(&self, out: &mut String) {
        escape_measurement(&self.measurement, out);
        for (key, value) in &self.tags {
            out.push(',');
            escape_tag(key, out);
            out.push('=');
            escape_tag(value, out);
        }
        for (i, (key, value)) in self.fields.iter().enumerate() {
            out.push(if i == 0 { ' ' } else { ',' });
            escape_tag(key, out);
            out.push('=');
            value.write_field(out);
        }
        if let Some(ts) = self.timestamp {
            let _ = write!(out, " {}", ts);
        }
        out.push('\n');
    }
}

impl std::fmt::Display for LineProtocolRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut line = String::new();
        self.write_line(&mut line);
        f.write_str(line.trim_end_matches('\n'))
    }
}

/// Escape a measurement name: space and comma.
pub fn escape_measurement(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            ' ' | ',' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
}

/// Escape a tag key, tag value or field key: space, comma, equals sign and backslash.
pub fn escape_tag(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            ' ' | ',' | '=' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
}

/// Escape the inside of a quoted string field value.
pub fn escape_string_field(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
}
