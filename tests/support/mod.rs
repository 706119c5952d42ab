//! Minimal line protocol parser used to check converter output.
//!
//! Format: measurement,tag1=value1 field1=value1,field2=value2 timestamp

#![allow(dead_code)]

/// One parsed line. Field values are kept in their raw encoded form
/// except for strings, which are unquoted and unescaped.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub measurement: String,
    pub tags: Vec<(String, String)>,
    pub fields: Vec<(String, String)>,
    pub timestamp: Option<i64>,
}

impl ParsedLine {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Parse every line of `input`.
pub fn parse_lines(input: &str) -> Vec<ParsedLine> {
    input
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| parse_line(line).unwrap_or_else(|e| panic!("{}: {}", e, line)))
        .collect()
}

/// Parse a single line.
pub fn parse_line(line: &str) -> Result<ParsedLine, String> {
    let parts = split_unescaped(line, ' ', true);
    if parts.len() < 2 || parts.len() > 3 {
        return Err(format!("Invalid line format ({} parts)", parts.len()));
    }

    let mut head = split_unescaped(parts[0], ',', false).into_iter();
    let measurement = unescape(head.next().unwrap_or(""));
    let mut tags = Vec::new();
    for tag in head {
        tags.push(split_pair(tag)?);
    }

    let mut fields = Vec::new();
    for field in split_unescaped(parts[1], ',', true) {
        let (key, raw) = split_pair_raw(field)?;
        let value = match raw.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
            Some(quoted) => unescape(quoted),
            None => raw.to_string(),
        };
        fields.push((key, value));
    }
    if fields.is_empty() {
        return Err("Missing fields".to_string());
    }

    let timestamp = match parts.get(2) {
        Some(ts) => Some(
            ts.parse::<i64>()
                .map_err(|e| format!("Invalid timestamp: {}", e))?,
        ),
        None => None,
    };

    Ok(ParsedLine {
        measurement,
        tags,
        fields,
        timestamp,
    })
}

fn split_pair(s: &str) -> Result<(String, String), String> {
    let (key, value) = split_pair_raw(s)?;
    Ok((key, unescape(value)))
}

fn split_pair_raw(s: &str) -> Result<(String, &str), String> {
    let parts = split_unescaped(s, '=', true);
    let key = parts.first().copied().unwrap_or("");
    if parts.len() < 2 || key.is_empty() {
        return Err(format!("Invalid key=value pair: {}", s));
    }
    Ok((unescape(key), &s[key.len() + 1..]))
}

/// Split on `sep` unless escaped with a backslash or, when `quotes` is set,
/// inside a double quoted string.
fn split_unescaped(s: &str, sep: char, quotes: bool) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    let mut in_quotes = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if quotes && c == '"' {
            in_quotes = !in_quotes;
        } else if c == sep && !in_quotes {
            parts.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
