//! Annotation rows of the annotated CSV format.
//!
//! Annotation rows start with `#` and describe the columns of the table that
//! follows. Two layouts are understood:
//!
//! ```text
//! #datatype,string,long,dateTime:RFC3339       <- Flux export layout, the first
//! #group,true,false,false                         column only holds the keyword
//! #default,_result,,
//! ,host,value,_time
//! ,a,1,2023-01-01T00:00:00Z
//!
//! #datatype measurement,tag,double,dateTime    <- compact layout, the first cell
//! m,host,usage,time                               holds the keyword and the first
//! cpu,a,0.5,1672531200000000000                   column's value
//! ```

use chrono::FixedOffset;

use crate::error::{Error, Result};
use crate::types::{DataType, Semantic};

/// Annotations understood by the converter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Annotation {
    /// `#datatype`: data type and line part of each column.
    Datatype,
    /// `#group`: group key flag of each column.
    Group,
    /// `#default`: value used for empty cells of each column.
    Default,
    /// `#constant`: virtual column with the same value in every row.
    Constant,
    /// `#timezone`: offset for timestamps parsed without one.
    Timezone,
}

impl Annotation {
    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "datatype" => Some(Self::Datatype),
            "group" => Some(Self::Group),
            "default" => Some(Self::Default),
            "constant" => Some(Self::Constant),
            "timezone" => Some(Self::Timezone),
            _ => None,
        }
    }

    /// Column annotations hold one value per column; table annotations don't.
    pub fn is_column_annotation(self) -> bool {
        matches!(self, Self::Datatype | Self::Group | Self::Default)
    }
}

/// Classification of a raw CSV row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowKind<'a> {
    /// A supported annotation. `first` is the value the row carries for the
    /// first column (empty in the Flux export layout).
    Annotation {
        /// The annotation.
        annotation: Annotation,
        /// Value for column zero.
        first: &'a str,
    },
    /// `#` alone or `# ` followed by free text.
    Comment,
    /// `#keyword` with a keyword that is not supported.
    Unknown(&'a str),
    /// Header or data row.
    Data,
}

/// Classify a row by its first cell.
pub fn classify<'a>(row: &[&'a str]) -> RowKind<'a> {
    let first = row.first().copied().unwrap_or("");
    let Some(rest) = first.strip_prefix('#') else {
        return RowKind::Data;
    };
    if rest.is_empty() || rest.starts_with(' ') {
        return RowKind::Comment;
    }
    let (keyword, value) = rest.split_once(' ').unwrap_or((rest, ""));
    match Annotation::from_keyword(keyword) {
        Some(annotation) => RowKind::Annotation {
            annotation,
            first: value,
        },
        None => RowKind::Unknown(keyword),
    }
}

/// Parsed content of a data type cell.
///
/// A cell has the form `type`, `type:format`, `type|default` or
/// `type:format|default`. Besides data types, the line part keywords
/// `measurement`, `tag`, `field`, `time` and `ignore`/`ignored` are accepted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TypeAnnotation {
    /// Explicit data type, if any.
    pub data_type: Option<DataType>,
    /// Format of numeric and boolean types.
    pub format: Option<String>,
    /// Line part chosen by a keyword.
    pub semantic: Option<Semantic>,
    /// Default value after `|`.
    pub default_value: Option<String>,
}

impl TypeAnnotation {
    /// Parse a data type cell.
    pub fn parse(cell: &str) -> Result<Self> {
        let mut annotation = TypeAnnotation::default();
        let mut text = cell.trim();
        if text.is_empty() {
            return Ok(annotation);
        }
        if let Some((head, default)) = text.split_once('|') {
            if !head.is_empty() {
                annotation.default_value = Some(default.to_string());
                text = head;
            }
        }
        let (name, format) = match text.split_once(':') {
            Some((name, format)) => (name, Some(format)),
            None => (text, None),
        };
        match name {
            "measurement" => {
                annotation.semantic = Some(Semantic::Measurement);
                annotation.data_type = Some(DataType::String);
            }
            "tag" => {
                annotation.semantic = Some(Semantic::Tag);
                annotation.data_type = Some(DataType::String);
            }
            "ignore" | "ignored" => annotation.semantic = Some(Semantic::Ignored),
            "field" => annotation.semantic = Some(Semantic::Field),
            "time" => {
                annotation.semantic = Some(Semantic::Time);
                annotation.data_type = Some(DataType::from_parts("dateTime", format)?);
            }
            _ => {
                let data_type = DataType::from_parts(name, format)?;
                if !data_type.is_date_time() {
                    annotation.format = format.filter(|f| !f.is_empty()).map(str::to_string);
                }
                annotation.data_type = Some(data_type);
            }
        }
        Ok(annotation)
    }
}

/// A `#constant` virtual column before it is resolved into the schema.
#[derive(Clone, Debug, PartialEq)]
pub struct ConstantColumn {
    /// Label of the column.
    pub label: String,
    /// Type of the constant.
    pub annotation: TypeAnnotation,
    /// The constant value.
    pub value: String,
}

/// Annotation rows seen since the last header row.
///
/// The block is filled row by row and consumed by
/// [`Schema::build`](crate::schema::Schema::build) when the header row arrives.
#[derive(Clone, Debug, Default)]
pub struct AnnotationBlock {
    pub(crate) width: Option<usize>,
    pub(crate) datatypes: Option<Vec<TypeAnnotation>>,
    pub(crate) groups: Option<Vec<bool>>,
    pub(crate) defaults: Option<Vec<String>>,
    pub(crate) constants: Vec<ConstantColumn>,
    pub(crate) timezone: Option<FixedOffset>,
}

impl AnnotationBlock {
    /// Create an empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no annotation was added.
    pub fn is_empty(&self) -> bool {
        self.width.is_none() && self.constants.is_empty() && self.timezone.is_none()
    }

    /// Add one annotation row.
    ///
    /// A column annotation whose width differs from an earlier column
    /// annotation of the block fails with [`Error::ColumnMismatch`] and leaves
    /// the block unchanged. Other errors invalidate the whole block.
    pub fn add(&mut self, annotation: Annotation, first: &str, row: &[&str]) -> Result<()> {
        let cells: Vec<&str> = std::iter::once(first)
            .chain(row.iter().skip(1).copied())
            .collect();

        if annotation.is_column_annotation() {
            if let Some(width) = self.width {
                if width != cells.len() {
                    return Err(Error::ColumnMismatch {
                        expected: width,
                        actual: cells.len(),
                    });
                }
            }
        }

        match annotation {
            Annotation::Datatype => {
                let types = cells
                    .iter()
                    .map(|c| TypeAnnotation::parse(c))
                    .collect::<Result<Vec<_>>>()?;
                self.datatypes = Some(types);
            }
            Annotation::Group => {
                let groups = cells
                    .iter()
                    .map(|c| c.trim().eq_ignore_ascii_case("true"))
                    .collect();
                self.groups = Some(groups);
            }
            Annotation::Default => {
                self.defaults = Some(cells.iter().map(|c| c.to_string()).collect());
            }
            Annotation::Constant => {
                self.constants.push(parse_constant(&cells)?);
                return Ok(());
            }
            Annotation::Timezone => {
                let value = cells.iter().find(|c| !c.is_empty()).copied().unwrap_or("");
                self.timezone = Some(parse_offset(value)?);
                return Ok(());
            }
        }
        self.width = Some(cells.len());
        Ok(())
    }
}

/// Parse the cells of a `#constant` row.
///
/// Accepted forms, with or without the Flux layout's empty first cell:
/// `type,label,value`, `measurement,value` and `dateTime,value`.
fn parse_constant(cells: &[&str]) -> Result<ConstantColumn> {
    let cells = match cells.split_first() {
        Some((first, rest)) if first.is_empty() => rest,
        _ => cells,
    };
    let type_cell = cells.first().copied().unwrap_or("");
    let annotation = TypeAnnotation::parse(type_cell)?;
    let mut label = cells.get(1).copied().unwrap_or("").to_string();
    let mut value = cells.get(2).copied().unwrap_or("").to_string();

    let is_time = matches!(annotation.data_type, Some(DataType::DateTime(_)));
    if (annotation.semantic == Some(Semantic::Measurement) || is_time) && value.is_empty() {
        value = std::mem::take(&mut label);
    }
    if label.is_empty() {
        label = format!("#constant {}", type_cell);
    }
    if value.is_empty() {
        return Err(Error::Schema(format!("#constant '{}' has no value", label)));
    }
    Ok(ConstantColumn {
        label,
        annotation,
        value,
    })
}

/// Parse a fixed UTC offset such as `+0100`, `-05:30`, `UTC` or `Z`.
pub fn parse_offset(value: &str) -> Result<FixedOffset> {
    let value = value.trim();
    let invalid = || Error::Schema(format!("invalid #timezone '{}'", value));
    if value.is_empty() || value.eq_ignore_ascii_case("utc") || value == "Z" {
        return FixedOffset::east_opt(0).ok_or_else(invalid);
    }
    let (sign, digits) = match value.as_bytes()[0] {
        b'+' => (1, &value[1..]),
        b'-' => (-1, &value[1..]),
        _ => return Err(invalid()),
    };
    let digits: String = digits.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
    let minutes: i32 = digits[2..].parse().map_err(|_| invalid())?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}
