//! Resolved column layout of one schema section.

use chrono::{FixedOffset, Offset, Utc};

use crate::annotation::{AnnotationBlock, TypeAnnotation};
use crate::error::{Error, Result};
use crate::types::{ColumnSpec, DataType, DateTimeFormat, Semantic};

const LABEL_MEASUREMENT: &str = "_measurement";
const LABEL_FIELD: &str = "_field";
const LABEL_VALUE: &str = "_value";

/// Immutable column layout of one schema section.
///
/// Built once from the annotation block and the header row, then shared by
/// every data row of the section. A new section builds a new `Schema`.
#[derive(Clone, Debug)]
pub struct Schema {
    columns: Vec<ColumnSpec>,
    width: usize,
    measurement: Option<usize>,
    default_measurement: Option<String>,
    time: Option<usize>,
    tags: Vec<usize>,
    fields: Vec<usize>,
    field_pair: Option<(usize, usize)>,
    timezone: FixedOffset,
}

/// How strongly a column claims to be the time column.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum TimeClaim {
    DataType,
    Keyword,
    Label,
}

impl Schema {
    /// Build the schema of a section from its annotations and header row.
    ///
    /// Returns the schema together with warnings about columns that were
    /// dropped while resolving it. Errors are section-level: the section
    /// produces no output.
    pub fn build(
        block: AnnotationBlock,
        header: &[&str],
        default_measurement: Option<&str>,
    ) -> Result<(Schema, Vec<String>)> {
        let width = header.len();
        if let Some(expected) = block.width {
            if expected != width {
                return Err(Error::Schema(format!(
                    "annotations have {} columns but the header has {}",
                    expected, width
                )));
            }
        }
        let flux_layout = width > 1 && header[0].is_empty();
        let mut warnings = Vec::new();
        let mut columns = Vec::with_capacity(width + block.constants.len());
        let mut claims = Vec::with_capacity(columns.capacity());

        for (i, raw_label) in header.iter().enumerate() {
            let mut label = *raw_label;
            let mut annotation = block
                .datatypes
                .as_ref()
                .and_then(|d| d.get(i))
                .cloned()
                .unwrap_or_default();
            if block.datatypes.is_none() {
                if let Some((name, inline)) = label.split_once('|') {
                    annotation = TypeAnnotation::parse(inline)?;
                    label = name;
                }
            }
            let group = block
                .groups
                .as_ref()
                .and_then(|g| g.get(i))
                .copied()
                .unwrap_or(false);
            let default_value = block
                .defaults
                .as_ref()
                .and_then(|d| d.get(i))
                .filter(|d| !d.is_empty())
                .cloned();
            let (column, claim) =
                resolve_column(Some(i), label, annotation, group, default_value, flux_layout);
            columns.push(column);
            claims.push(claim);
        }
        for constant in block.constants {
            let (column, claim) = resolve_column(
                None,
                &constant.label,
                constant.annotation,
                false,
                Some(constant.value),
                false,
            );
            columns.push(column);
            claims.push(claim);
        }

        let time = pick_time_column(&mut columns, &claims, &mut warnings);

        let mut measurement = None;
        for (i, column) in columns.iter_mut().enumerate() {
            if column.semantic != Semantic::Measurement {
                continue;
            }
            if measurement.is_none() {
                measurement = Some(i);
            } else {
                warnings.push(format!(
                    "more than one measurement column, '{}' is ignored",
                    column.label
                ));
                column.semantic = Semantic::Ignored;
            }
        }
        if measurement.is_none() && default_measurement.is_none() {
            return Err(Error::MissingMeasurement);
        }

        let position = |label: &str| {
            columns
                .iter()
                .position(|c| c.semantic == Semantic::Field && c.label == label)
        };
        let field_pair = match (position(LABEL_FIELD), position(LABEL_VALUE)) {
            (Some(name), Some(value)) => Some((name, value)),
            _ => None,
        };
        if field_pair.is_none() {
            if let Some(name) = position(LABEL_FIELD) {
                columns[name].semantic = Semantic::Ignored;
            }
        }

        let mut tags: Vec<usize> = columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.semantic == Semantic::Tag)
            .map(|(i, _)| i)
            .collect();
        tags.sort_by(|a, b| columns[*a].label.cmp(&columns[*b].label));

        let fields: Vec<usize> = columns
            .iter()
            .enumerate()
            .filter(|(i, c)| {
                c.semantic == Semantic::Field
                    && field_pair.is_none_or(|(name, value)| *i != name && *i != value)
            })
            .map(|(i, _)| i)
            .collect();
        if fields.is_empty() && field_pair.is_none() {
            return Err(Error::Schema("no field columns".to_string()));
        }

        let schema = Schema {
            columns,
            width,
            measurement,
            default_measurement: default_measurement.map(str::to_string),
            time,
            tags,
            fields,
            field_pair,
            timezone: block.timezone.unwrap_or_else(|| Utc.fix()),
        };
        Ok((schema, warnings))
    }

    /// Number of cells every data row of the section must have.
    pub fn width(&self) -> usize {
        self.width
    }

    /// All columns, header columns first, then `#constant` columns.
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// The measurement column, if the section has one.
    pub fn measurement_column(&self) -> Option<&ColumnSpec> {
        self.measurement.map(|i| &self.columns[i])
    }

    /// Measurement used when there is no measurement column.
    pub fn default_measurement(&self) -> Option<&str> {
        self.default_measurement.as_deref()
    }

    /// The time column, if the section has one.
    pub fn time_column(&self) -> Option<&ColumnSpec> {
        self.time.map(|i| &self.columns[i])
    }

    /// Tag columns sorted by label.
    pub fn tag_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.tags.iter().map(|i| &self.columns[*i])
    }

    /// Field columns in column order.
    pub fn field_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.fields.iter().map(|i| &self.columns[*i])
    }

    /// The `_field` name and `_value` columns of a Flux result table.
    pub fn field_pair(&self) -> Option<(&ColumnSpec, &ColumnSpec)> {
        self.field_pair
            .map(|(name, value)| (&self.columns[name], &self.columns[value]))
    }

    /// Offset applied to timestamps parsed without one.
    pub fn timezone(&self) -> FixedOffset {
        self.timezone
    }

    /// One line summary of the column roles, for logging.
    pub fn describe(&self) -> String {
        self.columns
            .iter()
            .filter(|c| c.semantic != Semantic::Ignored)
            .map(|c| format!("{}:{}:{}", c.label, c.semantic, c.data_type))
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn resolve_column(
    index: Option<usize>,
    label: &str,
    annotation: TypeAnnotation,
    group: bool,
    default_value: Option<String>,
    flux_layout: bool,
) -> (ColumnSpec, Option<TimeClaim>) {
    let explicit_type = annotation.data_type.is_some();
    let data_type = annotation.data_type.unwrap_or_default();
    let time_label = label.eq_ignore_ascii_case("_time") || label.eq_ignore_ascii_case("time");

    let (semantic, claim) = if label == LABEL_MEASUREMENT || label == "measurement" {
        (Semantic::Measurement, None)
    } else if time_label {
        (Semantic::Time, Some(TimeClaim::Label))
    } else if let Some(semantic) = annotation.semantic {
        let claim = (semantic == Semantic::Time).then_some(TimeClaim::Keyword);
        (semantic, claim)
    } else if label.is_empty() {
        (Semantic::Ignored, None)
    } else if label == LABEL_FIELD || label == LABEL_VALUE {
        (Semantic::Field, None)
    } else if label.starts_with('_') || (flux_layout && (label == "result" || label == "table")) {
        (Semantic::Ignored, None)
    } else if explicit_type && data_type.is_date_time() {
        (Semantic::Time, Some(TimeClaim::DataType))
    } else if group && data_type == DataType::String {
        (Semantic::Tag, None)
    } else {
        (Semantic::Field, None)
    };

    // A time column without a date type accepts RFC3339 and integers alike.
    let data_type = if semantic == Semantic::Time && !explicit_type {
        DataType::DateTime(DateTimeFormat::Auto)
    } else {
        data_type
    };

    let column = ColumnSpec {
        index,
        label: label.to_string(),
        data_type,
        format: annotation.format,
        semantic,
        default_value: default_value.or(annotation.default_value),
    };
    (column, claim)
}

/// Keep the strongest time claim (earliest on ties). Weaker explicit claims
/// are dropped with a warning, columns that only had a date type become fields.
fn pick_time_column(
    columns: &mut [ColumnSpec],
    claims: &[Option<TimeClaim>],
    warnings: &mut Vec<String>,
) -> Option<usize> {
    let mut winner: Option<(usize, TimeClaim)> = None;
    for (i, claim) in claims.iter().enumerate() {
        if let Some(claim) = claim {
            if winner.is_none_or(|(_, best)| *claim > best) {
                winner = Some((i, *claim));
            }
        }
    }
    let winner = winner.map(|(i, _)| i);
    for (i, claim) in claims.iter().enumerate() {
        if Some(i) == winner {
            continue;
        }
        match claim {
            Some(TimeClaim::DataType) => columns[i].semantic = Semantic::Field,
            Some(_) => {
                warnings.push(format!(
                    "at most one time column is used, '{}' is ignored",
                    columns[i].label
                ));
                columns[i].semantic = Semantic::Ignored;
            }
            None => {}
        }
    }
    winner
}
