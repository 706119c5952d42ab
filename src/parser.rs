//! Section state machine for annotated CSV.
//!
//! Rows are fed one at a time. Annotation rows build an [`AnnotationBlock`],
//! the header row turns it into a [`Schema`], and data rows are converted
//! with that schema until the next annotation row opens a new section.

use tracing::{debug, trace};

use crate::annotation::{AnnotationBlock, RowKind, classify};
use crate::config::{ConverterConfig, UnknownAnnotationPolicy};
use crate::convert::convert_row;
use crate::diagnostic::{Diagnostic, DiagnosticKind, DiagnosticSink, TracingSink};
use crate::error::{Error, Result};
use crate::schema::Schema;

/// Internal state of the current schema section.
enum ParsingState {
    /// Collecting annotation rows, the next data row is the header.
    AwaitingHeader(AnnotationBlock),
    /// Header seen, data rows are converted.
    Converting(Schema),
    /// The section is broken. Rows are dropped until the next section.
    Suspended {
        /// Still inside the annotation block, the header is yet to come.
        in_block: bool,
    },
    /// Flux error table (`,error,reference` header); its rows are reported.
    ErrorTable,
}

/// Row-at-a-time converter from annotated CSV rows to line protocol text.
///
/// This is the core shared by the blocking [`LineProtocolReader`] and the
/// async stream. It owns no input; callers push rows and collect output.
///
/// [`LineProtocolReader`]: crate::reader::LineProtocolReader
///
/// # Example
///
/// ```
/// use csv2lp::{ConverterConfig, LineProtocolConverter};
///
/// let mut converter = LineProtocolConverter::new(ConverterConfig::default());
/// let mut out = String::new();
/// converter.push_row(&["m|measurement", "host|tag", "v|long"], 1, &mut out)?;
/// converter.push_row(&["cpu", "a", "1"], 2, &mut out)?;
/// assert_eq!(out, "cpu,host=a v=1i\n");
/// # Ok::<(), csv2lp::Error>(())
/// ```
pub struct LineProtocolConverter {
    config: ConverterConfig,
    state: ParsingState,
    sink: Box<dyn DiagnosticSink + Send>,
    sections: u64,
    records_written: u64,
    rows_skipped: u64,
}

impl LineProtocolConverter {
    /// Create a converter that logs diagnostics through `tracing`.
    pub fn new(config: ConverterConfig) -> Self {
        Self::with_sink(config, Box::new(TracingSink))
    }

    /// Create a converter that reports diagnostics to `sink`.
    pub fn with_sink(config: ConverterConfig, sink: Box<dyn DiagnosticSink + Send>) -> Self {
        Self {
            config,
            state: ParsingState::AwaitingHeader(AnnotationBlock::new()),
            sink,
            sections: 0,
            records_written: 0,
            rows_skipped: 0,
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Number of records appended to the output so far.
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Number of data rows dropped because of row or section errors.
    pub fn rows_skipped(&self) -> u64 {
        self.rows_skipped
    }

    /// Number of schema sections started so far.
    pub fn sections(&self) -> u64 {
        self.sections
    }

    /// Process one CSV row and append any produced line to `out`.
    ///
    /// `line` is the source line number used in diagnostics. Recoverable
    /// problems go to the diagnostic sink; an error is returned only when a
    /// row error is escalated because `skip_row_on_error` is off.
    pub fn push_row(&mut self, row: &[&str], line: u64, out: &mut String) -> Result<()> {
        if row.iter().all(|cell| cell.is_empty()) {
            return Ok(());
        }

        match classify(row) {
            RowKind::Comment => Ok(()),
            RowKind::Unknown(keyword) => {
                self.unknown_annotation(keyword, line);
                Ok(())
            }
            RowKind::Annotation { annotation, first } => {
                let mut block = match std::mem::replace(
                    &mut self.state,
                    ParsingState::Suspended { in_block: true },
                ) {
                    ParsingState::AwaitingHeader(block) => block,
                    ParsingState::Suspended { in_block: true } => return Ok(()),
                    _ => AnnotationBlock::new(),
                };
                match block.add(annotation, first, row) {
                    Ok(()) => self.state = ParsingState::AwaitingHeader(block),
                    Err(e) if e.is_schema_level() => {
                        self.report(
                            line,
                            DiagnosticKind::Schema,
                            format!("{}; section skipped", e),
                        );
                    }
                    Err(e) => {
                        self.report(line, DiagnosticKind::Annotation, e.to_string());
                        self.state = ParsingState::AwaitingHeader(block);
                    }
                }
                Ok(())
            }
            RowKind::Data => self.data_row(row, line, out),
        }
    }

    fn data_row(&mut self, row: &[&str], line: u64, out: &mut String) -> Result<()> {
        match &mut self.state {
            ParsingState::Converting(schema) => {
                match convert_row(schema, &self.config, row) {
                    Ok(record) => {
                        trace!(line, measurement = %record.measurement, "record converted");
                        record.write_line(out);
                        self.records_written += 1;
                        Ok(())
                    }
                    Err(e) if self.config.skip_row_on_error => {
                        self.rows_skipped += 1;
                        self.report(line, DiagnosticKind::Row, e.to_string());
                        Ok(())
                    }
                    Err(e) => Err(Error::AtLine {
                        line,
                        source: Box::new(e),
                    }),
                }
            }
            ParsingState::Suspended { in_block } => {
                if *in_block {
                    *in_block = false;
                } else {
                    self.rows_skipped += 1;
                }
                Ok(())
            }
            ParsingState::ErrorTable => {
                let message = match row.get(1) {
                    Some(m) if !m.is_empty() => m.to_string(),
                    _ => "Unknown query error".to_string(),
                };
                let reference = row.get(2).filter(|r| !r.is_empty()).map(|r| r.to_string());
                let error = Error::QueryError { message, reference };
                let text = match &error {
                    Error::QueryError {
                        reference: Some(r), ..
                    } => format!("{} (reference {})", error, r),
                    _ => error.to_string(),
                };
                self.report(line, DiagnosticKind::Schema, text);
                Ok(())
            }
            ParsingState::AwaitingHeader(_) => {
                self.header_row(row, line);
                Ok(())
            }
        }
    }

    fn header_row(&mut self, row: &[&str], line: u64) {
        let ParsingState::AwaitingHeader(block) =
            std::mem::replace(&mut self.state, ParsingState::Suspended { in_block: false })
        else {
            return;
        };
        self.sections += 1;

        if row.len() >= 2 && row[0].is_empty() && row[1] == "error" {
            self.state = ParsingState::ErrorTable;
            return;
        }

        match Schema::build(block, row, self.config.default_measurement.as_deref()) {
            Ok((schema, warnings)) => {
                for warning in warnings {
                    self.report(line, DiagnosticKind::Schema, warning);
                }
                debug!(
                    line,
                    section = self.sections,
                    columns = %schema.describe(),
                    "schema section started"
                );
                self.state = ParsingState::Converting(schema);
            }
            Err(e) => {
                self.report(
                    line,
                    DiagnosticKind::Schema,
                    format!("{}; section skipped", e),
                );
            }
        }
    }

    fn unknown_annotation(&mut self, keyword: &str, line: u64) {
        match self.config.unknown_annotation {
            UnknownAnnotationPolicy::Skip => {}
            UnknownAnnotationPolicy::Warn => {
                self.report(
                    line,
                    DiagnosticKind::Annotation,
                    format!("unsupported annotation '#{}'", keyword),
                );
            }
            UnknownAnnotationPolicy::Reject => {
                self.report(
                    line,
                    DiagnosticKind::Schema,
                    format!(
                        "{}; section skipped",
                        Error::UnsupportedAnnotation(format!("#{}", keyword))
                    ),
                );
                let in_block = matches!(
                    self.state,
                    ParsingState::AwaitingHeader(_) | ParsingState::Suspended { in_block: true }
                );
                self.state = ParsingState::Suspended { in_block };
            }
        }
    }

    fn report(&mut self, line: u64, kind: DiagnosticKind, message: String) {
        self.sink.report(Diagnostic::new(line, kind, message));
    }
}
