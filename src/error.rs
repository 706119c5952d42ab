//! Error types for csv2lp.

use thiserror::Error;

/// Error type for CSV to line protocol conversion.
///
/// Most variants describe a problem with a single row or a single schema
/// section and are normally reported through a
/// [`DiagnosticSink`](crate::diagnostic::DiagnosticSink) while conversion
/// continues. Only `Io`, `Csv` and `AtLine` terminate an output stream.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error while reading the CSV input.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The CSV tokenizer failed to read a record.
    #[error("CSV read error: {0}")]
    Csv(String),

    /// Failed to parse a cell value for its declared type.
    #[error("Failed to parse value: {message}")]
    Parse {
        /// Description of what failed to parse.
        message: String,
    },

    /// Unknown data type in a `#datatype` annotation.
    #[error("Unknown data type: {0}")]
    UnknownDataType(String),

    /// Annotation keyword that is not understood.
    #[error("Unsupported annotation: {0}")]
    UnsupportedAnnotation(String),

    /// Row has a different number of columns than expected.
    #[error("Column count mismatch: expected {expected}, got {actual}")]
    ColumnMismatch {
        /// Expected number of columns.
        expected: usize,
        /// Actual number of columns found.
        actual: usize,
    },

    /// A required cell is empty and its column has no default value.
    #[error("Missing value for column '{column}'")]
    MissingValue {
        /// Label of the column.
        column: String,
    },

    /// The same tag or field key appears twice in one record.
    #[error("Duplicate key '{0}' in record")]
    DuplicateKey(String),

    /// Every field of the row was empty.
    #[error("Row has no fields")]
    NoFields,

    /// Neither a measurement column nor a default measurement exists.
    #[error("No measurement column found and no default measurement configured")]
    MissingMeasurement,

    /// Any other problem with the annotations or header of a section.
    #[error("Schema error: {0}")]
    Schema(String),

    /// A Flux error table (`,error,reference` header) was found in the input.
    #[error("Query error: {message}")]
    QueryError {
        /// Error message from the table.
        message: String,
        /// Optional reference code.
        reference: Option<String>,
    },

    /// A row or schema error that was escalated to a fatal stream error.
    #[error("line {line}: {source}")]
    AtLine {
        /// Source line number of the offending row.
        line: u64,
        /// The underlying error.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Returns true for errors that invalidate a whole schema section rather
    /// than a single row.
    pub fn is_schema_level(&self) -> bool {
        matches!(
            self,
            Error::UnknownDataType(_)
                | Error::UnsupportedAnnotation(_)
                | Error::MissingMeasurement
                | Error::Schema(_)
                | Error::QueryError { .. }
        )
    }

    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Error::Parse {
            message: message.into(),
        }
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        if e.is_io_error() {
            match e.into_kind() {
                csv::ErrorKind::Io(io) => Error::Io(io),
                other => Error::Csv(format!("{:?}", other)),
            }
        } else {
            Error::Csv(e.to_string())
        }
    }
}

impl From<csv_async::Error> for Error {
    fn from(e: csv_async::Error) -> Self {
        Error::Csv(e.to_string())
    }
}

impl From<Error> for std::io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(io) => io,
            Error::Csv(_) => std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            other => std::io::Error::other(other),
        }
    }
}

/// Result type alias for csv2lp operations.
pub type Result<T> = std::result::Result<T, Error>;
