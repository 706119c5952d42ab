//! # csv2lp
//!
//! Streaming converter from InfluxDB annotated CSV to line protocol.
//!
//! Annotated CSV carries its schema in `#datatype`, `#group` and `#default`
//! rows above the header. `csv2lp` reads those rows, decides for every column
//! whether it is the measurement, a tag, a field or the timestamp, and turns
//! each data row into one line of
//! [line protocol](https://docs.influxdata.com/influxdb/v2/reference/syntax/line-protocol/).
//!
//! ## Quick Start
//!
//! ```
//! use csv2lp::{ConverterConfig, CsvToLineProtocol};
//!
//! let csv = "\
//! #datatype,string,long,dateTime:RFC3339,double,string,string,string
//! #group,false,false,false,false,true,true,true
//! #default,_result,,,,,,
//! ,result,table,_time,_value,_field,_measurement,host
//! ,,0,2020-02-25T22:17:54.068926364Z,0.5,usage,cpu,server01
//! ,,0,2020-02-25T22:17:55.068926364Z,0.7,usage,cpu,server01
//! ";
//!
//! let lines = CsvToLineProtocol::new(ConverterConfig::default()).convert_str(csv)?;
//! assert_eq!(
//!     lines,
//!     "cpu,host=server01 usage=0.5 1582669074068926364\n\
//!      cpu,host=server01 usage=0.7 1582669075068926364\n"
//! );
//! # Ok::<(), csv2lp::Error>(())
//! ```
//!
//! ## Adapters
//!
//! - [`CsvToLineProtocol::reader`] wraps a blocking [`std::io::Read`]
//! - [`CsvToLineProtocol::stream`] yields [`bytes::Bytes`] chunks from a tokio
//!   `AsyncRead`
//! - [`CsvToLineProtocol::async_reader`] turns that stream back into an
//!   `AsyncRead`
//! - [`LineProtocolConverter`] converts rows one at a time for callers that
//!   tokenize CSV themselves
//!
//! Bad rows and broken sections are skipped and reported as [`Diagnostic`]s
//! through a [`DiagnosticSink`]. By default they are logged with `tracing`.

pub mod annotation;
pub mod config;
pub mod convert;
pub mod converter;
pub mod diagnostic;
pub mod error;
pub mod line;
pub mod parser;
pub mod reader;
pub mod schema;
pub mod types;
pub mod value;

// Re-export main types at crate root
pub use config::{ConverterConfig, DefaultTimestamp, Precision, UnknownAnnotationPolicy};
pub use converter::{CsvToLineProtocol, LineProtocolStream};
pub use diagnostic::{Diagnostic, DiagnosticKind, DiagnosticSink, TracingSink};
pub use error::{Error, Result};
pub use line::LineProtocolRecord;
pub use reader::LineProtocolReader;
pub use types::{ColumnSpec, DataType, DateTimeFormat, Semantic};
pub use value::Value;

// Lower level pieces for callers that drive conversion themselves
pub use annotation::AnnotationBlock;
pub use parser::LineProtocolConverter;
pub use schema::Schema;
