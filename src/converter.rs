//! Entry point tying the converter to its input adapters.
//!
//! [`CsvToLineProtocol`] holds the configuration and the diagnostic sink and
//! hands out a blocking [`Read`] adapter, an async byte stream or an
//! [`AsyncRead`] adapter over the same conversion.

use std::io::Read;
use std::pin::Pin;

use async_stream::stream;
use bytes::Bytes;
use csv_async::{AsyncReaderBuilder, Trim};
use futures::{Stream, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::io::StreamReader;
use tracing::{debug, error};

use crate::config::ConverterConfig;
use crate::diagnostic::{DiagnosticSink, TracingSink};
use crate::error::{Error, Result};
use crate::parser::LineProtocolConverter;
use crate::reader::LineProtocolReader;

/// Async stream of line protocol chunks.
///
/// Every chunk holds whole lines. The stream ends after the first error.
pub type LineProtocolStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Converter from annotated CSV to InfluxDB line protocol.
///
/// # Example
///
/// ```
/// use csv2lp::{ConverterConfig, CsvToLineProtocol};
///
/// let csv = "\
/// #datatype string,long,dateTime:RFC3339
/// #group true,false,false
/// tagA,valueB,_time
/// x,42,2023-01-01T00:00:00Z
/// ";
/// let config = ConverterConfig::default().with_default_measurement("m");
/// let lines = CsvToLineProtocol::new(config).convert_str(csv)?;
/// assert_eq!(lines, "m,tagA=x valueB=42i 1672531200000000000\n");
/// # Ok::<(), csv2lp::Error>(())
/// ```
pub struct CsvToLineProtocol {
    config: ConverterConfig,
    sink: Box<dyn DiagnosticSink + Send>,
}

impl CsvToLineProtocol {
    /// Create a converter that logs diagnostics through `tracing`.
    pub fn new(config: ConverterConfig) -> Self {
        Self {
            config,
            sink: Box::new(TracingSink),
        }
    }

    /// Send diagnostics to `sink` instead of the log.
    pub fn with_diagnostics(mut self, sink: impl DiagnosticSink + Send + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// The configuration in use.
    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    fn into_converter(self) -> LineProtocolConverter {
        LineProtocolConverter::with_sink(self.config, self.sink)
    }

    /// Wrap a blocking reader of CSV bytes.
    pub fn reader<R: Read>(self, input: R) -> LineProtocolReader<R> {
        LineProtocolReader::new(input, self.into_converter())
    }

    /// Convert a complete CSV document held in memory.
    pub fn convert_str(self, input: &str) -> Result<String> {
        self.reader(input.as_bytes()).read_all()
    }

    /// Convert an async reader of CSV bytes into a stream of line protocol
    /// chunks.
    ///
    /// Chunks are at least `chunk_size` bytes except for the last one.
    ///
    /// # Example
    ///
    /// ```
    /// use csv2lp::{ConverterConfig, CsvToLineProtocol};
    /// use futures::StreamExt;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<(), csv2lp::Error> {
    /// let csv = "m|measurement,v|long\ncpu,1\ncpu,2\n";
    /// let mut stream = CsvToLineProtocol::new(ConverterConfig::default()).stream(csv.as_bytes());
    ///
    /// let mut out = Vec::new();
    /// while let Some(chunk) = stream.next().await {
    ///     out.extend_from_slice(&chunk?);
    /// }
    /// assert_eq!(out, b"cpu v=1i\ncpu v=2i\n");
    /// # Ok(())
    /// # }
    /// ```
    pub fn stream<R>(self, input: R) -> LineProtocolStream
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let mut converter = self.into_converter();
        let config = converter.config().clone();

        let s = stream! {
            let mut input = BufReader::new(input);
            let mut skipped_lines = 0u64;
            let mut discard = Vec::new();
            for _ in 0..config.skip_header_lines {
                discard.clear();
                match input.read_until(b'\n', &mut discard).await {
                    Ok(0) => break,
                    Ok(_) => skipped_lines += 1,
                    Err(e) => {
                        error!(error = %e, "failed to skip header lines");
                        yield Err(Error::Io(e));
                        return;
                    }
                }
            }

            let mut csv = AsyncReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .delimiter(config.delimiter)
                .trim(if config.trim { Trim::Fields } else { Trim::None })
                .create_reader(input);
            let mut records = csv.records();
            let mut chunk = String::new();

            loop {
                let record = match records.next().await {
                    Some(Ok(record)) => record,
                    Some(Err(e)) => {
                        if !chunk.is_empty() {
                            yield Ok(Bytes::from(std::mem::take(&mut chunk)));
                        }
                        let e = Error::from(e);
                        error!(error = %e, "conversion aborted");
                        yield Err(e);
                        break;
                    }
                    None => break,
                };
                let line = record.position().map_or(0, |p| p.line()) + skipped_lines;
                let row: Vec<&str> = record.iter().collect();
                if let Err(e) = converter.push_row(&row, line, &mut chunk) {
                    if !chunk.is_empty() {
                        yield Ok(Bytes::from(std::mem::take(&mut chunk)));
                    }
                    error!(error = %e, "conversion aborted");
                    yield Err(e);
                    break;
                }
                if chunk.len() >= config.chunk_size {
                    yield Ok(Bytes::from(std::mem::take(&mut chunk)));
                }
            }
            if !chunk.is_empty() {
                yield Ok(Bytes::from(chunk));
            }
            debug!(
                records = converter.records_written(),
                skipped = converter.rows_skipped(),
                sections = converter.sections(),
                "conversion finished"
            );
        };

        Box::pin(s)
    }

    /// Convert an async reader of CSV bytes into an async reader of line
    /// protocol bytes.
    pub fn async_reader<R>(self, input: R) -> StreamReader<LineProtocolStream, Bytes>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        StreamReader::new(self.stream(input))
    }
}
