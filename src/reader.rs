//! Blocking adapter: annotated CSV in, line protocol bytes out.

use std::io::{self, BufRead, BufReader, Read};

use crate::config::ConverterConfig;
use crate::error::{Error, Result};
use crate::parser::LineProtocolConverter;

/// Build the CSV tokenizer the same way for every adapter.
pub(crate) fn csv_reader<R: Read>(config: &ConverterConfig, input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(config.delimiter)
        .trim(if config.trim {
            csv::Trim::Fields
        } else {
            csv::Trim::None
        })
        .from_reader(input)
}

/// A [`Read`] implementation producing line protocol from annotated CSV.
///
/// Rows are converted lazily as the output is consumed, so memory use stays
/// bounded by `chunk_size` plus one row regardless of input size. Recoverable
/// problems are reported to the converter's diagnostic sink. A fatal error is
/// returned once after all output produced before it, later reads return 0.
///
/// ```
/// use std::io::Read;
/// use csv2lp::{ConverterConfig, CsvToLineProtocol};
///
/// let csv = "#datatype measurement,tag,double\nm,host,load\ncpu,a,0.5\n";
/// let mut reader = CsvToLineProtocol::new(ConverterConfig::default()).reader(csv.as_bytes());
/// let mut out = String::new();
/// reader.read_to_string(&mut out)?;
/// assert_eq!(out, "cpu,host=a load=0.5\n");
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct LineProtocolReader<R: Read> {
    input: Option<R>,
    csv: Option<csv::Reader<BufReader<R>>>,
    record: csv::StringRecord,
    converter: LineProtocolConverter,
    skipped_lines: u64,
    pending: String,
    pos: usize,
    done: bool,
    error: Option<Error>,
}

impl<R: Read> LineProtocolReader<R> {
    pub(crate) fn new(input: R, converter: LineProtocolConverter) -> Self {
        Self {
            input: Some(input),
            csv: None,
            record: csv::StringRecord::new(),
            converter,
            skipped_lines: 0,
            pending: String::new(),
            pos: 0,
            done: false,
            error: None,
        }
    }

    /// The converter driving this reader, for its counters.
    pub fn converter(&self) -> &LineProtocolConverter {
        &self.converter
    }

    /// Convert the remaining input into one string.
    pub(crate) fn read_all(mut self) -> Result<String> {
        self.fill(usize::MAX)?;
        Ok(self.pending.split_off(self.pos))
    }

    /// Skip the configured leading lines and set up the CSV tokenizer.
    fn start(&mut self) -> Result<()> {
        let Some(input) = self.input.take() else {
            return Ok(());
        };
        let mut input = BufReader::new(input);
        let mut discard = Vec::new();
        for _ in 0..self.converter.config().skip_header_lines {
            discard.clear();
            if input.read_until(b'\n', &mut discard)? == 0 {
                break;
            }
            self.skipped_lines += 1;
        }
        self.csv = Some(csv_reader(self.converter.config(), input));
        Ok(())
    }

    /// Convert rows until at least `limit` bytes are pending.
    ///
    /// Returns false once the input is exhausted.
    fn fill(&mut self, limit: usize) -> Result<bool> {
        self.start()?;
        let Self {
            csv,
            record,
            converter,
            skipped_lines,
            pending,
            ..
        } = self;
        let Some(csv) = csv else {
            return Ok(false);
        };

        while pending.len() < limit {
            if !csv.read_record(record)? {
                return Ok(false);
            }
            let line = record.position().map_or(0, |p| p.line()) + *skipped_lines;
            let row: Vec<&str> = record.iter().collect();
            converter.push_row(&row, line, pending)?;
        }
        Ok(true)
    }
}

impl<R: Read> Read for LineProtocolReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos == self.pending.len() {
            if self.done {
                return match self.error.take() {
                    Some(e) => Err(e.into()),
                    None => Ok(0),
                };
            }
            self.pending.clear();
            self.pos = 0;
            match self.fill(self.converter.config().chunk_size) {
                Ok(more) => self.done = !more,
                Err(e) => {
                    tracing::error!(error = %e, "conversion aborted");
                    self.error = Some(e);
                    self.done = true;
                }
            }
        }

        let available = &self.pending.as_bytes()[self.pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::diagnostic::Diagnostic;

    fn reader(config: ConverterConfig, input: &str) -> LineProtocolReader<&[u8]> {
        LineProtocolReader::new(input.as_bytes(), LineProtocolConverter::new(config))
    }

    #[test]
    fn test_read_to_string() {
        let csv = "#datatype measurement,tag,long,dateTime:number\n\
                   m,host,v,time\n\
                   cpu,a,1,10\n\
                   cpu,b,2,20\n";
        let mut out = String::new();
        reader(ConverterConfig::default(), csv)
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "cpu,host=a v=1i 10\ncpu,host=b v=2i 20\n");
    }

    #[test]
    fn test_small_buffers_and_chunks() {
        let mut csv = String::from("m|measurement,v|long\n");
        for i in 0..100 {
            csv.push_str(&format!("cpu,{}\n", i));
        }
        let mut r = reader(ConverterConfig::default().with_chunk_size(7), &csv);
        let mut out = Vec::new();
        let mut buf = [0u8; 3];
        loop {
            let n = r.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        let out = String::from_utf8(out).unwrap();
        assert_eq!(out.lines().count(), 100);
        assert!(out.starts_with("cpu v=0i\ncpu v=1i\n"));
        assert_eq!(r.converter().records_written(), 100);
        for _ in 0..3 {
            assert_eq!(r.read(&mut buf).unwrap(), 0);
        }
    }

    #[test]
    fn test_read_all_ignores_chunk_size() {
        let mut csv = String::from("m|measurement,v|long\n");
        for i in 0..50 {
            csv.push_str(&format!("cpu,{}\n", i));
        }
        let out = reader(ConverterConfig::default().with_chunk_size(16), &csv)
            .read_all()
            .unwrap();
        assert_eq!(out.lines().count(), 50);
        assert!(out.ends_with("cpu v=49i\n"));
    }

    /// Yields its data, then fails like a dropped connection.
    struct BrokenInput {
        data: &'static [u8],
    }

    impl Read for BrokenInput {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.data.is_empty() {
                return Err(io::ErrorKind::ConnectionReset.into());
            }
            let n = self.data.len().min(buf.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_input_error_after_output() {
        let input = BrokenInput {
            data: b"m|measurement,v|long\ncpu,1\ncpu,2\n",
        };
        let mut r = LineProtocolReader::new(
            input,
            LineProtocolConverter::new(ConverterConfig::default()),
        );
        let mut buf = [0u8; 64];
        let n = r.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"cpu v=1i\ncpu v=2i\n");
        let err = r.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(r.read(&mut buf).unwrap(), 0);
        assert_eq!(r.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_skip_header_lines_keeps_line_numbers() {
        let diagnostics = Arc::new(Mutex::new(Vec::<Diagnostic>::new()));
        let converter = LineProtocolConverter::with_sink(
            ConverterConfig::default().with_skip_header_lines(2),
            Box::new(Arc::clone(&diagnostics)),
        );
        let csv = "exported,by\nsome tool\nm|measurement,v|long\ncpu,x\ncpu,2\n";
        let out = LineProtocolReader::new(csv.as_bytes(), converter)
            .read_all()
            .unwrap();
        assert_eq!(out, "cpu v=2i\n");
        let diagnostics = diagnostics.lock().unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].line, 4);
    }

    #[test]
    fn test_fatal_error_after_output() {
        let csv = "m|measurement,v|long\ncpu,1\ncpu,x\ncpu,3\n";
        let mut r = reader(
            ConverterConfig::default().with_skip_row_on_error(false),
            csv,
        );
        let mut buf = [0u8; 64];
        let n = r.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"cpu v=1i\n");
        let err = r.read(&mut buf).unwrap_err();
        assert!(err.to_string().contains("line 3"));
        assert_eq!(r.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_semicolon_delimiter_and_trim() {
        let csv = "m|measurement; v|double\ncpu ; 1.5\n";
        let out = reader(
            ConverterConfig::default().with_delimiter(b';').with_trim(true),
            csv,
        )
        .read_all()
        .unwrap();
        assert_eq!(out, "cpu v=1.5\n");
    }

    #[test]
    fn test_invalid_utf8_is_fatal() {
        let input: &[u8] = b"m|measurement,v|string\ncpu,\xff\xfe\n";
        let r = LineProtocolReader::new(
            input,
            LineProtocolConverter::new(ConverterConfig::default()),
        );
        assert!(matches!(r.read_all(), Err(Error::Csv(_))));
    }
}
