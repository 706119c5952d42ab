//! Side channel for recoverable conversion problems.
//!
//! Bad rows and broken schema sections never stop the output stream. Each one
//! is described by a [`Diagnostic`] handed to a [`DiagnosticSink`].

use std::sync::{Arc, Mutex};

use serde::Serialize;

/// Which part of the input a diagnostic is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A data row was skipped.
    Row,
    /// A schema section was suspended or a column was dropped from it.
    Schema,
    /// An annotation row was skipped.
    Annotation,
}

/// One recoverable problem found during conversion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Source line number, 1-based.
    pub line: u64,
    /// What was affected.
    pub kind: DiagnosticKind,
    /// Human readable cause.
    pub message: String,
}

impl Diagnostic {
    /// Create a diagnostic.
    pub fn new(line: u64, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            line,
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            DiagnosticKind::Row => "row skipped",
            DiagnosticKind::Schema => "schema",
            DiagnosticKind::Annotation => "annotation skipped",
        };
        write!(f, "line {}: {}: {}", self.line, kind, self.message)
    }
}

/// Receiver of diagnostics.
pub trait DiagnosticSink {
    /// Record one diagnostic.
    fn report(&mut self, diagnostic: Diagnostic);
}

/// Default sink that logs each diagnostic with `tracing::warn!`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&mut self, diagnostic: Diagnostic) {
        tracing::warn!(
            line = diagnostic.line,
            kind = ?diagnostic.kind,
            "{}",
            diagnostic.message
        );
    }
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

/// Shared collector, handy when the converter takes ownership of the sink.
impl DiagnosticSink for Arc<Mutex<Vec<Diagnostic>>> {
    fn report(&mut self, diagnostic: Diagnostic) {
        match self.lock() {
            Ok(mut v) => v.push(diagnostic),
            Err(poisoned) => poisoned.into_inner().push(diagnostic),
        }
    }
}

impl<F> DiagnosticSink for F
where
    F: FnMut(Diagnostic),
{
    fn report(&mut self, diagnostic: Diagnostic) {
        self(diagnostic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let d = Diagnostic::new(3, DiagnosticKind::Row, "Row has no fields");
        assert_eq!(d.to_string(), "line 3: row skipped: Row has no fields");
    }

    #[test]
    fn test_closure_sink() {
        let mut count = 0;
        {
            let mut sink = |_: Diagnostic| count += 1;
            sink.report(Diagnostic::new(1, DiagnosticKind::Schema, "x"));
            sink.report(Diagnostic::new(2, DiagnosticKind::Schema, "y"));
        }
        assert_eq!(count, 2);
    }

    #[test]
    fn test_shared_sink() {
        let shared = Arc::new(Mutex::new(Vec::new()));
        let mut sink = Arc::clone(&shared);
        sink.report(Diagnostic::new(9, DiagnosticKind::Annotation, "#foo"));
        assert_eq!(shared.lock().unwrap()[0].line, 9);
    }

    #[test]
    fn test_serialize() {
        let d = Diagnostic::new(5, DiagnosticKind::Schema, "no measurement");
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(
            json,
            r#"{"line":5,"kind":"schema","message":"no measurement"}"#
        );
    }
}
