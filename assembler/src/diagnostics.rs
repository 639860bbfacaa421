//! Recoverable assembly problems.
//!
//! The parser and linker never log-and-forget: every problem is handed to a
//! [`DiagnosticSink`] together with the file and line it belongs to.

use serde::Serialize;
use std::fmt;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub file: String,
    pub line: u32,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Error => write!(f, "{}:{} > {}", self.file, self.line, self.message),
            Severity::Warning => write!(f, "{}:{} > warning: {}", self.file, self.line, self.message),
        }
    }
}

/// Receiver for diagnostics produced while assembling
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

/// Collects diagnostics in order and mirrors them to `tracing`
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|diagnostic| diagnostic.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|diagnostic| !diagnostic.is_error())
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<Diagnostic> {
        self.entries
    }
}

impl DiagnosticSink for Diagnostics {
    fn report(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Warning => warn!("{}", diagnostic),
            Severity::Error => error!("{}", diagnostic),
        }
        self.entries.push(diagnostic);
    }
}

/// Attaches the file name to diagnostics and counts them for one run
pub(crate) struct Reporter<'a> {
    file: String,
    sink: &'a mut dyn DiagnosticSink,
    errors: usize,
    warnings: usize,
}

impl<'a> Reporter<'a> {
    pub(crate) fn new(file: &str, sink: &'a mut dyn DiagnosticSink) -> Self {
        Self {
            file: file.to_string(),
            sink,
            errors: 0,
            warnings: 0,
        }
    }

    pub(crate) fn file(&self) -> &str {
        &self.file
    }

    pub(crate) fn error(&mut self, line: u32, message: String) {
        self.errors += 1;
        self.emit(line, Severity::Error, message);
    }

    pub(crate) fn warning(&mut self, line: u32, message: String) {
        self.warnings += 1;
        self.emit(line, Severity::Warning, message);
    }

    pub(crate) fn errors(&self) -> usize {
        self.errors
    }

    pub(crate) fn warnings(&self) -> usize {
        self.warnings
    }

    fn emit(&mut self, line: u32, severity: Severity, message: String) {
        self.sink.report(Diagnostic {
            file: self.file.clone(),
            line,
            severity,
            message,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_format() {
        let error = Diagnostic {
            file: "prog.jas".to_string(),
            line: 12,
            severity: Severity::Error,
            message: "Undefined instruction `FOO`".to_string(),
        };
        assert_eq!(error.to_string(), "prog.jas:12 > Undefined instruction `FOO`");

        let warning = Diagnostic {
            severity: Severity::Warning,
            message: "Duplicate variable `a`".to_string(),
            ..error
        };
        assert_eq!(warning.to_string(), "prog.jas:12 > warning: Duplicate variable `a`");
    }

    #[test]
    fn test_reporter_counts_by_severity() {
        let mut diagnostics = Diagnostics::new();
        {
            let mut reporter = Reporter::new("a.jas", &mut diagnostics);
            reporter.warning(1, "first".to_string());
            reporter.error(2, "second".to_string());
            reporter.error(3, "third".to_string());
            assert_eq!(reporter.errors(), 2);
            assert_eq!(reporter.warnings(), 1);
        }

        assert_eq!(diagnostics.len(), 3);
        assert!(diagnostics.has_errors());
        assert_eq!(diagnostics.warnings().count(), 1);
        let lines: Vec<u32> = diagnostics.errors().map(|d| d.line).collect();
        assert_eq!(lines, vec![2, 3]);
        assert!(diagnostics.entries().iter().all(|d| d.file == "a.jas"));
    }

    #[test]
    fn test_warnings_only_is_not_failure() {
        let mut diagnostics = Diagnostics::new();
        Reporter::new("a.jas", &mut diagnostics).warning(4, "harmless".to_string());
        assert!(!diagnostics.has_errors());
        assert!(!diagnostics.is_empty());
    }
}
