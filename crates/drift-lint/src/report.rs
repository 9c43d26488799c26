//! Report sinks.
//!
//! Analyzers emit [`Report`]s through a [`ReportWriter`]. The default
//! [`TextWriter`] renders the report headline followed by one line per
//! diagnostic; the [`CountingWriter`] decorator tallies diagnostics so the
//! runner can report how many were found.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::Report;

/// A writer for analysis reports.
pub trait ReportWriter: Send + Sync {
    /// Receives one report.
    fn write_report(&self, report: &Report);
}

/// Renders reports as plain text to any writer.
pub struct TextWriter<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> TextWriter<W> {
    /// Wraps the output writer.
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Returns the inner writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap()
    }
}

impl<W: Write + Send> ReportWriter for TextWriter<W> {
    fn write_report(&self, report: &Report) {
        let mut out = self.out.lock().unwrap();
        let _ = writeln!(out, "{}", report.text);
        for d in &report.diagnostics {
            let _ = writeln!(out, "\tpos:{}: {}", d.pos, d.text);
        }
    }
}

/// Counts diagnostics while forwarding reports to an inner writer.
pub struct CountingWriter {
    inner: Arc<dyn ReportWriter>,
    count: AtomicUsize,
}

impl CountingWriter {
    /// Wraps the inner writer.
    pub fn new(inner: Arc<dyn ReportWriter>) -> Self {
        Self {
            inner,
            count: AtomicUsize::new(0),
        }
    }

    /// Returns the number of diagnostics seen so far.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl ReportWriter for CountingWriter {
    fn write_report(&self, report: &Report) {
        self.count
            .fetch_add(report.diagnostics.len(), Ordering::SeqCst);
        self.inner.write_report(report);
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::ReportWriter;
    use crate::Report;
    use std::sync::{Arc, Mutex};

    /// Collects reports for assertions.
    pub struct MemReporter(Mutex<Vec<Report>>);

    impl MemReporter {
        pub fn new() -> Arc<Self> {
            Arc::new(Self(Mutex::new(Vec::new())))
        }

        pub fn reports(&self) -> Vec<Report> {
            self.0.lock().unwrap().clone()
        }
    }

    impl ReportWriter for MemReporter {
        fn write_report(&self, report: &Report) {
            self.0.lock().unwrap().push(report.clone());
        }
    }
}
