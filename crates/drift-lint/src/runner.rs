//! The analysis runner.
//!
//! [`Runner`] ties the pipeline together: the detector chooses which files
//! are new, the base files are replayed silently on the dev database, and
//! each new file is executed statement by statement with the realm
//! re-inspected after every statement so the per-statement semantic
//! changes can be reconstructed by diffing consecutive snapshots.

use std::sync::Arc;

use drift_core::{DriftError, DriftResult};
use drift_db::driver::Driver;
use drift_migrate::dir::Dir;
use drift_migrate::planner::reset_dev;

use crate::detect::ChangeDetector;
use crate::report::{CountingWriter, ReportWriter};
use crate::{Analyzer, Change, File, Pass};

/// Replays new migration files and runs the analyzer chain on each.
pub struct Runner {
    /// The dev driver used for replay and inspection.
    pub dev: Arc<dyn Driver>,
    /// The migration directory.
    pub dir: Arc<dyn Dir>,
    /// Chooses the base and new file sets.
    pub detector: Box<dyn ChangeDetector>,
    /// The analyzers, run in order per file.
    pub analyzers: Vec<Box<dyn Analyzer>>,
    /// Where reports go.
    pub reporter: Arc<dyn ReportWriter>,
}

impl Runner {
    /// Runs the pipeline and returns the number of diagnostics reported.
    pub async fn run(&self) -> DriftResult<usize> {
        let (base, new) = self.detector.detect()?;
        reset_dev(self.dev.as_ref()).await?;
        for file in &base {
            for stmt in file.statements()? {
                self.dev.exec(&stmt.text).await.map_err(|e| {
                    DriftError::Analyzer(format!("replaying base file {}: {e}", file.name))
                })?;
            }
        }

        let counting = Arc::new(CountingWriter::new(self.reporter.clone()));
        for file in new {
            let start = self.dev.inspect_realm(&[]).await?;
            let mut previous = start.clone();
            let mut changes = Vec::new();
            for stmt in file.statements()? {
                self.dev.exec(&stmt.text).await.map_err(|e| {
                    DriftError::Analyzer(format!("executing {}: {e}", file.name))
                })?;
                let current = self.dev.inspect_realm(&[]).await?;
                changes.push(Change {
                    changes: self.dev.realm_diff(&previous, &current),
                    stmt: stmt.text.clone(),
                    pos: stmt.pos,
                });
                previous = current;
            }
            let sum = self.dev.realm_diff(&start, &previous);
            let file = File::new(file, changes, sum);
            let pass = Pass {
                file: &file,
                dev: self.dev.clone(),
                reporter: counting.clone(),
            };
            for analyzer in &self.analyzers {
                analyzer.analyze(&pass).await?;
            }
        }
        Ok(counting.count())
    }
}
