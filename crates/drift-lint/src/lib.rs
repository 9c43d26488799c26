//! # drift-lint
//!
//! Analysis of migration file contents. New files (relative to a baseline)
//! are replayed on a dev database, the semantic changes behind every
//! statement are reconstructed, and a chain of analyzers turns them into
//! positional diagnostics.
//!
//! ## Architecture
//!
//! - This module - [`Analyzer`], [`Pass`], [`File`], [`Report`],
//!   [`Diagnostic`], and the per-file resource span tracker.
//! - [`detect`] - [`ChangeDetector`](detect::ChangeDetector)
//!   implementations selecting which files count as "new".
//! - [`runner`] - [`Runner`](runner::Runner), the replay-and-analyze
//!   pipeline.
//! - [`destructive`] - Detection of schema/table/column/index drops.
//! - [`datadepend`] - Detection of changes that depend on existing data.
//! - [`report`] - [`ReportWriter`] sinks.

#![allow(clippy::result_large_err)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod datadepend;
pub mod destructive;
pub mod detect;
pub mod report;
pub mod runner;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;

use drift_core::DriftResult;
use drift_db::changes::{Change as SchemaChange, TableChange};
use drift_db::driver::Driver;
use drift_migrate::dir::MigrationFile;

pub use datadepend::DataDepend;
pub use destructive::Destructive;
pub use detect::{ChangeDetector, GitChangeDetector, LatestChanges};
pub use report::{ReportWriter, TextWriter};
pub use runner::Runner;

/// A migration file analyzer.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyzes one file pass.
    async fn analyze(&self, pass: &Pass<'_>) -> DriftResult<()>;
}

/// A list of analyzers run in order.
pub struct Analyzers(pub Vec<Box<dyn Analyzer>>);

#[async_trait]
impl Analyzer for Analyzers {
    async fn analyze(&self, pass: &Pass<'_>) -> DriftResult<()> {
        for analyzer in &self.0 {
            analyzer.analyze(pass).await?;
        }
        Ok(())
    }
}

/// The information handed to each analyzer for one file.
pub struct Pass<'a> {
    /// The analyzed file and its reconstructed changes.
    pub file: &'a File,
    /// The dev driver, available for analysis queries.
    pub dev: Arc<dyn Driver>,
    /// Where reports go.
    pub reporter: Arc<dyn ReportWriter>,
}

/// A parsed migration file with its semantic changes.
pub struct File {
    file: MigrationFile,
    /// Per-statement changes, in file order.
    pub changes: Vec<Change>,
    /// The aggregated net diff across the whole file. Changes that cancel
    /// out leave this empty.
    pub sum: Vec<SchemaChange>,
    spans: OnceLock<HashMap<String, SchemaSpan>>,
}

/// The changes one statement caused, with its position in the file.
#[derive(Debug, Clone)]
pub struct Change {
    /// The semantic changes.
    pub changes: Vec<SchemaChange>,
    /// The SQL statement that produced them.
    pub stmt: String,
    /// Byte offset of the statement in the file.
    pub pos: usize,
}

/// An analysis report with positional diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    /// The report headline.
    pub text: String,
    /// The diagnostics backing it.
    pub diagnostics: Vec<Diagnostic>,
}

/// A text tied to a statement position in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Byte offset of the offending statement.
    pub pos: usize,
    /// What is wrong.
    pub text: String,
}

// ── Resource spans ───────────────────────────────────────────────────

/// The lifespan of a resource relative to one migration file.
///
/// A bitmask: a resource both added and dropped within the same file is
/// `TEMPORARY`, and analyzers use that to skip scratch resources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceSpan(u8);

impl ResourceSpan {
    /// The resource may exist before this file; nothing is known.
    pub const UNKNOWN: Self = Self(0);
    /// The resource's life starts in this file.
    pub const ADDED: Self = Self(1);
    /// The resource's life ends in this file.
    pub const DROPPED: Self = Self(2);
    /// The resource is created and dropped within this file.
    pub const TEMPORARY: Self = Self(3);

    /// Returns whether all bits of `other` are set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns whether the resource lives only inside this file.
    pub const fn is_temporary(self) -> bool {
        self.0 == Self::TEMPORARY.0
    }
}

impl std::ops::BitOrAssign for ResourceSpan {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[derive(Debug, Default)]
struct SchemaSpan {
    state: ResourceSpan,
    tables: HashMap<String, TableSpan>,
}

#[derive(Debug, Default)]
struct TableSpan {
    state: ResourceSpan,
    columns: HashMap<String, ResourceSpan>,
    indexes: HashMap<String, ResourceSpan>,
}

impl File {
    /// Builds a file record from its parts.
    pub fn new(file: MigrationFile, changes: Vec<Change>, sum: Vec<SchemaChange>) -> Self {
        Self {
            file,
            changes,
            sum,
            spans: OnceLock::new(),
        }
    }

    /// Returns the file name.
    pub fn name(&self) -> &str {
        &self.file.name
    }

    /// Returns the underlying migration file.
    pub fn migration(&self) -> &MigrationFile {
        &self.file
    }

    /// Returns the span of a schema.
    pub fn schema_span(&self, schema: &str) -> ResourceSpan {
        self.spans()
            .get(schema)
            .map(|s| s.state)
            .unwrap_or_default()
    }

    /// Returns the span of a table.
    pub fn table_span(&self, schema: &str, table: &str) -> ResourceSpan {
        self.lookup_table(schema, table)
            .map(|t| t.state)
            .unwrap_or_default()
    }

    /// Returns the span of a column.
    pub fn column_span(&self, schema: &str, table: &str, column: &str) -> ResourceSpan {
        self.lookup_table(schema, table)
            .and_then(|t| t.columns.get(column).copied())
            .unwrap_or_default()
    }

    /// Returns the span of an index.
    pub fn index_span(&self, schema: &str, table: &str, index: &str) -> ResourceSpan {
        self.lookup_table(schema, table)
            .and_then(|t| t.indexes.get(index).copied())
            .unwrap_or_default()
    }

    fn lookup_table(&self, schema: &str, table: &str) -> Option<&TableSpan> {
        self.spans().get(schema)?.tables.get(table)
    }

    /// Folds every change in the file into the span map. Keys are names,
    /// never object references, so cyclic models cannot occur here.
    fn spans(&self) -> &HashMap<String, SchemaSpan> {
        self.spans.get_or_init(|| {
            let mut spans: HashMap<String, SchemaSpan> = HashMap::new();
            for change in &self.changes {
                for c in &change.changes {
                    match c {
                        SchemaChange::AddSchema { schema } => {
                            spans.entry(schema.clone()).or_default().state =
                                ResourceSpan::ADDED;
                        }
                        SchemaChange::DropSchema { schema } => {
                            spans.entry(schema.clone()).or_default().state |=
                                ResourceSpan::DROPPED;
                        }
                        SchemaChange::AddTable { table } => {
                            let span = spans
                                .entry(table.schema.clone())
                                .or_default()
                                .tables
                                .entry(table.name.clone())
                                .or_default();
                            span.state = ResourceSpan::ADDED;
                            for column in &table.columns {
                                span.columns
                                    .insert(column.name.clone(), ResourceSpan::ADDED);
                            }
                            for index in &table.indexes {
                                span.indexes.insert(index.name.clone(), ResourceSpan::ADDED);
                            }
                        }
                        SchemaChange::DropTable { schema, table } => {
                            spans
                                .entry(schema.clone())
                                .or_default()
                                .tables
                                .entry(table.clone())
                                .or_default()
                                .state |= ResourceSpan::DROPPED;
                        }
                        SchemaChange::ModifyTable {
                            schema,
                            table,
                            changes,
                        } => {
                            let span = spans
                                .entry(schema.clone())
                                .or_default()
                                .tables
                                .entry(table.clone())
                                .or_default();
                            for tc in changes {
                                match tc {
                                    TableChange::AddColumn { column } => {
                                        span.columns
                                            .insert(column.name.clone(), ResourceSpan::ADDED);
                                    }
                                    TableChange::DropColumn { column } => {
                                        *span.columns.entry(column.clone()).or_default() |=
                                            ResourceSpan::DROPPED;
                                    }
                                    TableChange::AddIndex { index } => {
                                        span.indexes
                                            .insert(index.name.clone(), ResourceSpan::ADDED);
                                    }
                                    TableChange::DropIndex { index } => {
                                        *span.indexes.entry(index.clone()).or_default() |=
                                            ResourceSpan::DROPPED;
                                    }
                                    _ => {}
                                }
                            }
                        }
                    }
                }
            }
            spans
        })
    }
}
