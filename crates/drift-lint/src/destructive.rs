//! Destructive change detection.
//!
//! Dropping a schema, table, column, or index destroys data or access
//! paths that may still be needed. A drop is only safe to stay silent
//! about when the resource's span is temporary, meaning the same file
//! created it.

use async_trait::async_trait;

use drift_core::DriftResult;
use drift_db::changes::{Change as SchemaChange, TableChange};

use crate::{Analyzer, Diagnostic, Pass, Report};

/// Reports drops of resources that existed before the file.
pub struct Destructive;

#[async_trait]
impl Analyzer for Destructive {
    async fn analyze(&self, pass: &Pass<'_>) -> DriftResult<()> {
        let file = pass.file;
        let mut diagnostics = Vec::new();
        for change in &file.changes {
            for c in &change.changes {
                match c {
                    SchemaChange::DropSchema { schema } => {
                        if !file.schema_span(schema).is_temporary() {
                            diagnostics.push(Diagnostic {
                                pos: change.pos,
                                text: format!("dropping schema {schema:?}"),
                            });
                        }
                    }
                    SchemaChange::DropTable { schema, table } => {
                        if !file.table_span(schema, table).is_temporary() {
                            diagnostics.push(Diagnostic {
                                pos: change.pos,
                                text: format!("dropping table {table:?}"),
                            });
                        }
                    }
                    SchemaChange::ModifyTable {
                        schema,
                        table,
                        changes,
                    } => {
                        for tc in changes {
                            match tc {
                                TableChange::DropColumn { column } => {
                                    if !file.column_span(schema, table, column).is_temporary() {
                                        diagnostics.push(Diagnostic {
                                            pos: change.pos,
                                            text: format!(
                                                "dropping column {column:?} from table {table:?}"
                                            ),
                                        });
                                    }
                                }
                                TableChange::DropIndex { index } => {
                                    if !file.index_span(schema, table, index).is_temporary() {
                                        diagnostics.push(Diagnostic {
                                            pos: change.pos,
                                            text: format!(
                                                "dropping index {index:?} from table {table:?}"
                                            ),
                                        });
                                    }
                                }
                                _ => {}
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        if !diagnostics.is_empty() {
            pass.reporter.write_report(&Report {
                text: format!("destructive changes detected in {}", file.name()),
                diagnostics,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::testutil::MemReporter;
    use crate::{Change, File};
    use drift_db::mock::MockDriver;
    use drift_db::schema::{Column, Table};
    use drift_migrate::dir::MigrationFile;
    use std::sync::Arc;

    fn pass_over(file: &File, reporter: Arc<MemReporter>) -> Pass<'_> {
        Pass {
            file,
            dev: Arc::new(MockDriver::new("mock")),
            reporter,
        }
    }

    fn file_with(changes: Vec<(usize, Vec<SchemaChange>)>) -> File {
        let changes = changes
            .into_iter()
            .map(|(pos, cs)| Change {
                changes: cs,
                stmt: String::new(),
                pos,
            })
            .collect();
        File::new(
            MigrationFile::new("20230101000000_t.sql", Vec::new()),
            changes,
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn test_drop_preexisting_table_reported() {
        let file = file_with(vec![(
            12,
            vec![SchemaChange::DropTable {
                schema: "main".into(),
                table: "users".into(),
            }],
        )]);
        let reporter = MemReporter::new();
        Destructive
            .analyze(&pass_over(&file, reporter.clone()))
            .await
            .unwrap();
        let reports = reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].diagnostics.len(), 1);
        assert_eq!(reports[0].diagnostics[0].pos, 12);
        assert!(reports[0].diagnostics[0].text.contains("users"));
    }

    #[tokio::test]
    async fn test_temporary_table_not_reported() {
        let file = file_with(vec![
            (
                0,
                vec![SchemaChange::AddTable {
                    table: Table::new("main", "tmp").with_column(Column::new("id", "bigint")),
                }],
            ),
            (
                40,
                vec![SchemaChange::DropTable {
                    schema: "main".into(),
                    table: "tmp".into(),
                }],
            ),
        ]);
        let reporter = MemReporter::new();
        Destructive
            .analyze(&pass_over(&file, reporter.clone()))
            .await
            .unwrap();
        assert!(reporter.reports().is_empty());
    }

    #[tokio::test]
    async fn test_drop_column_and_index_reported() {
        let file = file_with(vec![(
            0,
            vec![SchemaChange::ModifyTable {
                schema: "main".into(),
                table: "users".into(),
                changes: vec![
                    TableChange::DropColumn {
                        column: "email".into(),
                    },
                    TableChange::DropIndex {
                        index: "users_email".into(),
                    },
                ],
            }],
        )]);
        let reporter = MemReporter::new();
        Destructive
            .analyze(&pass_over(&file, reporter.clone()))
            .await
            .unwrap();
        let reports = reporter.reports();
        assert_eq!(reports[0].diagnostics.len(), 2);
    }

    #[tokio::test]
    async fn test_drop_schema_reported() {
        let file = file_with(vec![(
            0,
            vec![SchemaChange::DropSchema {
                schema: "legacy".into(),
            }],
        )]);
        let reporter = MemReporter::new();
        Destructive
            .analyze(&pass_over(&file, reporter.clone()))
            .await
            .unwrap();
        assert!(reporter.reports()[0].diagnostics[0].text.contains("legacy"));
    }
}
