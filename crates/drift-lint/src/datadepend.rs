//! Data-dependent change detection.
//!
//! Some schema changes are valid DDL yet fail or silently misbehave the
//! moment the table holds data: adding a NOT NULL column without a
//! default, narrowing a column type, or adding a unique index over rows
//! that may already contain duplicates. The span tracker keeps these
//! checks quiet for tables and columns born in the same file, where no
//! data can exist yet.

use async_trait::async_trait;

use drift_core::DriftResult;
use drift_db::changes::{Change as SchemaChange, ModifyKind, TableChange};

use crate::{Analyzer, Diagnostic, Pass, Report, ResourceSpan};

/// Reports changes whose outcome depends on existing data.
pub struct DataDepend;

#[async_trait]
impl Analyzer for DataDepend {
    async fn analyze(&self, pass: &Pass<'_>) -> DriftResult<()> {
        let file = pass.file;
        let mut diagnostics = Vec::new();
        for change in &file.changes {
            for c in &change.changes {
                let SchemaChange::ModifyTable {
                    schema,
                    table,
                    changes,
                } = c
                else {
                    continue;
                };
                // A table created in this file holds no data yet.
                if file.table_span(schema, table).contains(ResourceSpan::ADDED) {
                    continue;
                }
                for tc in changes {
                    match tc {
                        TableChange::AddColumn { column }
                            if !column.null && column.default.is_none() =>
                        {
                            diagnostics.push(Diagnostic {
                                pos: change.pos,
                                text: format!(
                                    "adding a non-nullable column {:?} to table {table:?} \
                                     without a default value fails when rows exist",
                                    column.name
                                ),
                            });
                        }
                        TableChange::ModifyColumn { from, to, kind }
                            if kind.contains(ModifyKind::TYPE)
                                && narrows(&from.type_raw, &to.type_raw) =>
                        {
                            diagnostics.push(Diagnostic {
                                pos: change.pos,
                                text: format!(
                                    "changing column {:?} from {:?} to {:?} may truncate \
                                     existing values",
                                    to.name, from.type_raw, to.type_raw
                                ),
                            });
                        }
                        TableChange::AddIndex { index }
                            if index.unique
                                && !index.columns.iter().all(|c| {
                                    file.column_span(schema, table, c)
                                        .contains(ResourceSpan::ADDED)
                                }) =>
                        {
                            diagnostics.push(Diagnostic {
                                pos: change.pos,
                                text: format!(
                                    "adding a unique index {:?} on table {table:?} fails when \
                                     duplicate entries exist",
                                    index.name
                                ),
                            });
                        }
                        _ => {}
                    }
                }
            }
        }
        if !diagnostics.is_empty() {
            pass.reporter.write_report(&Report {
                text: format!("data-dependent changes detected in {}", file.name()),
                diagnostics,
            });
        }
        Ok(())
    }
}

/// Returns whether converting `from` to `to` can lose information.
///
/// Two heuristics cover the common cases: a parenthesized size that
/// shrinks within the same base type, and a step down the integer
/// width ladder.
fn narrows(from: &str, to: &str) -> bool {
    if let (Some((from_base, from_size)), Some((to_base, to_size))) =
        (split_sized(from), split_sized(to))
    {
        if from_base.eq_ignore_ascii_case(&to_base) {
            return to_size < from_size;
        }
    }
    match (int_rank(from), int_rank(to)) {
        (Some(f), Some(t)) => t < f,
        _ => false,
    }
}

/// Splits `base(size)` into its parts.
fn split_sized(ty: &str) -> Option<(String, u64)> {
    let open = ty.find('(')?;
    let close = ty.rfind(')')?;
    let size = ty[open + 1..close].trim().parse().ok()?;
    Some((ty[..open].trim().to_string(), size))
}

fn int_rank(ty: &str) -> Option<u8> {
    match ty.trim().to_ascii_lowercase().as_str() {
        "tinyint" => Some(1),
        "smallint" => Some(2),
        "int" | "integer" => Some(3),
        "bigint" => Some(4),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::testutil::MemReporter;
    use crate::{Change, File};
    use drift_db::mock::MockDriver;
    use drift_db::schema::{Column, Index, Table};
    use drift_migrate::dir::MigrationFile;
    use std::sync::Arc;

    async fn analyze(changes: Vec<(usize, Vec<SchemaChange>)>) -> Vec<crate::Report> {
        let changes = changes
            .into_iter()
            .map(|(pos, cs)| Change {
                changes: cs,
                stmt: String::new(),
                pos,
            })
            .collect();
        let file = File::new(
            MigrationFile::new("20230101000000_t.sql", Vec::new()),
            changes,
            Vec::new(),
        );
        let reporter = MemReporter::new();
        let pass = Pass {
            file: &file,
            dev: Arc::new(MockDriver::new("mock")),
            reporter: reporter.clone(),
        };
        DataDepend.analyze(&pass).await.unwrap();
        reporter.reports()
    }

    fn modify(changes: Vec<TableChange>) -> Vec<SchemaChange> {
        vec![SchemaChange::ModifyTable {
            schema: "main".into(),
            table: "users".into(),
            changes,
        }]
    }

    // ── not-null column additions ───────────────────────────────────

    #[tokio::test]
    async fn test_not_null_column_without_default_reported() {
        let reports = analyze(vec![(
            5,
            modify(vec![TableChange::AddColumn {
                column: Column::new("age", "int"),
            }]),
        )]).await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].diagnostics[0].pos, 5);
        assert!(reports[0].diagnostics[0].text.contains("age"));
    }

    #[tokio::test]
    async fn test_not_null_column_with_default_silent() {
        let reports = analyze(vec![(
            0,
            modify(vec![TableChange::AddColumn {
                column: Column::new("age", "int").with_default("0"),
            }]),
        )]).await;
        assert!(reports.is_empty());
    }

    #[tokio::test]
    async fn test_nullable_column_silent() {
        let reports = analyze(vec![(
            0,
            modify(vec![TableChange::AddColumn {
                column: Column::new("age", "int").nullable(),
            }]),
        )]).await;
        assert!(reports.is_empty());
    }

    #[tokio::test]
    async fn test_new_table_in_same_file_silent() {
        let reports = analyze(vec![
            (
                0,
                vec![SchemaChange::AddTable {
                    table: Table::new("main", "users"),
                }],
            ),
            (
                30,
                modify(vec![TableChange::AddColumn {
                    column: Column::new("age", "int"),
                }]),
            ),
        ]).await;
        assert!(reports.is_empty());
    }

    // ── type narrowing ──────────────────────────────────────────────

    #[tokio::test]
    async fn test_varchar_shrink_reported() {
        let reports = analyze(vec![(
            0,
            modify(vec![TableChange::ModifyColumn {
                from: Column::new("email", "varchar(255)"),
                to: Column::new("email", "varchar(100)"),
                kind: ModifyKind::TYPE,
            }]),
        )]).await;
        assert_eq!(reports.len(), 1);
        assert!(reports[0].diagnostics[0].text.contains("truncate"));
    }

    #[tokio::test]
    async fn test_varchar_grow_silent() {
        let reports = analyze(vec![(
            0,
            modify(vec![TableChange::ModifyColumn {
                from: Column::new("email", "varchar(100)"),
                to: Column::new("email", "varchar(255)"),
                kind: ModifyKind::TYPE,
            }]),
        )]).await;
        assert!(reports.is_empty());
    }

    #[test]
    fn test_integer_narrowing() {
        assert!(narrows("bigint", "int"));
        assert!(narrows("int", "smallint"));
        assert!(!narrows("smallint", "bigint"));
        assert!(!narrows("text", "varchar(10)"));
        assert!(narrows("varchar(20)", "varchar(10)"));
    }

    // ── unique indexes ──────────────────────────────────────────────

    #[tokio::test]
    async fn test_unique_index_on_existing_column_reported() {
        let reports = analyze(vec![(
            0,
            modify(vec![TableChange::AddIndex {
                index: Index::new("users_email", vec!["email".into()]).unique(),
            }]),
        )]).await;
        assert_eq!(reports.len(), 1);
        assert!(reports[0].diagnostics[0].text.contains("duplicate"));
    }

    #[tokio::test]
    async fn test_unique_index_on_column_added_in_file_silent() {
        let reports = analyze(vec![
            (
                0,
                modify(vec![TableChange::AddColumn {
                    column: Column::new("email", "varchar(255)").nullable(),
                }]),
            ),
            (
                50,
                modify(vec![TableChange::AddIndex {
                    index: Index::new("users_email", vec!["email".into()]).unique(),
                }]),
            ),
        ]).await;
        assert!(reports.is_empty());
    }

    #[tokio::test]
    async fn test_non_unique_index_silent() {
        let reports = analyze(vec![(
            0,
            modify(vec![TableChange::AddIndex {
                index: Index::new("users_email", vec!["email".into()]),
            }]),
        )]).await;
        assert!(reports.is_empty());
    }
}
