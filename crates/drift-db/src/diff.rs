//! A pure, dialect-neutral realm differ.
//!
//! [`diff_realms`] compares two [`Realm`] values and produces the ordered
//! change list that transforms the first into the second. Dialect drivers
//! may refine this baseline (collation rules, implicit defaults); the mock
//! driver uses it as is.
//!
//! Ordering: schema additions first, then per-table work (adds, modifies,
//! drops), then schema drops. Within a modified table: columns, indexes,
//! foreign keys.

use crate::changes::{Change, ModifyKind, TableChange};
use crate::schema::{Realm, Table};

/// Computes the changes that turn `from` into `to`.
pub fn diff_realms(from: &Realm, to: &Realm) -> Vec<Change> {
    let mut changes = Vec::new();

    // Added schemas, together with their tables.
    for s in &to.schemas {
        if from.schema(&s.name).is_none() {
            changes.push(Change::AddSchema {
                schema: s.name.clone(),
            });
            for t in &s.tables {
                changes.push(Change::AddTable { table: t.clone() });
            }
        }
    }

    // Schemas present on both sides: diff their tables.
    for s in &to.schemas {
        let Some(old) = from.schema(&s.name) else {
            continue;
        };
        for t in &s.tables {
            match old.table(&t.name) {
                None => changes.push(Change::AddTable { table: t.clone() }),
                Some(prev) => {
                    let table_changes = diff_tables(prev, t);
                    if !table_changes.is_empty() {
                        changes.push(Change::ModifyTable {
                            schema: s.name.clone(),
                            table: t.name.clone(),
                            changes: table_changes,
                        });
                    }
                }
            }
        }
        for t in &old.tables {
            if s.table(&t.name).is_none() {
                changes.push(Change::DropTable {
                    schema: s.name.clone(),
                    table: t.name.clone(),
                });
            }
        }
    }

    // Dropped schemas.
    for s in &from.schemas {
        if to.schema(&s.name).is_none() {
            changes.push(Change::DropSchema {
                schema: s.name.clone(),
            });
        }
    }

    changes
}

/// Computes the table-scoped changes that turn `from` into `to`.
fn diff_tables(from: &Table, to: &Table) -> Vec<TableChange> {
    let mut changes = Vec::new();

    for c in &to.columns {
        match from.column(&c.name) {
            None => changes.push(TableChange::AddColumn { column: c.clone() }),
            Some(prev) => {
                let mut kind = ModifyKind::NONE;
                if prev.type_raw != c.type_raw {
                    kind |= ModifyKind::TYPE;
                }
                if prev.null != c.null {
                    kind |= ModifyKind::NULL;
                }
                if prev.default != c.default {
                    kind |= ModifyKind::DEFAULT;
                }
                if !kind.is_empty() {
                    changes.push(TableChange::ModifyColumn {
                        from: prev.clone(),
                        to: c.clone(),
                        kind,
                    });
                }
            }
        }
    }
    for c in &from.columns {
        if to.column(&c.name).is_none() {
            changes.push(TableChange::DropColumn {
                column: c.name.clone(),
            });
        }
    }

    // Indexes have no modify variant; a changed index is a drop plus an add.
    for i in &to.indexes {
        match from.index(&i.name) {
            None => changes.push(TableChange::AddIndex { index: i.clone() }),
            Some(prev) if prev != i => {
                changes.push(TableChange::DropIndex {
                    index: i.name.clone(),
                });
                changes.push(TableChange::AddIndex { index: i.clone() });
            }
            Some(_) => {}
        }
    }
    for i in &from.indexes {
        if to.index(&i.name).is_none() {
            changes.push(TableChange::DropIndex {
                index: i.name.clone(),
            });
        }
    }

    for f in &to.foreign_keys {
        match from.foreign_key(&f.name) {
            None => changes.push(TableChange::AddForeignKey { fk: f.clone() }),
            Some(prev) if prev != f => changes.push(TableChange::ModifyForeignKey {
                from: prev.clone(),
                to: f.clone(),
            }),
            Some(_) => {}
        }
    }
    for f in &from.foreign_keys {
        if to.foreign_key(&f.name).is_none() {
            changes.push(TableChange::DropForeignKey {
                fk: f.name.clone(),
            });
        }
    }

    changes
}
